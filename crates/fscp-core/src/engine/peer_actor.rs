//! The per-peer actor.
//!
//! Each peer's protocol state lives in exactly one task; every decision for
//! that peer happens here, serially, so the state machine needs no locks.
//! Inputs arrive as [`PeerCommand`]s (parsed wire messages from the receive
//! loop, frames from the dispatcher, administrative requests); outputs are
//! the [`PeerAction`]s the state machine emits, executed in order.

use super::shared::EngineShared;
use super::{EngineEvent, PresentationRejection};
use crate::endpoint::Endpoint;
use crate::error::{Error, PolicyError, StateError};
use crate::messages::{ContactEntry, SessionMessage, SessionRequestMessage};
use crate::peer::{PeerAction, PeerState};
use crate::switchboard::Port;
use fscp_crypto::{Certificate, Fingerprint};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Actor timer granularity
const TICK_PERIOD: Duration = Duration::from_millis(100);

/// Commands delivered to a peer actor, processed in arrival order
pub(crate) enum PeerCommand {
    /// A parsed SESSION_REQUEST from the wire
    SessionRequest(SessionRequestMessage),
    /// A parsed SESSION from the wire
    Session(SessionMessage),
    /// An encrypted data body from the wire
    Data {
        /// Channel from the type byte
        channel: u8,
        /// Raw body bytes
        body: Vec<u8>,
    },
    /// Certificates that passed engine-level trust validation
    InstallCertificates {
        /// The signing certificate
        signing: Certificate,
        /// The distinct encryption certificate, if any
        encryption: Option<Certificate>,
    },
    /// Present ourselves and negotiate a session
    Greet,
    /// Tunnel a user frame to this peer
    SendFrame(Vec<u8>),
    /// Ask the peer for endpoint hints
    RequestContacts(Vec<Fingerprint>),
    /// Force a renegotiation
    Rekey,
}

/// Handle to a running peer actor
pub(crate) struct PeerHandle {
    pub tx: mpsc::Sender<PeerCommand>,
}

/// Spawn the actor for `endpoint` and return its handle
pub(crate) fn spawn_peer(shared: Arc<EngineShared>, endpoint: Endpoint) -> PeerHandle {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(run_peer(shared, endpoint, rx));
    PeerHandle { tx }
}

async fn run_peer(
    shared: Arc<EngineShared>,
    endpoint: Endpoint,
    mut rx: mpsc::Receiver<PeerCommand>,
) {
    let mut state = PeerState::new(endpoint, shared.local.clone());
    let mut ticker = tokio::time::interval(TICK_PERIOD);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut shutdown = shared.shutdown_receiver();

    tracing::debug!(peer = %endpoint, "peer actor started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            command = rx.recv() => match command {
                Some(command) => handle_command(&shared, &mut state, command).await,
                None => break,
            },
            _ = ticker.tick() => {
                let actions = state.tick(Instant::now());
                execute_actions(&shared, &mut state, actions).await;
            }
        }
    }

    tracing::debug!(peer = %endpoint, "peer actor stopped");
}

async fn handle_command(shared: &Arc<EngineShared>, state: &mut PeerState, command: PeerCommand) {
    let endpoint = state.endpoint();

    let result = match command {
        PeerCommand::SessionRequest(msg) => match verify_request(state, &msg) {
            Ok(()) => state.on_session_request(&msg),
            Err(err) => Err(err),
        },
        PeerCommand::Session(msg) => match verify_session(state, &msg) {
            Ok(()) => state.on_session(&msg),
            Err(err) => Err(err),
        },
        PeerCommand::Data { channel, body } => state.on_data(channel, &body),
        PeerCommand::InstallCertificates { signing, encryption } => {
            state.install_certificates(signing, encryption)
        }
        PeerCommand::Greet => state.greet(),
        PeerCommand::SendFrame(frame) => state.send_frame(crate::CHANNEL_DATA, frame),
        PeerCommand::RequestContacts(fingerprints) => state.request_contacts(fingerprints),
        PeerCommand::Rekey => state.initiate_session(),
    };

    match result {
        Ok(actions) => execute_actions(shared, state, actions).await,
        Err(err) => handle_error(shared, endpoint, &err).await,
    }
}

fn verify_request(state: &PeerState, msg: &SessionRequestMessage) -> crate::Result<()> {
    let certs = state
        .certificates()
        .ok_or(Error::State(StateError::OutOfOrderHandshake))?;
    msg.verify(certs.signing.public_key())?;
    Ok(())
}

fn verify_session(state: &PeerState, msg: &SessionMessage) -> crate::Result<()> {
    let certs = state
        .certificates()
        .ok_or(Error::State(StateError::OutOfOrderHandshake))?;
    msg.verify(certs.signing.public_key())?;
    Ok(())
}

async fn handle_error(shared: &Arc<EngineShared>, endpoint: Endpoint, err: &Error) {
    match err {
        Error::Crypto(_) => {
            // Bad signatures and undecryptable data count toward the
            // blacklist; the offending message is dropped either way.
            tracing::warn!(peer = %endpoint, error = %err, "dropping message");
            shared.record_handshake_failure(endpoint);
        }
        Error::Policy(PolicyError::RotationRefused) => {
            tracing::warn!(peer = %endpoint, "peer presented new certificates, rotation disabled");
            shared.emit(EngineEvent::PresentationRejected {
                endpoint,
                reason: PresentationRejection::RotationRefused,
            });
            shared.record_handshake_failure(endpoint);
        }
        Error::State(StateError::Replay(_)) => {
            tracing::warn!(peer = %endpoint, error = %err, "replayed datagram dropped");
        }
        _ => {
            tracing::debug!(peer = %endpoint, error = %err, "message ignored");
        }
    }
}

async fn execute_actions(
    shared: &Arc<EngineShared>,
    state: &mut PeerState,
    actions: Vec<PeerAction>,
) {
    let endpoint = state.endpoint();
    let mut queue: VecDeque<PeerAction> = actions.into();

    while let Some(action) = queue.pop_front() {
        match action {
            PeerAction::Send(datagram) => {
                shared.send_to(endpoint, &datagram).await;
            }
            PeerAction::DeliverFrame(frame) => {
                shared.dispatch_frame(Port::Peer(endpoint), frame).await;
            }
            PeerAction::ContactRequested(fingerprints) => {
                if shared.config.contact_sharing_enabled {
                    let entries = shared.contact_entries(&fingerprints, endpoint);
                    if !entries.is_empty() {
                        reply_contacts(state, &mut queue, entries, endpoint);
                    }
                }
            }
            PeerAction::ContactReceived(entries) => {
                shared.handle_contact_entries(entries).await;
            }
            PeerAction::SessionEstablished { session_number } => {
                if let Some(fingerprint) = state.fingerprint() {
                    shared.register_connected(endpoint, fingerprint);
                }
                shared.clear_failures(endpoint);
                shared.emit(EngineEvent::SessionEstablished {
                    endpoint,
                    session_number,
                });
            }
            PeerAction::SessionLost => {
                shared.unregister_connected(endpoint);
                shared.emit(EngineEvent::SessionLost { endpoint });
            }
            PeerAction::NegotiationTimedOut => {
                shared.record_handshake_failure(endpoint);
                shared.emit(EngineEvent::NegotiationTimedOut { endpoint });
            }
        }
    }
}

fn reply_contacts(
    state: &mut PeerState,
    queue: &mut VecDeque<PeerAction>,
    entries: Vec<ContactEntry>,
    endpoint: Endpoint,
) {
    match state.send_contacts(entries) {
        Ok(actions) => queue.extend(actions),
        Err(err) => {
            tracing::debug!(peer = %endpoint, error = %err, "could not answer contact request");
        }
    }
}
