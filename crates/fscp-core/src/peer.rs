//! Per-peer protocol state machine.
//!
//! A [`PeerState`] holds everything the engine knows about one remote party:
//! its validated certificates, its last host identifier, the current and
//! provisional sessions, the in-flight negotiation and the queue of frames
//! waiting for keys. It is pure protocol logic: inputs are parsed (and
//! signature-verified) messages plus timer ticks, outputs are
//! [`PeerAction`]s the owning actor executes. All methods run inside one
//! actor, so nothing here locks.

use crate::config::EngineConfig;
use crate::endpoint::Endpoint;
use crate::error::{Error, PolicyError, Result, StateError};
use crate::identifier::HostIdentifier;
use crate::message::{write_message, MessageType};
use crate::messages::{
    ContactEntry, ContactPayload, ContactRequestPayload, PresentationMessage, SessionMessage,
    SessionRequestMessage,
};
use crate::session::ActiveSession;
use crate::{CHANNEL_CONTACT, CHANNEL_CONTACT_REQUEST, CHANNEL_DATA, CHANNEL_KEEPALIVE};
use fscp_crypto::{
    derive_session_keys, select_parameters, Certificate, CipherSuite, EllipticCurve,
    EphemeralKeyPair, Fingerprint, IdentityStore,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Local material and policy shared by every peer state
pub struct LocalContext {
    /// The local certificates and keys
    pub identity: Arc<IdentityStore>,
    /// This process incarnation's identifier
    pub host_identifier: HostIdentifier,
    /// Offered cipher suites, in preference order
    pub cipher_suites: Vec<CipherSuite>,
    /// Offered curves, in preference order
    pub elliptic_curves: Vec<EllipticCurve>,
    /// Accept changed certificates for a known endpoint
    pub allow_peer_cert_rotation: bool,
    /// Retransmission delays; length is the retry budget
    pub retransmit_schedule: Vec<Duration>,
    /// Idle time before a session is dropped
    pub session_timeout: Duration,
    /// Keep-alive interval
    pub keepalive_period: Duration,
    /// Bound on frames queued while a session is negotiated
    pub pending_queue_limit: usize,
}

impl LocalContext {
    /// Build a context from the engine configuration
    #[must_use]
    pub fn new(
        identity: Arc<IdentityStore>,
        host_identifier: HostIdentifier,
        config: &EngineConfig,
    ) -> Self {
        Self {
            identity,
            host_identifier,
            cipher_suites: config.cipher_suite_capabilities.clone(),
            elliptic_curves: config.elliptic_curve_capabilities.clone(),
            allow_peer_cert_rotation: config.allow_peer_cert_rotation,
            retransmit_schedule: config.retransmit_schedule.clone(),
            session_timeout: config.session_timeout,
            keepalive_period: config.keepalive_period,
            pending_queue_limit: config.pending_queue_limit,
        }
    }
}

/// A peer's validated certificates
#[derive(Debug, Clone)]
pub struct PeerCertificates {
    /// The signing certificate
    pub signing: Certificate,
    /// The encryption certificate (the signing one when not distinct)
    pub encryption: Certificate,
}

/// Effects the owning actor must carry out, in order
#[derive(Debug)]
pub enum PeerAction {
    /// Transmit a datagram to this peer's endpoint
    Send(Vec<u8>),
    /// Hand a decrypted user frame to the dispatcher
    DeliverFrame(Vec<u8>),
    /// The peer asked for endpoint hints for these fingerprints
    ContactRequested(Vec<Fingerprint>),
    /// The peer sent endpoint hints
    ContactReceived(Vec<ContactEntry>),
    /// A session is keyed and usable
    SessionEstablished {
        /// The agreed session number
        session_number: u32,
    },
    /// The session was dropped (idle timeout or peer restart)
    SessionLost,
    /// A negotiation exceeded its retransmission budget
    NegotiationTimedOut,
}

struct Retransmit {
    datagram: Vec<u8>,
    attempt: usize,
    next_at: Instant,
}

impl Retransmit {
    fn new(datagram: Vec<u8>, schedule: &[Duration]) -> Self {
        let first = schedule.first().copied().unwrap_or(Duration::from_secs(1));
        Self {
            datagram,
            attempt: 0,
            next_at: Instant::now() + first,
        }
    }
}

enum Negotiation {
    /// Our SESSION_REQUEST is in flight
    Requested {
        session_number: u32,
        retransmit: Retransmit,
    },
    /// We answered the peer's request with our SESSION and await theirs
    Answered {
        session_number: u32,
        suite: CipherSuite,
        curve: EllipticCurve,
        ephemeral: EphemeralKeyPair,
        retransmit: Retransmit,
    },
}

/// The long-lived state for one remote party
pub struct PeerState {
    endpoint: Endpoint,
    ctx: Arc<LocalContext>,
    certs: Option<PeerCertificates>,
    remote_host: Option<HostIdentifier>,
    last_accepted_remote_number: Option<u32>,
    highest_local_number: u32,
    current: Option<ActiveSession>,
    next: Option<ActiveSession>,
    negotiation: Option<Negotiation>,
    last_session_sent: Option<(u32, Vec<u8>)>,
    pending: VecDeque<(u8, Vec<u8>)>,
    presentation_sent: bool,
    greet_pending: bool,
    last_keepalive: Instant,
}

impl PeerState {
    /// Create the state for a peer at `endpoint`
    #[must_use]
    pub fn new(endpoint: Endpoint, ctx: Arc<LocalContext>) -> Self {
        Self {
            endpoint,
            ctx,
            certs: None,
            remote_host: None,
            last_accepted_remote_number: None,
            highest_local_number: 0,
            current: None,
            next: None,
            negotiation: None,
            last_session_sent: None,
            pending: VecDeque::new(),
            presentation_sent: false,
            greet_pending: false,
            last_keepalive: Instant::now(),
        }
    }

    /// The peer's endpoint
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// The peer's validated certificates, once presented
    #[must_use]
    pub fn certificates(&self) -> Option<&PeerCertificates> {
        self.certs.as_ref()
    }

    /// Whether a keyed session exists (provisional or active)
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.current.is_some() || self.next.is_some()
    }

    /// The newest keyed session's number
    #[must_use]
    pub fn session_number(&self) -> Option<u32> {
        self.next
            .as_ref()
            .or(self.current.as_ref())
            .map(ActiveSession::session_number)
    }

    /// Fingerprint of the peer's signing certificate
    #[must_use]
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.certs.as_ref().map(|c| c.signing.fingerprint())
    }

    fn newest_session_mut(&mut self) -> Option<&mut ActiveSession> {
        self.next.as_mut().or(self.current.as_mut())
    }

    fn presentation_datagram(&self) -> Vec<u8> {
        let identity = &self.ctx.identity;
        let body = PresentationMessage {
            signature_certificate: identity.signing_certificate().der().to_vec(),
            encryption_certificate: identity
                .encryption_certificate()
                .map(|c| c.der().to_vec()),
        }
        .to_bytes();
        write_message(MessageType::Presentation, &body)
    }

    /// Start (or resume) contacting this peer: present ourselves, then
    /// negotiate a session as soon as its certificates are known.
    ///
    /// # Errors
    ///
    /// Propagates signing failures from the session request.
    pub fn greet(&mut self) -> Result<Vec<PeerAction>> {
        let mut actions = Vec::new();

        if !self.presentation_sent {
            actions.push(PeerAction::Send(self.presentation_datagram()));
            self.presentation_sent = true;
        }

        if self.certs.is_some()
            && !self.has_session()
            && self.negotiation.is_none()
        {
            actions.extend(self.initiate_session()?);
        } else if !self.has_session() {
            self.greet_pending = true;
        }

        Ok(actions)
    }

    /// Install the peer's certificates after engine-level trust validation.
    ///
    /// Re-presenting identical certificates is a no-op. Different
    /// certificates are accepted only under the rotation policy and clear any
    /// prior session.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::RotationRefused` when the certificates changed
    /// and rotation is disabled.
    pub fn install_certificates(
        &mut self,
        signing: Certificate,
        encryption: Option<Certificate>,
    ) -> Result<Vec<PeerAction>> {
        let encryption = encryption.unwrap_or_else(|| signing.clone());

        let mut actions = Vec::new();

        if let Some(existing) = &self.certs {
            if existing.signing == signing && existing.encryption == encryption {
                // Same identity again; nothing changes.
            } else if !self.ctx.allow_peer_cert_rotation {
                return Err(PolicyError::RotationRefused.into());
            } else {
                tracing::info!(peer = %self.endpoint, "peer rotated certificates, dropping session");
                if self.drop_sessions() {
                    actions.push(PeerAction::SessionLost);
                }
                self.certs = Some(PeerCertificates {
                    signing,
                    encryption,
                });
            }
        } else {
            self.certs = Some(PeerCertificates {
                signing,
                encryption,
            });
        }

        if !self.presentation_sent {
            actions.push(PeerAction::Send(self.presentation_datagram()));
            self.presentation_sent = true;
        }

        if self.greet_pending && !self.has_session() && self.negotiation.is_none() {
            actions.extend(self.initiate_session()?);
        }

        Ok(actions)
    }

    fn drop_sessions(&mut self) -> bool {
        let had = self.has_session();
        self.current = None;
        self.next = None;
        self.negotiation = None;
        self.last_session_sent = None;
        had
    }

    fn next_proposal_number(&self) -> u32 {
        let floor = [
            Some(self.highest_local_number),
            self.last_accepted_remote_number,
            self.current.as_ref().map(ActiveSession::session_number),
            self.next.as_ref().map(ActiveSession::session_number),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0);
        floor.wrapping_add(1)
    }

    /// Propose a fresh session (initial negotiation or rekey).
    ///
    /// # Errors
    ///
    /// Returns `StateError::OutOfOrderHandshake` before the peer presented
    /// itself, or a crypto error if signing fails.
    pub fn initiate_session(&mut self) -> Result<Vec<PeerAction>> {
        if self.certs.is_none() {
            self.greet_pending = true;
            return Err(StateError::OutOfOrderHandshake.into());
        }

        let session_number = self.next_proposal_number();
        let body = SessionRequestMessage::write(
            session_number,
            self.ctx.host_identifier,
            &self.ctx.cipher_suites,
            &self.ctx.elliptic_curves,
            self.ctx.identity.signing_key(),
        )?;
        let datagram = write_message(MessageType::SessionRequest, &body);

        self.highest_local_number = session_number;
        self.negotiation = Some(Negotiation::Requested {
            session_number,
            retransmit: Retransmit::new(datagram.clone(), &self.ctx.retransmit_schedule),
        });

        tracing::debug!(peer = %self.endpoint, session_number, "proposing session");
        Ok(vec![PeerAction::Send(datagram)])
    }

    fn note_remote_host(&mut self, host: HostIdentifier, actions: &mut Vec<PeerAction>) {
        if let Some(previous) = self.remote_host {
            if previous != host {
                tracing::info!(peer = %self.endpoint, "peer restarted, resetting session state");
                if self.drop_sessions() {
                    actions.push(PeerAction::SessionLost);
                }
                self.last_accepted_remote_number = None;
            }
        }
        self.remote_host = Some(host);
    }

    /// Handle a signature-verified SESSION_REQUEST.
    ///
    /// # Errors
    ///
    /// Returns `StateError` for out-of-order or regressing proposals and
    /// `PolicyError::NoAcceptableParameters` when capabilities do not
    /// intersect. Either way the message is simply not answered.
    pub fn on_session_request(&mut self, msg: &SessionRequestMessage) -> Result<Vec<PeerAction>> {
        if self.certs.is_none() {
            return Err(StateError::OutOfOrderHandshake.into());
        }

        let mut actions = Vec::new();
        self.note_remote_host(msg.host_identifier, &mut actions);

        if let Some(last) = self.last_accepted_remote_number {
            if msg.session_number <= last {
                return Err(StateError::SessionNumberRegression {
                    last,
                    proposed: msg.session_number,
                }
                .into());
            }
        }

        // Simultaneous proposals: the lower host identifier wins.
        if let Some(Negotiation::Requested { session_number, .. }) = &self.negotiation {
            if self
                .ctx
                .host_identifier
                .wins_against(&msg.host_identifier)
            {
                tracing::debug!(
                    peer = %self.endpoint,
                    ours = session_number,
                    theirs = msg.session_number,
                    "ignoring losing simultaneous proposal"
                );
                return Ok(actions);
            }
            tracing::debug!(peer = %self.endpoint, "discarding our losing proposal");
            self.negotiation = None;
        }

        let (suite, curve) = select_parameters(
            &self.ctx.cipher_suites,
            &self.ctx.elliptic_curves,
            &msg.known_cipher_suites(),
            &msg.known_elliptic_curves(),
        )
        .ok_or(PolicyError::NoAcceptableParameters)?;

        let ephemeral = EphemeralKeyPair::generate(curve)?;
        let body = SessionMessage::write(
            msg.session_number,
            self.ctx.host_identifier,
            suite,
            curve,
            &ephemeral.public_key_bytes(),
            self.ctx.identity.signing_key(),
        )?;
        let datagram = write_message(MessageType::Session, &body);

        self.last_accepted_remote_number = Some(msg.session_number);
        self.last_session_sent = Some((msg.session_number, datagram.clone()));
        self.negotiation = Some(Negotiation::Answered {
            session_number: msg.session_number,
            suite,
            curve,
            ephemeral,
            retransmit: Retransmit::new(datagram.clone(), &self.ctx.retransmit_schedule),
        });

        tracing::debug!(
            peer = %self.endpoint,
            session_number = msg.session_number,
            %suite,
            %curve,
            "accepted session proposal"
        );

        actions.push(PeerAction::Send(datagram));
        Ok(actions)
    }

    /// Handle a signature-verified SESSION.
    ///
    /// # Errors
    ///
    /// Returns `StateError::OutOfOrderHandshake` for sessions that match no
    /// in-flight negotiation, `MessageError` for unknown parameter codes and
    /// crypto errors for agreement failures.
    pub fn on_session(&mut self, msg: &SessionMessage) -> Result<Vec<PeerAction>> {
        if self.certs.is_none() {
            return Err(StateError::OutOfOrderHandshake.into());
        }

        let mut actions = Vec::new();
        self.note_remote_host(msg.host_identifier, &mut actions);

        match self.negotiation.take() {
            Some(Negotiation::Requested {
                session_number,
                retransmit,
            }) => {
                if msg.session_number != session_number {
                    self.negotiation = Some(Negotiation::Requested {
                        session_number,
                        retransmit,
                    });
                    return Err(StateError::OutOfOrderHandshake.into());
                }

                let suite = msg.suite().map_err(Error::Message)?;
                let curve = msg.curve().map_err(Error::Message)?;
                if !self.ctx.cipher_suites.contains(&suite)
                    || !self.ctx.elliptic_curves.contains(&curve)
                {
                    // The peer picked something we never offered.
                    return Err(PolicyError::NoAcceptableParameters.into());
                }

                let ephemeral = EphemeralKeyPair::generate(curve)?;
                let body = SessionMessage::write(
                    session_number,
                    self.ctx.host_identifier,
                    suite,
                    curve,
                    &ephemeral.public_key_bytes(),
                    self.ctx.identity.signing_key(),
                )?;
                let datagram = write_message(MessageType::Session, &body);
                self.last_session_sent = Some((session_number, datagram.clone()));

                actions.push(PeerAction::Send(datagram));
                actions.extend(self.key_session(session_number, suite, curve, &ephemeral, msg)?);
                Ok(actions)
            }
            Some(Negotiation::Answered {
                session_number,
                suite,
                curve,
                ephemeral,
                retransmit,
            }) => {
                if msg.session_number != session_number
                    || msg.cipher_suite != suite.code()
                    || msg.elliptic_curve != curve.code()
                {
                    self.negotiation = Some(Negotiation::Answered {
                        session_number,
                        suite,
                        curve,
                        ephemeral,
                        retransmit,
                    });
                    return Err(StateError::OutOfOrderHandshake.into());
                }

                actions.extend(self.key_session(session_number, suite, curve, &ephemeral, msg)?);
                Ok(actions)
            }
            None => {
                // A retransmitted SESSION for keys we already derived: the
                // peer missed our answer, repeat it verbatim.
                if let Some((sent_number, datagram)) = &self.last_session_sent {
                    if *sent_number == msg.session_number
                        && self.session_number() == Some(msg.session_number)
                    {
                        actions.push(PeerAction::Send(datagram.clone()));
                        return Ok(actions);
                    }
                }
                Err(StateError::OutOfOrderHandshake.into())
            }
        }
    }

    fn key_session(
        &mut self,
        session_number: u32,
        suite: CipherSuite,
        curve: EllipticCurve,
        ephemeral: &EphemeralKeyPair,
        msg: &SessionMessage,
    ) -> Result<Vec<PeerAction>> {
        let shared_secret = ephemeral.agree(&msg.public_key)?;
        let keys = derive_session_keys(
            suite,
            &shared_secret,
            session_number,
            self.ctx.host_identifier.as_bytes(),
            msg.host_identifier.as_bytes(),
        )?;
        let session = ActiveSession::new(session_number, suite, curve, &keys)?;

        self.next = Some(session);
        self.greet_pending = false;

        tracing::info!(
            peer = %self.endpoint,
            session_number,
            %suite,
            %curve,
            "session keyed"
        );

        let mut actions = vec![PeerAction::SessionEstablished { session_number }];
        actions.extend(self.flush_pending());
        Ok(actions)
    }

    fn flush_pending(&mut self) -> Vec<PeerAction> {
        let mut actions = Vec::new();
        while let Some((channel, frame)) = self.pending.pop_front() {
            let Some(session) = self.newest_session_mut() else {
                self.pending.push_front((channel, frame));
                break;
            };
            match session.encrypt_data(channel, &frame) {
                Ok(datagram) => actions.push(PeerAction::Send(datagram)),
                Err(_) => {
                    self.pending.push_front((channel, frame));
                    break;
                }
            }
        }
        actions
    }

    /// Handle a data body received on `channel`.
    ///
    /// Decryption is attempted against the current session first, then the
    /// provisional one; success under the provisional session promotes it
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns `StateError::SessionNotReady` without a session, replay and
    /// AEAD errors otherwise.
    pub fn on_data(&mut self, channel: u8, body: &[u8]) -> Result<Vec<PeerAction>> {
        let plaintext = self.decrypt_with_promotion(channel, body)?;

        let mut actions = Vec::new();
        match channel {
            CHANNEL_DATA => actions.push(PeerAction::DeliverFrame(plaintext)),
            CHANNEL_CONTACT => {
                let payload = ContactPayload::parse(&plaintext).map_err(Error::Message)?;
                actions.push(PeerAction::ContactReceived(payload.entries));
            }
            CHANNEL_CONTACT_REQUEST => {
                let payload =
                    ContactRequestPayload::parse(&plaintext).map_err(Error::Message)?;
                actions.push(PeerAction::ContactRequested(payload.fingerprints));
            }
            CHANNEL_KEEPALIVE => {
                tracing::trace!(peer = %self.endpoint, "keep-alive");
            }
            _ => {
                tracing::debug!(peer = %self.endpoint, channel, "dropping frame on reserved channel");
            }
        }

        Ok(actions)
    }

    fn decrypt_with_promotion(&mut self, channel: u8, body: &[u8]) -> Result<Vec<u8>> {
        if self.current.is_none() && self.next.is_none() {
            return Err(StateError::SessionNotReady.into());
        }

        if let Some(current) = self.current.as_mut() {
            match current.decrypt_data(channel, body) {
                Ok(plaintext) => return Ok(plaintext),
                Err(err) => {
                    if self.next.is_none() {
                        return Err(err);
                    }
                }
            }
        }

        let Some(next) = self.next.as_mut() else {
            return Err(StateError::SessionNotReady.into());
        };
        let plaintext = next.decrypt_data(channel, body)?;

        // First traffic under the provisional session replaces the current
        // one atomically.
        let promoted = self.next.take();
        if let Some(promoted) = promoted {
            tracing::debug!(
                peer = %self.endpoint,
                session_number = promoted.session_number(),
                "promoting provisional session"
            );
            self.current = Some(promoted);
        }

        Ok(plaintext)
    }

    /// Queue or send a frame to this peer on `channel`.
    ///
    /// Without a keyed session the frame is queued (bounded, oldest dropped).
    /// Sequence exhaustion queues the frame and starts a rekey.
    ///
    /// # Errors
    ///
    /// Propagates signing failures when a rekey proposal is produced.
    pub fn send_frame(&mut self, channel: u8, frame: Vec<u8>) -> Result<Vec<PeerAction>> {
        let encrypted = self
            .newest_session_mut()
            .map(|session| session.encrypt_data(channel, &frame));

        match encrypted {
            None => {
                self.queue_frame(channel, frame);
                if self.certs.is_some() && self.negotiation.is_none() {
                    return self.initiate_session();
                }
                self.greet_pending = true;
                Ok(Vec::new())
            }
            Some(Ok(datagram)) => Ok(vec![PeerAction::Send(datagram)]),
            Some(Err(Error::State(StateError::SequenceExhausted(_)))) => {
                // Renegotiate before this frame may leave.
                self.queue_frame(channel, frame);
                if self.negotiation.is_none() {
                    tracing::info!(peer = %self.endpoint, "sequence numbers exhausted, rekeying");
                    self.initiate_session()
                } else {
                    Ok(Vec::new())
                }
            }
            Some(Err(err)) => Err(err),
        }
    }

    fn queue_frame(&mut self, channel: u8, frame: Vec<u8>) {
        if self.pending.len() >= self.ctx.pending_queue_limit {
            self.pending.pop_front();
            tracing::warn!(peer = %self.endpoint, "pending queue overflow, dropping oldest frame");
        }
        self.pending.push_back((channel, frame));
    }

    /// Ask this peer for endpoint hints.
    ///
    /// # Errors
    ///
    /// As [`Self::send_frame`].
    pub fn request_contacts(&mut self, fingerprints: Vec<Fingerprint>) -> Result<Vec<PeerAction>> {
        let payload = ContactRequestPayload { fingerprints }.to_bytes();
        self.send_frame(CHANNEL_CONTACT_REQUEST, payload)
    }

    /// Answer a contact request with endpoint hints.
    ///
    /// # Errors
    ///
    /// As [`Self::send_frame`].
    pub fn send_contacts(&mut self, entries: Vec<ContactEntry>) -> Result<Vec<PeerAction>> {
        let payload = ContactPayload { entries }.to_bytes();
        self.send_frame(CHANNEL_CONTACT, payload)
    }

    /// Drive retransmissions, keep-alives and idle expiry.
    pub fn tick(&mut self, now: Instant) -> Vec<PeerAction> {
        let mut actions = Vec::new();

        // Retransmit the outstanding handshake datagram, or give up.
        let budget = self.ctx.retransmit_schedule.len();
        let mut timed_out = false;
        if let Some(negotiation) = self.negotiation.as_mut() {
            let retransmit = match negotiation {
                Negotiation::Requested { retransmit, .. }
                | Negotiation::Answered { retransmit, .. } => retransmit,
            };
            if retransmit.next_at <= now {
                retransmit.attempt += 1;
                if retransmit.attempt >= budget {
                    timed_out = true;
                } else {
                    retransmit.next_at = now + self.ctx.retransmit_schedule[retransmit.attempt];
                    actions.push(PeerAction::Send(retransmit.datagram.clone()));
                }
            }
        }
        if timed_out {
            tracing::warn!(peer = %self.endpoint, "session negotiation timed out");
            self.negotiation = None;
            actions.push(PeerAction::NegotiationTimedOut);
        }

        // A session with no authenticated receive traffic for the policy
        // threshold is gone; keep-alives from a live peer refresh it.
        let timeout = self.ctx.session_timeout;
        let last_heard = self
            .next
            .as_ref()
            .or(self.current.as_ref())
            .map(ActiveSession::last_receive);
        if let Some(last_heard) = last_heard {
            if now.saturating_duration_since(last_heard) >= timeout {
                tracing::info!(peer = %self.endpoint, "session idle past timeout, dropping");
                if self.drop_sessions() {
                    actions.push(PeerAction::SessionLost);
                }
            }
        }

        // Keep the session (and the NAT pinhole) warm.
        if self.has_session() && now.duration_since(self.last_keepalive) >= self.ctx.keepalive_period
        {
            self.last_keepalive = now;
            if let Some(session) = self.newest_session_mut() {
                if let Ok(datagram) = session.encrypt_keepalive() {
                    actions.push(PeerAction::Send(datagram));
                }
            }
        }

        actions
    }

    /// Testing support: force the newest session's outbound counter.
    pub fn force_send_sequence(&mut self, channel: u8, sequence: u32) {
        if let Some(session) = self.newest_session_mut() {
            session.set_send_sequence(channel, sequence);
        }
    }
}
