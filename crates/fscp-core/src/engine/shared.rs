//! Engine shared state and its long-running loops.
//!
//! One `EngineShared` backs all engine tasks: the socket receive loop, the
//! TAP read loop, the per-peer actors and the maintenance timer. Peer state
//! itself is never touched here; cross-peer effects travel as actor commands.

use super::events::{EngineEvent, PresentationRejection};
use super::peer_actor::{spawn_peer, PeerCommand, PeerHandle};
use crate::config::EngineConfig;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::message::{write_message, Message, MessageType};
use crate::messages::{
    ContactEntry, HelloMessage, PresentationMessage, SessionMessage, SessionRequestMessage,
};
use crate::peer::LocalContext;
use crate::pool::BufferPool;
use crate::switchboard::{Dispatcher, IpNetwork, Port};
use crate::MAX_DATAGRAM_SIZE;
use fscp_crypto::{Certificate, Fingerprint, IdentityStore, TrustStore};
use fscp_transport::{TapDevice, TapError, Transport, TransportError};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot, watch};

/// How long after a hello an endpoint's presentation counts as solicited
const SOLICITATION_WINDOW: Duration = Duration::from_secs(60);

struct BlacklistEntry {
    failures: u32,
    blocked_until: Option<Instant>,
}

pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) local: Arc<LocalContext>,
    pub(crate) identity: Arc<IdentityStore>,
    pub(crate) trust: TrustStore,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) tap: Arc<dyn TapDevice>,
    pub(crate) peers: DashMap<Endpoint, PeerHandle>,
    pub(crate) connected: DashMap<Endpoint, Fingerprint>,
    pub(crate) pending_hellos: DashMap<u32, oneshot::Sender<()>>,
    recent_contacts: DashMap<Endpoint, Instant>,
    last_seen: DashMap<Endpoint, Instant>,
    blacklist: DashMap<Endpoint, BlacklistEntry>,
    dispatcher: Mutex<Dispatcher>,
    pub(crate) pool: BufferPool,
    events: broadcast::Sender<EngineEvent>,
    shutdown: watch::Sender<bool>,
    me: OnceLock<Weak<EngineShared>>,
}

impl EngineShared {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: EngineConfig,
        local: Arc<LocalContext>,
        identity: Arc<IdentityStore>,
        trust: TrustStore,
        transport: Arc<dyn Transport>,
        tap: Arc<dyn TapDevice>,
        dispatcher: Dispatcher,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let (shutdown, _) = watch::channel(false);
        let pool_buffers = config.pool_buffers;

        let shared = Arc::new(Self {
            config,
            local,
            identity,
            trust,
            transport,
            tap,
            peers: DashMap::new(),
            connected: DashMap::new(),
            pending_hellos: DashMap::new(),
            recent_contacts: DashMap::new(),
            last_seen: DashMap::new(),
            blacklist: DashMap::new(),
            dispatcher: Mutex::new(dispatcher),
            pool: BufferPool::new(MAX_DATAGRAM_SIZE, pool_buffers),
            events,
            shutdown,
            me: OnceLock::new(),
        });

        let _ = shared.me.set(Arc::downgrade(&shared));
        shared
    }

    fn upgrade(&self) -> Option<Arc<EngineShared>> {
        self.me.get().and_then(Weak::upgrade)
    }

    pub(crate) fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(crate) fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub(crate) async fn send_to(&self, endpoint: Endpoint, datagram: &[u8]) {
        if let Err(err) = self.transport.send_to(datagram, endpoint.addr()).await {
            tracing::debug!(peer = %endpoint, error = %err, "datagram send failed");
        }
    }

    // ---- peer registry -------------------------------------------------

    /// Get or create the actor for `endpoint`, returning its mailbox
    pub(crate) fn ensure_peer(
        &self,
        endpoint: Endpoint,
    ) -> Option<tokio::sync::mpsc::Sender<PeerCommand>> {
        if let Some(handle) = self.peers.get(&endpoint) {
            return Some(handle.tx.clone());
        }

        let shared = self.upgrade()?;
        let handle = self
            .peers
            .entry(endpoint)
            .or_insert_with(|| spawn_peer(shared, endpoint));
        Some(handle.tx.clone())
    }

    fn existing_peer(&self, endpoint: Endpoint) -> Option<tokio::sync::mpsc::Sender<PeerCommand>> {
        self.peers.get(&endpoint).map(|handle| handle.tx.clone())
    }

    pub(crate) fn remove_peer(&self, endpoint: Endpoint) {
        // Dropping the handle closes the mailbox; the actor exits on its own.
        self.peers.remove(&endpoint);
        self.connected.remove(&endpoint);
        self.last_seen.remove(&endpoint);
        if let Ok(mut dispatcher) = self.dispatcher.lock() {
            dispatcher.remove_port(Port::Peer(endpoint));
        }
    }

    pub(crate) fn register_connected(&self, endpoint: Endpoint, fingerprint: Fingerprint) {
        self.connected.insert(endpoint, fingerprint);
        if let Ok(mut dispatcher) = self.dispatcher.lock() {
            dispatcher.add_port(Port::Peer(endpoint));
        }
    }

    pub(crate) fn unregister_connected(&self, endpoint: Endpoint) {
        self.connected.remove(&endpoint);
        if let Ok(mut dispatcher) = self.dispatcher.lock() {
            dispatcher.remove_port(Port::Peer(endpoint));
        }
    }

    // ---- blacklist -----------------------------------------------------

    pub(crate) fn is_blacklisted(&self, endpoint: Endpoint) -> bool {
        let Some(entry) = self.blacklist.get(&endpoint) else {
            return false;
        };
        match entry.blocked_until {
            Some(until) => until > Instant::now(),
            None => false,
        }
    }

    pub(crate) fn record_handshake_failure(&self, endpoint: Endpoint) {
        let mut entry = self.blacklist.entry(endpoint).or_insert(BlacklistEntry {
            failures: 0,
            blocked_until: None,
        });
        entry.failures += 1;

        if entry.failures >= self.config.blacklist_threshold {
            entry.failures = 0;
            entry.blocked_until = Some(Instant::now() + self.config.blacklist_cooldown);
            drop(entry);
            tracing::warn!(peer = %endpoint, "endpoint blacklisted after repeated handshake failures");
            self.emit(EngineEvent::PeerBlacklisted { endpoint });
        }
    }

    pub(crate) fn clear_failures(&self, endpoint: Endpoint) {
        self.blacklist.remove(&endpoint);
    }

    // ---- dispatch ------------------------------------------------------

    pub(crate) async fn dispatch_frame(&self, source: Port, frame: Vec<u8>) {
        let targets = match self.dispatcher.lock() {
            Ok(mut dispatcher) => dispatcher.dispatch(source, &frame),
            Err(_) => return,
        };

        for target in targets {
            match target {
                Port::Tap => {
                    if let Err(err) = self.tap.write_frame(&frame).await {
                        tracing::debug!(error = %err, "tap write failed, frame dropped");
                    }
                }
                Port::Peer(endpoint) => {
                    if let Some(tx) = self.existing_peer(endpoint) {
                        if tx.try_send(PeerCommand::SendFrame(frame.clone())).is_err() {
                            tracing::debug!(peer = %endpoint, "peer queue full, frame dropped");
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn set_routes(&self, port: Port, routes: Vec<IpNetwork>) {
        if let Ok(mut dispatcher) = self.dispatcher.lock() {
            if let Dispatcher::Router(router) = &mut *dispatcher {
                router.set_routes(port, routes);
            }
        }
    }

    // ---- contact directory ---------------------------------------------

    pub(crate) fn contact_entries(
        &self,
        wanted: &[Fingerprint],
        requester: Endpoint,
    ) -> Vec<ContactEntry> {
        wanted
            .iter()
            .filter_map(|fingerprint| {
                self.connected.iter().find_map(|entry| {
                    if entry.value() == fingerprint && *entry.key() != requester {
                        Some(ContactEntry {
                            fingerprint: *fingerprint,
                            endpoint: *entry.key(),
                        })
                    } else {
                        None
                    }
                })
            })
            .collect()
    }

    pub(crate) async fn handle_contact_entries(&self, entries: Vec<ContactEntry>) {
        for entry in entries {
            self.emit(EngineEvent::ContactLearned {
                fingerprint: entry.fingerprint,
                endpoint: entry.endpoint,
            });

            let wanted = self
                .config
                .contact_fingerprints
                .contains(&entry.fingerprint);
            let already_connected = self
                .connected
                .iter()
                .any(|e| *e.value() == entry.fingerprint);

            if wanted && !already_connected && !self.is_blacklisted(entry.endpoint) {
                if let Some(shared) = self.upgrade() {
                    tokio::spawn(async move {
                        if let Err(err) = introduce(shared, entry.endpoint).await {
                            tracing::debug!(
                                peer = %entry.endpoint,
                                error = %err,
                                "contact-driven introduction failed"
                            );
                        }
                    });
                }
            }
        }
    }

    // ---- hello ---------------------------------------------------------

    fn mark_recent(&self, endpoint: Endpoint) {
        self.recent_contacts.insert(endpoint, Instant::now());
    }

    fn is_solicited(&self, endpoint: Endpoint) -> bool {
        if self.peers.contains_key(&endpoint) {
            return true;
        }
        match self.recent_contacts.get(&endpoint) {
            Some(seen) => seen.elapsed() < SOLICITATION_WINDOW,
            None => false,
        }
    }

    /// Probe `endpoint` with retried HELLO_REQUESTs.
    ///
    /// # Errors
    ///
    /// `Error::HelloTimeout` when the budget is exhausted, `Error::Cancelled`
    /// on shutdown.
    pub(crate) async fn hello(&self, endpoint: Endpoint) -> Result<()> {
        let unique_number = fscp_crypto::random::random_u32()?;
        let (tx, rx) = oneshot::channel();
        self.pending_hellos.insert(unique_number, tx);
        self.mark_recent(endpoint);

        let datagram = write_message(
            MessageType::HelloRequest,
            &HelloMessage { unique_number }.to_bytes(),
        );

        let result = tokio::time::timeout(
            self.config.hello_timeout,
            self.hello_exchange(endpoint, &datagram, rx),
        )
        .await;

        self.pending_hellos.remove(&unique_number);

        match result {
            Ok(inner) => inner,
            Err(_) => Err(Error::HelloTimeout),
        }
    }

    async fn hello_exchange(
        &self,
        endpoint: Endpoint,
        datagram: &[u8],
        mut rx: oneshot::Receiver<()>,
    ) -> Result<()> {
        let mut shutdown = self.shutdown_receiver();

        for delay in &self.config.retransmit_schedule {
            self.transport.send_to(datagram, endpoint.addr()).await?;

            tokio::select! {
                answered = &mut rx => {
                    return match answered {
                        Ok(()) => Ok(()),
                        Err(_) => Err(Error::Cancelled),
                    };
                }
                _ = shutdown.changed() => return Err(Error::Cancelled),
                () = tokio::time::sleep(*delay) => {}
            }
        }

        Err(Error::HelloTimeout)
    }

    // ---- datagram handling ---------------------------------------------

    pub(crate) async fn handle_datagram(&self, data: &[u8], endpoint: Endpoint) {
        if self.is_blacklisted(endpoint) {
            tracing::trace!(peer = %endpoint, "datagram from blacklisted endpoint dropped");
            return;
        }

        let message = match Message::parse(data) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(peer = %endpoint, error = %err, "malformed datagram dropped");
                return;
            }
        };

        self.last_seen.insert(endpoint, Instant::now());

        match message.message_type() {
            MessageType::HelloRequest => {
                let Ok(hello) = HelloMessage::parse(message.body()) else {
                    return;
                };
                self.mark_recent(endpoint);
                let response =
                    write_message(MessageType::HelloResponse, &hello.to_bytes());
                self.send_to(endpoint, &response).await;
            }
            MessageType::HelloResponse => {
                let Ok(hello) = HelloMessage::parse(message.body()) else {
                    return;
                };
                self.mark_recent(endpoint);
                if let Some((_, tx)) = self.pending_hellos.remove(&hello.unique_number) {
                    let _ = tx.send(());
                }
            }
            MessageType::Presentation => {
                self.handle_presentation(endpoint, message.body()).await;
            }
            MessageType::SessionRequest => {
                let Ok(msg) = SessionRequestMessage::parse(message.body()) else {
                    tracing::debug!(peer = %endpoint, "malformed session request dropped");
                    return;
                };
                self.route_to_peer(endpoint, PeerCommand::SessionRequest(msg))
                    .await;
            }
            MessageType::Session => {
                let Ok(msg) = SessionMessage::parse(message.body()) else {
                    tracing::debug!(peer = %endpoint, "malformed session message dropped");
                    return;
                };
                self.route_to_peer(endpoint, PeerCommand::Session(msg)).await;
            }
            MessageType::Data(channel) => {
                self.route_to_peer(
                    endpoint,
                    PeerCommand::Data {
                        channel,
                        body: message.body().to_vec(),
                    },
                )
                .await;
            }
        }
    }

    async fn route_to_peer(&self, endpoint: Endpoint, command: PeerCommand) {
        match self.existing_peer(endpoint) {
            Some(tx) => {
                if tx.send(command).await.is_err() {
                    tracing::debug!(peer = %endpoint, "peer actor gone, message dropped");
                }
            }
            None => {
                tracing::debug!(peer = %endpoint, "protocol message from unknown peer dropped");
            }
        }
    }

    async fn handle_presentation(&self, endpoint: Endpoint, body: &[u8]) {
        if !self.is_solicited(endpoint) {
            tracing::warn!(peer = %endpoint, "unsolicited presentation rejected");
            self.emit(EngineEvent::PresentationRejected {
                endpoint,
                reason: PresentationRejection::Unsolicited,
            });
            self.record_handshake_failure(endpoint);
            return;
        }

        let Ok(presentation) = PresentationMessage::parse(body) else {
            tracing::debug!(peer = %endpoint, "malformed presentation dropped");
            return;
        };

        // X.509 parsing and RSA chain verification are CPU-bound; keep them
        // off the socket loop.
        let trust = self.trust.clone();
        let validated = tokio::task::spawn_blocking(move || {
            validate_presentation(&trust, &presentation)
        })
        .await;

        let outcome = match validated {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(peer = %endpoint, error = %err, "presentation validation task failed");
                return;
            }
        };

        match outcome {
            Ok((signing, encryption)) => {
                tracing::info!(
                    peer = %endpoint,
                    subject = signing.subject(),
                    "presentation accepted"
                );
                if let Some(tx) = self.ensure_peer(endpoint) {
                    let _ = tx
                        .send(PeerCommand::InstallCertificates { signing, encryption })
                        .await;
                }
            }
            Err(Some(reason)) => {
                tracing::warn!(peer = %endpoint, ?reason, "presentation rejected");
                self.emit(EngineEvent::PresentationRejected { endpoint, reason });
                self.record_handshake_failure(endpoint);
            }
            Err(None) => {
                tracing::debug!(peer = %endpoint, "unparseable certificates in presentation");
            }
        }
    }
}

/// Validate presented certificates against policy and the trust store.
///
/// `Err(None)` means the DER did not parse (dropped silently); `Err(Some)`
/// carries the policy rejection.
fn validate_presentation(
    trust: &TrustStore,
    presentation: &PresentationMessage,
) -> std::result::Result<(Certificate, Option<Certificate>), Option<PresentationRejection>> {
    let signing = Certificate::from_der(&presentation.signature_certificate).map_err(|_| None)?;

    if !signing.is_currently_valid() {
        return Err(Some(PresentationRejection::Expired));
    }
    let usage = signing.key_usage();
    if usage.present && !usage.digital_signature {
        return Err(Some(PresentationRejection::Mismatch));
    }
    if !trust.verifies(&signing) {
        return Err(Some(PresentationRejection::Untrusted));
    }

    let encryption = match &presentation.encryption_certificate {
        None => None,
        Some(der) => {
            let cert = Certificate::from_der(der).map_err(|_| None)?;
            if !cert.is_currently_valid() {
                return Err(Some(PresentationRejection::Expired));
            }
            let usage = cert.key_usage();
            if usage.present && !usage.key_encipherment && !usage.key_agreement {
                return Err(Some(PresentationRejection::Mismatch));
            }
            if !cert.same_names_as(&signing) {
                return Err(Some(PresentationRejection::Mismatch));
            }
            if !trust.verifies(&cert) {
                return Err(Some(PresentationRejection::Untrusted));
            }
            Some(cert)
        }
    };

    Ok((signing, encryption))
}

// ---- long-running loops ------------------------------------------------

/// Hello, present, negotiate: the full introduction to one endpoint.
pub(crate) async fn introduce(shared: Arc<EngineShared>, endpoint: Endpoint) -> Result<()> {
    if shared.is_blacklisted(endpoint) {
        return Err(Error::Timeout);
    }

    shared.hello(endpoint).await?;

    let tx = shared.ensure_peer(endpoint).ok_or(Error::Cancelled)?;
    tx.send(PeerCommand::Greet)
        .await
        .map_err(|_| Error::Cancelled)?;
    Ok(())
}

/// Socket receive loop: one datagram at a time, in arrival order.
pub(crate) async fn run_receiver(shared: Arc<EngineShared>) {
    let mut shutdown = shared.shutdown_receiver();

    loop {
        let mut buf = shared.pool.get();

        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = shared.transport.recv_from(&mut buf) => received,
        };

        match received {
            Ok((size, addr)) => {
                let endpoint = Endpoint::new(addr);
                shared.handle_datagram(&buf[..size], endpoint).await;
            }
            Err(TransportError::Closed) => {
                shared.pool.put(buf);
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "socket receive failed");
            }
        }

        shared.pool.put(buf);
    }

    tracing::debug!("receive loop stopped");
}

/// TAP read loop: frames from the local stack enter the dispatcher.
pub(crate) async fn run_tap(shared: Arc<EngineShared>) {
    let mut shutdown = shared.shutdown_receiver();

    loop {
        let mut buf = shared.pool.get();

        let read = tokio::select! {
            _ = shutdown.changed() => break,
            read = shared.tap.read_frame(&mut buf) => read,
        };

        match read {
            Ok(size) => {
                shared.dispatch_frame(Port::Tap, buf[..size].to_vec()).await;
            }
            Err(TapError::Closed) => {
                shared.pool.put(buf);
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "tap read failed");
            }
        }

        shared.pool.put(buf);
    }

    tracing::debug!("tap loop stopped");
}

/// Maintenance: auto-contact rounds and stale-peer sweeps.
pub(crate) async fn run_maintenance(shared: Arc<EngineShared>) {
    let mut shutdown = shared.shutdown_receiver();
    let mut contact_timer = tokio::time::interval(shared.config.contact_request_period);
    contact_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut sweep_timer = tokio::time::interval(shared.config.session_timeout);
    sweep_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = contact_timer.tick() => contact_round(&shared).await,
            _ = sweep_timer.tick() => sweep_stale_peers(&shared),
        }
    }

    tracing::debug!("maintenance loop stopped");
}

async fn contact_round(shared: &Arc<EngineShared>) {
    // Re-greet configured endpoints we are not connected to.
    for endpoint in &shared.config.contact_endpoints {
        let endpoint = *endpoint;
        if shared.connected.contains_key(&endpoint) || shared.is_blacklisted(endpoint) {
            continue;
        }
        let task_shared = Arc::clone(shared);
        tokio::spawn(async move {
            if let Err(err) = introduce(task_shared, endpoint).await {
                tracing::debug!(peer = %endpoint, error = %err, "auto-contact failed");
            }
        });
    }

    // Ask connected peers where the still-missing fingerprints live.
    let missing: Vec<Fingerprint> = shared
        .config
        .contact_fingerprints
        .iter()
        .copied()
        .filter(|fp| !shared.connected.iter().any(|e| e.value() == fp))
        .collect();

    if missing.is_empty() {
        return;
    }

    let mailboxes: Vec<_> = shared
        .peers
        .iter()
        .map(|entry| entry.value().tx.clone())
        .collect();
    for tx in mailboxes {
        let _ = tx.try_send(PeerCommand::RequestContacts(missing.clone()));
    }
}

fn sweep_stale_peers(shared: &Arc<EngineShared>) {
    shared
        .recent_contacts
        .retain(|_, seen| seen.elapsed() < SOLICITATION_WINDOW);

    let Some(cutoff) = Instant::now().checked_sub(shared.config.session_timeout) else {
        return;
    };

    let stale: Vec<Endpoint> = shared
        .peers
        .iter()
        .filter_map(|entry| {
            let endpoint = *entry.key();
            if shared.connected.contains_key(&endpoint) {
                return None;
            }
            match shared.last_seen.get(&endpoint) {
                Some(seen) if *seen > cutoff => None,
                _ => Some(endpoint),
            }
        })
        .collect();

    for endpoint in stale {
        tracing::debug!(peer = %endpoint, "removing stale peer record");
        shared.remove_peer(endpoint);
    }
}
