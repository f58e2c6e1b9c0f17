//! The FSCP engine: one UDP socket, one TAP, many peers.
//!
//! [`Engine`] owns the shared state and the long-running tasks (socket
//! receive loop, TAP read loop, maintenance timer, one actor per peer).
//! Starting is explicit, stopping cancels every task, completes pending
//! hellos with `Cancelled`, drops all sessions and closes the socket.

mod events;
mod peer_actor;
mod shared;

pub use events::{EngineEvent, PresentationRejection};

use crate::config::EngineConfig;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result, StateError};
use crate::identifier::HostIdentifier;
use crate::peer::LocalContext;
use crate::switchboard::{Dispatcher, IpNetwork, Port, Router, Switch};
use crate::ForwardingMode;
use fscp_crypto::{Fingerprint, IdentityStore, TrustStore};
use fscp_transport::{TapDevice, Transport, UdpTransport};
use peer_actor::PeerCommand;
use shared::EngineShared;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// The protocol engine
pub struct Engine {
    shared: Arc<EngineShared>,
    host_identifier: HostIdentifier,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Bind the engine's UDP socket and build the engine.
    ///
    /// # Errors
    ///
    /// Binding failures are fatal initialization errors.
    pub async fn bind(
        config: EngineConfig,
        identity: IdentityStore,
        trust: TrustStore,
        tap: Arc<dyn TapDevice>,
    ) -> Result<Self> {
        let transport = UdpTransport::bind(config.listen_on).await?;
        Self::with_transport(config, identity, trust, tap, Arc::new(transport))
    }

    /// Build the engine over an already-bound transport.
    ///
    /// # Errors
    ///
    /// Fails if the host identifier cannot be generated.
    pub fn with_transport(
        config: EngineConfig,
        identity: IdentityStore,
        trust: TrustStore,
        tap: Arc<dyn TapDevice>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let host_identifier = HostIdentifier::generate()?;
        let identity = Arc::new(identity);
        let local = Arc::new(LocalContext::new(
            Arc::clone(&identity),
            host_identifier,
            &config,
        ));

        let dispatcher = match config.forwarding_mode {
            ForwardingMode::Switch => Dispatcher::Switch(Switch::new(
                config.max_switch_entries,
                config.client_routing_enabled,
                config.relay_mode_enabled,
            )),
            ForwardingMode::Router => {
                Dispatcher::Router(Router::new(config.client_routing_enabled))
            }
        };

        let shared = EngineShared::new(config, local, identity, trust, transport, tap, dispatcher);

        Ok(Self {
            shared,
            host_identifier,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the engine loops.
    pub async fn start(&self) {
        self.shared.tap.set_connected(true).await;

        let handles = vec![
            tokio::spawn(shared::run_receiver(Arc::clone(&self.shared))),
            tokio::spawn(shared::run_tap(Arc::clone(&self.shared))),
            tokio::spawn(shared::run_maintenance(Arc::clone(&self.shared))),
        ];

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.extend(handles);
        }

        tracing::info!(
            host = %self.host_identifier,
            fingerprint = %hex::encode(&self.shared.identity.fingerprint()[..8]),
            "engine started"
        );
    }

    /// The bound socket address.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.shared.transport.local_addr()?)
    }

    /// This incarnation's host identifier
    #[must_use]
    pub fn host_identifier(&self) -> HostIdentifier {
        self.host_identifier
    }

    /// Fingerprint of the local signing certificate
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.shared.identity.fingerprint()
    }

    /// Subscribe to engine lifecycle events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.subscribe()
    }

    /// Contact a peer: hello (with retries), presentation, session.
    ///
    /// Returns once the introduction is underway; watch
    /// [`EngineEvent::SessionEstablished`] for completion.
    ///
    /// # Errors
    ///
    /// `Error::HelloTimeout` if the endpoint never answers the probe,
    /// `Error::Cancelled` on shutdown.
    pub async fn introduce_to(&self, endpoint: Endpoint) -> Result<()> {
        shared::introduce(Arc::clone(&self.shared), endpoint).await
    }

    /// Force a session renegotiation with a known peer.
    ///
    /// # Errors
    ///
    /// `StateError::SessionNotReady` if the peer is unknown.
    pub async fn rekey(&self, endpoint: Endpoint) -> Result<()> {
        let tx = self
            .shared
            .peers
            .get(&endpoint)
            .map(|handle| handle.tx.clone())
            .ok_or(Error::State(StateError::SessionNotReady))?;
        tx.send(PeerCommand::Rekey)
            .await
            .map_err(|_| Error::Cancelled)
    }

    /// Announce the prefixes routed through a peer (router mode only)
    pub fn set_peer_routes(&self, endpoint: Endpoint, routes: Vec<IpNetwork>) {
        self.shared.set_routes(Port::Peer(endpoint), routes);
    }

    /// Announce the prefixes served by the local TAP (router mode only)
    pub fn set_local_routes(&self, routes: Vec<IpNetwork>) {
        self.shared.set_routes(Port::Tap, routes);
    }

    /// Administratively remove a peer and its state
    pub fn remove_peer(&self, endpoint: Endpoint) {
        self.shared.remove_peer(endpoint);
    }

    /// Peers with an established session
    #[must_use]
    pub fn connected_peers(&self) -> Vec<(Endpoint, Fingerprint)> {
        self.shared
            .connected
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Stop the engine: cancel tasks, drop sessions, close the socket.
    pub async fn stop(&self) {
        tracing::info!("engine stopping");

        self.shared.signal_shutdown();
        let _ = self.shared.transport.close().await;
        self.shared.tap.set_connected(false).await;

        // Pending hellos complete with Cancelled, not Timeout.
        self.shared.pending_hellos.clear();

        let handles: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for mut handle in handles {
            if tokio::time::timeout(Duration::from_secs(1), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }

        // Dropping the mailboxes ends every peer actor.
        self.shared.peers.clear();
        self.shared.connected.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fscp_crypto::test_certificates::{leaf, test_ca};
    use fscp_transport::MemoryTap;

    fn identity(name: &str) -> IdentityStore {
        let (cert, key) = leaf(name);
        IdentityStore::new(cert, key, None).unwrap()
    }

    fn trust() -> TrustStore {
        let mut store = TrustStore::new();
        store.add_anchor(test_ca().certificate.clone());
        store
    }

    async fn test_engine(name: &str) -> Engine {
        let mut config = EngineConfig::default();
        config.listen_on = "127.0.0.1:0".parse().unwrap();
        let (tap, _handle) = MemoryTap::new([0xAA, 0, 0, 0, 0, 1]);
        Engine::bind(config, identity(name), trust(), tap)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_start_stop() {
        let engine = test_engine("engine-basic").await;
        engine.start().await;

        let addr = engine.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_hello_between_engines() {
        let a = test_engine("engine-a").await;
        let b = test_engine("engine-b").await;
        a.start().await;
        b.start().await;

        let b_endpoint = Endpoint::new(b.local_addr().unwrap());
        a.introduce_to(b_endpoint).await.unwrap();

        a.stop().await;
        b.stop().await;
    }

    #[tokio::test]
    async fn test_hello_timeout_when_unreachable() {
        let mut config = EngineConfig::default();
        config.listen_on = "127.0.0.1:0".parse().unwrap();
        config.hello_timeout = Duration::from_millis(200);
        config.retransmit_schedule = vec![Duration::from_millis(50); 2];
        let (tap, _handle) = MemoryTap::new([0xAA, 0, 0, 0, 0, 2]);
        let engine = Engine::bind(config, identity("engine-lonely"), trust(), tap)
            .await
            .unwrap();
        engine.start().await;

        // A port nobody listens on (we bind it, then drop it).
        let unreachable: Endpoint = "127.0.0.1:1".parse().unwrap();
        let result = engine.introduce_to(unreachable).await;
        assert!(matches!(result, Err(Error::HelloTimeout)));

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_rekey_unknown_peer() {
        let engine = test_engine("engine-rekey").await;
        let unknown: Endpoint = "203.0.113.1:12000".parse().unwrap();
        assert!(matches!(
            engine.rekey(unknown).await,
            Err(Error::State(StateError::SessionNotReady))
        ));
    }
}
