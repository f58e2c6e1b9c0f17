//! Engine configuration.

use crate::endpoint::Endpoint;
use fscp_crypto::{CipherSuite, EllipticCurve, Fingerprint};
use std::net::SocketAddr;
use std::time::Duration;

/// Whether names resolve to IPv4 or IPv6 addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionProtocol {
    /// Resolve to IPv4
    #[default]
    Ipv4,
    /// Resolve to IPv6
    Ipv6,
}

/// Frame dispatch mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardingMode {
    /// Ethernet switch: learn MAC to peer bindings
    #[default]
    Switch,
    /// IP router: match destinations against announced prefixes
    Router,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Address the single UDP socket binds to
    pub listen_on: SocketAddr,

    /// Address family used when resolving contact host names
    pub hostname_resolution_protocol: ResolutionProtocol,

    /// Total budget for one hello exchange, spread over the retry schedule
    pub hello_timeout: Duration,

    /// Idle time after which a session is torn down
    pub session_timeout: Duration,

    /// Interval between keep-alives on an established session
    pub keepalive_period: Duration,

    /// Cipher suites offered and accepted, in preference order
    pub cipher_suite_capabilities: Vec<CipherSuite>,

    /// Elliptic curves offered and accepted, in preference order
    pub elliptic_curve_capabilities: Vec<EllipticCurve>,

    /// Accept a peer presenting different certificates for a known endpoint
    pub allow_peer_cert_rotation: bool,

    /// Forward frames between two remote peers
    pub client_routing_enabled: bool,

    /// Accept frames whose source MAC is not the peer's learned MAC and
    /// disable source binding entirely
    pub relay_mode_enabled: bool,

    /// Answer contact requests with endpoint hints
    pub contact_sharing_enabled: bool,

    /// Endpoints greeted at startup
    pub contact_endpoints: Vec<Endpoint>,

    /// Fingerprints the engine keeps trying to locate via contact requests
    pub contact_fingerprints: Vec<Fingerprint>,

    /// Frame dispatch mode
    pub forwarding_mode: ForwardingMode,

    /// Delay before each retransmission attempt, in order; its length is the
    /// retry budget for hellos and session negotiation
    pub retransmit_schedule: Vec<Duration>,

    /// Interval between contact-request rounds for missing fingerprints
    pub contact_request_period: Duration,

    /// MAC learning table capacity (switch mode)
    pub max_switch_entries: usize,

    /// Frames queued per peer while its session is negotiating
    pub pending_queue_limit: usize,

    /// Datagram buffers held by the receive pool
    pub pool_buffers: usize,

    /// Handshake failures before an endpoint is blacklisted
    pub blacklist_threshold: u32,

    /// How long a blacklisted endpoint is ignored
    pub blacklist_cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen_on: "0.0.0.0:12000".parse().expect("static address"),
            hostname_resolution_protocol: ResolutionProtocol::default(),
            hello_timeout: Duration::from_secs(3),
            session_timeout: Duration::from_secs(180),
            keepalive_period: Duration::from_secs(10),
            cipher_suite_capabilities: CipherSuite::ALL.to_vec(),
            elliptic_curve_capabilities: EllipticCurve::SUPPORTED.to_vec(),
            allow_peer_cert_rotation: false,
            client_routing_enabled: true,
            relay_mode_enabled: false,
            contact_sharing_enabled: true,
            contact_endpoints: Vec::new(),
            contact_fingerprints: Vec::new(),
            forwarding_mode: ForwardingMode::default(),
            retransmit_schedule: vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            contact_request_period: Duration::from_secs(30),
            max_switch_entries: 1024,
            pending_queue_limit: 64,
            pool_buffers: 64,
            blacklist_threshold: 5,
            blacklist_cooldown: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.listen_on.port(), 12000);
        assert!(!config.allow_peer_cert_rotation);
        assert!(!config.relay_mode_enabled);
        assert_eq!(config.forwarding_mode, ForwardingMode::Switch);
        assert!(!config.retransmit_schedule.is_empty());
        assert!(!config.cipher_suite_capabilities.is_empty());
        assert!(config
            .elliptic_curve_capabilities
            .iter()
            .all(|ec| ec.is_supported()));
    }
}
