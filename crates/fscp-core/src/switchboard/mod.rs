//! Frame dispatch between the local TAP and remote peers.
//!
//! Two modes share one interface: the Ethernet [`Switch`] learns MAC to port
//! bindings, the IP [`Router`] matches destinations against announced
//! prefixes. Neither ever forwards a frame back to the port it came from, and
//! the client-routing policy decides whether two remote peers may see each
//! other's traffic at all.

pub mod frame;
mod router;
mod switch;

pub use router::{IpNetwork, Router};
pub use switch::Switch;

use crate::endpoint::Endpoint;

/// A dispatch port: the local TAP or one remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Port {
    /// The local TAP device
    Tap,
    /// The peer at this endpoint
    Peer(Endpoint),
}

impl Port {
    /// Whether this port is a remote peer
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Port::Peer(_))
    }
}

/// Whether a frame may flow from `source` to `target` under the
/// client-routing policy: remote-to-remote forwarding requires it.
#[must_use]
fn policy_allows(client_routing_enabled: bool, source: Port, target: Port) -> bool {
    client_routing_enabled || !(source.is_remote() && target.is_remote())
}

/// The engine's dispatcher, in one of its two modes
pub enum Dispatcher {
    /// Ethernet learning switch
    Switch(Switch),
    /// IP longest-prefix-match router
    Router(Router),
}

impl Dispatcher {
    /// Ports the frame should be forwarded to (never includes `source`)
    pub fn dispatch(&mut self, source: Port, frame: &[u8]) -> Vec<Port> {
        match self {
            Dispatcher::Switch(s) => s.dispatch(source, frame),
            Dispatcher::Router(r) => r.dispatch(source, frame),
        }
    }

    /// Register a port so fan-out reaches it before it ever sends
    pub fn add_port(&mut self, port: Port) {
        match self {
            Dispatcher::Switch(s) => s.add_port(port),
            Dispatcher::Router(r) => r.ensure_port(port),
        }
    }

    /// Drop all state for a removed port
    pub fn remove_port(&mut self, port: Port) {
        match self {
            Dispatcher::Switch(s) => s.remove_port(port),
            Dispatcher::Router(r) => r.remove_port(port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u8) -> Port {
        Port::Peer(format!("192.0.2.{n}:12000").parse().unwrap())
    }

    #[test]
    fn test_policy_matrix() {
        // Tap to remote and remote to tap always flow.
        assert!(policy_allows(false, Port::Tap, peer(1)));
        assert!(policy_allows(false, peer(1), Port::Tap));
        // Remote to remote needs client routing.
        assert!(!policy_allows(false, peer(1), peer(2)));
        assert!(policy_allows(true, peer(1), peer(2)));
    }
}
