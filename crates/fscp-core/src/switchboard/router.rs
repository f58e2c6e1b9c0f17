//! IP longest-prefix-match router.
//!
//! Every port announces a set of CIDR prefixes. The match table is compiled
//! lazily: route changes only invalidate the cache, and the next lookup
//! rebuilds it sorted by prefix length.

use super::frame::{ip_destination, is_fanout_destination};
use super::{policy_allows, Port};
use std::collections::HashMap;
use std::net::IpAddr;

/// An IPv4 or IPv6 CIDR prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpNetwork {
    address: IpAddr,
    prefix_len: u8,
}

impl IpNetwork {
    /// Build a prefix, clamping the length to the address family's width
    #[must_use]
    pub fn new(address: IpAddr, prefix_len: u8) -> Self {
        let max = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self {
            address,
            prefix_len: prefix_len.min(max),
        }
    }

    /// The prefix length
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether `addr` falls inside this prefix
    #[must_use]
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.address, addr) {
            (IpAddr::V4(net), IpAddr::V4(host)) => {
                let shift = 32 - u32::from(self.prefix_len);
                if shift >= 32 {
                    return true;
                }
                (u32::from(net) >> shift) == (u32::from(*host) >> shift)
            }
            (IpAddr::V6(net), IpAddr::V6(host)) => {
                let shift = 128 - u32::from(self.prefix_len);
                if shift >= 128 {
                    return true;
                }
                (u128::from(net) >> shift) == (u128::from(*host) >> shift)
            }
            _ => false,
        }
    }
}

impl std::str::FromStr for IpNetwork {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((addr, len)) => {
                let address: IpAddr = addr.parse()?;
                // A bad prefix length reads as the full host width.
                let prefix_len = len.parse().unwrap_or(u8::MAX);
                Ok(Self::new(address, prefix_len))
            }
            None => {
                let address: IpAddr = s.parse()?;
                Ok(Self::new(address, u8::MAX))
            }
        }
    }
}

impl std::fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

/// Longest-prefix-match router over announced port prefixes
pub struct Router {
    ports: HashMap<Port, Vec<IpNetwork>>,
    compiled: Option<Vec<(IpNetwork, Port)>>,
    client_routing_enabled: bool,
}

impl Router {
    /// Create a router
    #[must_use]
    pub fn new(client_routing_enabled: bool) -> Self {
        let mut ports = HashMap::new();
        ports.insert(Port::Tap, Vec::new());

        Self {
            ports,
            compiled: None,
            client_routing_enabled,
        }
    }

    /// Replace a port's announced prefixes, invalidating the match table
    pub fn set_routes(&mut self, port: Port, routes: Vec<IpNetwork>) {
        self.ports.insert(port, routes);
        self.compiled = None;
    }

    /// Register a port without announcements; existing routes are kept
    pub fn ensure_port(&mut self, port: Port) {
        self.ports.entry(port).or_default();
    }

    /// Remove a port and its announcements
    pub fn remove_port(&mut self, port: Port) {
        if self.ports.remove(&port).is_some() {
            self.compiled = None;
        }
    }

    /// The port whose announced prefixes best cover `addr`
    #[must_use]
    pub fn route_for(&mut self, addr: &IpAddr) -> Option<Port> {
        self.compiled()
            .iter()
            .find(|(net, _)| net.contains(addr))
            .map(|(_, port)| *port)
    }

    fn compiled(&mut self) -> &[(IpNetwork, Port)] {
        if self.compiled.is_none() {
            let mut table: Vec<(IpNetwork, Port)> = self
                .ports
                .iter()
                .flat_map(|(port, routes)| routes.iter().map(|net| (*net, *port)))
                .collect();
            // Longest prefix first; ties broken by port for determinism.
            table.sort_by(|a, b| b.0.prefix_len.cmp(&a.0.prefix_len).then(a.1.cmp(&b.1)));
            self.compiled = Some(table);
        }
        self.compiled.as_deref().unwrap_or(&[])
    }

    /// Dispatch one raw IP packet arriving on `source`.
    ///
    /// Packets of unrecognized version are dropped silently; fan-out
    /// destinations reach every other policy-permitted port.
    pub fn dispatch(&mut self, source: Port, packet: &[u8]) -> Vec<Port> {
        if !self.ports.contains_key(&source) {
            self.ports.insert(source, Vec::new());
        }

        let Some(destination) = ip_destination(packet) else {
            return Vec::new();
        };

        if is_fanout_destination(&destination) {
            return self
                .ports
                .keys()
                .copied()
                .filter(|&p| p != source && policy_allows(self.client_routing_enabled, source, p))
                .collect();
        }

        match self.route_for(&destination) {
            Some(target)
                if target != source
                    && policy_allows(self.client_routing_enabled, source, target) =>
            {
                vec![target]
            }
            _ => Vec::new(),
        }
    }
}
