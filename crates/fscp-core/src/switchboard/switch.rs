//! Ethernet learning switch.
//!
//! Binds source MACs to the port they were seen on, bounded by an
//! oldest-entry eviction. Relay mode disables source binding entirely so a
//! relaying peer cannot poison the table with the MACs it forwards for
//! others.

use super::frame::{ethernet_addresses, is_group_mac, MacAddress};
use super::{policy_allows, Port};
use std::collections::HashMap;
use std::time::Instant;

struct SwitchEntry {
    port: Port,
    last_seen: Instant,
}

/// MAC-learning switch with a capacity bound
pub struct Switch {
    map: HashMap<MacAddress, SwitchEntry>,
    ports: Vec<Port>,
    max_entries: usize,
    client_routing_enabled: bool,
    relay_mode_enabled: bool,
}

impl Switch {
    /// Create a switch.
    #[must_use]
    pub fn new(max_entries: usize, client_routing_enabled: bool, relay_mode_enabled: bool) -> Self {
        Self {
            map: HashMap::new(),
            ports: vec![Port::Tap],
            max_entries,
            client_routing_enabled,
            relay_mode_enabled,
        }
    }

    /// Register a port so broadcast fan-out reaches it
    pub fn add_port(&mut self, port: Port) {
        if !self.ports.contains(&port) {
            self.ports.push(port);
        }
    }

    /// Remove a port and every binding pointing at it
    pub fn remove_port(&mut self, port: Port) {
        self.ports.retain(|p| *p != port);
        self.map.retain(|_, entry| entry.port != port);
    }

    /// Number of learned bindings
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.map.len()
    }

    /// The port a MAC is currently bound to
    #[must_use]
    pub fn lookup(&self, mac: &MacAddress) -> Option<Port> {
        self.map.get(mac).map(|entry| entry.port)
    }

    fn learn(&mut self, mac: MacAddress, port: Port) {
        if is_group_mac(&mac) {
            return;
        }

        if let Some(entry) = self.map.get_mut(&mac) {
            entry.port = port;
            entry.last_seen = Instant::now();
            return;
        }

        if self.map.len() >= self.max_entries {
            self.evict_oldest();
        }

        self.map.insert(
            mac,
            SwitchEntry {
                port,
                last_seen: Instant::now(),
            },
        );
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(mac, _)| *mac);
        if let Some(mac) = oldest {
            self.map.remove(&mac);
        }
    }

    /// Dispatch one Ethernet frame arriving on `source`.
    ///
    /// Learns the source MAC (unless relay mode disables it), then forwards
    /// to the destination's bound port, or floods to every other
    /// policy-permitted port for group and unknown destinations.
    pub fn dispatch(&mut self, source: Port, frame: &[u8]) -> Vec<Port> {
        let Some((dst, src)) = ethernet_addresses(frame) else {
            return Vec::new();
        };

        self.add_port(source);
        if !self.relay_mode_enabled {
            self.learn(src, source);
        }

        if !is_group_mac(&dst) {
            if let Some(target) = self.lookup(&dst) {
                if target == source || !policy_allows(self.client_routing_enabled, source, target)
                {
                    return Vec::new();
                }
                return vec![target];
            }
        }

        // Group destination or unknown unicast: flood.
        self.ports
            .iter()
            .copied()
            .filter(|&p| p != source && policy_allows(self.client_routing_enabled, source, p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switchboard::frame::BROADCAST_MAC;

    const MAC_A: MacAddress = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01];
    const MAC_B: MacAddress = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x02];
    const MAC_LOCAL: MacAddress = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x10];

    fn frame(dst: MacAddress, src: MacAddress) -> Vec<u8> {
        let mut f = Vec::new();
        f.extend_from_slice(&dst);
        f.extend_from_slice(&src);
        f.extend_from_slice(&[0x08, 0x00]);
        f.extend_from_slice(&[0u8; 50]);
        f
    }

    fn peer(n: u8) -> Port {
        Port::Peer(format!("192.0.2.{n}:12000").parse().unwrap())
    }

    #[test]
    fn test_learning_then_unicast() {
        let mut sw = Switch::new(16, true, false);

        // A's frame floods (B unknown) and binds MAC_A to peer 1.
        let targets = sw.dispatch(peer(1), &frame(MAC_B, MAC_A));
        assert!(targets.contains(&Port::Tap));
        assert_eq!(sw.lookup(&MAC_A), Some(peer(1)));

        // Traffic back to MAC_A is unicast to peer 1 only.
        let targets = sw.dispatch(Port::Tap, &frame(MAC_A, MAC_LOCAL));
        assert_eq!(targets, vec![peer(1)]);
    }

    #[test]
    fn test_never_returns_to_source() {
        let mut sw = Switch::new(16, true, false);
        sw.dispatch(peer(1), &frame(MAC_B, MAC_A));

        // A frame from peer 1 addressed to a MAC bound to peer 1 is dropped.
        let targets = sw.dispatch(peer(1), &frame(MAC_A, MAC_B));
        assert!(targets.is_empty());
    }

    #[test]
    fn test_broadcast_fans_out_except_source() {
        let mut sw = Switch::new(16, true, false);
        sw.add_port(peer(1));
        sw.add_port(peer(2));

        let targets = sw.dispatch(peer(1), &frame(BROADCAST_MAC, MAC_A));
        assert!(targets.contains(&Port::Tap));
        assert!(targets.contains(&peer(2)));
        assert!(!targets.contains(&peer(1)));
    }

    #[test]
    fn test_client_routing_disabled_isolates_remotes() {
        let mut sw = Switch::new(16, false, false);
        sw.add_port(peer(1));
        sw.add_port(peer(2));

        // Broadcast from a remote reaches only the TAP.
        let targets = sw.dispatch(peer(1), &frame(BROADCAST_MAC, MAC_A));
        assert_eq!(targets, vec![Port::Tap]);

        // Learned unicast between remotes is suppressed too.
        sw.dispatch(peer(2), &frame(BROADCAST_MAC, MAC_B));
        let targets = sw.dispatch(peer(1), &frame(MAC_B, MAC_A));
        assert!(targets.is_empty());
    }

    #[test]
    fn test_relay_mode_disables_learning() {
        let mut sw = Switch::new(16, true, true);
        sw.dispatch(peer(1), &frame(MAC_B, MAC_A));
        assert_eq!(sw.lookup(&MAC_A), None);
        assert_eq!(sw.entry_count(), 0);
    }

    #[test]
    fn test_group_source_not_learned() {
        let mut sw = Switch::new(16, true, false);
        sw.dispatch(peer(1), &frame(MAC_B, BROADCAST_MAC));
        assert_eq!(sw.entry_count(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut sw = Switch::new(2, true, false);

        sw.dispatch(peer(1), &frame(MAC_B, [0, 0, 0, 0, 0, 1]));
        std::thread::sleep(std::time::Duration::from_millis(2));
        sw.dispatch(peer(1), &frame(MAC_B, [0, 0, 0, 0, 0, 2]));
        std::thread::sleep(std::time::Duration::from_millis(2));
        sw.dispatch(peer(1), &frame(MAC_B, [0, 0, 0, 0, 0, 3]));

        assert_eq!(sw.entry_count(), 2);
        assert_eq!(sw.lookup(&[0, 0, 0, 0, 0, 1]), None);
        assert!(sw.lookup(&[0, 0, 0, 0, 0, 3]).is_some());
    }

    #[test]
    fn test_rebinding_moves_mac() {
        let mut sw = Switch::new(16, true, false);
        sw.dispatch(peer(1), &frame(MAC_B, MAC_A));
        sw.dispatch(peer(2), &frame(MAC_B, MAC_A));
        assert_eq!(sw.lookup(&MAC_A), Some(peer(2)));
    }

    #[test]
    fn test_remove_port_clears_bindings() {
        let mut sw = Switch::new(16, true, false);
        sw.dispatch(peer(1), &frame(MAC_B, MAC_A));
        sw.remove_port(peer(1));
        assert_eq!(sw.lookup(&MAC_A), None);

        let targets = sw.dispatch(Port::Tap, &frame(BROADCAST_MAC, MAC_LOCAL));
        assert!(!targets.contains(&peer(1)));
    }

    #[test]
    fn test_runt_frames_dropped() {
        let mut sw = Switch::new(16, true, false);
        assert!(sw.dispatch(peer(1), &[0u8; 10]).is_empty());
    }
}
