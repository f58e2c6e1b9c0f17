//! Minimal frame parsing for dispatch decisions.
//!
//! The dispatcher only ever needs addresses: MACs from Ethernet headers,
//! destination addresses from IP headers. Nothing else is interpreted.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A MAC address
pub type MacAddress = [u8; 6];

/// Ethernet header length
pub const ETHERNET_HEADER_LEN: usize = 14;

/// The broadcast MAC
pub const BROADCAST_MAC: MacAddress = [0xFF; 6];

/// Destination and source MACs of an Ethernet frame, if long enough
#[must_use]
pub fn ethernet_addresses(frame: &[u8]) -> Option<(MacAddress, MacAddress)> {
    if frame.len() < ETHERNET_HEADER_LEN {
        return None;
    }
    let mut dst = [0u8; 6];
    let mut src = [0u8; 6];
    dst.copy_from_slice(&frame[0..6]);
    src.copy_from_slice(&frame[6..12]);
    Some((dst, src))
}

/// Whether a MAC is the broadcast address
#[must_use]
pub fn is_broadcast_mac(mac: &MacAddress) -> bool {
    *mac == BROADCAST_MAC
}

/// Whether a MAC is a group (multicast or broadcast) address
#[must_use]
pub fn is_group_mac(mac: &MacAddress) -> bool {
    mac[0] & 0x01 != 0
}

/// Destination address of a raw IP packet (version sniffed from the first
/// nibble), or `None` for unrecognized or truncated packets
#[must_use]
pub fn ip_destination(packet: &[u8]) -> Option<IpAddr> {
    match packet.first()? >> 4 {
        4 if packet.len() >= 20 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&packet[16..20]);
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        6 if packet.len() >= 40 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&packet[24..40]);
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Whether an IP destination fans out to every port (multicast, broadcast,
/// solicited-node)
#[must_use]
pub fn is_fanout_destination(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_multicast() || v4.is_broadcast(),
        IpAddr::V6(v6) => v6.is_multicast(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethernet_frame(dst: MacAddress, src: MacAddress) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&dst);
        frame.extend_from_slice(&src);
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&[0u8; 46]);
        frame
    }

    #[test]
    fn test_ethernet_addresses() {
        let dst = [1, 2, 3, 4, 5, 6];
        let src = [7, 8, 9, 10, 11, 12];
        let frame = ethernet_frame(dst, src);
        assert_eq!(ethernet_addresses(&frame), Some((dst, src)));
    }

    #[test]
    fn test_runt_frame() {
        assert_eq!(ethernet_addresses(&[0u8; 13]), None);
    }

    #[test]
    fn test_mac_classification() {
        assert!(is_broadcast_mac(&BROADCAST_MAC));
        assert!(is_group_mac(&BROADCAST_MAC));
        assert!(is_group_mac(&[0x01, 0x00, 0x5E, 0, 0, 1]));
        assert!(!is_group_mac(&[0xAA, 0, 0, 0, 0, 1]));
    }

    #[test]
    fn test_ipv4_destination() {
        let mut packet = vec![0u8; 20];
        packet[0] = 0x45;
        packet[16..20].copy_from_slice(&[192, 0, 2, 33]);
        assert_eq!(
            ip_destination(&packet),
            Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 33)))
        );
    }

    #[test]
    fn test_ipv6_destination() {
        let mut packet = vec![0u8; 40];
        packet[0] = 0x60;
        packet[24..40].copy_from_slice(&Ipv6Addr::LOCALHOST.octets());
        assert_eq!(ip_destination(&packet), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn test_unknown_version_dropped() {
        let packet = [0x20u8; 40];
        assert_eq!(ip_destination(&packet), None);
        assert_eq!(ip_destination(&[]), None);
    }

    #[test]
    fn test_truncated_headers() {
        assert_eq!(ip_destination(&[0x45; 19]), None);
        assert_eq!(ip_destination(&[0x60; 39]), None);
    }

    #[test]
    fn test_fanout_destinations() {
        assert!(is_fanout_destination(&"224.0.0.1".parse().unwrap()));
        assert!(is_fanout_destination(&"255.255.255.255".parse().unwrap()));
        assert!(is_fanout_destination(&"ff02::1".parse().unwrap()));
        // Solicited-node multicast is multicast.
        assert!(is_fanout_destination(&"ff02::1:ff00:42".parse().unwrap()));
        assert!(!is_fanout_destination(&"192.0.2.1".parse().unwrap()));
        assert!(!is_fanout_destination(&"2001:db8::1".parse().unwrap()));
    }
}
