//! Network addresses as used for routing table keys and wire encoding.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Address family, kept explicit rather than inferred from `IpAddr` so that
/// `want` resolution and compact node-info encoding can branch on it
/// directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

/// An opaque peer address: IP, port, and family. Stringifies stably so it
/// can be used as a hash-map key (the transaction table keys on this).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(SocketAddr);

impl Address {
    pub fn new(socket_addr: SocketAddr) -> Self {
        Address(socket_addr)
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn family(&self) -> Family {
        match self.0.ip() {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// 26-byte compact node-info tail: 4-byte IPv4 + 2-byte big-endian port.
    pub fn to_compact_v4(&self) -> Option<[u8; 6]> {
        match self.0.ip() {
            IpAddr::V4(v4) => Some(pack_v4(v4, self.0.port())),
            IpAddr::V6(_) => None,
        }
    }

    /// 38-byte compact node-info tail: 16-byte IPv6 + 2-byte big-endian port.
    pub fn to_compact_v6(&self) -> Option<[u8; 18]> {
        match self.0.ip() {
            IpAddr::V6(v6) => Some(pack_v6(v6, self.0.port())),
            IpAddr::V4(_) => None,
        }
    }

    pub fn from_compact_v4(bytes: &[u8; 6]) -> Self {
        let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let port = u16::from_be_bytes([bytes[4], bytes[5]]);
        Address(SocketAddr::new(IpAddr::V4(ip), port))
    }

    pub fn from_compact_v6(bytes: &[u8; 18]) -> Self {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&bytes[0..16]);
        let ip = Ipv6Addr::from(octets);
        let port = u16::from_be_bytes([bytes[16], bytes[17]]);
        Address(SocketAddr::new(IpAddr::V6(ip), port))
    }
}

fn pack_v4(ip: Ipv4Addr, port: u16) -> [u8; 6] {
    let o = ip.octets();
    let p = port.to_be_bytes();
    [o[0], o[1], o[2], o[3], p[0], p[1]]
}

fn pack_v6(ip: Ipv6Addr, port: u16) -> [u8; 18] {
    let o = ip.octets();
    let p = port.to_be_bytes();
    let mut out = [0u8; 18];
    out[..16].copy_from_slice(&o);
    out[16..].copy_from_slice(&p);
    out
}

impl From<SocketAddr> for Address {
    fn from(s: SocketAddr) -> Self {
        Address(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_compact_round_trip() {
        let addr = Address::new("203.0.113.5:6881".parse().unwrap());
        let compact = addr.to_compact_v4().unwrap();
        let back = Address::from_compact_v4(&compact);
        assert_eq!(addr, back);
        assert!(addr.to_compact_v6().is_none());
    }

    #[test]
    fn v6_compact_round_trip() {
        let addr = Address::new("[2001:db8::1]:6881".parse().unwrap());
        let compact = addr.to_compact_v6().unwrap();
        let back = Address::from_compact_v6(&compact);
        assert_eq!(addr, back);
        assert!(addr.to_compact_v4().is_none());
    }

    #[test]
    fn family_matches_ip_version() {
        let v4 = Address::new("1.2.3.4:80".parse().unwrap());
        let v6 = Address::new("[::1]:80".parse().unwrap());
        assert_eq!(v4.family(), Family::V4);
        assert_eq!(v6.family(), Family::V6);
    }
}
