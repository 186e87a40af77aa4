//! 160-bit node identifiers and the distance metric they induce.

use std::fmt;
use std::net::IpAddr;

use rand::RngCore;

pub const NODE_ID_LEN: usize = 20;

/// A 160-bit identifier shared by nodes and infohashes.
///
/// The all-zero id is reserved and treated as invalid everywhere it could be
/// mistaken for a real peer (see `is_zero`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    pub const ZERO: NodeId = NodeId([0u8; NODE_ID_LEN]);

    pub fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        NodeId(bytes)
    }

    /// Returns `None` if `bytes` is not exactly 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != NODE_ID_LEN {
            return None;
        }
        let mut arr = [0u8; NODE_ID_LEN];
        arr.copy_from_slice(bytes);
        Some(NodeId(arr))
    }

    pub fn to_bytes(self) -> [u8; NODE_ID_LEN] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; NODE_ID_LEN]
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; NODE_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        NodeId(bytes)
    }

    /// Bitwise XOR distance to `other`. This is the Kademlia metric: smaller
    /// means closer, and it is symmetric and satisfies the triangle
    /// inequality over the XOR group.
    pub fn distance(&self, other: &NodeId) -> NodeId {
        let mut out = [0u8; NODE_ID_LEN];
        for i in 0..NODE_ID_LEN {
            out[i] = self.0[i] ^ other.0[i];
        }
        NodeId(out)
    }

    /// Number of leading bits `self` and `other` share, i.e. the bucket
    /// index of `other` in a table rooted at `self`.
    pub fn common_prefix_len(&self, other: &NodeId) -> u32 {
        let d = self.distance(other);
        for (i, byte) in d.0.iter().enumerate() {
            if *byte != 0 {
                return (i as u32) * 8 + byte.leading_zeros();
            }
        }
        (NODE_ID_LEN as u32) * 8
    }

    /// Returns true if `self` is closer (or equal) to `target` than `other`.
    pub fn closer_to(&self, other: &NodeId, target: &NodeId) -> bool {
        self.distance(target) < other.distance(target)
    }

    /// BEP 42: derive an id whose low-order structure is a CRC32C function
    /// of the node's externally-observed IP address plus a random seed byte,
    /// making it expensive for an attacker to mint ids close to an arbitrary
    /// target without controlling many source IPs.
    pub fn secure_mangle(public_ip: IpAddr, rand_seed: u8) -> NodeId {
        let mut ip_bytes = canonical_ip_bytes(public_ip);
        let masks: [u8; 4] = [0x03, 0x0f, 0x3f, 0xff];
        for (b, m) in ip_bytes.iter_mut().zip(masks.iter()) {
            *b &= m;
        }
        ip_bytes[0] |= (rand_seed & 0x7) << 5;

        let crc = crc32c::crc32c(&ip_bytes);

        let mut rng = rand::thread_rng();
        let mut id = [0u8; NODE_ID_LEN];
        id[0] = (crc >> 24) as u8;
        id[1] = (crc >> 16) as u8;
        id[2] = ((crc >> 8) as u8 & 0xf8) | (rng.next_u32() as u8 & 0x7);
        rng.fill_bytes(&mut id[3..19]);
        id[19] = rand_seed;
        NodeId(id)
    }

    /// Validates that `id` is consistent with `secure_mangle(public_ip, _)`
    /// for the seed byte carried in `id`'s last byte.
    pub fn verify_secure(&self, public_ip: IpAddr) -> bool {
        let expected = NodeId::secure_mangle(public_ip, self.0[19]);
        expected.0[0] == self.0[0]
            && expected.0[1] == self.0[1]
            && (expected.0[2] & 0xf8) == (self.0[2] & 0xf8)
    }
}

/// BEP 42 operates on the last 8 bytes of an IPv6 address or all 4 bytes of
/// an IPv4 address; we always return a 4-byte working array, truncating v6
/// addresses to their low 4 bytes as common implementations do.
fn canonical_ip_bytes(ip: IpAddr) -> [u8; 4] {
    match ip {
        IpAddr::V4(v4) => v4.octets(),
        IpAddr::V6(v6) => {
            let o = v6.octets();
            [o[12], o[13], o[14], o[15]]
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_reflexive_and_zero_for_self() {
        let a = NodeId::random();
        assert!(a.distance(&a).is_zero());
    }

    #[test]
    fn distance_is_symmetric() {
        let a = NodeId::random();
        let b = NodeId::random();
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn distance_triangle_inequality_under_xor() {
        // Under the XOR metric, d(a,c) = d(a,b) XOR d(b,c), so there's no
        // real "triangle inequality" violation to construct; verify the
        // XOR identity instead, which is the property proofs rely on.
        let a = NodeId::random();
        let b = NodeId::random();
        let c = NodeId::random();
        let ab = a.distance(&b);
        let bc = b.distance(&c);
        let ac = a.distance(&c);
        assert_eq!(ac, ab.distance(&bc));
    }

    #[test]
    fn common_prefix_len_full_for_identical_ids() {
        let a = NodeId::random();
        assert_eq!(a.common_prefix_len(&a), 160);
    }

    #[test]
    fn common_prefix_len_detects_first_differing_bit() {
        let mut bytes = [0u8; NODE_ID_LEN];
        bytes[0] = 0b0000_0000;
        let a = NodeId::from_bytes(bytes);
        bytes[0] = 0b0000_0001;
        let b = NodeId::from_bytes(bytes);
        assert_eq!(a.common_prefix_len(&b), 7);
    }

    #[test]
    fn zero_id_is_zero() {
        assert!(NodeId::ZERO.is_zero());
        assert!(!NodeId::random().is_zero());
    }

    #[test]
    fn secure_mangle_round_trips_verification() {
        let ip: IpAddr = "203.0.113.5".parse().unwrap();
        let id = NodeId::secure_mangle(ip, 0x42);
        assert!(id.verify_secure(ip));
        let other_ip: IpAddr = "198.51.100.9".parse().unwrap();
        assert!(!id.verify_secure(other_ip));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(NodeId::from_slice(&[0u8; 19]).is_none());
        assert!(NodeId::from_slice(&[0u8; 20]).is_some());
    }
}
