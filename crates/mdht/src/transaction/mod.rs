pub mod table;
pub mod transaction;

pub use table::TransactionTable;
pub use transaction::{Transaction, TransactionOutcome};

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically allocates transaction ids, minimally big-endian encoded
/// (leading zero bytes stripped) to match the "short opaque bytes"
/// convention real KRPC implementations use on the wire. 64 bits is wide
/// enough that wraparound while any transaction is in flight cannot happen
/// in practice (§9 design notes).
pub struct TransactionIdAllocator {
    counter: AtomicU64,
}

impl TransactionIdAllocator {
    pub fn new() -> Self {
        TransactionIdAllocator { counter: AtomicU64::new(1) }
    }

    pub fn next(&self) -> Vec<u8> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        encode_minimal(n)
    }
}

impl Default for TransactionIdAllocator {
    fn default() -> Self {
        TransactionIdAllocator::new()
    }
}

fn encode_minimal(n: u64) -> Vec<u8> {
    let bytes = n.to_be_bytes();
    let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[first_nonzero..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_monotonically_increasing() {
        let alloc = TransactionIdAllocator::new();
        let mut prev = alloc.next();
        for _ in 0..1000 {
            let next = alloc.next();
            assert_ne!(prev, next);
            prev = next;
        }
    }

    #[test]
    fn small_counters_encode_to_a_single_byte() {
        assert_eq!(encode_minimal(1), vec![1]);
        assert_eq!(encode_minimal(255), vec![255]);
        assert_eq!(encode_minimal(256), vec![1, 0]);
    }
}
