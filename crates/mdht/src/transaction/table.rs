//! Mapping `(remote_address, transaction_id) -> Transaction` (§4.4).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::address::Address;
use crate::transaction::transaction::Transaction;

type Key = (Address, Vec<u8>);

#[derive(Default)]
pub struct TransactionTable {
    inner: Mutex<HashMap<Key, Arc<Transaction>>>,
}

impl TransactionTable {
    pub fn new() -> Self {
        TransactionTable::default()
    }

    /// Inserting a duplicate key is a programming error: the id allocator
    /// is monotonic and wide enough that a genuine collision while a
    /// transaction is in flight is unreachable in practice.
    pub fn insert(&self, remote: Address, id: Vec<u8>, txn: Arc<Transaction>) {
        let key = (remote, id);
        let mut table = self.inner.lock();
        if table.contains_key(&key) {
            panic!("duplicate transaction key {:?}: id allocator invariant violated", key);
        }
        table.insert(key, txn);
    }

    /// A response whose transaction id is known but whose source address
    /// differs from the one the query was sent to is treated as untracked:
    /// the address is part of the lookup key.
    pub fn remove(&self, remote: &Address, id: &[u8]) -> Option<Arc<Transaction>> {
        self.inner.lock().remove(&(*remote, id.to_vec()))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains all outstanding transactions, cancelling each. Used on server
    /// close so nothing is left registered past the socket shutting down.
    pub fn cancel_all(&self) {
        let drained: Vec<Arc<Transaction>> = self.inner.lock().drain().map(|(_, v)| v).collect();
        for txn in drained {
            txn.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::transaction::Transaction;
    use std::time::Duration;

    fn addr() -> Address {
        Address::new("127.0.0.1:6881".parse().unwrap())
    }

    #[test]
    fn insert_then_remove_round_trips() {
        let table = TransactionTable::new();
        let (txn, _rx) = Transaction::new(vec![1, 2], addr(), "ping", 3, Duration::from_secs(5));
        table.insert(addr(), vec![1, 2], txn);
        assert_eq!(table.len(), 1);
        assert!(table.remove(&addr(), &[1, 2]).is_some());
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "duplicate transaction key")]
    fn duplicate_insert_panics() {
        let table = TransactionTable::new();
        let (a, _ra) = Transaction::new(vec![9], addr(), "ping", 3, Duration::from_secs(5));
        let (b, _rb) = Transaction::new(vec![9], addr(), "ping", 3, Duration::from_secs(5));
        table.insert(addr(), vec![9], a);
        table.insert(addr(), vec![9], b);
    }

    #[test]
    fn remove_with_wrong_address_misses() {
        let table = TransactionTable::new();
        let (txn, _rx) = Transaction::new(vec![5], addr(), "ping", 3, Duration::from_secs(5));
        table.insert(addr(), vec![5], txn);
        let other = Address::new("10.0.0.9:6881".parse().unwrap());
        assert!(table.remove(&other, &[5]).is_none());
        assert_eq!(table.len(), 1);
    }
}
