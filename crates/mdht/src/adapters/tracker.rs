//! In-memory connection-tracking admission gate, bounding the number of
//! concurrent novel outbound flows per remote address.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::address::Address;
use crate::ports::{AdmissionHandle, ConnectionTracker};

pub struct InMemoryConnectionTracker {
    max_concurrent: usize,
    active: Arc<Mutex<HashSet<Address>>>,
}

impl InMemoryConnectionTracker {
    pub fn new(max_concurrent: usize) -> Self {
        InMemoryConnectionTracker { max_concurrent, active: Arc::new(Mutex::new(HashSet::new())) }
    }
}

impl ConnectionTracker for InMemoryConnectionTracker {
    fn try_acquire(&self, addr: &Address) -> Option<Box<dyn AdmissionHandle>> {
        let mut active = self.active.lock();
        if active.len() >= self.max_concurrent && !active.contains(addr) {
            return None;
        }
        active.insert(*addr);
        Some(Box::new(Admission { addr: *addr, active: self.active.clone() }))
    }
}

struct Admission {
    addr: Address,
    active: Arc<Mutex<HashSet<Address>>>,
}

impl AdmissionHandle for Admission {
    fn mark_done(self: Box<Self>) {
        self.active.lock().remove(&self.addr);
    }
}
