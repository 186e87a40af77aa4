//! Default `TimeSource`: the system wall clock.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::timestamp::Timestamp;
use crate::ports::TimeSource;

pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Timestamp::new(secs)
    }
}

/// A clock a test can advance explicitly, for deterministic token-rotation
/// and node-freshness assertions without sleeping real time.
#[derive(Clone)]
pub struct ManualClock {
    now: std::sync::Arc<parking_lot::Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        ManualClock { now: std::sync::Arc::new(parking_lot::Mutex::new(start)) }
    }

    pub fn advance(&self, secs: u64) {
        let mut now = self.now.lock();
        *now = now.add_secs(secs);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
