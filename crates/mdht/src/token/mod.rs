//! Rotating announce tokens (`get_peers`/`announce_peer`).

use std::net::IpAddr;
use std::time::Duration;

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::domain::address::Address;
use crate::domain::timestamp::Timestamp;

const SECRET_LEN: usize = 20;

/// Holds the current secret plus a bounded number of retired ones, rotating
/// lazily whenever `create`/`validate` notices the interval has elapsed
/// rather than on a timer of its own.
pub struct TokenServer {
    secrets: Vec<[u8; SECRET_LEN]>,
    retained: usize,
    interval: Duration,
    last_rotation: Timestamp,
}

impl TokenServer {
    pub fn new(interval: Duration, retained: usize, now: Timestamp) -> Self {
        TokenServer {
            secrets: vec![random_secret()],
            retained,
            interval,
            last_rotation: now,
        }
    }

    fn maybe_rotate(&mut self, now: Timestamp) {
        let interval_secs = self.interval.as_secs();
        if interval_secs == 0 {
            return;
        }
        while now.elapsed_since(self.last_rotation) >= interval_secs {
            self.secrets.insert(0, random_secret());
            self.secrets.truncate(self.retained + 1);
            self.last_rotation = self.last_rotation.add_secs(interval_secs);
        }
    }

    pub fn create(&mut self, addr: &Address, now: Timestamp) -> Vec<u8> {
        self.maybe_rotate(now);
        hash_token(&self.secrets[0], addr.ip())
    }

    pub fn validate(&mut self, token: &[u8], addr: &Address, now: Timestamp) -> bool {
        self.maybe_rotate(now);
        self.secrets
            .iter()
            .any(|secret| hash_token(secret, addr.ip()) == token)
    }
}

fn random_secret() -> [u8; SECRET_LEN] {
    let mut bytes = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn hash_token(secret: &[u8; SECRET_LEN], ip: IpAddr) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    match ip {
        IpAddr::V4(v4) => hasher.update(v4.octets()),
        IpAddr::V6(v6) => hasher.update(v6.octets()),
    }
    hasher.finalize().to_vec()
}
