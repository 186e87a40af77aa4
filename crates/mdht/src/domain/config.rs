//! The configuration surface recognized by the server (§6).

use std::net::IpAddr;
use std::time::Duration;

use crate::domain::node_id::NodeId;

/// Plain-data configuration snapshot. `ports::ConfigProvider` hands one of
/// these to the engine at startup; there is no live-reload story here.
#[derive(Clone, Debug)]
pub struct DhtConfig {
    /// Generated randomly if `None`.
    pub node_id: Option<NodeId>,
    /// Used to harden the id per BEP 42 when `no_security` is false.
    pub public_ip: Option<IpAddr>,
    pub no_security: bool,
    /// Do not answer queries; advertise `ro=1` on outgoing messages.
    pub passive: bool,
    pub max_sends: u32,
    pub resend_delay: Duration,
    pub token_interval: Duration,
    /// Number of prior secrets (beyond the current one) a token may still
    /// validate against.
    pub token_retained_secrets: usize,
    pub bucket_k: usize,
}

impl Default for DhtConfig {
    fn default() -> Self {
        DhtConfig {
            node_id: None,
            public_ip: None,
            no_security: false,
            passive: false,
            max_sends: 3,
            resend_delay: Duration::from_secs(5),
            token_interval: Duration::from_secs(5 * 60),
            token_retained_secrets: 2,
            bucket_k: 8,
        }
    }
}

impl DhtConfig {
    /// Fast timers and a small `k`, for deterministic tests.
    pub fn for_testing() -> Self {
        DhtConfig {
            max_sends: 3,
            resend_delay: Duration::from_millis(50),
            token_interval: Duration::from_millis(200),
            token_retained_secrets: 2,
            bucket_k: 8,
            ..DhtConfig::default()
        }
    }
}
