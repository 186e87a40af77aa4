//! Trait boundaries the engine is built against. Concrete implementations
//! live in `adapters`; tests supply their own.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::domain::address::Address;
use crate::domain::config::DhtConfig;
use crate::domain::node_id::NodeId;
use crate::domain::timestamp::Timestamp;

/// The socket write side. A real adapter wraps a `tokio::net::UdpSocket`;
/// tests substitute an in-memory channel.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send_to(&self, addr: Address, bytes: Vec<u8>) -> std::io::Result<()>;
}

/// The socket read side, owned by the engine's receive loop. Kept separate
/// from `Sender` because only one task ever calls it, unlike sends which
/// fan out from every outstanding transaction.
#[async_trait]
pub trait Receiver: Send + Sync {
    async fn recv_from(&self) -> std::io::Result<(Vec<u8>, Address)>;
}

/// Abstracts the wall clock so resend/timeout logic is deterministic under
/// test.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Released handle for an admitted outbound flow.
pub trait AdmissionHandle: Send {
    fn mark_done(self: Box<Self>);
}

/// Rate-admits novel outbound `(local, remote)` flows. Acquired once per
/// send attempt; the transaction sender marks it done on a successful
/// write and drops it (without marking done) on failure.
pub trait ConnectionTracker: Send + Sync {
    fn try_acquire(&self, addr: &Address) -> Option<Box<dyn AdmissionHandle>>;
}

/// External IP block-list lookup, consulted by the security gate before a
/// node is ever inserted into the routing table.
pub trait IpBlocklist: Send + Sync {
    fn is_blocked(&self, ip: IpAddr) -> bool;
}

/// Named counters, injected so the core stays testable without a
/// process-wide registry (§9 design notes).
pub trait MetricsSink: Send + Sync {
    fn incr(&self, name: &str);
}

/// Inbound-query hooks. Returning `true` from `on_query` suppresses the
/// engine's default handling of that query.
pub trait QueryHooks: Send + Sync {
    fn on_query(&self, _from: &Address, _method: &str) -> bool {
        false
    }

    fn on_announce_peer(&self, _info_hash: &NodeId, _from: &Address, _port: u16) {}
}

/// Supplies the static configuration snapshot and the bootstrap seed list
/// (e.g. DNS resolution of well-known bootstrap hosts).
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    fn config(&self) -> DhtConfig;
    async fn starting_nodes(&self) -> Vec<Address>;
}
