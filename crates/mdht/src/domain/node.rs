//! Per-peer records and the freshness classification used for eviction.

use crate::domain::address::Address;
use crate::domain::node_id::NodeId;
use crate::domain::timestamp::Timestamp;

/// How long a node remains "good" without fresh activity, per BEP 5.
pub const GOOD_INTERVAL_SECS: u64 = 15 * 60;

/// Consecutive unanswered outbound queries after which a node is "bad"
/// regardless of how recently it was seen.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Coarse freshness classification used by the routing table's displacement
/// policy. `Bad` nodes are the only ones ever evicted to make room.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quality {
    Good,
    Questionable,
    Bad,
}

/// A peer known to this node, keyed by the composite `(id, address)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub address: Address,
    pub last_got_query: Timestamp,
    pub last_got_response: Timestamp,
    pub last_sent_query: Timestamp,
    pub consecutive_failures: u32,
    pub announce_token: Option<Vec<u8>>,
    pub read_only: bool,
}

impl Node {
    pub fn new(id: NodeId, address: Address) -> Self {
        Node {
            id,
            address,
            last_got_query: Timestamp::NEVER,
            last_got_response: Timestamp::NEVER,
            last_sent_query: Timestamp::NEVER,
            consecutive_failures: 0,
            announce_token: None,
            read_only: false,
        }
    }

    /// Time-and-failure-based freshness, ignoring identity/security checks
    /// that only the routing table (which knows the local id and the
    /// security/blocklist ports) can evaluate.
    pub fn quality(&self, now: Timestamp) -> Quality {
        if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            return Quality::Bad;
        }
        if self.is_recently_responsive(now) {
            return Quality::Good;
        }
        Quality::Questionable
    }

    fn is_recently_responsive(&self, now: Timestamp) -> bool {
        let responded_recently = !self.last_got_response.is_never()
            && now.elapsed_since(self.last_got_response) <= GOOD_INTERVAL_SECS;
        let ever_responded_and_queried_us_recently = !self.last_got_response.is_never()
            && !self.last_got_query.is_never()
            && now.elapsed_since(self.last_got_query) <= GOOD_INTERVAL_SECS;
        responded_recently || ever_responded_and_queried_us_recently
    }

    pub fn on_query_received(&mut self, now: Timestamp) {
        self.last_got_query = now;
    }

    pub fn on_response_received(&mut self, now: Timestamp) {
        self.last_got_response = now;
        self.consecutive_failures = 0;
    }

    pub fn on_query_sent(&mut self, now: Timestamp) {
        self.last_sent_query = now;
    }

    pub fn on_query_failed(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(addr: &str) -> Node {
        Node::new(NodeId::random(), Address::new(addr.parse().unwrap()))
    }

    #[test]
    fn fresh_response_is_good() {
        let mut n = node_at("1.2.3.4:6881");
        n.on_response_received(Timestamp::new(1000));
        assert_eq!(n.quality(Timestamp::new(1000)), Quality::Good);
        assert_eq!(n.quality(Timestamp::new(1000 + GOOD_INTERVAL_SECS)), Quality::Good);
        assert_eq!(
            n.quality(Timestamp::new(1000 + GOOD_INTERVAL_SECS + 1)),
            Quality::Questionable
        );
    }

    #[test]
    fn responded_once_and_queried_us_recently_is_good() {
        let mut n = node_at("1.2.3.4:6881");
        n.on_response_received(Timestamp::new(0));
        n.on_query_received(Timestamp::new(2000));
        assert_eq!(n.quality(Timestamp::new(2000 + GOOD_INTERVAL_SECS)), Quality::Good);
    }

    #[test]
    fn never_responded_is_never_good() {
        let mut n = node_at("1.2.3.4:6881");
        n.on_query_received(Timestamp::new(10));
        assert_eq!(n.quality(Timestamp::new(10)), Quality::Questionable);
    }

    #[test]
    fn three_failures_is_bad_regardless_of_recency() {
        let mut n = node_at("1.2.3.4:6881");
        n.on_response_received(Timestamp::new(1000));
        n.on_query_failed();
        n.on_query_failed();
        n.on_query_failed();
        assert_eq!(n.quality(Timestamp::new(1000)), Quality::Bad);
    }

    #[test]
    fn response_resets_failure_counter() {
        let mut n = node_at("1.2.3.4:6881");
        n.on_query_failed();
        n.on_query_failed();
        n.on_response_received(Timestamp::new(5));
        assert_eq!(n.consecutive_failures, 0);
        assert_eq!(n.quality(Timestamp::new(5)), Quality::Good);
    }
}
