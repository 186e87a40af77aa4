//! Iterative bootstrap traversal (§4.8): starting from a seed list, fan
//! out `find_node` queries toward the local id, feeding each reply's
//! candidate nodes back into the frontier until the search runs dry or
//! the node budget is exhausted.
//!
//! This does not implement full iterative-deepening Kademlia lookup
//! convergence (closest-node tracking across rounds); it is a breadth
//! traversal meant to seed the routing table at startup, which is all
//! §4.8 asks for. Responses are fed through `Server::find_node`, which
//! already inserts the responding node into the routing table on the
//! normal reply path; this module only needs to chase the candidates a
//! reply names.

mod bloom;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::debug;

use crate::bootstrap::bloom::BloomFilter;
use crate::domain::address::Address;
use crate::engine::Server;
use crate::krpc::message::{decode_compact_nodes_v4, decode_compact_nodes_v6, Msg, MsgBody};

const ALPHA: usize = 3;
const MAX_ADDRS_TRIED: usize = 2000;
const TARGET_FPR: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapStats {
    pub addrs_tried: usize,
    pub responses_received: usize,
}

fn address_key(addr: &Address) -> Vec<u8> {
    match addr.socket_addr() {
        SocketAddr::V4(a) => {
            let mut v = a.ip().octets().to_vec();
            v.extend_from_slice(&a.port().to_be_bytes());
            v
        }
        SocketAddr::V6(a) => {
            let mut v = a.ip().octets().to_vec();
            v.extend_from_slice(&a.port().to_be_bytes());
            v
        }
    }
}

/// Runs the traversal to completion and reports how many addresses were
/// probed and how many of them answered. `seeds` usually comes from
/// `ConfigProvider::starting_nodes`.
pub async fn run(server: Arc<Server>, seeds: Vec<Address>) -> BootstrapStats {
    let mut seen = BloomFilter::new(MAX_ADDRS_TRIED, TARGET_FPR);
    let mut frontier: VecDeque<Address> = VecDeque::new();
    let mut stats = BootstrapStats::default();

    for seed in seeds {
        let key = address_key(&seed);
        if !seen.contains(&key) {
            seen.insert(&key);
            frontier.push_back(seed);
        }
    }

    while stats.addrs_tried < MAX_ADDRS_TRIED && !frontier.is_empty() {
        let mut batch = Vec::with_capacity(ALPHA);
        for _ in 0..ALPHA {
            match frontier.pop_front() {
                Some(addr) => batch.push(addr),
                None => break,
            }
        }

        let mut set = tokio::task::JoinSet::new();
        for addr in batch {
            let server = server.clone();
            let target = server.local_id;
            set.spawn(async move {
                let result = server.find_node(addr, target, None).await;
                (addr, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            let (addr, result) = match joined {
                Ok(pair) => pair,
                Err(_) => continue,
            };
            stats.addrs_tried += 1;
            match result {
                Ok(msg) => {
                    stats.responses_received += 1;
                    for candidate in candidates_from(&msg) {
                        let key = address_key(&candidate);
                        if !seen.contains(&key) {
                            seen.insert(&key);
                            frontier.push_back(candidate);
                        }
                    }
                }
                Err(error) => debug!(%addr, %error, "bootstrap probe failed"),
            }
        }
    }

    stats
}

fn candidates_from(msg: &Msg) -> Vec<Address> {
    let mut out = Vec::new();
    if let MsgBody::Response { r } = &msg.body {
        if let Some(nodes) = &r.nodes {
            out.extend(decode_compact_nodes_v4(nodes).into_iter().map(|(_, addr)| addr));
        }
        if let Some(nodes6) = &r.nodes6 {
            out.extend(decode_compact_nodes_v6(nodes6).into_iter().map(|(_, addr)| addr));
        }
    }
    out
}
