//! Protocol state machine for inbound datagrams (§4.6).

use std::sync::Arc;

use tracing::debug;

use crate::domain::address::{Address, Family};
use crate::domain::node_id::NodeId;
use crate::krpc::message::{encode, KrpcError, Msg, MsgBody, QueryArgs, ReturnValues};
use crate::krpc::{encode_compact_nodes_v4, encode_compact_nodes_v6, resolve_want};
use crate::engine::server::Server;

const NODES_PER_REPLY: usize = 8;

pub async fn handle(server: &Arc<Server>, msg: Msg, from: Address) {
    let t = msg.transaction_id.clone();
    match msg.body {
        MsgBody::Query { q, a } => handle_query(server, t, q, a, from).await,
        MsgBody::Response { .. } | MsgBody::Error { .. } => handle_reply(server, msg, from).await,
    }
}

async fn handle_query(server: &Arc<Server>, t: Vec<u8>, q: String, a: QueryArgs, from: Address) {
    let querier_id = match NodeId::from_slice(&a.id) {
        Some(id) => id,
        None => {
            reply_error(server, &t, from, KrpcError::protocol("missing or malformed id")).await;
            return;
        }
    };

    let now = server.now();
    server.on_query_from(querier_id, from, now);

    if server.hooks().on_query(&from, &q) {
        return;
    }
    if server.config().passive {
        return;
    }

    match q.as_str() {
        "ping" => reply_ok(server, &t, from, ReturnValues { id: server.local_id.to_bytes().to_vec(), ..Default::default() }).await,

        "find_node" => {
            let target = match a.target.as_ref().and_then(|b| NodeId::from_slice(b)) {
                Some(t) => t,
                None => {
                    reply_error(server, &t, from, KrpcError::protocol("find_node requires target")).await;
                    return;
                }
            };
            let r = build_nodes_reply(server, &target, &a, from, now);
            reply_ok(server, &t, from, r).await;
        }

        "get_peers" => {
            let info_hash = match a.info_hash.as_ref().and_then(|b| NodeId::from_slice(b)) {
                Some(h) => h,
                None => {
                    reply_error(server, &t, from, KrpcError::protocol("get_peers requires info_hash")).await;
                    return;
                }
            };
            let mut r = build_nodes_reply(server, &info_hash, &a, from, now);
            let token = server.tokens().lock().create(&from, now);
            r.token = Some(serde_bytes::ByteBuf::from(token));
            reply_ok(server, &t, from, r).await;
        }

        "announce_peer" => {
            let (info_hash, port, token) = match (
                a.info_hash.as_ref().and_then(|b| NodeId::from_slice(b)),
                a.port,
                a.token.as_ref(),
            ) {
                (Some(h), Some(p), Some(tok)) => (h, p, tok.clone()),
                _ => {
                    reply_error(server, &t, from, KrpcError::protocol("announce_peer requires info_hash, port, token")).await;
                    return;
                }
            };
            let valid = server.tokens().lock().validate(&token, &from, now);
            if !valid {
                debug!(%from, "announce_peer with invalid token, silently dropped");
                return;
            }
            let effective_port = if a.implied_port == Some(1) { from.port() } else { port };
            server.hooks().on_announce_peer(&info_hash, &from, effective_port);
            reply_ok(server, &t, from, ReturnValues { id: server.local_id.to_bytes().to_vec(), ..Default::default() }).await;
        }

        other => {
            reply_error(server, &t, from, KrpcError::method_unknown(format!("unknown method {other}"))).await;
        }
    }
}

fn build_nodes_reply(server: &Arc<Server>, target: &NodeId, a: &QueryArgs, from: Address, now: crate::domain::timestamp::Timestamp) -> ReturnValues {
    let families = resolve_want(a.want.as_deref(), from.family());
    let table = server.routing_table().lock();
    let mut r = ReturnValues { id: server.local_id.to_bytes().to_vec(), ..Default::default() };
    for family in families {
        let closest = table.closest_good(NODES_PER_REPLY, target, family, now);
        let pairs: Vec<(NodeId, Address)> = closest.into_iter().map(|n| (n.id, n.address)).collect();
        match family {
            Family::V4 => r.nodes = Some(serde_bytes::ByteBuf::from(encode_compact_nodes_v4(&pairs))),
            Family::V6 => r.nodes6 = Some(serde_bytes::ByteBuf::from(encode_compact_nodes_v6(&pairs))),
        }
    }
    r
}

async fn handle_reply(server: &Arc<Server>, msg: Msg, from: Address) {
    let t = msg.transaction_id.clone();
    match server.transactions_remove(&from, &t) {
        Some(txn) => {
            let now = server.now();
            match &msg.body {
                MsgBody::Response { r } => {
                    if let Some(id) = NodeId::from_slice(&r.id) {
                        server.on_response_from(id, from, now);
                    }
                }
                MsgBody::Error { .. } => {
                    // Error replies carry no sender id on the wire, but a
                    // reply of any kind still proves the node at `from` is
                    // alive, so every id already registered at that address
                    // gets its freshness bumped the same way `mark_failed_at`
                    // resolves ids from an address alone.
                    let ids = server.routing_table().lock().ids_at_address(&from);
                    let mut table = server.routing_table().lock();
                    for id in ids {
                        table.mark_responded(&id, now);
                    }
                }
                MsgBody::Query { .. } => unreachable!("handle_reply only dispatched for Response/Error bodies"),
            }
            txn.on_response(msg);
        }
        None => {
            server.metrics().incr("untracked_response");
            debug!(%from, transaction_id = ?hex::encode(&t), "untracked response ignored");
        }
    }
}

async fn reply_ok(server: &Arc<Server>, t: &[u8], to: Address, r: ReturnValues) {
    let ip = to
        .to_compact_v4()
        .map(|b| serde_bytes::ByteBuf::from(b.to_vec()))
        .or_else(|| to.to_compact_v6().map(|b| serde_bytes::ByteBuf::from(b.to_vec())));
    send_reply(server, to, Msg { transaction_id: t.to_vec(), body: MsgBody::Response { r }, read_only: false, ip }).await;
}

async fn reply_error(server: &Arc<Server>, t: &[u8], to: Address, e: KrpcError) {
    send_reply(server, to, Msg { transaction_id: t.to_vec(), body: MsgBody::Error { e }, read_only: false, ip: None }).await;
}

async fn send_reply(server: &Arc<Server>, to: Address, msg: Msg) {
    if let Ok(bytes) = encode(&msg) {
        let _ = server.send_raw(to, bytes).await;
    }
}
