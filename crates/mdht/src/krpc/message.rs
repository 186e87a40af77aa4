//! KRPC wire messages: bencode-encoded dicts over UDP (§6).
//!
//! The shape here is deliberately a single flat `QueryArgs`/`ReturnValues`
//! pair rather than one variant per method: bencode dicts don't carry a
//! schema, and matching the reference krpc encoders this was grounded on,
//! unused fields are simply absent on the wire (`skip_serializing_if`) and
//! required-field validation happens in the inbound handler, not here.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::domain::address::Address;
use crate::domain::error::{ERROR_GENERIC, ERROR_METHOD_UNKNOWN, ERROR_PROTOCOL};
use crate::domain::node_id::NodeId;

fn is_false(b: &bool) -> bool {
    !b
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Msg {
    #[serde(rename = "t", with = "serde_bytes")]
    pub transaction_id: Vec<u8>,
    #[serde(flatten)]
    pub body: MsgBody,
    #[serde(rename = "ro", default, skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(rename = "ip", skip_serializing_if = "Option::is_none")]
    pub ip: Option<ByteBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "y")]
pub enum MsgBody {
    #[serde(rename = "q")]
    Query { q: String, a: QueryArgs },
    #[serde(rename = "r")]
    Response { r: ReturnValues },
    #[serde(rename = "e")]
    Error { e: KrpcError },
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct QueryArgs {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub want: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noseed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ReturnValues {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<ByteBuf>,
    #[serde(rename = "nodes6", skip_serializing_if = "Option::is_none")]
    pub nodes6: Option<ByteBuf>,
}

/// `[code, message]` as the wire format dictates, not a two-field struct.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KrpcError(pub i32, pub String);

impl KrpcError {
    pub fn generic(message: impl Into<String>) -> Self {
        KrpcError(ERROR_GENERIC, message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        KrpcError(ERROR_PROTOCOL, message.into())
    }

    pub fn method_unknown(message: impl Into<String>) -> Self {
        KrpcError(ERROR_METHOD_UNKNOWN, message.into())
    }
}

/// Concatenated 26-byte records: 20-byte id + 4-byte IPv4 + 2-byte port.
pub fn encode_compact_nodes_v4(nodes: &[(NodeId, Address)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nodes.len() * 26);
    for (id, addr) in nodes {
        if let Some(compact) = addr.to_compact_v4() {
            out.extend_from_slice(id.as_bytes());
            out.extend_from_slice(&compact);
        }
    }
    out
}

/// Concatenated 38-byte records: 20-byte id + 16-byte IPv6 + 2-byte port.
pub fn encode_compact_nodes_v6(nodes: &[(NodeId, Address)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nodes.len() * 38);
    for (id, addr) in nodes {
        if let Some(compact) = addr.to_compact_v6() {
            out.extend_from_slice(id.as_bytes());
            out.extend_from_slice(&compact);
        }
    }
    out
}

pub fn decode_compact_nodes_v4(bytes: &[u8]) -> Vec<(NodeId, Address)> {
    const REC_LEN: usize = 26;
    bytes
        .chunks_exact(REC_LEN)
        .filter_map(|rec| {
            let id = NodeId::from_slice(&rec[0..20])?;
            let mut tail = [0u8; 6];
            tail.copy_from_slice(&rec[20..26]);
            Some((id, Address::from_compact_v4(&tail)))
        })
        .collect()
}

pub fn decode_compact_nodes_v6(bytes: &[u8]) -> Vec<(NodeId, Address)> {
    const REC_LEN: usize = 38;
    bytes
        .chunks_exact(REC_LEN)
        .filter_map(|rec| {
            let id = NodeId::from_slice(&rec[0..20])?;
            let mut tail = [0u8; 18];
            tail.copy_from_slice(&rec[20..38]);
            Some((id, Address::from_compact_v6(&tail)))
        })
        .collect()
}

pub fn encode(msg: &Msg) -> Result<Vec<u8>, serde_bencode::Error> {
    serde_bencode::to_bytes(msg)
}

pub fn decode(bytes: &[u8]) -> Result<Msg, serde_bencode::Error> {
    serde_bencode::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_v4_round_trips() {
        let pairs = vec![
            (NodeId::random(), Address::new("1.2.3.4:6881".parse().unwrap())),
            (NodeId::random(), Address::new("5.6.7.8:6882".parse().unwrap())),
        ];
        let encoded = encode_compact_nodes_v4(&pairs);
        assert_eq!(encoded.len(), 52);
        let decoded = decode_compact_nodes_v4(&encoded);
        assert_eq!(decoded, pairs);
    }

    #[test]
    fn ping_query_round_trips_through_bencode() {
        let msg = Msg {
            transaction_id: vec![0x61, 0x61],
            body: MsgBody::Query {
                q: "ping".to_string(),
                a: QueryArgs {
                    id: NodeId::random().to_bytes().to_vec(),
                    ..Default::default()
                },
            },
            read_only: false,
            ip: None,
        };
        let bytes = encode(&msg).unwrap();
        let back = decode(&bytes).unwrap();
        match back.body {
            MsgBody::Query { q, .. } => assert_eq!(q, "ping"),
            _ => panic!("expected query"),
        }
        assert_eq!(back.transaction_id, msg.transaction_id);
    }

    #[test]
    fn error_reply_round_trips() {
        let msg = Msg {
            transaction_id: vec![0x7a, 0x7a],
            body: MsgBody::Error {
                e: KrpcError::protocol("missing a key"),
            },
            read_only: false,
            ip: None,
        };
        let bytes = encode(&msg).unwrap();
        let back = decode(&bytes).unwrap();
        match back.body {
            MsgBody::Error { e } => assert_eq!(e, KrpcError::protocol("missing a key")),
            _ => panic!("expected error"),
        }
    }

    #[test]
    fn read_only_flag_is_omitted_when_false() {
        let msg = Msg {
            transaction_id: vec![1],
            body: MsgBody::Query {
                q: "ping".into(),
                a: QueryArgs {
                    id: NodeId::random().to_bytes().to_vec(),
                    ..Default::default()
                },
            },
            read_only: false,
            ip: None,
        };
        let bytes = encode(&msg).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(!text.contains("2:ro"));
    }
}
