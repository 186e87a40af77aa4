//! Error taxonomy. Decode errors never reach this type: they are dropped at
//! the socket boundary and only counted (see `engine::server`).

use thiserror::Error;

/// Rejections a node insertion can hit. These are logged and counted, never
/// surfaced to the application (per the "security / insertion rejections"
/// category).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    #[error("id is the zero id")]
    ZeroId,
    #[error("id equals the local node's id")]
    SelfId,
    #[error("id fails BEP 42 security validation")]
    InsecureId,
    #[error("address is in the IP blocklist")]
    Blocklisted,
    #[error("bucket is full and no bad node could be displaced")]
    BucketFull,
}

/// Outcome of an outbound `Transaction`, delivered to the caller of `query`.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },
    #[error("send error on attempt {attempt}: {source}")]
    SendError {
        attempt: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("query cancelled")]
    Cancelled,
}

/// Reply-level errors (`y = "e"`) are delivered as ordinary successful
/// replies at the transaction layer; this type exists so callers can match
/// on the KRPC error code without re-parsing the wire message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("KRPC error {code}: {message}")]
pub struct KrpcErrorReply {
    pub code: i32,
    pub message: String,
}

pub const ERROR_GENERIC: i32 = 201;
pub const ERROR_PROTOCOL: i32 = 203;
pub const ERROR_METHOD_UNKNOWN: i32 = 204;
