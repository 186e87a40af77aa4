pub mod address;
pub mod config;
pub mod error;
pub mod node;
pub mod node_id;
pub mod timestamp;

pub use address::{Address, Family};
pub use config::DhtConfig;
pub use error::{InsertError, KrpcErrorReply, QueryError, ERROR_GENERIC, ERROR_METHOD_UNKNOWN, ERROR_PROTOCOL};
pub use node::{Node, Quality, GOOD_INTERVAL_SECS, MAX_CONSECUTIVE_FAILURES};
pub use node_id::{NodeId, NODE_ID_LEN};
pub use timestamp::Timestamp;
