//! # Mainline DHT Node
//!
//! A Kademlia-style distributed hash table node speaking the BitTorrent
//! Mainline DHT wire protocol (BEP 5), acting as both client and server
//! over a single UDP socket.
//!
//! ## Architecture
//!
//! - **Domain layer:** node ids, addresses, timestamps, node freshness
//!   state, the routing table, error types, and configuration — pure
//!   logic, no I/O.
//! - **Ports layer:** trait boundaries (`Sender`, `Receiver`, `TimeSource`,
//!   `ConnectionTracker`, `IpBlocklist`, `MetricsSink`, `QueryHooks`,
//!   `ConfigProvider`) the engine is built against.
//! - **Adapters layer:** concrete implementations — a real UDP socket, the
//!   system clock, no-op metrics/blocklist/hooks, a static config
//!   provider.
//! - **Engine:** the `Server`, which owns the routing table, the
//!   transaction table, and the token server, and drives the receive
//!   loop and outbound query lifecycle.
//! - **KRPC:** the bencoded wire format.
//! - **Transaction:** per-query state machine (send, resend, timeout).
//! - **Token:** the opaque `get_peers`/`announce_peer` token issuer.
//! - **Bootstrap:** iterative `find_node` fan-out used to seed the
//!   routing table at startup.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mdht::adapters::{
//!     InMemoryConnectionTracker, NoOpIpBlocklist, NoOpMetricsSink, NoopQueryHooks, SystemClock,
//!     UdpTransport,
//! };
//! use mdht::domain::DhtConfig;
//! use mdht::engine::Server;
//!
//! # async fn run() -> std::io::Result<()> {
//! let transport = Arc::new(UdpTransport::bind("0.0.0.0:6881".parse().unwrap()).await?);
//! let server = Server::new(
//!     DhtConfig::default(),
//!     transport.clone(),
//!     transport,
//!     Arc::new(InMemoryConnectionTracker::new(256)),
//!     Arc::new(SystemClock),
//!     Arc::new(NoOpIpBlocklist),
//!     Arc::new(NoOpMetricsSink),
//!     Arc::new(NoopQueryHooks),
//! );
//! tokio::spawn(server.clone().run_receive_loop());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod bootstrap;
pub mod domain;
pub mod engine;
pub mod krpc;
pub mod ports;
pub mod routing;
pub mod token;
pub mod transaction;

pub use bootstrap::BootstrapStats;
pub use domain::config::DhtConfig;
pub use domain::error::{InsertError, KrpcErrorReply, QueryError};
pub use domain::node::{Node, Quality};
pub use domain::node_id::NodeId;
pub use domain::address::{Address, Family};
pub use engine::Server;
pub use routing::{AddOutcome, RoutingTable, RoutingTableStats};
