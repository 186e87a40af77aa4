//! Concrete implementations of the `ports` traits.

pub mod blocklist;
pub mod clock;
pub mod config;
pub mod hooks;
pub mod metrics;
pub mod tracker;
pub mod udp;

pub use blocklist::NoOpIpBlocklist;
pub use clock::{ManualClock, SystemClock};
pub use config::StaticDhtConfig;
pub use hooks::NoopQueryHooks;
pub use metrics::NoOpMetricsSink;
pub use tracker::InMemoryConnectionTracker;
pub use udp::UdpTransport;
