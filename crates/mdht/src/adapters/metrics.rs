//! Default `MetricsSink`: discards every counter. Real deployments swap
//! this for an adapter that forwards into their own telemetry pipeline.

use crate::ports::MetricsSink;

pub struct NoOpMetricsSink;

impl MetricsSink for NoOpMetricsSink {
    fn incr(&self, _name: &str) {}
}
