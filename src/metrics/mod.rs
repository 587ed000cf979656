/// Metric data points and the sinks that receive them
pub mod sink;

pub use sink::{
    EmfMetricsSink, MetricDatum, MetricIdentity, MetricsSink, MockMetricsSink, NoopMetricsSink,
};
