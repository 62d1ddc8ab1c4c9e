//! # Tidvakt Telemetry
//!
//! Crate for logging bootstrap and the metrics sink contract shared by the
//! ingestion monitor and the reorderer relay.

pub mod logging;
pub mod metrics;
pub mod recording;

pub use logging::EventLogger;
pub use metrics::{MetricsError, MetricsSink, PrometheusSink};
pub use recording::{RecordedMetric, RecordingSink};
