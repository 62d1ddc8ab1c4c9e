//! # Tidvakt Monitor
//!
//! Ingestion health accounting: per-map, per-CPU and per-event-type
//! throughput, byte volume and loss, both as observed in user space and as
//! reported by the kernel's own counters, plus sorting violation detection.

pub mod error;
pub mod monitor;
pub mod stats;
pub mod usage;

pub use error::MonitorError;
pub use monitor::{IngestMonitor, LossAlert, MonitoredMap};
pub use stats::{growth, KernelDelta, KernelSnapshot, MapCounters, ReadCounters, ReadValues};
pub use usage::{size_bucket, utilisation};
