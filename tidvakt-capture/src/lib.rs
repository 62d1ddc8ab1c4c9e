//! tidvakt‑capture
//!
//! Front ends draining kernel event buffers into the ingestion core.
//!
//! The kernel side (loaded program, maps, readers) is only visible through
//! the traits in [`kernel`]; a real loader and the simulator both implement
//! them. Two adapters share the [`Ingestor`] contract:
//! - [`PerCpuIngestor`] feeds per-CPU perf buffers into the reorderer
//! - [`RingIngestor`] dispatches an already ordered ring buffer directly

pub mod error;
pub mod ingest;
pub mod kernel;
pub mod lifecycle;
pub mod priority;

pub use error::{IngestError, KernelError};
pub use ingest::{Ingestor, IngestorKind, LossObserver, PerCpuIngestor, RingIngestor};
pub use kernel::{
    KernelCounters, LossFn, MapHandlers, MapRegistry, PerfMap, RecordFn, RingMap, RingUsage, StatsTable,
};
pub use lifecycle::Lifecycle;
