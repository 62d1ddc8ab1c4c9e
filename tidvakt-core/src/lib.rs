//! # tidvakt-core
//!
//! Event-stream ingestion core of a kernel security probe.
//!
//! Kernel events reach user space in CPU scheduling order. This crate turns
//! them back into approximate timestamp order within a bounded latency and
//! without per-event allocation on the hot path.
//!
//! ### Expectations (Production):
//! - Zero heap allocations per event once the pools are warm
//! - A single worker owns the reordering heap, no locks on the hot path
//! - Backpressure instead of silent drops between producers and the worker
//!
//! ### Key Submodules:
//! - `alloc`: Record pool reused across producers and the consumer
//! - `events`: Raw records, wire header parsing and the downstream handler contract
//! - `reorder`: Generation-windowed min-heap, its worker and telemetry relay

pub mod alloc;
pub mod error;
pub mod events;
pub mod reorder;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::reorder::*;
}

pub use error::ReorderError;
