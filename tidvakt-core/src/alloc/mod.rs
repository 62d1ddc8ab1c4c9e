//! ## tidvakt-core::alloc
//! **Record buffer pooling**
//!
//! ### Expectations (Production):
//! - Zero heap allocations in the record delivery path once warm
//! - Safe concurrent get/release from producers and the consumer
//!
//! ### Key Submodules:
//! - `pool/`: Bounded pool of reusable record buffers
//! - `stats/`: Pool usage counters

pub mod pool;
pub mod stats;

pub use pool::RecordPool;
pub use stats::{PoolStats, PoolStatsSnapshot};
