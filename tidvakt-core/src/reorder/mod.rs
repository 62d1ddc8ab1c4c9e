//! ## tidvakt-core::reorder
//! **Bounded-latency event reordering**
//!
//! Records from per-CPU buffers are held in a timestamp min-heap and released
//! once their arrival generation falls `retention` generations behind the
//! current one. The generation advances on a fixed tick.
//!
//! ### Key Submodules:
//! - `heap/`: Node arena and generation-windowed heap
//! - `engine/`: The worker that owns the heap
//! - `metric/`: Operational samples
//! - `relay/`: Sample to gauge relay

pub mod engine;
pub mod heap;
pub mod metric;
pub mod relay;

pub use engine::{ReOrderer, ReOrdererOptions, SAFETY_VALVE_FACTOR};
pub use heap::{HeapOps, NodePool, ReorderHeap};
pub use metric::ReOrdererMetric;
pub use relay::ReOrdererRelay;
