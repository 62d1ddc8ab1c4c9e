//! Ingestion adapters.
//!
//! Both variants follow the same contract: `init` resolves the kernel maps
//! (a missing map is fatal), `start` spawns readers through the
//! [`Lifecycle`], and `pause`/`resume` control kernel-side delivery where
//! the buffer type supports it.

use std::sync::Arc;

use tidvakt_config::IngestConfig;
use tidvakt_core::alloc::RecordPool;
use tidvakt_core::events::EventHandler;
use tidvakt_core::reorder::ReOrderer;

use crate::error::IngestError;
use crate::kernel::MapRegistry;
use crate::lifecycle::Lifecycle;

mod perf;
mod ring;

pub use perf::PerCpuIngestor;
pub use ring::RingIngestor;

/// Receives `(count, map name, cpu)` for every kernel loss report.
pub type LossObserver = Arc<dyn Fn(u64, &str, u32) + Send + Sync>;

pub trait Ingestor: Send {
    fn init(&mut self, registry: &dyn MapRegistry, config: &IngestConfig)
        -> Result<(), IngestError>;

    fn start(&mut self, lifecycle: &mut Lifecycle) -> Result<(), IngestError>;

    fn pause(&self) -> Result<(), IngestError>;

    fn resume(&self) -> Result<(), IngestError>;

    /// Must be set before `start` to take effect.
    fn set_loss_observer(&mut self, observer: LossObserver);
}

/// The adapter variant, chosen once from configuration.
pub enum IngestorKind {
    PerCpu(PerCpuIngestor),
    SingleBuffer(RingIngestor),
}

impl IngestorKind {
    pub fn per_cpu(reorderer: Arc<ReOrderer>) -> Self {
        Self::PerCpu(PerCpuIngestor::new(reorderer))
    }

    pub fn single_buffer(handler: Arc<dyn EventHandler>, pool: Arc<RecordPool>) -> Self {
        Self::SingleBuffer(RingIngestor::new(handler, pool))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PerCpu(_) => "per_cpu",
            Self::SingleBuffer(_) => "single_buffer",
        }
    }

    fn inner(&self) -> &dyn Ingestor {
        match self {
            Self::PerCpu(i) => i,
            Self::SingleBuffer(i) => i,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Ingestor {
        match self {
            Self::PerCpu(i) => i,
            Self::SingleBuffer(i) => i,
        }
    }
}

impl Ingestor for IngestorKind {
    fn init(
        &mut self,
        registry: &dyn MapRegistry,
        config: &IngestConfig,
    ) -> Result<(), IngestError> {
        self.inner_mut().init(registry, config)
    }

    fn start(&mut self, lifecycle: &mut Lifecycle) -> Result<(), IngestError> {
        self.inner_mut().start(lifecycle)
    }

    fn pause(&self) -> Result<(), IngestError> {
        self.inner().pause()
    }

    fn resume(&self) -> Result<(), IngestError> {
        self.inner().resume()
    }

    fn set_loss_observer(&mut self, observer: LossObserver) {
        self.inner_mut().set_loss_observer(observer)
    }
}
