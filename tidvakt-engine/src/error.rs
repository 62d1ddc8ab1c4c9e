use thiserror::Error;

use tidvakt_capture::{IngestError, KernelError};
use tidvakt_core::ReorderError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Reorderer error: {0}")]
    Reorder(#[from] ReorderError),
}
