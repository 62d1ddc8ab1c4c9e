use thiserror::Error;

use tidvakt_core::ReorderError;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Map {0} not found")]
    MapNotFound(String),

    #[error("Map {name} is not a {expected}")]
    WrongMapKind { name: String, expected: &'static str },

    #[error("Lookup in {map} failed: {reason}")]
    Lookup { map: String, reason: String },

    #[error("Map {0} is already being read")]
    AlreadyReading(String),

    #[error("Ring usage query failed: {0}")]
    Usage(String),

    #[error("Reader thread failed: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("Ingestor started before init")]
    NotInitialized,

    #[error("Ingestor already started")]
    AlreadyStarted,

    #[error("Reorderer error: {0}")]
    Reorder(#[from] ReorderError),

    #[error("Failed to spawn dispatch worker: {0}")]
    Spawn(#[from] std::io::Error),
}
