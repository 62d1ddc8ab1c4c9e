use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReorderError {
    #[error("Reorderer worker already started")]
    AlreadyStarted,

    #[error("Reorderer is shut down")]
    Closed,
}
