//! # Tidvakt Engine
//!
//! The probe runtime: builds the ingestion pipeline from configuration and
//! runs it until shutdown.

mod counting;
mod error;
mod probe;

pub use counting::CountingHandler;
pub use error::RuntimeError;
pub use probe::Probe;
