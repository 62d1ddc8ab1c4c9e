use thiserror::Error;

use tidvakt_capture::KernelError;
use tidvakt_telemetry::MetricsError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Kernel statistics unavailable: {0}")]
    Kernel(#[from] KernelError),

    #[error("Metrics sink failed: {0}")]
    Metrics(#[from] MetricsError),
}
