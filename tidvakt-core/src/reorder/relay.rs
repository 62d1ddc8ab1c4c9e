//! Reorderer telemetry relay.
//!
//! Turns each [`ReOrdererMetric`] sample into the queue-size and average
//! sift-depth gauges.

use std::sync::Arc;

use tidvakt_telemetry::metrics::{names, MetricsError, MetricsSink};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::metric::ReOrdererMetric;

pub struct ReOrdererRelay {
    sink: Arc<dyn MetricsSink>,
    queue_size: String,
    avg_op_depth: String,
}

impl ReOrdererRelay {
    pub fn new(sink: Arc<dyn MetricsSink>, namespace: &str) -> Self {
        Self {
            sink,
            queue_size: names::qualified(namespace, names::QUEUE_SIZE),
            avg_op_depth: names::qualified(namespace, names::AVG_OP_DEPTH),
        }
    }

    pub fn emit(&self, metric: &ReOrdererMetric) -> Result<(), MetricsError> {
        self.sink
            .gauge(&self.queue_size, metric.queue_size as f64, &[])?;
        self.sink
            .gauge(&self.avg_op_depth, metric.avg_op_depth(), &[])
    }

    /// Consumes samples until `cancel` fires or the stream ends.
    pub async fn run(self, mut samples: mpsc::Receiver<ReOrdererMetric>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                sample = samples.recv() => match sample {
                    Some(metric) => {
                        if let Err(e) = self.emit(&metric) {
                            warn!(error = %e, "failed to send reorderer metrics");
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("reorderer relay stopped");
    }
}
