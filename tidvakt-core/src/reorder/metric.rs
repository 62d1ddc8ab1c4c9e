//! Operational samples taken by the reorderer worker.

use super::heap::HeapOps;

/// One metric window: heap operations since the previous sample plus the
/// heap size at sampling time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReOrdererMetric {
    pub total_op: u64,
    pub total_depth: u64,
    pub queue_size: u64,
}

impl ReOrdererMetric {
    pub fn new(ops: HeapOps, queue_size: usize) -> Self {
        Self {
            total_op: ops.total_op,
            total_depth: ops.total_depth,
            queue_size: queue_size as u64,
        }
    }

    /// Mean sift depth per heap operation, zero for an idle window.
    pub fn avg_op_depth(&self) -> f64 {
        if self.total_op == 0 {
            0.0
        } else {
            self.total_depth as f64 / self.total_op as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_depth() {
        let metric = ReOrdererMetric {
            total_op: 4,
            total_depth: 6,
            queue_size: 10,
        };
        assert_eq!(metric.avg_op_depth(), 1.5);
        assert_eq!(ReOrdererMetric::default().avg_op_depth(), 0.0);
    }
}
