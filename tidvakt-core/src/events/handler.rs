//! Downstream handler contract.

/// Receives every delivered record, once, in delivery order.
///
/// The payload is only borrowed for the duration of the call.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, cpu: u32, payload: &[u8]);
}

impl<F> EventHandler for F
where
    F: Fn(u32, &[u8]) + Send + Sync,
{
    #[inline]
    fn handle_event(&self, cpu: u32, payload: &[u8]) {
        self(cpu, payload)
    }
}
