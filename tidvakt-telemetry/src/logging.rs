//! ## tidvakt-telemetry::logging
//! **Structured logging with tracing**
//!
//! Installs the process-wide `tracing` subscriber and provides a helper for
//! emitting security-relevant probe events (loss alerts, adapter state
//! changes) with OpenTelemetry style key/value metadata.

use opentelemetry::KeyValue;
use tracing::info_span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber.
    ///
    /// `RUST_LOG` takes precedence over `level`. Calling this more than once
    /// is harmless: the first subscriber stays installed.
    pub fn init(level: &str, json: bool) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let builder = fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE);

        let installed = if json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };

        if let Err(e) = installed {
            tracing::debug!("tracing subscriber already installed: {e}");
        }
    }

    /// Logs a probe event inside its own span.
    #[inline]
    pub fn log_event(event_type: &str, metadata: &[KeyValue]) {
        let span = info_span!(
            "probe_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );
        let _entered = span.enter();
        tracing::info!(metadata = ?metadata, "Probe event occurred");
    }
}
