//! Observability configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Default log level; `RUST_LOG` overrides it.
    #[validate(custom(function = validation::validate_log_level))]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON formatted logs.
    #[serde(default)]
    pub json_logs: bool,

    /// Prefix for every emitted metric name.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_namespace() -> String {
    "tidvakt".into()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            namespace: default_namespace(),
        }
    }
}
