//! # Tidvakt Configuration System
//!
//! Hierarchical configuration for the event ingestion core.
//!
//! ## Features
//! - **Unified Configuration**: one tree for reorderer, ingestion, monitor and telemetry
//! - **Validation**: runtime validation of every sizing parameter before anything starts
//! - **Environment Awareness**: per-environment overrides and `TIDVAKT_*` variables

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod ingest;
mod monitor;
mod reorderer;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use ingest::IngestConfig;
pub use monitor::MonitorConfig;
pub use reorderer::ReordererConfig;
pub use telemetry::TelemetryConfig;

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct TidvaktConfig {
    /// Reordering engine parameters.
    #[validate(nested)]
    #[serde(default)]
    pub reorderer: ReordererConfig,

    /// Kernel buffer ingestion parameters.
    #[validate(nested)]
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Ingestion monitor parameters.
    #[validate(nested)]
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Logging and metrics parameters.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl TidvaktConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/tidvakt.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<environment>.yaml` - Environment‑specific overrides.
    /// 4. `TIDVAKT_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(TidvaktConfig::default()));

        if Path::new("config/tidvakt.yaml").exists() {
            figment = figment.merge(Yaml::file("config/tidvakt.yaml"));
        } else {
            tracing::debug!("config/tidvakt.yaml not found, using default configuration");
        }

        let env = std::env::var("TIDVAKT_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific path, still honouring `TIDVAKT_*`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment =
            Figment::from(Serialized::defaults(TidvaktConfig::default())).merge(Yaml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed("TIDVAKT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn full_config_validation() {
        let config = TidvaktConfig::default();
        config.validate().expect("Default config should validate");
    }

    #[test]
    fn environment_override() {
        Jail::expect_with(|jail| {
            jail.set_env("TIDVAKT_REORDERER__RETENTION", "9");
            jail.set_env("TIDVAKT_INGEST__USE_RING_BUFFER", "true");
            let config = TidvaktConfig::load().expect("config should load");
            assert_eq!(config.reorderer.retention, 9);
            assert!(config.ingest.use_ring_buffer);
            Ok(())
        });
    }

    #[test]
    fn file_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "probe.yaml",
                r#"
reorderer:
  queue_size: 128
ingest:
  ring_buffer_size: "8MiB"
"#,
            )?;
            let config = TidvaktConfig::load_from_path("probe.yaml").expect("config should load");
            assert_eq!(config.reorderer.queue_size, 128);
            assert_eq!(config.reorderer.flush_interval_ms, 50);
            assert_eq!(config.ingest.ring_buffer_size, 8 * 1024 * 1024);
            Ok(())
        });
    }

    #[test]
    fn invalid_file_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("probe.yaml", "ingest:\n  perf_buffer_pages: 100\n")?;
            assert!(matches!(
                TidvaktConfig::load_from_path("probe.yaml"),
                Err(ConfigError::Validation(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            TidvaktConfig::load_from_path("/nonexistent/tidvakt.yaml"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
