//! Simulation scenario parameters.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for every random source in the simulation.
    pub seed: u64,
    /// Simulated CPUs, one perf reader each.
    pub cpus: usize,
    /// Records written per CPU per second.
    pub events_per_sec: u64,
    /// Base interval between two reads of a buffer (milliseconds).
    pub poll_interval_ms: u64,
    /// Upper bound of the random extra delay added to each read (milliseconds).
    pub jitter_ms: u64,
    /// Probability that the kernel drops a record instead of writing it.
    pub loss_probability: f64,
    /// Event type ids are drawn from `0..event_types`.
    pub event_types: u32,
    /// Payload bytes following the header.
    pub payload_len: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            cpus: 4,
            events_per_sec: 2_000,
            poll_interval_ms: 10,
            jitter_ms: 15,
            loss_probability: 0.0,
            event_types: 16,
            payload_len: 44,
        }
    }
}

impl SimConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Worst-case delay between a kernel write and its delivery.
    pub fn max_delivery_delay(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms + self.jitter_ms)
    }
}

#[derive(Error, Debug)]
pub enum SimConfigError {
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Deserialization error: {0}")]
    Serde(#[from] serde_yaml::Error),
    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// Loads a scenario from a YAML file. Missing fields take their defaults.
pub fn load_sim_config<P: AsRef<Path>>(path: P) -> Result<SimConfig, SimConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SimConfigError::FileNotFound(format!(
            "{} does not exist",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    let config: SimConfig = serde_yaml::from_str(&content)?;
    config.check()?;
    Ok(config)
}

impl SimConfig {
    pub fn check(&self) -> Result<(), SimConfigError> {
        if self.cpus == 0 {
            return Err(SimConfigError::Invalid("cpus must be at least 1".into()));
        }
        if self.event_types == 0 {
            return Err(SimConfigError::Invalid("event_types must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(SimConfigError::Invalid(
                "loss_probability must be within 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_scenario_uses_defaults() {
        let config: SimConfig = serde_yaml::from_str("cpus: 8\njitter_ms: 40\n").unwrap();
        assert_eq!(config.cpus, 8);
        assert_eq!(config.seed, 42);
        assert_eq!(config.max_delivery_delay(), Duration::from_millis(50));
        assert!(config.check().is_ok());
    }

    #[test]
    fn invalid_probability() {
        let config = SimConfig {
            loss_probability: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.check(), Err(SimConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            load_sim_config("/nonexistent/scenario.yaml"),
            Err(SimConfigError::FileNotFound(_))
        ));
    }
}
