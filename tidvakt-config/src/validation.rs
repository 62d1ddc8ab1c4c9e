//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

lazy_static! {
    static ref MAP_NAME: Regex = Regex::new("^[A-Za-z0-9_]+$").expect("static pattern");
}

/// Kernel object names are limited to 15 characters plus the terminator.
const MAX_MAP_NAME_LEN: usize = 15;

/// Validate that a map name is a legal kernel object name.
pub fn validate_map_name(name: &str) -> Result<(), ValidationError> {
    if name.len() <= MAX_MAP_NAME_LEN && MAP_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_map_name"))
    }
}

/// Validate that a given value is a power of two.
pub fn validate_power_of_two(value: usize) -> Result<(), ValidationError> {
    if value.is_power_of_two() {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_power_of_two"))
    }
}

/// Validate a log level accepted by `EnvFilter`.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Validate that every event type name is non-empty and unique.
pub fn validate_event_types(names: &[String]) -> Result<(), ValidationError> {
    if names.is_empty() || names.iter().any(|n| n.is_empty()) {
        return Err(ValidationError::new("empty_event_type"));
    }
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort();
    sorted.dedup();
    if sorted.len() != names.len() {
        return Err(ValidationError::new("duplicate_event_type"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_names() {
        assert!(validate_map_name("events").is_ok());
        assert!(validate_map_name("events_ringbuf").is_ok());
        assert!(validate_map_name("").is_err());
        assert!(validate_map_name("bad-name").is_err());
        assert!(validate_map_name("a_very_long_map_name").is_err());
    }

    #[test]
    fn powers_of_two() {
        assert!(validate_power_of_two(1).is_ok());
        assert!(validate_power_of_two(4096).is_ok());
        assert!(validate_power_of_two(0).is_err());
        assert!(validate_power_of_two(3 * 4096).is_err());
    }

    #[test]
    fn event_types() {
        assert!(validate_event_types(&["exec".into(), "open".into()]).is_ok());
        assert!(validate_event_types(&["exec".into(), "exec".into()]).is_err());
        assert!(validate_event_types(&[]).is_err());
    }
}
