//! Runtime configuration with environment overrides.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
}

const ENV_MAX_TASKS: &str = "LENSWORK_MAX_TASKS";
const ENV_TASK_TTL_SECS: &str = "LENSWORK_TASK_TTL_SECS";
const ENV_SWEEP_INTERVAL_SECS: &str = "LENSWORK_SWEEP_INTERVAL_SECS";

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Soft cap on concurrent non-terminal tasks
    pub max_concurrent_tasks: usize,
    /// Time a terminal task remains queryable
    pub task_ttl_secs: u64,
    /// Cadence of the background cleanup sweeper
    pub sweep_interval_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 20,
            task_ttl_secs: 3_600,
            sweep_interval_secs: 300,
        }
    }
}

impl RuntimeConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = read_env(ENV_MAX_TASKS)? {
            config.max_concurrent_tasks = value as usize;
        }
        if let Some(value) = read_env(ENV_TASK_TTL_SECS)? {
            config.task_ttl_secs = value;
        }
        if let Some(value) = read_env(ENV_SWEEP_INTERVAL_SECS)? {
            config.sweep_interval_secs = value;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_tasks must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env(key: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{} must be a number, got '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_tasks, 20);
        assert_eq!(config.task_ttl_secs, 3_600);
        assert_eq!(config.sweep_interval_secs, 300);
    }

    #[test]
    fn test_zero_caps_are_rejected() {
        let config = RuntimeConfig {
            max_concurrent_tasks: 0,
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
