// src/config.rs

//! Loader configuration.
//!
//! Hosts that wire the loader from a config file deserialize a
//! [`LoaderConfig`] section, e.g.:
//!
//! ```toml
//! max_threads = 8
//! log_failures = true
//! ```
//!
//! All fields are optional and have reasonable defaults.

use std::path::Path;

use serde::Deserialize;

use crate::errors::ConfigError;

/// Configuration for an [`crate::AsyncLoader`].
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderConfig {
    /// Upper bound on concurrently executing jobs. Defaults to the number
    /// of available CPUs.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// When set, each job failure is logged with the job name and the
    /// error message. Defaults to `false`.
    #[serde(default)]
    pub log_failures: bool,
}

fn default_max_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_threads: default_max_threads(),
            log_failures: false,
        }
    }
}

impl LoaderConfig {
    /// Parse a configuration from a TOML string and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: LoaderConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Run semantic validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::Invalid(
                "max_threads must be >= 1 (got 0)".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = LoaderConfig::default();
        assert!(cfg.max_threads >= 1);
        assert!(!cfg.log_failures);
    }

    #[test]
    fn parses_full_config() {
        let cfg = LoaderConfig::from_toml_str("max_threads = 4\nlog_failures = true\n").unwrap();
        assert_eq!(cfg.max_threads, 4);
        assert!(cfg.log_failures);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = LoaderConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.max_threads, LoaderConfig::default().max_threads);
    }

    #[test]
    fn zero_threads_rejected() {
        let err = LoaderConfig::from_toml_str("max_threads = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
