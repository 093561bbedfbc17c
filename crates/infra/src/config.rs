//! Configuration loading and representation.

use std::env;
use std::str::FromStr;

use crate::cleaner::Cleaner;
use crate::failures::FailureList;
use crate::submit::JobSubmitter;

/// Window size used when nothing else is configured.
pub const DEFAULT_MAXIMUM: usize = 1000;

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_NAMESPACE: &str = "resque";
const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Settings shared by every cleaner built from it.
///
/// This is the one place the process-wide window default lives; cleaners take
/// a copy at construction and may override their own maximum afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanerConfig {
    /// Number of newest failures a cleaner looks at.
    pub maximum: usize,
    /// Emit human-readable summaries from the stats operations.
    pub verbose: bool,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            maximum: DEFAULT_MAXIMUM,
            verbose: false,
        }
    }
}

impl CleanerConfig {
    pub fn with_maximum(mut self, maximum: usize) -> Self {
        self.maximum = maximum;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Build a cleaner over `failures` that requeues through `submitter`.
    pub fn build<L, J>(&self, failures: L, submitter: J) -> Cleaner<L, J>
    where
        L: FailureList,
        J: JobSubmitter,
    {
        Cleaner::new(failures, submitter, self.clone())
    }
}

/// Process configuration for the dashboard binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    pub redis_url: String,
    pub namespace: String,
    pub bind: String,
    pub cleaner: CleanerConfig,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            bind: DEFAULT_BIND.to_string(),
            cleaner: CleanerConfig::default(),
        }
    }
}

impl SweeperConfig {
    /// Read `SWEEPER_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (unset keys keep their defaults).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("SWEEPER_REDIS_URL") {
            config.redis_url = url;
        }
        if let Some(namespace) = lookup("SWEEPER_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(bind) = lookup("SWEEPER_BIND") {
            config.bind = bind;
        }
        if let Some(raw) = lookup("SWEEPER_MAXIMUM") {
            config.cleaner.maximum = parse_value("SWEEPER_MAXIMUM", &raw)?;
        }
        if let Some(raw) = lookup("SWEEPER_VERBOSE") {
            config.cleaner.verbose = parse_flag("SWEEPER_VERBOSE", &raw)?;
        }

        Ok(config)
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = SweeperConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SweeperConfig::default());
        assert_eq!(config.cleaner.maximum, DEFAULT_MAXIMUM);
        assert!(!config.cleaner.verbose);
    }

    #[test]
    fn reads_overrides() {
        let config = SweeperConfig::from_lookup(lookup(&[
            ("SWEEPER_MAXIMUM", "250"),
            ("SWEEPER_VERBOSE", "yes"),
            ("SWEEPER_NAMESPACE", "app"),
        ]))
        .unwrap();
        assert_eq!(config.cleaner.maximum, 250);
        assert!(config.cleaner.verbose);
        assert_eq!(config.namespace, "app");
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = SweeperConfig::from_lookup(lookup(&[("SWEEPER_MAXIMUM", "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "SWEEPER_MAXIMUM",
                value: "lots".to_string()
            }
        );
        assert!(SweeperConfig::from_lookup(lookup(&[("SWEEPER_VERBOSE", "maybe")])).is_err());
    }
}
