//! Environment configuration helpers
//!
//! Reads typed values from process environment variables. Crates build their
//! own config structs on top of [`Env`]; tests feed fixed pairs instead of
//! mutating the real environment.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::crypto;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is required")]
    Missing { key: String },

    #[error("{key} has an invalid value: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Source of configuration values
#[derive(Debug, Clone, Default)]
pub struct Env {
    overrides: Option<HashMap<String, String>>,
}

impl Env {
    /// Read from the process environment
    pub fn system() -> Self {
        Self { overrides: None }
    }

    /// Read only from the given pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            overrides: Some(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Raw value; blank values count as unset
    pub fn string(&self, key: &str) -> Option<String> {
        let value = match &self.overrides {
            Some(map) => map.get(key).cloned(),
            None => std::env::var(key).ok(),
        }?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    pub fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.string(key).ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
    }

    /// Parsed value, `None` when unset
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| raw.parse::<T>().map_err(|e| ConfigError::invalid(key, e.to_string())))
            .transpose()
    }

    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    /// Whole seconds; zero is rejected
    pub fn duration_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.parse::<u64>(key)? {
            None => Ok(default),
            Some(0) => Err(ConfigError::invalid(key, "must be greater than zero")),
            Some(secs) => Ok(Duration::from_secs(secs)),
        }
    }

    /// Milliseconds; zero is rejected
    pub fn duration_ms(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.parse::<u64>(key)? {
            None => Ok(default),
            Some(0) => Err(ConfigError::invalid(key, "must be greater than zero")),
            Some(ms) => Ok(Duration::from_millis(ms)),
        }
    }

    /// Comma-separated list with blanks dropped
    pub fn list(&self, key: &str) -> Vec<String> {
        self.string(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Standard base64 value that must decode to exactly 32 bytes
    pub fn secret_32(&self, key: &str) -> Result<Option<[u8; 32]>, ConfigError> {
        let Some(raw) = self.string(key) else {
            return Ok(None);
        };
        let bytes =
            crypto::from_base64(&raw).map_err(|e| ConfigError::invalid(key, e.to_string()))?;
        let secret: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            ConfigError::invalid(key, format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Some(secret))
    }
}
