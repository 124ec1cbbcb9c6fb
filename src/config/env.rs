//! Environment variable parsing utilities

use std::env;
use std::str::FromStr;

use crate::config::ConfigError;

/// Utility for parsing environment variables with optional prefix
#[derive(Debug, Clone, Default)]
pub struct EnvParser {
    prefix: Option<String>,
}

impl EnvParser {
    /// Create a new environment parser without prefix
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Create a new environment parser with prefix
    pub fn with_prefix(prefix: &str) -> Self {
        let prefix = if prefix.is_empty() {
            None
        } else {
            let mut p = prefix.to_uppercase();
            if !p.ends_with('_') {
                p.push('_');
            }
            Some(p)
        };

        Self { prefix }
    }

    /// Get the environment variable key with prefix applied
    pub fn key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Get a string value from environment. Empty values count as unset.
    pub fn get_string(&self, key: &str) -> Option<String> {
        env::var(self.key(key)).ok().filter(|v| !v.trim().is_empty())
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// Get a required string value from environment
    pub fn get_required_string(&self, key: &str) -> Result<String, ConfigError> {
        self.get_string(key)
            .ok_or_else(|| ConfigError::MissingRequired(self.key(key)))
    }

    /// Get a boolean value from environment
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.get_string(key) {
            Some(value) => {
                let parsed = match value.trim().to_lowercase().as_str() {
                    "true" | "yes" | "1" | "on" => true,
                    "false" | "no" | "0" | "off" => false,
                    _ => {
                        return Err(ConfigError::ParseError {
                            field: self.key(key),
                            message: format!("Invalid boolean value: '{}'", value),
                        })
                    }
                };
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, ConfigError> {
        self.parse_numeric(key)
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.parse_numeric(key)
    }

    fn parse_numeric<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_string(key) {
            Some(value) => {
                let parsed = value.trim().parse::<T>().map_err(|e| ConfigError::ParseError {
                    field: self.key(key),
                    message: format!("Invalid numeric value '{}': {}", value, e),
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Get a URL from environment
    pub fn get_url(&self, key: &str) -> Result<Option<url::Url>, ConfigError> {
        match self.get_string(key) {
            Some(value) => {
                let url = value.parse::<url::Url>().map_err(|e| ConfigError::ParseError {
                    field: self.key(key),
                    message: format!("Invalid URL '{}': {}", value, e),
                })?;
                Ok(Some(url))
            }
            None => Ok(None),
        }
    }

    /// Get a duration in seconds from environment
    pub fn get_duration_seconds(
        &self,
        key: &str,
    ) -> Result<Option<std::time::Duration>, ConfigError> {
        Ok(self.get_u64(key)?.map(std::time::Duration::from_secs))
    }
}
