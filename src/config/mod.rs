//! Runtime settings, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub mod env;

pub use env::EnvParser;

use crate::metadata::DEFAULT_METADATA_URL;

pub const DEFAULT_STATE_STORE_URL: &str = "redis://127.0.0.1/";
pub const DEFAULT_TABLE_NAME: &str = "kiro-debian-repo-versions";
pub const DEFAULT_DOWNLOAD_DIR: &str = "/tmp/kiro-downloads";
pub const DEFAULT_REPOSITORY_DIR: &str = "/tmp/debian-repo";
pub const DEFAULT_PACKAGE_CONFIG_DIR: &str = "config/packages";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Required configuration field '{0}' is missing")]
    MissingRequired(String),

    #[error("Failed to parse '{field}': {message}")]
    ParseError { field: String, message: String },

    #[error("Invalid value for '{field}': {message}")]
    Invalid { field: String, message: String },
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        crate::error::Error::Config(e.to_string())
    }
}

/// Where the repository is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishBackend {
    Gcs,
    Local,
}

impl FromStr for PublishBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcs" => Ok(PublishBackend::Gcs),
            "local" => Ok(PublishBackend::Local),
            other => Err(format!("unknown publish backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bucket_name: String,
    pub state_store_url: String,
    pub state_table_name: String,
    pub metadata_url: String,
    pub download_dir: PathBuf,
    pub repository_dir: PathBuf,
    pub publish_backend: PublishBackend,
    pub local_publish_dir: Option<PathBuf>,
    pub gcs_credentials_file: Option<PathBuf>,
    pub package_config_dir: PathBuf,
    pub success_webhook_url: Option<url::Url>,
    pub failure_webhook_url: Option<url::Url>,
    pub notify_channel: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub http_timeout: Duration,
    pub download_timeout: Duration,
    pub http_max_attempts: u32,
    pub publish_extras: bool,
    pub verify_uploads: bool,
    pub skip_permission_check: bool,
}

impl Settings {
    /// Settings for `bucket_name` with every other value defaulted.
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            state_store_url: DEFAULT_STATE_STORE_URL.to_string(),
            state_table_name: DEFAULT_TABLE_NAME.to_string(),
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            repository_dir: PathBuf::from(DEFAULT_REPOSITORY_DIR),
            publish_backend: PublishBackend::Gcs,
            local_publish_dir: None,
            gcs_credentials_file: None,
            package_config_dir: PathBuf::from(DEFAULT_PACKAGE_CONFIG_DIR),
            success_webhook_url: None,
            failure_webhook_url: None,
            notify_channel: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            http_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(300),
            http_max_attempts: 3,
            publish_extras: false,
            verify_uploads: false,
            skip_permission_check: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_parser(&EnvParser::new())
    }

    pub fn from_parser(env: &EnvParser) -> Result<Self, ConfigError> {
        let defaults = Self::new(env.get_required_string("BUCKET_NAME")?);

        let publish_backend = match env.get_string("PUBLISH_BACKEND") {
            Some(value) => value.parse().map_err(|message| ConfigError::ParseError {
                field: env.key("PUBLISH_BACKEND"),
                message,
            })?,
            None => defaults.publish_backend,
        };
        let log_format = match env.get_string("LOG_FORMAT") {
            Some(value) => value.parse().map_err(|message| ConfigError::ParseError {
                field: env.key("LOG_FORMAT"),
                message,
            })?,
            None => defaults.log_format,
        };

        let settings = Self {
            state_store_url: env.get_string_or("STATE_STORE_URL", DEFAULT_STATE_STORE_URL),
            state_table_name: env.get_string_or("STATE_TABLE_NAME", DEFAULT_TABLE_NAME),
            metadata_url: env.get_string_or("METADATA_URL", DEFAULT_METADATA_URL),
            download_dir: env
                .get_string("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            repository_dir: env
                .get_string("REPOSITORY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.repository_dir),
            publish_backend,
            local_publish_dir: env.get_string("LOCAL_PUBLISH_DIR").map(PathBuf::from),
            gcs_credentials_file: env.get_string("GCS_CREDENTIALS_FILE").map(PathBuf::from),
            package_config_dir: env
                .get_string("PACKAGE_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.package_config_dir),
            success_webhook_url: env.get_url("SUCCESS_WEBHOOK_URL")?,
            failure_webhook_url: env.get_url("FAILURE_WEBHOOK_URL")?,
            notify_channel: env.get_string("NOTIFY_CHANNEL"),
            log_level: env.get_string_or("LOG_LEVEL", &defaults.log_level),
            log_format,
            http_timeout: env
                .get_duration_seconds("HTTP_TIMEOUT_SECS")?
                .unwrap_or(defaults.http_timeout),
            download_timeout: env
                .get_duration_seconds("DOWNLOAD_TIMEOUT_SECS")?
                .unwrap_or(defaults.download_timeout),
            http_max_attempts: env
                .get_u32("HTTP_MAX_ATTEMPTS")?
                .unwrap_or(defaults.http_max_attempts),
            publish_extras: env.get_bool("PUBLISH_EXTRAS")?.unwrap_or(false),
            verify_uploads: env.get_bool("VERIFY_UPLOADS")?.unwrap_or(false),
            skip_permission_check: env.get_bool("SKIP_PERMISSION_CHECK")?.unwrap_or(false),
            ..defaults
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_name.trim().is_empty() || self.bucket_name.contains('/') {
            return Err(ConfigError::Invalid {
                field: "BUCKET_NAME".to_string(),
                message: format!("'{}' is not a bucket name", self.bucket_name),
            });
        }
        if self.http_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "HTTP_MAX_ATTEMPTS".to_string(),
                message: "at least one attempt is required".to_string(),
            });
        }
        if self.publish_backend == PublishBackend::Local && self.local_publish_dir.is_none() {
            return Err(ConfigError::MissingRequired("LOCAL_PUBLISH_DIR".to_string()));
        }
        if self.publish_backend == PublishBackend::Gcs && !cfg!(feature = "gcs") {
            return Err(ConfigError::Invalid {
                field: "PUBLISH_BACKEND".to_string(),
                message: "built without GCS support".to_string(),
            });
        }
        Ok(())
    }

    /// Public base URL of the repository.
    pub fn repository_url(&self) -> String {
        format!("https://{}/", self.bucket_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "BUCKET_NAME",
        "PUBLISH_BACKEND",
        "LOCAL_PUBLISH_DIR",
        "HTTP_MAX_ATTEMPTS",
        "PUBLISH_EXTRAS",
        "LOG_FORMAT",
        "SUCCESS_WEBHOOK_URL",
        "STATE_TABLE_NAME",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        env::set_var("BUCKET_NAME", "repo.example.com");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.bucket_name, "repo.example.com");
        assert_eq!(settings.state_table_name, "kiro-debian-repo-versions");
        assert_eq!(settings.metadata_url, DEFAULT_METADATA_URL);
        assert_eq!(settings.download_dir, PathBuf::from("/tmp/kiro-downloads"));
        assert_eq!(settings.http_max_attempts, 3);
        assert!(!settings.publish_extras);
        assert_eq!(settings.repository_url(), "https://repo.example.com/");
        clear();
    }

    #[test]
    #[serial]
    fn test_missing_bucket() {
        clear();
        assert!(matches!(
            Settings::from_env(),
            Err(ConfigError::MissingRequired(ref name)) if name == "BUCKET_NAME"
        ));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        env::set_var("BUCKET_NAME", "repo.example.com");
        env::set_var("PUBLISH_BACKEND", "local");
        env::set_var("LOCAL_PUBLISH_DIR", "/srv/repo");
        env::set_var("PUBLISH_EXTRAS", "yes");
        env::set_var("LOG_FORMAT", "json");
        env::set_var("STATE_TABLE_NAME", "staging-versions");
        env::set_var("SUCCESS_WEBHOOK_URL", "https://hooks.example.com/ok");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.publish_backend, PublishBackend::Local);
        assert_eq!(settings.local_publish_dir, Some(PathBuf::from("/srv/repo")));
        assert!(settings.publish_extras);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.state_table_name, "staging-versions");
        assert_eq!(
            settings.success_webhook_url.unwrap().as_str(),
            "https://hooks.example.com/ok"
        );
        clear();
    }

    #[test]
    #[serial]
    fn test_validation() {
        clear();
        env::set_var("BUCKET_NAME", "repo.example.com");
        env::set_var("HTTP_MAX_ATTEMPTS", "0");
        assert!(matches!(Settings::from_env(), Err(ConfigError::Invalid { .. })));

        env::remove_var("HTTP_MAX_ATTEMPTS");
        env::set_var("PUBLISH_BACKEND", "ftp");
        assert!(matches!(Settings::from_env(), Err(ConfigError::ParseError { .. })));

        env::set_var("PUBLISH_BACKEND", "local");
        assert!(matches!(
            Settings::from_env(),
            Err(ConfigError::MissingRequired(ref name)) if name == "LOCAL_PUBLISH_DIR"
        ));
        clear();
    }
}
