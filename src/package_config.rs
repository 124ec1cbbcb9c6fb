//! Declarative per-package configuration.
//!
//! Each package type lives in its own YAML file under the package config
//! directory (`config/packages/<name>.yaml`):
//!
//! ```yaml
//! package_name: kiro
//! description: Kiro IDE - AI-powered development environment
//! maintainer: Kiro Team <support@kiro.dev>
//! homepage: https://kiro.dev
//! section: editors
//! priority: optional
//! architecture: amd64
//! source:
//!   type: external_download
//!   metadata_endpoint: https://prod.download.desktop.kiro.dev/stable/metadata-linux-x64-deb-stable.json
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::ControlDefaults;

/// Where the packages of a type come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Vendor-hosted metadata describing downloadable `.deb` files.
    ExternalDownload { metadata_endpoint: String },
    /// Packages built locally and staged in the bucket.
    BuildScript { staging_prefix: Option<String> },
    /// Release assets of a GitHub repository.
    GithubRelease {
        repository: String,
        asset_pattern: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub package_name: String,
    pub description: String,
    pub maintainer: String,
    pub homepage: String,
    pub section: String,
    pub priority: String,
    pub architecture: String,
    #[serde(default)]
    pub depends: Option<String>,
    pub source: SourceConfig,
}

impl PackageConfig {
    /// Load a configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.package_name.is_empty() {
            return Err(Error::Config("package_name must not be empty".to_string()));
        }
        if !self
            .package_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+-.".contains(c))
        {
            return Err(Error::Config(format!(
                "invalid package name '{}'",
                self.package_name
            )));
        }
        if self.architecture.is_empty() {
            return Err(Error::Config(format!(
                "{}: architecture must not be empty",
                self.package_name
            )));
        }
        Ok(())
    }

    /// Control fields applied to every record of this package.
    pub fn control_defaults(&self) -> ControlDefaults {
        ControlDefaults {
            package_name: self.package_name.clone(),
            architecture: self.architecture.clone(),
            section: self.section.clone(),
            priority: self.priority.clone(),
            maintainer: self.maintainer.clone(),
            homepage: self.homepage.clone(),
            description: self.description.clone(),
            depends: self.depends.clone(),
        }
    }
}

/// Loads package configurations from a directory.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Every `*.yaml` file in the directory, keyed by package name.
    ///
    /// A missing directory yields no configurations.
    pub fn load_all(&self) -> Result<BTreeMap<String, PackageConfig>> {
        let mut configs = BTreeMap::new();
        if !self.config_dir.is_dir() {
            debug!(dir = %self.config_dir.display(), "Package config directory not found");
            return Ok(configs);
        }

        for entry in std::fs::read_dir(&self.config_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let config = PackageConfig::from_file(&path)?;
            if let Some(previous) = configs.insert(config.package_name.clone(), config) {
                return Err(Error::Config(format!(
                    "package '{}' is configured more than once",
                    previous.package_name
                )));
            }
        }

        info!(count = configs.len(), "Loaded package configurations");
        Ok(configs)
    }

    /// The configuration of one package, read from `<name>.yaml`.
    pub fn get(&self, package_name: &str) -> Result<PackageConfig> {
        let path = self.path_for(package_name);
        if !path.is_file() {
            return Err(Error::Config(format!(
                "no configuration for package '{}' at {}",
                package_name,
                path.display()
            )));
        }
        PackageConfig::from_file(&path)
    }

    /// Control defaults for `package_name`, falling back to the built-in
    /// kiro defaults when the package has no configuration.
    pub fn control_defaults(&self, package_name: &str) -> Result<ControlDefaults> {
        let path = self.path_for(package_name);
        if !path.is_file() {
            return Ok(ControlDefaults {
                package_name: package_name.to_string(),
                ..ControlDefaults::default()
            });
        }
        Ok(PackageConfig::from_file(&path)?.control_defaults())
    }

    fn path_for(&self, package_name: &str) -> PathBuf {
        self.config_dir.join(format!("{}.yaml", package_name))
    }
}
