//! Package records and the files that accompany them during a run.

use apt_repository::Digests;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PACKAGE_NAME: &str = "kiro";
pub const DEFAULT_ARCHITECTURE: &str = "amd64";
pub const DEFAULT_SECTION: &str = "editors";
pub const DEFAULT_PRIORITY: &str = "optional";
pub const DEFAULT_MAINTAINER: &str = "Kiro Team <support@kiro.dev>";
pub const DEFAULT_HOMEPAGE: &str = "https://kiro.dev";

fn default_package_name() -> String {
    DEFAULT_PACKAGE_NAME.to_string()
}

fn default_architecture() -> String {
    DEFAULT_ARCHITECTURE.to_string()
}

fn default_section() -> String {
    DEFAULT_SECTION.to_string()
}

fn default_priority() -> String {
    DEFAULT_PRIORITY.to_string()
}

fn default_maintainer() -> String {
    DEFAULT_MAINTAINER.to_string()
}

fn default_homepage() -> String {
    DEFAULT_HOMEPAGE.to_string()
}

/// Control fields that describe a package type rather than a single release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDefaults {
    pub package_name: String,
    pub architecture: String,
    pub section: String,
    pub priority: String,
    pub maintainer: String,
    pub homepage: String,
    pub description: String,
    pub depends: Option<String>,
}

impl Default for ControlDefaults {
    fn default() -> Self {
        Self {
            package_name: default_package_name(),
            architecture: default_architecture(),
            section: default_section(),
            priority: default_priority(),
            maintainer: default_maintainer(),
            homepage: default_homepage(),
            description: "Kiro IDE - AI-powered development environment".to_string(),
            depends: None,
        }
    }
}

/// One version of one package type; the unit of persisted state.
///
/// Records written before multi-package support carry no `package_name`
/// and are read back as `kiro`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    #[serde(default = "default_package_name")]
    pub package_name: String,
    pub version: String,
    #[serde(default = "default_architecture")]
    pub architecture: String,
    #[serde(default)]
    pub pub_date: String,
    #[serde(default)]
    pub deb_url: String,
    #[serde(default)]
    pub actual_filename: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub md5_hash: String,
    #[serde(default)]
    pub sha1_hash: String,
    #[serde(default)]
    pub sha256_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<String>,
    #[serde(default = "default_section")]
    pub section: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_maintainer")]
    pub maintainer: String,
    #[serde(default = "default_homepage")]
    pub homepage: String,
    #[serde(default)]
    pub description: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp"
    )]
    pub processed_timestamp: Option<DateTime<Utc>>,
}

impl PackageRecord {
    /// A fresh, unprocessed record for a release of the package described by
    /// `defaults`.
    pub fn new(
        defaults: &ControlDefaults,
        version: impl Into<String>,
        pub_date: impl Into<String>,
        deb_url: impl Into<String>,
    ) -> Self {
        Self {
            package_name: defaults.package_name.clone(),
            version: version.into(),
            architecture: defaults.architecture.clone(),
            pub_date: pub_date.into(),
            deb_url: deb_url.into(),
            actual_filename: String::new(),
            file_size: 0,
            md5_hash: String::new(),
            sha1_hash: String::new(),
            sha256_hash: String::new(),
            certificate_url: None,
            signature_url: None,
            notes: None,
            depends: defaults.depends.clone(),
            section: defaults.section.clone(),
            priority: defaults.priority.clone(),
            maintainer: defaults.maintainer.clone(),
            homepage: defaults.homepage.clone(),
            description: defaults.description.clone(),
            processed_timestamp: None,
        }
    }

    /// Composite key under which the record is stored.
    pub fn package_id(&self) -> String {
        package_id(&self.package_name, &self.version)
    }

    /// Whether the file metadata of a previous run is attached.
    pub fn has_file_metadata(&self) -> bool {
        !self.actual_filename.is_empty() && self.file_size > 0 && !self.md5_hash.is_empty()
    }

    /// Attach the filename, size and digests of the downloaded package.
    pub fn attach_file_metadata(&mut self, filename: impl Into<String>, size: u64, digests: Digests) {
        self.actual_filename = filename.into();
        self.file_size = size;
        self.md5_hash = digests.md5;
        self.sha1_hash = digests.sha1;
        self.sha256_hash = digests.sha256;
    }

    /// Stored digests, if all three are present.
    pub fn digests(&self) -> Option<Digests> {
        if self.md5_hash.is_empty() || self.sha1_hash.is_empty() || self.sha256_hash.is_empty() {
            return None;
        }
        Some(Digests {
            md5: self.md5_hash.clone(),
            sha1: self.sha1_hash.clone(),
            sha256: self.sha256_hash.clone(),
        })
    }

    /// Conventional `.deb` filename for this record.
    pub fn default_filename(&self) -> String {
        format!(
            "{}_{}_{}.deb",
            self.package_name, self.version, self.architecture
        )
    }
}

/// `package_name#version`
pub fn package_id(package_name: &str, version: &str) -> String {
    format!("{}#{}", package_name, version)
}

/// Files downloaded for one release during the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFiles {
    pub package_name: String,
    pub version: String,
    pub deb_path: PathBuf,
    pub certificate_path: Option<PathBuf>,
    pub signature_path: Option<PathBuf>,
}

impl LocalFiles {
    /// All files, package first.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.deb_path.as_path())
            .chain(self.certificate_path.as_deref())
            .chain(self.signature_path.as_deref())
    }

    pub fn package_id(&self) -> String {
        package_id(&self.package_name, &self.version)
    }
}

/// Everything produced by an index rebuild, ready to be published once.
#[derive(Debug, Clone)]
pub struct RepositoryBundle {
    /// Contents of `dists/<suite>/<component>/binary-<arch>/Packages`.
    pub packages: String,
    /// Contents of `dists/<suite>/Release`.
    pub release: String,
    /// One-line source list for clients.
    pub sources_list: String,
    /// Artifacts downloaded in this run, keyed to their pool directory.
    pub artifacts: Vec<LocalFiles>,
    /// Directory the skeleton was laid out in.
    pub base_path: PathBuf,
}

/// Serde support for timestamps written either as RFC 3339 or as naive
/// ISO 8601 in UTC (`2024-01-01T12:00:00.123456`).
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(ts.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(serde::de::Error::custom)
    }
}
