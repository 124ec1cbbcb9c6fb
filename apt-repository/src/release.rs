//! Release file generation for flat, unsigned APT repositories.

use crate::{AptRepositoryError, HashAlgorithm, HashedFile, Result};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date format used for `Date` and `Valid-Until`.
pub const RELEASE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// A Release file for an APT repository.
///
/// The rendered file carries no signature block; clients consume it with
/// `trusted=yes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Origin of the repository.
    pub origin: String,
    /// Label for the repository.
    pub label: String,
    /// Suite name.
    pub suite: String,
    /// Codename.
    pub codename: String,
    /// Version.
    pub version: String,
    /// Supported architectures.
    pub architectures: Vec<String>,
    /// Repository components.
    pub components: Vec<String>,
    /// Description. Lines after the first are rendered as continuation lines.
    pub description: String,
    /// Date of the release.
    pub date: DateTime<Utc>,
    /// Valid until date.
    pub valid_until: DateTime<Utc>,
    /// Index files covered by this release, with their digests.
    pub files: Vec<HashedFile>,
}

impl Release {
    /// Add a file to the release.
    pub fn add_file(&mut self, file: HashedFile) {
        self.files.push(file);
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Origin: {}", self.origin)?;
        writeln!(f, "Label: {}", self.label)?;
        writeln!(f, "Suite: {}", self.suite)?;
        writeln!(f, "Codename: {}", self.codename)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Architectures: {}", self.architectures.join(" "))?;
        writeln!(f, "Components: {}", self.components.join(" "))?;

        let mut description = self.description.lines();
        writeln!(f, "Description: {}", description.next().unwrap_or_default())?;
        for line in description {
            writeln!(f, " {}", line)?;
        }

        writeln!(f, "Date: {}", self.date.format(RELEASE_DATE_FORMAT))?;
        writeln!(
            f,
            "Valid-Until: {}",
            self.valid_until.format(RELEASE_DATE_FORMAT)
        )?;

        for algorithm in HashAlgorithm::all() {
            writeln!(f, "{}:", algorithm.as_str())?;
            for file in &self.files {
                writeln!(
                    f,
                    " {} {} {}",
                    file.digests.get(*algorithm),
                    file.size,
                    file.path
                )?;
            }
        }

        Ok(())
    }
}

/// Builder for creating Release files.
#[derive(Debug, Clone, Default)]
pub struct ReleaseBuilder {
    origin: Option<String>,
    label: Option<String>,
    suite: Option<String>,
    codename: Option<String>,
    version: Option<String>,
    architectures: Vec<String>,
    components: Vec<String>,
    description: Option<String>,
    date: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    files: Vec<HashedFile>,
}

impl ReleaseBuilder {
    /// Create a new Release builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the origin.
    pub fn origin<S: Into<String>>(mut self, origin: S) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Set the label.
    pub fn label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the suite.
    pub fn suite<S: Into<String>>(mut self, suite: S) -> Self {
        self.suite = Some(suite.into());
        self
    }

    /// Set the codename. Defaults to the suite.
    pub fn codename<S: Into<String>>(mut self, codename: S) -> Self {
        self.codename = Some(codename.into());
        self
    }

    /// Set the version.
    pub fn version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the architectures.
    pub fn architectures(mut self, architectures: Vec<String>) -> Self {
        self.architectures = architectures;
        self
    }

    /// Set the components.
    pub fn components(mut self, components: Vec<String>) -> Self {
        self.components = components;
        self
    }

    /// Set the description.
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the date. Defaults to now.
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the valid until date. Defaults to one year after `date`.
    pub fn valid_until(mut self, valid_until: DateTime<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    /// Add a file.
    pub fn add_file(mut self, file: HashedFile) -> Self {
        self.files.push(file);
        self
    }

    /// Build the Release.
    pub fn build(self) -> Result<Release> {
        let suite = self
            .suite
            .ok_or_else(|| AptRepositoryError::missing_field("Suite"))?;
        if self.architectures.is_empty() {
            return Err(AptRepositoryError::invalid_config(
                "at least one architecture is required",
            ));
        }
        if self.components.is_empty() {
            return Err(AptRepositoryError::invalid_config(
                "at least one component is required",
            ));
        }

        let date = self.date.unwrap_or_else(Utc::now);
        // Months arithmetic clamps Feb 29 to Feb 28 in non-leap years.
        let valid_until = self.valid_until.unwrap_or_else(|| {
            date.checked_add_months(Months::new(12))
                .unwrap_or_else(|| date + Duration::days(365))
        });

        Ok(Release {
            origin: self
                .origin
                .ok_or_else(|| AptRepositoryError::missing_field("Origin"))?,
            label: self
                .label
                .ok_or_else(|| AptRepositoryError::missing_field("Label"))?,
            codename: self.codename.unwrap_or_else(|| suite.clone()),
            suite,
            version: self.version.unwrap_or_else(|| "1.0".to_string()),
            architectures: self.architectures,
            components: self.components,
            description: self.description.unwrap_or_default(),
            date,
            valid_until,
            files: self.files,
        })
    }
}
