//! Repository index generation.
//!
//! Turns the full set of package records into the `Packages`, `Release` and
//! source list texts of a [`RepositoryBundle`]. Apart from laying out the
//! directory skeleton, building is a pure function of its inputs: the same
//! records and local files always give byte-identical `Packages` content.

use apt_repository::hash::{hash_data, hash_file};
use apt_repository::{
    HashedFile, Package, PackageFile, Release, ReleaseBuilder, RepositoryLayout, SourceEntry,
    SourcesList,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{LocalFiles, PackageRecord, RepositoryBundle};
use crate::version::parse_version;

/// Size recorded for a package whose file metadata cannot be determined.
pub const FALLBACK_FILE_SIZE: u64 = 50_000_000;

/// Fixed identity fields of the `Release` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryIdentity {
    pub origin: String,
    pub label: String,
    pub version: String,
    pub description: String,
}

impl Default for RepositoryIdentity {
    fn default() -> Self {
        Self {
            origin: "Kiro".to_string(),
            label: "Kiro IDE Repository".to_string(),
            version: "1.0".to_string(),
            description: "Kiro IDE Debian Repository - Official packages for Kiro IDE\n\
                          This repository contains official Debian packages for Kiro IDE."
                .to_string(),
        }
    }
}

pub struct IndexBuilder {
    layout: RepositoryLayout,
    identity: RepositoryIdentity,
    base_path: PathBuf,
    bucket_name: String,
}

impl IndexBuilder {
    pub fn new(base_path: impl Into<PathBuf>, bucket_name: impl Into<String>) -> Self {
        Self {
            layout: RepositoryLayout::default(),
            identity: RepositoryIdentity::default(),
            base_path: base_path.into(),
            bucket_name: bucket_name.into(),
        }
    }

    pub fn with_identity(mut self, identity: RepositoryIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn layout(&self) -> &RepositoryLayout {
        &self.layout
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Public URL clients point APT at.
    pub fn repository_url(&self) -> String {
        format!("https://{}/", self.bucket_name)
    }

    /// Build the bundle for `records`, dated now.
    ///
    /// `local_files` holds the artifacts downloaded in this run; only those
    /// end up in [`RepositoryBundle::artifacts`].
    pub fn build(
        &self,
        records: &[PackageRecord],
        local_files: &[LocalFiles],
    ) -> Result<RepositoryBundle> {
        self.build_at(records, local_files, Utc::now())
    }

    pub fn build_at(
        &self,
        records: &[PackageRecord],
        local_files: &[LocalFiles],
        now: DateTime<Utc>,
    ) -> Result<RepositoryBundle> {
        let records = ordered(records);
        info!(count = records.len(), "Building repository index");

        let created = self
            .layout
            .create_skeleton(&self.base_path, records.iter().map(|r| r.package_name.as_str()))?;
        debug!(directories = created.len(), "Repository skeleton in place");

        let packages = self.packages_file(&records, local_files)?.to_string();
        let release = self.release(&packages, now)?.to_string();
        let sources_list = self.sources_list().to_string();

        let artifacts: Vec<LocalFiles> = local_files
            .iter()
            .filter(|files| {
                let known = records.iter().any(|r| {
                    r.package_name == files.package_name && r.version == files.version
                });
                if !known {
                    warn!(package_id = %files.package_id(), "Downloaded files match no record, not publishing them");
                }
                known
            })
            .cloned()
            .collect();

        Ok(RepositoryBundle {
            packages,
            release,
            sources_list,
            artifacts,
            base_path: self.base_path.clone(),
        })
    }

    /// One stanza per record, in the order given.
    pub fn packages_file(
        &self,
        records: &[PackageRecord],
        local_files: &[LocalFiles],
    ) -> Result<PackageFile> {
        let mut file = PackageFile::new();
        for record in records {
            file.add_package(self.package_entry(record, local_files)?);
        }
        Ok(file)
    }

    /// Control stanza for one record.
    ///
    /// File metadata comes from the record itself when it was stored by an
    /// earlier run, then from a file downloaded in this run, and failing
    /// both from a synthesized placeholder.
    pub fn package_entry(
        &self,
        record: &PackageRecord,
        local_files: &[LocalFiles],
    ) -> Result<Package> {
        let local = local_files
            .iter()
            .find(|f| f.package_name == record.package_name && f.version == record.version);

        let stored = if record.has_file_metadata() {
            record
                .digests()
                .map(|digests| (record.actual_filename.clone(), record.file_size, digests))
        } else {
            None
        };

        let (filename, size, digests) = match (stored, local) {
            (Some(stored), _) => stored,
            (None, Some(local)) => {
                let (size, digests) = hash_file(&local.deb_path)?;
                let filename = local
                    .deb_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| record.default_filename());
                (filename, size, digests)
            }
            (None, None) => {
                warn!(
                    package_id = %record.package_id(),
                    "No file metadata available, using fallback"
                );
                let (_, digests) =
                    hash_data(format!("{}{}", record.package_name, record.version).as_bytes());
                (record.default_filename(), FALLBACK_FILE_SIZE, digests)
            }
        };

        Ok(Package {
            package: record.package_name.clone(),
            version: record.version.clone(),
            architecture: record.architecture.clone(),
            maintainer: record.maintainer.clone(),
            depends: record.depends.clone().filter(|d| !d.is_empty()),
            section: record.section.clone(),
            priority: record.priority.clone(),
            homepage: record.homepage.clone(),
            description: record.description.clone(),
            filename: self.layout.pool_path(&record.package_name, &filename)?,
            size,
            digests,
        })
    }

    /// The unsigned `Release` file covering `packages`.
    pub fn release(&self, packages: &str, now: DateTime<Utc>) -> Result<Release> {
        let release = ReleaseBuilder::new()
            .origin(&self.identity.origin)
            .label(&self.identity.label)
            .suite(self.layout.suite())
            .codename(self.layout.suite())
            .version(&self.identity.version)
            .architectures(vec![self.layout.architecture().to_string()])
            .components(vec![self.layout.component().to_string()])
            .description(&self.identity.description)
            .date(now)
            .add_file(HashedFile::from_data(
                self.layout.packages_release_entry(),
                packages.as_bytes(),
            ))
            .build()?;
        Ok(release)
    }

    pub fn sources_list(&self) -> SourcesList {
        SourcesList::new()
            .comment("Kiro IDE Debian Repository")
            .comment(
                "This repository is not GPG-signed. The [trusted=yes] option bypasses signature verification.",
            )
            .comment(format!(
                "The [arch={0}] option restricts this repository to {0} architecture only.",
                self.layout.architecture()
            ))
            .entry(
                SourceEntry::new(
                    self.repository_url(),
                    self.layout.suite().to_string(),
                    vec![self.layout.component().to_string()],
                )
                .with_architecture(self.layout.architecture())
                .trusted(true),
            )
    }
}

/// Records sorted by name then version, one per `package_id`.
fn ordered(records: &[PackageRecord]) -> Vec<PackageRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| {
        a.package_name
            .cmp(&b.package_name)
            .then_with(|| parse_version(&a.version).cmp(&parse_version(&b.version)))
            .then_with(|| a.version.cmp(&b.version))
    });
    let mut seen = BTreeSet::new();
    sorted.retain(|r| seen.insert(r.package_id()));
    sorted
}
