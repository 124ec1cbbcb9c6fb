//! On-disk and published layout of a single-suite repository.
//!
//! ```text
//! dists/<suite>/Release
//! dists/<suite>/<component>/binary-<arch>/Packages
//! pool/<component>/<first letter>/<package>/<file>.deb
//! ```

use crate::{AptRepositoryError, Result};
use std::fs;
use std::path::{Path, PathBuf};

fn check_name(field: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains('/') {
        return Err(AptRepositoryError::invalid_field(field, value));
    }
    Ok(())
}

/// Check `package_name` can name a pool directory.
pub fn validate_package_name(package_name: &str) -> Result<()> {
    check_name("package_name", package_name)
}

/// Paths of a repository serving one suite, component and architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLayout {
    suite: String,
    component: String,
    architecture: String,
}

impl Default for RepositoryLayout {
    fn default() -> Self {
        Self {
            suite: "stable".to_string(),
            component: "main".to_string(),
            architecture: "amd64".to_string(),
        }
    }
}

impl RepositoryLayout {
    /// Create a layout, rejecting empty or nested names.
    pub fn new<S: Into<String>>(suite: S, component: S, architecture: S) -> Result<Self> {
        let layout = Self {
            suite: suite.into(),
            component: component.into(),
            architecture: architecture.into(),
        };
        check_name("suite", &layout.suite)?;
        check_name("component", &layout.component)?;
        check_name("architecture", &layout.architecture)?;
        Ok(layout)
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// `dists/<suite>`
    pub fn dists_dir(&self) -> String {
        format!("dists/{}", self.suite)
    }

    /// Directory holding the Packages index.
    pub fn binary_dir(&self) -> String {
        format!(
            "{}/{}/binary-{}",
            self.dists_dir(),
            self.component,
            self.architecture
        )
    }

    /// Published path of the Packages index.
    pub fn packages_path(&self) -> String {
        format!("{}/Packages", self.binary_dir())
    }

    /// Path of the Packages index as listed inside the Release file.
    pub fn packages_release_entry(&self) -> String {
        format!("{}/binary-{}/Packages", self.component, self.architecture)
    }

    /// Published path of the Release file.
    pub fn release_path(&self) -> String {
        format!("{}/Release", self.dists_dir())
    }

    /// Pool directory of a package: `pool/<component>/<first letter>/<name>`.
    pub fn pool_dir(&self, package_name: &str) -> Result<String> {
        validate_package_name(package_name)?;
        let initial = package_name
            .chars()
            .next()
            .ok_or_else(|| AptRepositoryError::invalid_field("package_name", ""))?;
        Ok(format!(
            "pool/{}/{}/{}",
            self.component, initial, package_name
        ))
    }

    /// Pool path of a file belonging to a package.
    pub fn pool_path(&self, package_name: &str, filename: &str) -> Result<String> {
        Ok(format!("{}/{}", self.pool_dir(package_name)?, filename))
    }

    /// Create the `dists` and `pool` directories under `base`.
    ///
    /// Safe to call repeatedly.
    pub fn create_skeleton<'a, I>(&self, base: &Path, package_names: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut created = vec![base.join(self.binary_dir())];
        for name in package_names {
            let dir = base.join(self.pool_dir(name)?);
            if !created.contains(&dir) {
                created.push(dir);
            }
        }

        for dir in &created {
            fs::create_dir_all(dir).map_err(|source| AptRepositoryError::DirectoryCreation {
                path: dir.display().to_string(),
                source,
            })?;
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_paths() {
        let layout = RepositoryLayout::default();
        assert_eq!(layout.packages_path(), "dists/stable/main/binary-amd64/Packages");
        assert_eq!(layout.release_path(), "dists/stable/Release");
        assert_eq!(layout.packages_release_entry(), "main/binary-amd64/Packages");
        assert_eq!(
            layout.pool_path("kiro", "kiro_1.2.3_amd64.deb").unwrap(),
            "pool/main/k/kiro/kiro_1.2.3_amd64.deb"
        );
        assert_eq!(layout.pool_dir("kiro-repo").unwrap(), "pool/main/k/kiro-repo");
    }

    #[test]
    fn test_invalid_names() {
        assert!(RepositoryLayout::new("stable", "", "amd64").is_err());
        assert!(RepositoryLayout::new("stable/updates", "main", "amd64").is_err());
        let layout = RepositoryLayout::default();
        assert!(layout.pool_dir("").is_err());
        assert!(layout.pool_dir("../etc").is_err());
        assert!(validate_package_name("kiro").is_ok());
        assert!(matches!(
            validate_package_name(""),
            Err(AptRepositoryError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_create_skeleton_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let layout = RepositoryLayout::default();

        let created = layout
            .create_skeleton(temp_dir.path(), ["kiro", "kiro-cli", "kiro"])
            .unwrap();
        assert_eq!(created.len(), 3);
        layout
            .create_skeleton(temp_dir.path(), ["kiro"])
            .unwrap();

        assert!(temp_dir.path().join("dists/stable/main/binary-amd64").is_dir());
        assert!(temp_dir.path().join("pool/main/k/kiro").is_dir());
        assert!(temp_dir.path().join("pool/main/k/kiro-cli").is_dir());
    }
}
