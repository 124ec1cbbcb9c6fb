//! `Packages` index generation.

use crate::hash::{Digests, HashAlgorithm};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A binary package entry in a Packages file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package name.
    pub package: String,
    /// Package version.
    pub version: String,
    /// Architecture.
    pub architecture: String,
    /// Maintainer.
    pub maintainer: String,
    /// Package dependencies.
    pub depends: Option<String>,
    /// Package section.
    pub section: String,
    /// Package priority.
    pub priority: String,
    /// Package homepage.
    pub homepage: String,
    /// Package description. Lines after the first are the extended description.
    pub description: String,
    /// Filename (relative to repository root).
    pub filename: String,
    /// File size in bytes.
    pub size: u64,
    /// Digests of the file.
    pub digests: Digests,
}

impl Package {
    /// Convert the package to a control file paragraph.
    ///
    /// Field order is fixed: APT clients in the wild parse this file with
    /// line-oriented tooling as well as proper deb822 parsers.
    pub fn to_paragraph(&self) -> String {
        let mut paragraph = String::new();

        paragraph.push_str(&format!("Package: {}\n", self.package));
        paragraph.push_str(&format!("Version: {}\n", self.version));
        paragraph.push_str(&format!("Architecture: {}\n", self.architecture));
        paragraph.push_str(&format!("Maintainer: {}\n", self.maintainer));
        if let Some(ref depends) = self.depends {
            paragraph.push_str(&format!("Depends: {}\n", depends));
        }
        paragraph.push_str(&format!("Section: {}\n", self.section));
        paragraph.push_str(&format!("Priority: {}\n", self.priority));
        paragraph.push_str(&format!("Homepage: {}\n", self.homepage));

        let mut description = self.description.lines();
        paragraph.push_str(&format!(
            "Description: {}\n",
            description.next().unwrap_or_default()
        ));
        for line in description {
            if line.trim().is_empty() {
                paragraph.push_str(" .\n");
            } else {
                paragraph.push_str(&format!(" {}\n", line));
            }
        }

        paragraph.push_str(&format!("Filename: {}\n", self.filename));
        paragraph.push_str(&format!("Size: {}\n", self.size));
        for algorithm in HashAlgorithm::all() {
            paragraph.push_str(&format!(
                "{}: {}\n",
                algorithm.control_field(),
                self.digests.get(*algorithm)
            ));
        }

        paragraph
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_paragraph())
    }
}

/// A collection of packages that can be written to a Packages file.
///
/// Stanzas are separated by a single blank line and the file ends with a
/// newline.
#[derive(Debug, Clone, Default)]
pub struct PackageFile {
    packages: Vec<Package>,
}

impl PackageFile {
    /// Create a new empty package file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package to the file.
    pub fn add_package(&mut self, package: Package) {
        self.packages.push(package);
    }

    /// Get all packages.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Get the number of packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Check if the package file is empty.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl fmt::Display for PackageFile {
    /// Paragraphs separated by blank lines. A file without packages is a
    /// single newline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.packages.is_empty() {
            return f.write_str("\n");
        }
        for (i, package) in self.packages.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(&package.to_paragraph())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_data;

    fn package(name: &str, version: &str) -> Package {
        Package {
            package: name.to_string(),
            version: version.to_string(),
            architecture: "amd64".to_string(),
            maintainer: "Kiro Team <support@kiro.dev>".to_string(),
            depends: None,
            section: "editors".to_string(),
            priority: "optional".to_string(),
            homepage: "https://kiro.dev".to_string(),
            description: "Kiro IDE".to_string(),
            filename: format!("pool/main/k/{0}/{0}_{1}_amd64.deb", name, version),
            size: 1024,
            digests: hash_data(version.as_bytes()).1,
        }
    }

    #[test]
    fn test_paragraph_field_order() {
        let mut pkg = package("kiro", "1.2.3");
        pkg.depends = Some("libc6 (>= 2.31)".to_string());

        let fields: Vec<&str> = pkg
            .to_paragraph()
            .lines()
            .filter_map(|l| l.split_once(':').map(|(k, _)| k))
            .collect();

        assert_eq!(
            fields,
            vec![
                "Package",
                "Version",
                "Architecture",
                "Maintainer",
                "Depends",
                "Section",
                "Priority",
                "Homepage",
                "Description",
                "Filename",
                "Size",
                "MD5sum",
                "SHA1",
                "SHA256",
            ]
        );
    }

    #[test]
    fn test_depends_omitted_when_absent() {
        let paragraph = package("kiro", "1.0.0").to_paragraph();
        assert!(!paragraph.contains("Depends:"));
        assert!(paragraph.ends_with('\n'));
    }

    #[test]
    fn test_empty_description_keeps_field() {
        let mut pkg = package("kiro", "1.0.0");
        pkg.description = String::new();
        assert!(pkg.to_paragraph().contains("\nDescription: \nFilename: "));
    }

    #[test]
    fn test_extended_description() {
        let mut pkg = package("kiro-repo", "1.0");
        pkg.description = "Repository config\n\nInstalls the source list".to_string();

        let paragraph = pkg.to_paragraph();
        assert!(paragraph
            .contains("Description: Repository config\n .\n Installs the source list\n"));
    }

    #[test]
    fn test_empty_package_file_is_a_newline() {
        let package_file = PackageFile::new();
        assert!(package_file.is_empty());
        assert_eq!(package_file.to_string(), "\n");
    }

    #[test]
    fn test_package_file_separators() {
        let mut package_file = PackageFile::new();

        package_file.add_package(package("kiro", "1.0.0"));
        package_file.add_package(package("kiro", "1.1.0"));
        assert_eq!(package_file.len(), 2);

        let content = package_file.to_string();
        assert_eq!(content.matches("\n\nPackage: ").count(), 1);
        assert!(content.ends_with("\n"));
        assert!(!content.ends_with("\n\n"));
        assert!(content.starts_with("Package: kiro\nVersion: 1.0.0\n"));
    }
}
