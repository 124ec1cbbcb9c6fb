//! One-line-style APT source list entries (`/etc/apt/sources.list.d/*.list`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `deb` line pointing clients at a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Base URI of the repository, with a trailing slash.
    pub uri: String,
    /// Suite to use.
    pub suite: String,
    /// Components to enable.
    pub components: Vec<String>,
    /// Restrict the entry to these architectures.
    pub architectures: Vec<String>,
    /// Skip signature verification (`trusted=yes`).
    pub trusted: bool,
}

impl SourceEntry {
    /// Create an entry for `uri`, normalising it to end in a slash.
    pub fn new<S: Into<String>>(uri: S, suite: S, components: Vec<String>) -> Self {
        let mut uri = uri.into();
        if !uri.ends_with('/') {
            uri.push('/');
        }
        Self {
            uri,
            suite: suite.into(),
            components,
            architectures: Vec::new(),
            trusted: false,
        }
    }

    /// Restrict the entry to an architecture.
    pub fn with_architecture<S: Into<String>>(mut self, architecture: S) -> Self {
        self.architectures.push(architecture.into());
        self
    }

    /// Mark the repository as trusted.
    pub fn trusted(mut self, trusted: bool) -> Self {
        self.trusted = trusted;
        self
    }

    fn options(&self) -> Vec<String> {
        let mut options = Vec::new();
        if self.trusted {
            options.push("trusted=yes".to_string());
        }
        if !self.architectures.is_empty() {
            options.push(format!("arch={}", self.architectures.join(",")));
        }
        options
    }
}

impl fmt::Display for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("deb ")?;
        let options = self.options();
        if !options.is_empty() {
            write!(f, "[{}] ", options.join(" "))?;
        }
        write!(f, "{} {}", self.uri, self.suite)?;
        for component in &self.components {
            write!(f, " {}", component)?;
        }
        Ok(())
    }
}

/// A source list file: leading comment lines followed by entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcesList {
    comments: Vec<String>,
    entries: Vec<SourceEntry>,
}

impl SourcesList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a comment line. The `# ` prefix is added when rendering.
    pub fn comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comments.push(comment.into());
        self
    }

    pub fn entry(mut self, entry: SourceEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }
}

impl fmt::Display for SourcesList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for comment in &self.comments {
            writeln!(f, "# {}", comment)?;
        }
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trusted_entry() {
        let entry = SourceEntry::new("https://repo.example.org", "stable", vec!["main".to_string()])
            .with_architecture("amd64")
            .trusted(true);

        assert_eq!(
            entry.to_string(),
            "deb [trusted=yes arch=amd64] https://repo.example.org/ stable main"
        );
    }

    #[test]
    fn test_plain_entry() {
        let entry = SourceEntry::new(
            "http://deb.example.org/debian/",
            "bookworm",
            vec!["main".to_string(), "contrib".to_string()],
        );
        assert_eq!(
            entry.to_string(),
            "deb http://deb.example.org/debian/ bookworm main contrib"
        );
    }

    #[test]
    fn test_sources_list_rendering() {
        let list = SourcesList::new()
            .comment("Kiro IDE Debian Repository")
            .entry(SourceEntry::new("https://b/", "stable", vec!["main".to_string()]));

        assert_eq!(
            list.to_string(),
            "# Kiro IDE Debian Repository\ndeb https://b/ stable main\n"
        );
        assert_eq!(list.entries().len(), 1);
    }
}
