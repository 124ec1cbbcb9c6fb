//! Ordering of upstream version strings.
//!
//! Upstream versions are "semantic-ish": dotted numbers, sometimes with a
//! suffix glued to a component (`1.2.3-beta`, `0.9rc1`). Only the leading
//! digits of each component take part in ordering.

use std::fmt;

/// Comparable key derived from a version string.
///
/// Keys compare component-wise as integers. When one key is a prefix of the
/// other, the shorter key is smaller, so `[1, 2] < [1, 2, 0]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionKey(Vec<u64>);

impl VersionKey {
    /// The key of any version that cannot be parsed.
    pub fn lowest() -> Self {
        VersionKey(vec![0])
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl From<Vec<u64>> for VersionKey {
    fn from(components: Vec<u64>) -> Self {
        VersionKey(components)
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", component)?;
        }
        Ok(())
    }
}

/// Parse a version string into its ordering key.
///
/// Every `.`-separated segment must start with an ASCII digit; otherwise the
/// whole string maps to [`VersionKey::lowest`]. Digit runs too large for a
/// `u64` saturate.
pub fn parse_version(version: &str) -> VersionKey {
    if version.is_empty() {
        return VersionKey::lowest();
    }

    let mut components = Vec::new();
    for segment in version.split('.') {
        let digits: &str = {
            let end = segment
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(segment.len());
            &segment[..end]
        };
        if digits.is_empty() {
            return VersionKey::lowest();
        }
        components.push(digits.parse::<u64>().unwrap_or(u64::MAX));
    }

    VersionKey(components)
}
