//! Digest computation for repository files.
//!
//! Every file referenced from `Packages` or `Release` is described by the same
//! three digests, so they are always computed together in one pass.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Digest algorithms published in the repository metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// MD5 hash algorithm.
    Md5,
    /// SHA-1 hash algorithm.
    Sha1,
    /// SHA-256 hash algorithm.
    Sha256,
}

impl HashAlgorithm {
    /// Block header used in Release files.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5Sum",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
        }
    }

    /// Field name used in Packages stanzas.
    pub fn control_field(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5sum",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
        }
    }

    /// Length of the lowercase hex rendering of a digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
        }
    }

    /// All algorithms, in the order they appear in Release files.
    pub fn all() -> &'static [HashAlgorithm] {
        &[HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256]
    }

    /// Whether `value` looks like a digest produced by this algorithm.
    pub fn is_valid_digest(&self, value: &str) -> bool {
        value.len() == self.hex_len()
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The digests of a single blob of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digests {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

impl Digests {
    /// Get a digest by algorithm.
    pub fn get(&self, algorithm: HashAlgorithm) -> &str {
        match algorithm {
            HashAlgorithm::Md5 => &self.md5,
            HashAlgorithm::Sha1 => &self.sha1,
            HashAlgorithm::Sha256 => &self.sha256,
        }
    }
}

/// A file with its size and digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedFile {
    /// The path of the file, relative to the directory the index lives in.
    pub path: String,
    /// The size of the file in bytes.
    pub size: u64,
    /// The digests of the file.
    pub digests: Digests,
}

impl HashedFile {
    /// Describe in-memory content that will be published at `path`.
    pub fn from_data<S: Into<String>>(path: S, data: &[u8]) -> Self {
        let (size, digests) = hash_data(data);
        Self {
            path: path.into(),
            size,
            digests,
        }
    }
}

/// Computes MD5, SHA1 and SHA256 over a stream in a single pass.
pub struct MultiHasher {
    md5: md5::Context,
    sha1: sha1::Sha1,
    sha256: sha2::Sha256,
    size: u64,
}

impl MultiHasher {
    pub fn new() -> Self {
        use sha2::Digest;
        Self {
            md5: md5::Context::new(),
            sha1: sha1::Sha1::new(),
            sha256: sha2::Sha256::new(),
            size: 0,
        }
    }

    /// Update the hashes with the given data.
    pub fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.size += data.len() as u64;
        self.md5.consume(data);
        self.sha1.update(data);
        self.sha256.update(data);
    }

    /// Finalize the hashes and return the total size with the digests.
    pub fn finalize(self) -> (u64, Digests) {
        use sha2::Digest;
        let digests = Digests {
            md5: format!("{:x}", self.md5.compute()),
            sha1: format!("{:x}", self.sha1.finalize()),
            sha256: format!("{:x}", self.sha256.finalize()),
        };
        (self.size, digests)
    }

    /// Bytes consumed so far.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Default for MultiHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MultiHasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Hash everything a reader yields.
pub fn hash_reader<R: Read>(mut reader: R) -> Result<(u64, Digests)> {
    let mut hasher = MultiHasher::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize())
}

/// Hash a file on disk.
pub fn hash_file(path: &Path) -> Result<(u64, Digests)> {
    let file = File::open(path)?;
    hash_reader(BufReader::new(file))
}

/// Hash in-memory data.
pub fn hash_data(data: &[u8]) -> (u64, Digests) {
    let mut hasher = MultiHasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_algorithm_str() {
        assert_eq!(HashAlgorithm::Md5.as_str(), "MD5Sum");
        assert_eq!(HashAlgorithm::Sha1.as_str(), "SHA1");
        assert_eq!(HashAlgorithm::Sha256.as_str(), "SHA256");
        assert_eq!(HashAlgorithm::Md5.control_field(), "MD5sum");
    }

    #[test]
    fn test_hash_data_known_values() {
        let (size, digests) = hash_data(b"hello world");

        assert_eq!(size, 11);
        assert_eq!(digests.md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(digests.sha1, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        assert_eq!(
            digests.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_digests_are_well_formed() {
        let (_, digests) = hash_data(b"");
        for algorithm in HashAlgorithm::all() {
            assert!(algorithm.is_valid_digest(digests.get(*algorithm)));
        }
        assert!(!HashAlgorithm::Md5.is_valid_digest("ABCDEF"));
        assert!(!HashAlgorithm::Sha1.is_valid_digest(&digests.md5));
    }

    #[test]
    fn test_multi_hasher_matches_hash_data() {
        let mut hasher = MultiHasher::new();
        hasher.write_all(b"test ").unwrap();
        hasher.write_all(b"data").unwrap();
        assert_eq!(hasher.size(), 9);

        assert_eq!(hasher.finalize(), hash_data(b"test data"));
    }

    #[test]
    fn test_hash_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("blob.deb");
        std::fs::write(&path, b"package contents").unwrap();

        let (size, digests) = hash_file(&path).unwrap();
        assert_eq!(size, 16);
        assert_eq!(digests, hash_data(b"package contents").1);
    }

    #[test]
    fn test_hash_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(hash_file(&dir.path().join("missing")).is_err());
    }
}
