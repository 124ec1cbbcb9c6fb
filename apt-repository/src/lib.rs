//! # APT Repository Library
//!
//! Generates the metadata of a flat, unsigned APT repository serving one
//! suite: `Packages` indices, the `Release` file, and the one-line source
//! list clients install. Digests are computed with MD5, SHA1 and SHA256.
//!
//! ## Example
//!
//! ```rust
//! use apt_repository::{HashedFile, ReleaseBuilder, RepositoryLayout};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let layout = RepositoryLayout::default();
//! let release = ReleaseBuilder::new()
//!     .origin("Example Origin")
//!     .label("Example Repository")
//!     .suite(layout.suite())
//!     .architectures(vec![layout.architecture().to_string()])
//!     .components(vec![layout.component().to_string()])
//!     .add_file(HashedFile::from_data(layout.packages_release_entry(), b""))
//!     .build()?;
//!
//! assert!(release.to_string().starts_with("Origin: Example Origin\n"));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod hash;
pub mod layout;
pub mod packages;
pub mod release;
pub mod sources_list;

pub use error::{AptRepositoryError, Result};
pub use hash::{Digests, HashAlgorithm, HashedFile};
pub use layout::RepositoryLayout;
pub use packages::{Package, PackageFile};
pub use release::{Release, ReleaseBuilder};
pub use sources_list::{SourceEntry, SourcesList};
