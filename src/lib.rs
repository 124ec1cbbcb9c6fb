//! Mirrors upstream Kiro releases into a self-hosted, unsigned Debian
//! repository.

pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod index;
pub mod instructions;
pub mod logging;
pub mod metadata;
pub mod models;
pub mod notify;
pub mod package_config;
pub mod permissions;
pub mod pipeline;
pub mod publish;
pub mod retry;
pub mod store;
pub mod version;

pub use error::{Error, ErrorKind, Result};
