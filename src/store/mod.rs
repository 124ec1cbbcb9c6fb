//! Key-value persistence of package records.
//!
//! [`KeyValueTable`] is the narrow interface a backing table has to offer:
//! single-item reads and writes plus a paginated scan with an optional
//! equality filter. [`VersionTracker`] builds the record-level operations on
//! top of it.

use async_trait::async_trait;

mod memory;
mod redis_table;
mod tracker;

pub use memory::MemoryTable;
pub use redis_table::RedisTable;
pub use tracker::VersionTracker;

/// A stored item: a JSON object.
pub type Item = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    #[error("Access to the state store was denied: {0}")]
    PermissionDenied(String),

    #[error("Malformed item {key}: {message}")]
    Malformed { key: String, message: String },

    #[error("Invalid pagination token: {0}")]
    InvalidToken(String),
}

/// Predicate evaluated by the table while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFilter {
    /// The named attribute is a string exactly equal to `value`.
    AttributeEquals { name: String, value: String },
}

impl ScanFilter {
    pub fn attribute_equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        ScanFilter::AttributeEquals {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        match self {
            ScanFilter::AttributeEquals { name, value } => {
                item.get(name).and_then(|v| v.as_str()) == Some(value.as_str())
            }
        }
    }
}

/// One page of scan results.
#[derive(Debug, Default)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Token to pass to the next `scan` call; `None` once the scan is complete.
    pub next_token: Option<String>,
}

#[async_trait]
pub trait KeyValueTable: Send + Sync {
    /// Insert or replace the item stored under `key`.
    async fn put_item(&self, key: &str, item: Item) -> Result<(), StoreError>;

    /// Insert the item only if nothing is stored under `key` yet.
    ///
    /// Returns `false` when the write was rejected.
    async fn put_item_if_absent(&self, key: &str, item: Item) -> Result<bool, StoreError>;

    async fn get_item(&self, key: &str) -> Result<Option<Item>, StoreError>;

    async fn delete_item(&self, key: &str) -> Result<(), StoreError>;

    /// Read one page of items, starting after `start_token`.
    async fn scan(
        &self,
        filter: Option<&ScanFilter>,
        start_token: Option<&str>,
    ) -> Result<ScanPage, StoreError>;

    /// Check that the table is reachable and the credentials are accepted.
    async fn ping(&self) -> Result<(), StoreError>;
}
