use apt_repository::layout::validate_package_name;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Item, KeyValueTable, ScanFilter, StoreError};
use crate::error::Result;
use crate::models::{package_id, PackageRecord};
use crate::version::parse_version;

/// Record-level view of the state table.
///
/// Lookups are exact on `package_name#version`: a record for `kiro-repo`
/// never satisfies a query for `kiro`.
#[derive(Clone)]
pub struct VersionTracker {
    table: Arc<dyn KeyValueTable>,
}

impl VersionTracker {
    pub fn new(table: Arc<dyn KeyValueTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Arc<dyn KeyValueTable> {
        &self.table
    }

    /// Whether `package_name` at `version` has been processed.
    pub async fn exists(&self, package_name: &str, version: &str) -> Result<bool> {
        let key = package_id(package_name, version);
        let found = self.table.get_item(&key).await?.is_some();
        debug!(package_id = %key, found, "Checked processed state");
        Ok(found)
    }

    /// Insert or replace a record.
    ///
    /// `processed_timestamp` is set on first persistence and kept afterwards.
    pub async fn put(&self, record: &mut PackageRecord) -> Result<()> {
        let (key, item) = Self::prepare(record)?;
        self.table.put_item(&key, item).await?;
        info!(package_id = %key, "Stored package record");
        Ok(())
    }

    /// Insert a record unless one with the same id exists.
    ///
    /// Returns `false` without writing anything when the id is taken.
    pub async fn put_if_absent(&self, record: &mut PackageRecord) -> Result<bool> {
        let (key, item) = Self::prepare(record)?;
        let inserted = self.table.put_item_if_absent(&key, item).await?;
        if inserted {
            info!(package_id = %key, "Stored package record");
        } else {
            info!(package_id = %key, "Package record already present, write rejected");
        }
        Ok(inserted)
    }

    /// Every decodable record in the table.
    pub async fn list_all(&self) -> Result<Vec<PackageRecord>> {
        let records = self.scan_all(None).await?;
        info!(count = records.len(), "Listed package records");
        Ok(records)
    }

    /// Records whose `package_name` is exactly `package_name`.
    pub async fn list_by_name(&self, package_name: &str) -> Result<Vec<PackageRecord>> {
        let filter = ScanFilter::attribute_equals("package_name", package_name);
        let mut records = self.scan_all(Some(&filter)).await?;
        records.retain(|r| r.package_name == package_name);
        debug!(package_name, count = records.len(), "Listed package records by name");
        Ok(records)
    }

    /// The record with the highest version for `package_name`.
    ///
    /// When several versions share the maximal key the first one scanned wins.
    pub async fn latest(&self, package_name: &str) -> Result<Option<PackageRecord>> {
        let records = self.list_by_name(package_name).await?;
        Ok(records.into_iter().reduce(|best, candidate| {
            if parse_version(&candidate.version) > parse_version(&best.version) {
                candidate
            } else {
                best
            }
        }))
    }

    fn prepare(record: &mut PackageRecord) -> Result<(String, Item)> {
        if record.processed_timestamp.is_none() {
            record.processed_timestamp = Some(Utc::now());
        }
        let key = record.package_id();
        let mut item = match serde_json::to_value(&*record)? {
            serde_json::Value::Object(item) => item,
            other => {
                return Err(StoreError::Malformed {
                    key,
                    message: format!("record serialized to {}", other),
                }
                .into())
            }
        };
        item.insert("package_id".to_string(), serde_json::Value::String(key.clone()));
        Ok((key, item))
    }

    async fn scan_all(&self, filter: Option<&ScanFilter>) -> Result<Vec<PackageRecord>> {
        let mut records = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.table.scan(filter, token.as_deref()).await?;
            for item in page.items {
                let id = item
                    .get("package_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("<unknown>")
                    .to_string();
                match serde_json::from_value::<PackageRecord>(serde_json::Value::Object(item)) {
                    Ok(record) => match validate_package_name(&record.package_name) {
                        Ok(()) => records.push(record),
                        Err(e) => warn!(
                            package_id = %id,
                            error = %e,
                            "Skipping package record with unusable name"
                        ),
                    },
                    Err(e) => warn!(package_id = %id, error = %e, "Skipping malformed package record"),
                }
            }
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(records)
    }
}
