use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use super::{Item, KeyValueTable, ScanFilter, ScanPage, StoreError};

/// In-process table, ordered by key.
///
/// Scans return at most `page_size` items per call and apply the filter after
/// the page has been cut, so filtered scans may yield short or empty pages
/// that still carry a continuation token.
#[derive(Debug)]
pub struct MemoryTable {
    items: Mutex<BTreeMap<String, Item>>,
    page_size: usize,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::with_page_size(100)
    }
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Item>>, StoreError> {
        self.items
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("table lock poisoned: {}", e)))
    }
}

#[async_trait]
impl KeyValueTable for MemoryTable {
    async fn put_item(&self, key: &str, item: Item) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), item);
        Ok(())
    }

    async fn put_item_if_absent(&self, key: &str, item: Item) -> Result<bool, StoreError> {
        let mut items = self.lock()?;
        if items.contains_key(key) {
            return Ok(false);
        }
        items.insert(key.to_string(), item);
        Ok(true)
    }

    async fn get_item(&self, key: &str) -> Result<Option<Item>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn delete_item(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn scan(
        &self,
        filter: Option<&ScanFilter>,
        start_token: Option<&str>,
    ) -> Result<ScanPage, StoreError> {
        let items = self.lock()?;
        let lower = match start_token {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };

        let mut range = items.range((lower, Bound::Unbounded));
        let page: Vec<(&String, &Item)> = range.by_ref().take(self.page_size).collect();
        let next_token = match (range.next(), page.last()) {
            (Some(_), Some((last_key, _))) => Some(last_key.to_string()),
            _ => None,
        };

        Ok(ScanPage {
            items: page
                .into_iter()
                .filter(|(_, item)| filter.map_or(true, |f| f.matches(item)))
                .map(|(_, item)| item.clone())
                .collect(),
            next_token,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(name: &str) -> Item {
        json!({ "package_name": name }).as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_conditional_put() {
        let table = MemoryTable::new();
        assert!(table.put_item_if_absent("kiro#1.0", item("kiro")).await.unwrap());
        assert!(!table.put_item_if_absent("kiro#1.0", item("other")).await.unwrap());

        let stored = table.get_item("kiro#1.0").await.unwrap().unwrap();
        assert_eq!(stored["package_name"], "kiro");
    }

    #[tokio::test]
    async fn test_scan_pages() {
        let table = MemoryTable::with_page_size(2);
        for i in 0..5 {
            table.put_item(&format!("kiro#1.{}", i), item("kiro")).await.unwrap();
        }

        let mut token = None;
        let mut pages = 0;
        let mut seen = 0;
        loop {
            let page = table.scan(None, token.as_deref()).await.unwrap();
            pages += 1;
            seen += page.items.len();
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(pages, 3);
        assert_eq!(seen, 5);
    }

    #[tokio::test]
    async fn test_filter_is_applied_after_paging() {
        let table = MemoryTable::with_page_size(1);
        table.put_item("a", item("kiro-repo")).await.unwrap();
        table.put_item("b", item("kiro")).await.unwrap();

        let filter = ScanFilter::attribute_equals("package_name", "kiro");
        let first = table.scan(Some(&filter), None).await.unwrap();
        assert!(first.items.is_empty());
        assert_eq!(first.next_token.as_deref(), Some("a"));

        let second = table.scan(Some(&filter), Some("a")).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let table = MemoryTable::new();
        table.put_item("k", item("kiro")).await.unwrap();
        table.delete_item("k").await.unwrap();
        table.delete_item("k").await.unwrap();
        assert!(table.is_empty());
    }
}
