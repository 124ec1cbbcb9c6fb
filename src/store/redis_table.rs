use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ExistenceCheck, RedisError, SetOptions};
use tracing::warn;

use super::{Item, KeyValueTable, ScanFilter, ScanPage, StoreError};

/// Table stored in Redis, one JSON document per key under `<table>:`.
///
/// Pagination tokens are `SCAN` cursors; filters are evaluated client-side
/// on each page.
pub struct RedisTable {
    client: Client,
    prefix: String,
    page_size: usize,
}

impl std::fmt::Debug for RedisTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTable")
            .field("prefix", &self.prefix)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        if e.kind() == redis::ErrorKind::AuthenticationFailed || e.code() == Some("NOPERM") {
            StoreError::PermissionDenied(e.to_string())
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }
}

impl RedisTable {
    pub fn new(url: &str, table_name: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            prefix: format!("{}:", table_name),
            page_size: 100,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn encode(item: &Item) -> Result<String, StoreError> {
        serde_json::to_string(item).map_err(|e| StoreError::Malformed {
            key: String::new(),
            message: e.to_string(),
        })
    }

    fn decode(key: &str, raw: &str) -> Result<Item, StoreError> {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(item)) => Ok(item),
            Ok(other) => Err(StoreError::Malformed {
                key: key.to_string(),
                message: format!("expected a JSON object, got {}", other),
            }),
            Err(e) => Err(StoreError::Malformed {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl KeyValueTable for RedisTable {
    async fn put_item(&self, key: &str, item: Item) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(self.key(key), Self::encode(&item)?).await?;
        Ok(())
    }

    async fn put_item_if_absent(&self, key: &str, item: Item) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = conn
            .set_options(
                self.key(key),
                Self::encode(&item)?,
                SetOptions::default().conditional_set(ExistenceCheck::NX),
            )
            .await?;
        Ok(result.is_some())
    }

    async fn get_item(&self, key: &str) -> Result<Option<Item>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.key(key)).await?;
        raw.map(|raw| Self::decode(key, &raw)).transpose()
    }

    async fn delete_item(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(self.key(key)).await?;
        Ok(())
    }

    async fn scan(
        &self,
        filter: Option<&ScanFilter>,
        start_token: Option<&str>,
    ) -> Result<ScanPage, StoreError> {
        let cursor: u64 = match start_token {
            Some(token) => token
                .parse()
                .map_err(|_| StoreError::InvalidToken(token.to_string()))?,
            None => 0,
        };

        let mut conn = self.connection().await?;
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(format!("{}*", self.prefix))
            .arg("COUNT")
            .arg(self.page_size)
            .query_async(&mut conn)
            .await?;

        let mut items = Vec::new();
        if !keys.is_empty() {
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&keys)
                .query_async(&mut conn)
                .await?;
            for (key, value) in keys.iter().zip(values) {
                // Deleted between SCAN and MGET.
                let Some(raw) = value else { continue };
                match Self::decode(key, &raw) {
                    Ok(item) => {
                        if filter.map_or(true, |f| f.matches(&item)) {
                            items.push(item);
                        }
                    }
                    Err(e) => warn!(key = %key, error = %e, "Skipping undecodable item"),
                }
            }
        }

        Ok(ScanPage {
            items,
            next_token: (next_cursor != 0).then(|| next_cursor.to_string()),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix() {
        let table = RedisTable::new("redis://127.0.0.1/", "kiro-debian-repo-versions").unwrap();
        assert_eq!(table.key("kiro#1.0"), "kiro-debian-repo-versions:kiro#1.0");
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(RedisTable::decode("k", "[1, 2]").is_err());
        assert!(RedisTable::decode("k", "not json").is_err());
        let item = RedisTable::decode("k", r#"{"version": "1.0"}"#).unwrap();
        assert_eq!(item["version"], "1.0");
    }

    #[test]
    fn test_invalid_url() {
        assert!(RedisTable::new("not a url", "t").is_err());
    }
}
