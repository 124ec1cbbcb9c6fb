//! Capability checks run before a run mutates anything.
//!
//! Each check performs the real operation on a throwaway key and reports a
//! [`CheckOutcome`]; any outcome other than [`CheckOutcome::Allowed`] aborts
//! the run with [`Error::Permission`].

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::publish::{ObjectBody, ObjectStore, ObjectStoreError};
use crate::store::{Item, KeyValueTable, StoreError};

pub const TEST_ITEM_KEY: &str = "permission-test-key";
pub const TEST_OBJECT_KEY: &str = "permission-test/test-object";

const STATE_STORE: &str = "state-store";
const OBJECT_STORE: &str = "object-store";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Allowed,
    /// The service refused the operation.
    Denied { code: String, message: String },
    /// The operation failed for another reason.
    Failed { code: String, message: String },
}

impl CheckOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CheckOutcome::Allowed)
    }

    /// `Ok(())` when allowed, otherwise a permission error for `operation`.
    pub fn into_result(self, service: &str, operation: &str) -> Result<()> {
        match self {
            CheckOutcome::Allowed => {
                debug!(service, operation, "Permission check passed");
                Ok(())
            }
            CheckOutcome::Denied { code, message } | CheckOutcome::Failed { code, message } => {
                warn!(service, operation, %code, %message, "Permission check failed");
                Err(Error::permission(service, operation, code, message))
            }
        }
    }
}

impl<T> From<std::result::Result<T, StoreError>> for CheckOutcome {
    fn from(result: std::result::Result<T, StoreError>) -> Self {
        match result {
            Ok(_) => CheckOutcome::Allowed,
            Err(StoreError::PermissionDenied(message)) => CheckOutcome::Denied {
                code: "AccessDenied".to_string(),
                message,
            },
            Err(e @ StoreError::Unavailable(_)) => CheckOutcome::Failed {
                code: "ServiceUnavailable".to_string(),
                message: e.to_string(),
            },
            Err(e) => CheckOutcome::Failed {
                code: "InvalidResponse".to_string(),
                message: e.to_string(),
            },
        }
    }
}

impl<T> From<std::result::Result<T, ObjectStoreError>> for CheckOutcome {
    fn from(result: std::result::Result<T, ObjectStoreError>) -> Self {
        let (code, e) = match result {
            Ok(_) => return CheckOutcome::Allowed,
            Err(ObjectStoreError::PermissionDenied(message)) => {
                return CheckOutcome::Denied {
                    code: "AccessDenied".to_string(),
                    message,
                }
            }
            Err(e @ ObjectStoreError::ServiceUnavailable) => ("ServiceUnavailable", e),
            Err(e @ ObjectStoreError::NotFound(_)) => ("NoSuchBucket", e),
            Err(e @ ObjectStoreError::Io(_)) => ("IoError", e),
            Err(e @ ObjectStoreError::Other(_)) => ("Unknown", e),
        };
        CheckOutcome::Failed {
            code: code.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
pub trait AccessValidator: Send + Sync {
    /// The configured credentials are accepted by every service.
    async fn check_auth(&self) -> Result<()>;

    /// The credentials carry every capability a run needs.
    async fn check_permissions(&self) -> Result<()>;
}

/// Checks access to the state table and the object store.
pub struct LiveValidator {
    table: Arc<dyn KeyValueTable>,
    objects: Arc<dyn ObjectStore>,
}

impl LiveValidator {
    pub fn new(table: Arc<dyn KeyValueTable>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { table, objects }
    }

    pub async fn check_table_write(&self) -> CheckOutcome {
        let mut item = Item::new();
        item.insert("package_id".to_string(), json!(TEST_ITEM_KEY));
        item.insert("permission_test".to_string(), json!(true));
        let outcome = CheckOutcome::from(self.table.put_item(TEST_ITEM_KEY, item).await);
        if !outcome.is_allowed() {
            return outcome;
        }
        self.table.delete_item(TEST_ITEM_KEY).await.into()
    }

    pub async fn check_table_scan(&self) -> CheckOutcome {
        self.table.scan(None, None).await.into()
    }

    pub async fn check_object_write(&self) -> CheckOutcome {
        let body = ObjectBody::Bytes(b"permission test".to_vec());
        let outcome = CheckOutcome::from(
            self.objects
                .put_object(TEST_OBJECT_KEY, &body, "text/plain")
                .await,
        );
        if !outcome.is_allowed() {
            return outcome;
        }
        self.objects.delete_object(TEST_OBJECT_KEY).await.into()
    }
}

#[async_trait]
impl AccessValidator for LiveValidator {
    async fn check_auth(&self) -> Result<()> {
        CheckOutcome::from(self.table.ping().await).into_result(STATE_STORE, "Ping")?;
        CheckOutcome::from(self.objects.check_access().await)
            .into_result(OBJECT_STORE, "CheckAccess")?;
        info!("Credentials accepted");
        Ok(())
    }

    async fn check_permissions(&self) -> Result<()> {
        self.check_table_write()
            .await
            .into_result(STATE_STORE, "PutItem")?;
        self.check_table_scan().await.into_result(STATE_STORE, "Scan")?;
        self.check_object_write()
            .await
            .into_result(OBJECT_STORE, "PutObject")?;
        info!("Permission checks passed");
        Ok(())
    }
}

/// Accepts everything; for local runs without real credentials.
#[derive(Debug, Default)]
pub struct SkipValidation;

#[async_trait]
impl AccessValidator for SkipValidation {
    async fn check_auth(&self) -> Result<()> {
        debug!("Skipping credential check");
        Ok(())
    }

    async fn check_permissions(&self) -> Result<()> {
        debug!("Skipping permission checks");
        Ok(())
    }
}
