//! Publishing a repository bundle to object storage.
//!
//! Objects are addressed by key (`dists/stable/Release`,
//! `pool/main/k/kiro/kiro_1.2.3_amd64.deb`, ...) and become publicly
//! readable at `https://<bucket>/<key>`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use apt_repository::RepositoryLayout;

use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::instructions::render_index_html;
use crate::models::RepositoryBundle;
use crate::retry::RetryPolicy;

mod local;

pub use local::LocalObjectStore;

#[cfg(feature = "gcs")]
mod gcs;

#[cfg(feature = "gcs")]
pub use gcs::GcsObjectStore;

pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_DEB: &str = "application/vnd.debian.binary-package";
pub const CONTENT_TYPE_PEM: &str = "application/x-pem-file";
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";
pub const CONTENT_TYPE_HTML: &str = "text/html";

/// Name of the published source list.
pub const SOURCES_LIST_KEY: &str = "kiro.list";
pub const INDEX_HTML_KEY: &str = "index.html";

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Access denied: {0}")]
    PermissionDenied(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ObjectStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ObjectStoreError::ServiceUnavailable)
    }

    /// Attach the key the failed call was about.
    pub fn for_key(self, key: &str) -> Error {
        Error::Publish {
            key: key.to_string(),
            retryable: self.is_retryable(),
            message: self.to_string(),
        }
    }
}

/// Contents of an object to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBody {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl ObjectBody {
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            ObjectBody::Bytes(bytes) => Ok(bytes.clone()),
            ObjectBody::File(path) => tokio::fs::read(path).await,
        }
    }
}

/// One object of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishObject {
    pub key: String,
    pub body: ObjectBody,
    pub content_type: &'static str,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        body: &ObjectBody,
        content_type: &str,
    ) -> std::result::Result<(), ObjectStoreError>;

    async fn delete_object(&self, key: &str) -> std::result::Result<(), ObjectStoreError>;

    /// Cheap read-only call proving the store is reachable with the
    /// configured credentials.
    async fn check_access(&self) -> std::result::Result<(), ObjectStoreError>;
}

/// Content type for a published key, from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    let name = key.rsplit('/').next().unwrap_or(key);
    if name == "Packages" || name == "Release" || name.ends_with(".list") || name.ends_with(".txt")
    {
        CONTENT_TYPE_TEXT
    } else if name.ends_with(".deb") {
        CONTENT_TYPE_DEB
    } else if name.ends_with(".pem") {
        CONTENT_TYPE_PEM
    } else if name.ends_with(".html") {
        CONTENT_TYPE_HTML
    } else {
        CONTENT_TYPE_BINARY
    }
}

fn file_object(layout: &RepositoryLayout, package_name: &str, path: &Path) -> Result<PublishObject> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::integrity(path, "artifact path has no file name"))?;
    let key = layout.pool_path(package_name, &filename)?;
    Ok(PublishObject {
        content_type: content_type_for(&key),
        key,
        body: ObjectBody::File(path.to_path_buf()),
    })
}

/// Every object making up `bundle`: the new artifacts, then `Packages`,
/// then `Release`.
///
/// Uploads follow this order, so the index never references a pool file
/// that is not yet in the store.
pub fn bundle_objects(
    bundle: &RepositoryBundle,
    layout: &RepositoryLayout,
) -> Result<Vec<PublishObject>> {
    let mut objects = Vec::new();
    for artifact in &bundle.artifacts {
        for path in artifact.paths() {
            objects.push(file_object(layout, &artifact.package_name, path)?);
        }
    }
    objects.push(PublishObject {
        key: layout.packages_path(),
        body: ObjectBody::Bytes(bundle.packages.clone().into_bytes()),
        content_type: CONTENT_TYPE_TEXT,
    });
    objects.push(PublishObject {
        key: layout.release_path(),
        body: ObjectBody::Bytes(bundle.release.clone().into_bytes()),
        content_type: CONTENT_TYPE_TEXT,
    });
    Ok(objects)
}

/// Uploads bundles through an [`ObjectStore`].
pub struct RepositoryPublisher {
    store: Arc<dyn ObjectStore>,
    layout: RepositoryLayout,
    policy: RetryPolicy,
    repository_url: String,
    publish_extras: bool,
    verifier: Option<HttpClient>,
}

impl RepositoryPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, repository_url: impl Into<String>) -> Self {
        Self {
            store,
            layout: RepositoryLayout::default(),
            policy: RetryPolicy::default(),
            repository_url: repository_url.into(),
            publish_extras: false,
            verifier: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Also publish the source list and the installation page.
    pub fn with_extras(mut self, publish_extras: bool) -> Self {
        self.publish_extras = publish_extras;
        self
    }

    /// Check every key is publicly readable after upload.
    pub fn with_verification(mut self, client: HttpClient) -> Self {
        self.verifier = Some(client);
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Objects `publish` would upload for `bundle`.
    pub fn objects(&self, bundle: &RepositoryBundle) -> Result<Vec<PublishObject>> {
        let mut objects = bundle_objects(bundle, &self.layout)?;
        if self.publish_extras {
            let source_line = bundle
                .sources_list
                .lines()
                .find(|l| l.starts_with("deb "))
                .unwrap_or_default();
            objects.push(PublishObject {
                key: SOURCES_LIST_KEY.to_string(),
                body: ObjectBody::Bytes(bundle.sources_list.clone().into_bytes()),
                content_type: CONTENT_TYPE_TEXT,
            });
            objects.push(PublishObject {
                key: INDEX_HTML_KEY.to_string(),
                body: ObjectBody::Bytes(
                    render_index_html(&self.repository_url, source_line)?.into_bytes(),
                ),
                content_type: CONTENT_TYPE_HTML,
            });
        }
        Ok(objects)
    }

    /// Upload `bundle`, returning the published keys in upload order.
    pub async fn publish(&self, bundle: &RepositoryBundle) -> Result<Vec<String>> {
        let objects = self.objects(bundle)?;
        info!(count = objects.len(), "Publishing repository");

        let mut keys = Vec::with_capacity(objects.len());
        for object in &objects {
            self.upload(object).await?;
            keys.push(object.key.clone());
        }

        if let Some(client) = &self.verifier {
            for key in &keys {
                let url = format!("{}/{}", self.repository_url.trim_end_matches('/'), key);
                client.head(&url).await.map_err(|e| Error::Publish {
                    key: key.clone(),
                    message: format!("not publicly readable: {}", e),
                    retryable: false,
                })?;
                debug!(%key, "Verified upload");
            }
        }

        info!(count = keys.len(), "Published repository");
        Ok(keys)
    }

    async fn upload(&self, object: &PublishObject) -> Result<()> {
        self.policy
            .retry(&object.key, || async {
                self.store
                    .put_object(&object.key, &object.body, object.content_type)
                    .await
                    .map_err(|e| e.for_key(&object.key))
            })
            .await?;
        debug!(key = %object.key, content_type = object.content_type, "Uploaded object");
        Ok(())
    }
}
