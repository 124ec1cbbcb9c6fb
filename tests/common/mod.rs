use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use debian_repo_manager::download::PackageDownloader;
use debian_repo_manager::http::HttpClient;
use debian_repo_manager::index::IndexBuilder;
use debian_repo_manager::metadata::MetadataClient;
use debian_repo_manager::notify::{Notification, Notifier};
use debian_repo_manager::pipeline::Pipeline;
use debian_repo_manager::publish::{ObjectBody, ObjectStore, ObjectStoreError, RepositoryPublisher};
use debian_repo_manager::retry::RetryPolicy;
use debian_repo_manager::store::{MemoryTable, VersionTracker};

pub const BUCKET: &str = "repo.example.com";

/// Object store keeping uploads in memory. Deleted objects are forgotten.
#[derive(Default)]
pub struct RecordingStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
    puts: Mutex<Vec<String>>,
    rejected_suffix: Option<&'static str>,
}

impl RecordingStore {
    /// A store refusing every key ending in `suffix`.
    pub fn rejecting(suffix: &'static str) -> Self {
        Self {
            rejected_suffix: Some(suffix),
            ..Default::default()
        }
    }

    /// Keys currently stored.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| String::from_utf8_lossy(data).into_owned())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, content_type)| content_type.clone())
    }

    /// Every `put_object` call, permission checks included.
    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put_object(
        &self,
        key: &str,
        body: &ObjectBody,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        if let Some(suffix) = self.rejected_suffix {
            if key.ends_with(suffix) {
                return Err(ObjectStoreError::PermissionDenied(key.to_string()));
            }
        }
        let data = body.read().await?;
        self.puts.lock().unwrap().push(key.to_string());
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn check_access(&self) -> Result<(), ObjectStoreError> {
        Ok(())
    }
}

/// Collects notifications; optionally fails after recording them.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<Notification>>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> debian_repo_manager::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(debian_repo_manager::Error::Notification(
                "notifier is down".to_string(),
            ));
        }
        Ok(())
    }
}

/// A pipeline against in-memory state, a recording store and `metadata_url`.
pub struct Harness {
    pub table: Arc<MemoryTable>,
    pub store: Arc<RecordingStore>,
    pub notifier: RecordingNotifier,
    pub downloads: TempDir,
    pub repository: TempDir,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(metadata_url: &str) -> Self {
        Self::with_notifier(metadata_url, RecordingNotifier::default())
    }

    pub fn with_notifier(metadata_url: &str, notifier: RecordingNotifier) -> Self {
        Self::with_store(metadata_url, notifier, RecordingStore::default())
    }

    pub fn with_store(
        metadata_url: &str,
        notifier: RecordingNotifier,
        store: RecordingStore,
    ) -> Self {
        let table = Arc::new(MemoryTable::with_page_size(2));
        let store = Arc::new(store);
        let downloads = TempDir::new().unwrap();
        let repository = TempDir::new().unwrap();

        let http = HttpClient::new(Duration::from_secs(5), RetryPolicy::immediate(3)).unwrap();
        let publisher = RepositoryPublisher::new(store.clone(), format!("https://{}/", BUCKET))
            .with_retry_policy(RetryPolicy::immediate(3));

        let pipeline = Pipeline::new(
            VersionTracker::new(table.clone()),
            MetadataClient::new(http.clone(), metadata_url),
            PackageDownloader::new(http, downloads.path()),
            IndexBuilder::new(repository.path(), BUCKET),
            publisher,
        )
        .with_notifiers(vec![Box::new(notifier.clone())]);

        Self {
            table,
            store,
            notifier,
            downloads,
            repository,
            pipeline,
        }
    }
}
