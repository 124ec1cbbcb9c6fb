//! One run of the repository manager.
//!
//! A run checks credentials, then either mirrors the release upstream
//! currently ships or rebuilds the index from stored state, publishes the
//! result and reports the outcome.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{PublishBackend, Settings};
use crate::download::{Expected, PackageDownloader};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::index::IndexBuilder;
use crate::logging::OperationTracker;
use crate::metadata::MetadataClient;
use crate::models::{ControlDefaults, LocalFiles, PackageRecord, DEFAULT_PACKAGE_NAME};
use crate::notify::{
    send_best_effort, LogNotifier, Notification, Notifier, RedisNotifier, WebhookNotifier,
};
use crate::package_config::ConfigManager;
use crate::permissions::{AccessValidator, LiveValidator, SkipValidation};
use crate::publish::{LocalObjectStore, ObjectStore, RepositoryPublisher};
use crate::retry::RetryPolicy;
use crate::store::{KeyValueTable, RedisTable, VersionTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Normal,
    /// Rebuild and republish the index from stored records only.
    ForceRebuild,
}

/// Status code and message reported for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl RunOutcome {
    fn ok(body: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            body: body.into(),
        }
    }

    pub fn processed(version: &str) -> Self {
        Self::ok(format!("Successfully processed version {}", version))
    }

    pub fn already_processed(version: &str) -> Self {
        Self::ok(format!("Version {} already processed", version))
    }

    pub fn rebuilt(count: usize) -> Self {
        Self::ok(format!("Successfully rebuilt repository with {} packages", count))
    }

    pub fn failed(error: &Error) -> Self {
        Self {
            status_code: 500,
            body: format!("Error processing repository: {}", error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Step of a run, reported as context when the run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AuthCheck,
    PermissionCheck,
    FetchMetadata,
    DuplicateCheck,
    Download,
    Verify,
    Persist,
    IndexRebuild,
    Publish,
}

impl Stage {
    pub fn description(&self) -> &'static str {
        match self {
            Stage::AuthCheck => "Checking credentials",
            Stage::PermissionCheck => "Checking permissions",
            Stage::FetchMetadata => "Fetching release metadata",
            Stage::DuplicateCheck => "Checking processed versions",
            Stage::Download => "Downloading release files",
            Stage::Verify => "Verifying downloaded files",
            Stage::Persist => "Storing package record",
            Stage::IndexRebuild => "Building repository index",
            Stage::Publish => "Publishing repository",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

pub struct Pipeline {
    package_name: String,
    tracker: VersionTracker,
    metadata: MetadataClient,
    downloader: PackageDownloader,
    index: IndexBuilder,
    publisher: RepositoryPublisher,
    validator: Box<dyn AccessValidator>,
    notifiers: Vec<Box<dyn Notifier>>,
    packages: Option<ConfigManager>,
}

impl Pipeline {
    /// A pipeline mirroring `kiro`, probing the tracker's table and the
    /// publisher's store for permissions and logging notifications.
    pub fn new(
        tracker: VersionTracker,
        metadata: MetadataClient,
        downloader: PackageDownloader,
        index: IndexBuilder,
        publisher: RepositoryPublisher,
    ) -> Self {
        let validator = LiveValidator::new(tracker.table().clone(), publisher.store().clone());
        Self {
            package_name: DEFAULT_PACKAGE_NAME.to_string(),
            tracker,
            metadata,
            downloader,
            index,
            publisher,
            validator: Box::new(validator),
            notifiers: vec![Box::new(LogNotifier)],
            packages: None,
        }
    }

    pub fn with_package_name(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = package_name.into();
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn AccessValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_notifiers(mut self, notifiers: Vec<Box<dyn Notifier>>) -> Self {
        self.notifiers = notifiers;
        self
    }

    /// Take control fields of new records from package configuration files.
    pub fn with_package_configs(mut self, packages: ConfigManager) -> Self {
        self.packages = Some(packages);
        self
    }

    pub fn tracker(&self) -> &VersionTracker {
        &self.tracker
    }

    /// Build a pipeline with real backends for `settings`.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let policy = RetryPolicy {
            max_attempts: settings.http_max_attempts,
            ..RetryPolicy::default()
        };
        let repository_url = settings.repository_url();

        let table: Arc<dyn KeyValueTable> = Arc::new(RedisTable::new(
            &settings.state_store_url,
            &settings.state_table_name,
        )?);
        let store = object_store(settings).await?;

        let http = HttpClient::new(settings.http_timeout, policy.clone())?;
        let downloads = HttpClient::new(settings.download_timeout, policy.clone())?;

        let mut publisher = RepositoryPublisher::new(store, repository_url)
            .with_retry_policy(policy)
            .with_extras(settings.publish_extras);
        if settings.verify_uploads {
            publisher = publisher.with_verification(http.clone());
        }

        let mut pipeline = Self::new(
            VersionTracker::new(table),
            MetadataClient::new(http, settings.metadata_url.clone()),
            PackageDownloader::new(downloads, settings.download_dir.clone()),
            IndexBuilder::new(settings.repository_dir.clone(), settings.bucket_name.clone()),
            publisher,
        )
        .with_package_configs(ConfigManager::new(settings.package_config_dir.clone()))
        .with_notifiers(notifiers(settings).await?);

        if settings.skip_permission_check {
            warn!("Permission checks disabled");
            pipeline = pipeline.with_validator(Box::new(SkipValidation));
        }
        Ok(pipeline)
    }

    /// Run once. Never fails: errors become a 500 outcome after a failure
    /// notification has been attempted.
    pub async fn run(&self, mode: RunMode) -> RunOutcome {
        let operations = OperationTracker::new();
        let mut stage = Stage::AuthCheck;
        info!(package_name = %self.package_name, ?mode, "Starting repository run");

        let result = self.execute(mode, &operations, &mut stage).await;
        if mode == RunMode::Normal {
            self.downloader.cleanup_all().await;
        }

        match result {
            Ok(outcome) => {
                operations.log_summary(true);
                info!(status = outcome.status_code, body = %outcome.body, "Run finished");
                outcome
            }
            Err(e) => {
                error!(stage = %stage, error = %e, kind = ?e.kind(), "Run failed");
                send_best_effort(
                    &self.notifiers,
                    &Notification::failure(&e, Some(stage.description())),
                )
                .await;
                operations.log_summary(false);
                RunOutcome::failed(&e)
            }
        }
    }

    async fn execute(
        &self,
        mode: RunMode,
        operations: &OperationTracker,
        stage: &mut Stage,
    ) -> Result<RunOutcome> {
        *stage = Stage::AuthCheck;
        operations
            .track("auth_check", &[], self.validator.check_auth())
            .await?;
        *stage = Stage::PermissionCheck;
        operations
            .track("permission_check", &[], self.validator.check_permissions())
            .await?;

        match mode {
            RunMode::Normal => self.process_current_release(operations, stage).await,
            RunMode::ForceRebuild => self.rebuild(operations, stage).await,
        }
    }

    async fn process_current_release(
        &self,
        operations: &OperationTracker,
        stage: &mut Stage,
    ) -> Result<RunOutcome> {
        *stage = Stage::FetchMetadata;
        let release = operations
            .track(
                "metadata_fetch",
                &[("url", self.metadata.url())],
                self.metadata.current_release(),
            )
            .await?;
        let version = release.version.clone();

        *stage = Stage::DuplicateCheck;
        if self.tracker.exists(&self.package_name, &version).await? {
            info!(package_name = %self.package_name, %version, "Version already processed, skipping");
            return Ok(RunOutcome::already_processed(&version));
        }

        let defaults = match &self.packages {
            Some(packages) => packages.control_defaults(&self.package_name)?,
            None => ControlDefaults {
                package_name: self.package_name.clone(),
                ..Default::default()
            },
        };
        let mut record = release.to_record(&defaults);

        *stage = Stage::Download;
        let files = operations
            .track(
                "package_download",
                &[("version", version.as_str())],
                self.downloader
                    .download_release_files(&self.package_name, &release),
            )
            .await?;

        *stage = Stage::Verify;
        let expected = Expected {
            size: None,
            sha256: release.sha256.clone(),
        };
        self.downloader.verify_integrity(&files, &expected).await?;
        self.downloader
            .populate_file_metadata(&mut record, &files)
            .await?;

        *stage = Stage::Persist;
        let package_id = record.package_id();
        let inserted = operations
            .track(
                "version_storage",
                &[("package_id", package_id.as_str())],
                self.tracker.put_if_absent(&mut record),
            )
            .await?;
        if !inserted {
            info!(%package_id, "Another run stored this version first");
            return Ok(RunOutcome::already_processed(&version));
        }

        let published = self
            .rebuild_and_publish(operations, stage, std::slice::from_ref(&files))
            .await?;

        let pool_urls = self.pool_urls(&published);
        send_best_effort(
            &self.notifiers,
            &Notification::success(&record, &pool_urls, &self.index.repository_url()),
        )
        .await;

        operations.set_gauge("latest_version_processed", &version);
        Ok(RunOutcome::processed(&version))
    }

    async fn rebuild(
        &self,
        operations: &OperationTracker,
        stage: &mut Stage,
    ) -> Result<RunOutcome> {
        info!("Force rebuild requested, skipping metadata fetch");
        let published = self.rebuild_and_publish(operations, stage, &[]).await?;
        Ok(RunOutcome::rebuilt(published.record_count))
    }

    /// Rebuild the index from every stored record and publish it together
    /// with `local_files`. Returns the published keys and the record count.
    async fn rebuild_and_publish(
        &self,
        operations: &OperationTracker,
        stage: &mut Stage,
        local_files: &[LocalFiles],
    ) -> Result<Published> {
        *stage = Stage::IndexRebuild;
        let records: Vec<PackageRecord> = self.tracker.list_all().await?;
        operations.set_gauge("total_releases", records.len());
        let bundle = self.index.build(&records, local_files)?;

        *stage = Stage::Publish;
        let keys = operations
            .track("repository_upload", &[], self.publisher.publish(&bundle))
            .await?;
        Ok(Published {
            keys,
            record_count: records.len(),
        })
    }

    fn pool_urls(&self, published: &Published) -> Vec<String> {
        let base = self.index.repository_url();
        published
            .keys
            .iter()
            .filter(|key| key.starts_with("pool/"))
            .map(|key| format!("{}{}", base, key))
            .collect()
    }
}

struct Published {
    keys: Vec<String>,
    record_count: usize,
}

async fn object_store(settings: &Settings) -> Result<Arc<dyn ObjectStore>> {
    match settings.publish_backend {
        PublishBackend::Local => {
            let dir = settings.local_publish_dir.as_deref().ok_or_else(|| {
                Error::Config("LOCAL_PUBLISH_DIR is required for the local backend".to_string())
            })?;
            tokio::fs::create_dir_all(dir).await?;
            Ok(Arc::new(LocalObjectStore::new(dir)?))
        }
        #[cfg(feature = "gcs")]
        PublishBackend::Gcs => {
            let store = crate::publish::GcsObjectStore::new(
                settings.bucket_name.clone(),
                settings.gcs_credentials_file.as_deref(),
            )
            .await
            .map_err(|e| Error::Config(format!("failed to set up GCS client: {}", e)))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "gcs"))]
        PublishBackend::Gcs => Err(Error::Config("built without GCS support".to_string())),
    }
}

async fn notifiers(settings: &Settings) -> Result<Vec<Box<dyn Notifier>>> {
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    if settings.success_webhook_url.is_some() || settings.failure_webhook_url.is_some() {
        notifiers.push(Box::new(WebhookNotifier::new(
            settings.success_webhook_url.clone(),
            settings.failure_webhook_url.clone(),
            settings.http_timeout,
        )?));
    }
    if let Some(channel) = &settings.notify_channel {
        notifiers.push(Box::new(
            RedisNotifier::connect(&settings.state_store_url, channel.clone()).await?,
        ));
    }
    if notifiers.is_empty() {
        notifiers.push(Box::new(LogNotifier));
    }
    Ok(notifiers)
}
