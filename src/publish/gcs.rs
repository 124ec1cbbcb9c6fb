use async_trait::async_trait;
use google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::{
    delete::DeleteObjectRequest, list::ListObjectsRequest, upload::Media,
    upload::UploadObjectRequest, upload::UploadType,
};
use google_cloud_storage::http::Error as GcsError;
use std::path::Path;

use crate::publish::{ObjectBody, ObjectStore, ObjectStoreError};

pub struct GcsObjectStore {
    bucket_name: String,
    client: Client,
}

impl std::fmt::Debug for GcsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsObjectStore")
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

fn map_error(e: GcsError) -> ObjectStoreError {
    match e {
        GcsError::Response(e) if e.code == 503 || e.code == 429 => {
            ObjectStoreError::ServiceUnavailable
        }
        GcsError::Response(e) if e.code == 401 || e.code == 403 => {
            ObjectStoreError::PermissionDenied(e.message)
        }
        GcsError::Response(e) if e.code == 404 => ObjectStoreError::NotFound(e.message),
        e => ObjectStoreError::Other(e.to_string()),
    }
}

impl GcsObjectStore {
    /// Connect to `bucket_name`, authenticating with the service account
    /// key at `credentials_file` when given and anonymously otherwise.
    pub async fn new(
        bucket_name: String,
        credentials_file: Option<&Path>,
    ) -> Result<Self, ObjectStoreError> {
        let config = ClientConfig::default();
        let config = if let Some(path) = credentials_file {
            let creds = CredentialsFile::new_from_file(path.display().to_string())
                .await
                .map_err(|e| ObjectStoreError::Other(e.to_string()))?;
            config
                .with_credentials(creds)
                .await
                .map_err(|e| ObjectStoreError::Other(e.to_string()))?
        } else {
            config.anonymous()
        };

        Ok(Self {
            bucket_name,
            client: Client::new(config),
        })
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: &ObjectBody,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let request = UploadObjectRequest {
            bucket: self.bucket_name.clone(),
            ..Default::default()
        };
        let mut media = Media::new(key.to_string());
        media.content_type = content_type.to_string().into();
        let upload_type = UploadType::Simple(media);

        let data = body.read().await?;
        self.client
            .upload_object(&request, data, &upload_type)
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        let request = DeleteObjectRequest {
            bucket: self.bucket_name.clone(),
            object: key.to_string(),
            ..Default::default()
        };
        self.client.delete_object(&request).await.map_err(map_error)
    }

    async fn check_access(&self) -> Result<(), ObjectStoreError> {
        let request = ListObjectsRequest {
            bucket: self.bucket_name.clone(),
            max_results: Some(1),
            ..Default::default()
        };
        self.client
            .list_objects(&request)
            .await
            .map(|_| ())
            .map_err(map_error)
    }
}
