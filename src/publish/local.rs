use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::publish::{ObjectBody, ObjectStore, ObjectStoreError};

/// Publishes into a local directory, for development and for serving the
/// repository from a plain web server.
#[derive(Debug)]
pub struct LocalObjectStore {
    path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if !path.is_dir() {
            std::fs::create_dir_all(path)?;
        }
        Ok(Self {
            path: path.canonicalize()?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ObjectStoreError::Other(format!("invalid object key: {}", key)));
        }
        Ok(self.path.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: &ObjectBody,
        _content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match body {
            ObjectBody::Bytes(bytes) => tokio::fs::write(&target, bytes).await?,
            ObjectBody::File(source) => {
                tokio::fs::copy(source, &target).await?;
            }
        }
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        match tokio::fs::remove_file(self.object_path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ObjectStoreError::NotFound(key.to_string())),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(ObjectStoreError::PermissionDenied(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn check_access(&self) -> Result<(), ObjectStoreError> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        if !metadata.is_dir() {
            return Err(ObjectStoreError::Other(format!(
                "{} is not a directory",
                self.path.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(ObjectStoreError::PermissionDenied(format!(
                "{} is read-only",
                self.path.display()
            )));
        }
        Ok(())
    }
}
