use apt_repository::hash::{hash_file, MultiHasher};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::metadata::{ReleaseInfo, UrlKind};
use crate::models::{LocalFiles, PackageRecord};

/// Downloads release files into per-version directories and checks them.
#[derive(Debug, Clone)]
pub struct PackageDownloader {
    http: HttpClient,
    download_dir: PathBuf,
}

/// What a single file is expected to look like, when upstream says.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expected {
    pub size: Option<u64>,
    pub sha256: Option<String>,
}

impl PackageDownloader {
    pub fn new(http: HttpClient, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            download_dir: download_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn version_dir(&self, package_name: &str, version: &str) -> PathBuf {
        self.download_dir.join(format!("{}-{}", package_name, version))
    }

    /// Download the package and its sidecar files.
    ///
    /// On failure nothing is left behind for this version.
    pub async fn download_release_files(
        &self,
        package_name: &str,
        release: &ReleaseInfo,
    ) -> Result<LocalFiles> {
        let version_dir = self.version_dir(package_name, &release.version);
        info!(package_name, version = %release.version, dir = %version_dir.display(), "Starting download");
        tokio::fs::create_dir_all(&version_dir).await?;

        match self.download_into(&version_dir, package_name, release).await {
            Ok(files) => {
                info!(package_name, version = %release.version, "Downloaded all release files");
                Ok(files)
            }
            Err(e) => {
                warn!(package_name, version = %release.version, error = %e, "Download failed");
                remove_dir(&version_dir).await;
                Err(e)
            }
        }
    }

    async fn download_into(
        &self,
        version_dir: &Path,
        package_name: &str,
        release: &ReleaseInfo,
    ) -> Result<LocalFiles> {
        let deb_path = self.download_file(&release.deb_url, version_dir).await?;
        let certificate_path = match &release.certificate_url {
            Some(url) => Some(self.download_file(url, version_dir).await?),
            None => None,
        };
        let signature_path = match &release.signature_url {
            Some(url) => Some(self.download_file(url, version_dir).await?),
            None => None,
        };
        Ok(LocalFiles {
            package_name: package_name.to_string(),
            version: release.version.clone(),
            deb_path,
            certificate_path,
            signature_path,
        })
    }

    /// Stream `url` into `target_dir`, returning the path of the written file.
    pub async fn download_file(&self, url: &str, target_dir: &Path) -> Result<PathBuf> {
        let filename = filename_from_url(url);
        let target = target_dir.join(&filename);
        let partial = target_dir.join(format!("{}.part", filename));
        debug!(%url, target = %target.display(), "Downloading file");

        let response = self.http.get(url).await?;
        let mut file = File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(source) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(Error::Request {
                        url: url.to_string(),
                        source,
                    });
                }
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, &target).await?;
        info!(%url, size = written, file = %target.display(), "Downloaded file");
        Ok(target)
    }

    /// Check every downloaded file exists and is non-empty, and that the
    /// package matches `expected` when given.
    pub async fn verify_integrity(&self, files: &LocalFiles, expected: &Expected) -> Result<()> {
        for path in files.paths() {
            let metadata = tokio::fs::metadata(path)
                .await
                .map_err(|_| Error::integrity(path, "downloaded file does not exist"))?;
            if metadata.len() == 0 {
                return Err(Error::integrity(path, "downloaded file is empty"));
            }
        }

        if let Some(size) = expected.size {
            let actual = tokio::fs::metadata(&files.deb_path).await?.len();
            if actual != size {
                return Err(Error::integrity(
                    &files.deb_path,
                    format!("size mismatch: expected {}, got {}", size, actual),
                ));
            }
        }

        if let Some(sha256) = &expected.sha256 {
            let actual = sha256_of(&files.deb_path).await?;
            if !actual.eq_ignore_ascii_case(sha256) {
                return Err(Error::integrity(
                    &files.deb_path,
                    format!("checksum mismatch: expected {}, got {}", sha256, actual),
                ));
            }
            debug!(file = %files.deb_path.display(), "Checksum verification passed");
        }

        info!(package_id = %files.package_id(), "Integrity verification passed");
        Ok(())
    }

    /// Attach the package filename, size and digests to `record`.
    pub async fn populate_file_metadata(
        &self,
        record: &mut PackageRecord,
        files: &LocalFiles,
    ) -> Result<()> {
        let path = files.deb_path.clone();
        let (size, digests) = tokio::task::spawn_blocking(move || hash_file(&path))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        let filename = files
            .deb_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.default_filename());
        debug!(package_id = %record.package_id(), %filename, size, "Attached file metadata");
        record.attach_file_metadata(filename, size, digests);
        Ok(())
    }

    /// Remove the download directory of one release.
    pub async fn cleanup(&self, files: &LocalFiles) {
        remove_dir(&self.version_dir(&files.package_name, &files.version)).await;
    }

    /// Remove every per-version download directory.
    pub async fn cleanup_all(&self) {
        let mut entries = match tokio::fs::read_dir(&self.download_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.download_dir.display(), error = %e, "Nothing to clean up");
                return;
            }
        };
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                        remove_dir(&entry.path()).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.download_dir.display(), error = %e, "Failed to list download directory");
                    break;
                }
            }
        }
        info!(dir = %self.download_dir.display(), "Cleaned up download directories");
    }
}

async fn remove_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "Removed directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove directory"),
    }
}

async fn sha256_of(path: &Path) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = MultiHasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = tokio::io::AsyncReadExt::read(&mut file, &mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().1.sha256)
}

/// Last path segment of `url`, or a generic name for the kind of file.
pub fn filename_from_url(url: &str) -> String {
    let name = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty());
    if let Some(name) = name {
        return name;
    }
    match UrlKind::classify(url) {
        UrlKind::Package => "package.deb",
        UrlKind::Certificate => "certificate.pem",
        UrlKind::Signature => "signature.bin",
        UrlKind::Other if url.contains("deb") => "package.deb",
        UrlKind::Other => "unknown_file",
    }
    .to_string()
}
