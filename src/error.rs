//! Error taxonomy shared by every stage of a run.

use std::path::PathBuf;

use crate::store::StoreError;

/// Broad classification used to decide how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credentials or capabilities. Raised before anything is mutated.
    Permission,
    /// Network failures and retryable HTTP statuses.
    Transient,
    /// Empty downloads, size or checksum mismatches.
    Integrity,
    /// Malformed metadata or configuration.
    Data,
    /// State store unavailable or rejecting requests.
    Store,
    /// Object storage refused an upload.
    Publish,
    /// Anything else: local I/O, template rendering.
    Internal,
}

/// Errors raised by the repository manager.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Permission check failed for {service} {operation} ({error_code}): {message}")]
    Permission {
        service: String,
        operation: String,
        error_code: String,
        message: String,
    },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Integrity check failed for {}: {message}", path.display())]
    Integrity { path: PathBuf, message: String },

    #[error("Invalid release metadata: {0}")]
    Metadata(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to publish {key}: {message}")]
    Publish {
        key: String,
        message: String,
        retryable: bool,
    },

    #[error("Failed to send notification: {0}")]
    Notification(String),

    #[error("Repository index error: {0}")]
    Index(#[from] apt_repository::AptRepositoryError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// HTTP statuses worth retrying.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

impl Error {
    pub fn permission(
        service: impl Into<String>,
        operation: impl Into<String>,
        error_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Permission {
            service: service.into(),
            operation: operation.into(),
            error_code: error_code.into(),
            message: message.into(),
        }
    }

    pub fn integrity(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Integrity {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Permission { .. } => ErrorKind::Permission,
            Error::Http { status, .. } if RETRYABLE_STATUSES.contains(status) => {
                ErrorKind::Transient
            }
            Error::Http { .. } => ErrorKind::Data,
            Error::Request { source, .. } if source.is_decode() || source.is_builder() => {
                ErrorKind::Data
            }
            Error::Request { .. } => ErrorKind::Transient,
            Error::Integrity { .. } => ErrorKind::Integrity,
            Error::Metadata(_) | Error::Config(_) | Error::Json(_) => ErrorKind::Data,
            Error::Store(StoreError::PermissionDenied(_)) => ErrorKind::Permission,
            Error::Store(_) => ErrorKind::Store,
            Error::Publish { .. } => ErrorKind::Publish,
            Error::Notification(_) | Error::Index(_) | Error::Template(_) | Error::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether repeating the failed call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Publish { retryable, .. } => *retryable,
            _ => self.kind() == ErrorKind::Transient,
        }
    }

    /// Short type name used in failure notifications.
    pub fn type_name(&self) -> &'static str {
        match self {
            Error::Permission { .. } => "PermissionError",
            Error::Http { .. } => "HttpError",
            Error::Request { .. } => "RequestError",
            Error::Integrity { .. } => "IntegrityError",
            Error::Metadata(_) => "MetadataError",
            Error::Config(_) => "ConfigError",
            Error::Store(_) => "StoreError",
            Error::Publish { .. } => "PublishError",
            Error::Notification(_) => "NotificationError",
            Error::Index(_) => "IndexError",
            Error::Template(_) => "TemplateError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
