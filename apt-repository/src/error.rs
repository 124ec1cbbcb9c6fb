//! Error types for the APT repository library.

/// Result type for APT repository operations.
pub type Result<T> = std::result::Result<T, AptRepositoryError>;

/// Errors that can occur when working with APT repositories.
#[derive(Debug, thiserror::Error)]
pub enum AptRepositoryError {
    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid repository configuration.
    #[error("Invalid repository configuration: {0}")]
    InvalidConfiguration(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid field value.
    #[error("Invalid field value for '{field}': {value}")]
    InvalidField { field: String, value: String },

    /// Directory creation failed.
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        source: std::io::Error,
    },
}

impl AptRepositoryError {
    /// Create a new invalid configuration error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a new missing field error.
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        Self::MissingField(field.into())
    }

    /// Create a new invalid field error.
    pub fn invalid_field<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        Self::InvalidField {
            field: field.into(),
            value: value.into(),
        }
    }
}
