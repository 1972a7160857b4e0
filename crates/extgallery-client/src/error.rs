//! Error types for gallery operations

use extgallery_core::CoreError;
use std::fmt;
use thiserror::Error;

/// Gallery operation errors
///
/// Variants carry messages rather than sources so a single batch failure can
/// be handed to every identity of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GalleryError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Registry unreachable: {message}")]
    Offline { message: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("{message}")]
    Failed { message: String },

    #[error("Failed to write download to {path}: {message}")]
    DownloadFailedWriting { path: String, message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Invalid gallery configuration: {message}")]
    InvalidConfig { message: String },
}

/// Stable error codes, used as telemetry values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GalleryErrorCode {
    Cancelled,
    Offline,
    Timeout,
    Failed,
    DownloadFailedWriting,
    NotFound,
    InvalidConfig,
}

impl GalleryErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            GalleryErrorCode::Cancelled => "Cancelled",
            GalleryErrorCode::Offline => "Offline",
            GalleryErrorCode::Timeout => "Timeout",
            GalleryErrorCode::Failed => "Failed",
            GalleryErrorCode::DownloadFailedWriting => "DownloadFailedWriting",
            GalleryErrorCode::NotFound => "NotFound",
            GalleryErrorCode::InvalidConfig => "InvalidConfig",
        }
    }
}

impl fmt::Display for GalleryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GalleryError {
    pub fn code(&self) -> GalleryErrorCode {
        match self {
            GalleryError::Cancelled => GalleryErrorCode::Cancelled,
            GalleryError::Offline { .. } => GalleryErrorCode::Offline,
            GalleryError::Timeout { .. } => GalleryErrorCode::Timeout,
            GalleryError::Failed { .. } => GalleryErrorCode::Failed,
            GalleryError::DownloadFailedWriting { .. } => GalleryErrorCode::DownloadFailedWriting,
            GalleryError::NotFound { .. } => GalleryErrorCode::NotFound,
            GalleryError::InvalidConfig { .. } => GalleryErrorCode::InvalidConfig,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        GalleryError::Failed {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        GalleryError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GalleryError::Cancelled)
    }
}

/// Result type for gallery operations
pub type Result<T> = std::result::Result<T, GalleryError>;

impl From<reqwest::Error> for GalleryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GalleryError::Timeout {
                message: e.to_string(),
            }
        } else if e.is_connect() {
            GalleryError::Offline {
                message: format!("Connection failed: {}", e),
            }
        } else {
            GalleryError::Failed {
                message: e.to_string(),
            }
        }
    }
}

impl From<std::io::Error> for GalleryError {
    fn from(e: std::io::Error) -> Self {
        GalleryError::Failed {
            message: format!("IO error: {}", e),
        }
    }
}

impl From<serde_json::Error> for GalleryError {
    fn from(e: serde_json::Error) -> Self {
        GalleryError::Failed {
            message: format!("Invalid JSON response: {}", e),
        }
    }
}

impl From<serde_yaml::Error> for GalleryError {
    fn from(e: serde_yaml::Error) -> Self {
        GalleryError::InvalidConfig {
            message: e.to_string(),
        }
    }
}

impl From<url::ParseError> for GalleryError {
    fn from(e: url::ParseError) -> Self {
        GalleryError::InvalidConfig {
            message: format!("Invalid URL: {}", e),
        }
    }
}

impl From<CoreError> for GalleryError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidTemplate { .. } | CoreError::InvalidVersion(_) => {
                GalleryError::InvalidConfig {
                    message: e.to_string(),
                }
            }
            other => GalleryError::Failed {
                message: other.to_string(),
            },
        }
    }
}
