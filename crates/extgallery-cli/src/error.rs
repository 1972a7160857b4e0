//! CLI error types with exit code handling
//!
//! Gallery errors are mapped onto a small set of diagnostics, each with its
//! own exit code.

use extgallery_client::{GalleryError, GalleryErrorCode};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid command line input
    #[error("Invalid input: {message}")]
    #[diagnostic(code(extgallery::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Nothing matched the request
    #[error("{message}")]
    #[diagnostic(code(extgallery::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(extgallery::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Registry unreachable or timed out
    #[error("Network error: {message}")]
    #[diagnostic(
        code(extgallery::cli::network),
        help("Check your connection, or point EXTGALLERY_SERVICE_URL at a reachable gallery")
    )]
    Network { message: String },

    /// The registry answered with a failure
    #[error("Gallery error: {message}")]
    #[diagnostic(code(extgallery::cli::gallery))]
    Gallery { message: String },

    /// IO error (file not writable, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(extgallery::cli::io))]
    Io { message: String },

    #[error("Interrupted")]
    #[diagnostic(code(extgallery::cli::cancelled))]
    Cancelled,
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::USAGE_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Network { .. } => exit_codes::NETWORK_ERROR,
            CliError::Gallery { .. } => exit_codes::ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Cancelled => exit_codes::CANCELLED,
        }
    }

    /// Create an input error
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a not found error with help text
    pub fn not_found(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<GalleryError> for CliError {
    fn from(err: GalleryError) -> Self {
        let message = err.to_string();
        match err.code() {
            GalleryErrorCode::Cancelled => CliError::Cancelled,
            GalleryErrorCode::Offline | GalleryErrorCode::Timeout => CliError::Network { message },
            GalleryErrorCode::InvalidConfig => CliError::Config {
                message,
                help: Some("Run 'extgallery config path' to locate the configuration file".into()),
            },
            GalleryErrorCode::DownloadFailedWriting => CliError::Io { message },
            GalleryErrorCode::NotFound => CliError::NotFound {
                message,
                help: None,
            },
            GalleryErrorCode::Failed => CliError::Gallery { message },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Io {
            message: format!("Cannot encode output: {}", err),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::Io {
            message: format!("Cannot encode output: {}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gallery_error_mapping() {
        let cases = [
            (GalleryError::Cancelled, exit_codes::CANCELLED),
            (
                GalleryError::Timeout {
                    message: "slow".into(),
                },
                exit_codes::NETWORK_ERROR,
            ),
            (
                GalleryError::invalid_config("bad template"),
                exit_codes::CONFIG_ERROR,
            ),
            (
                GalleryError::DownloadFailedWriting {
                    path: "/tmp/x".into(),
                    message: "disk full".into(),
                },
                exit_codes::IO_ERROR,
            ),
            (GalleryError::failed("500"), exit_codes::ERROR),
        ];
        for (error, code) in cases {
            assert_eq!(CliError::from(error).exit_code(), code);
        }
    }
}
