//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("Invalid version range '{range}': {message}")]
    InvalidVersionRange { range: String, message: String },

    #[error("Invalid URL template '{template}': missing {placeholder}")]
    InvalidTemplate {
        template: String,
        placeholder: String,
    },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
