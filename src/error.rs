use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum NamingError {
    #[error("name has to be a non-empty string")]
    Empty,

    #[error("name '{name}' does not match pattern '{pattern}'")]
    Mismatch { name: String, pattern: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum QtlError {
    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("invalid name pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("invalid config value: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("storage request failed: {0}")]
    StorageHttp(String),

    #[error("storage returned status {status}: {message}")]
    StorageStatus { status: u16, message: String },

    #[error("failed to write manifest: {0}")]
    Output(String),
}
