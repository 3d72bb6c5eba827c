//! Error handling for the bluescan CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluescan_core::BluescanError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
