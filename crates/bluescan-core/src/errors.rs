//! Error types for the bluescan core
//!
//! Every fallible operation in this crate returns [`BluescanError`]. Errors raised while a
//! discovery session is starting propagate to the caller; errors raised during teardown are
//! logged and absorbed by the controller and never surface here.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Core error type for discovery control and adapter access
#[derive(Debug, Error)]
pub enum BluescanError {
    #[error("Unknown operation mode: {mode}")]
    UnknownMode { mode: String },

    #[error("{operation} failed: {reason}")]
    PlatformCall { operation: String, reason: String },

    #[error("Malformed device path: {path}")]
    MalformedPath { path: String },

    #[error("Invalid Bluetooth address: {address}")]
    InvalidAddress { address: String },

    #[error("Bluetooth adapter not found: {pattern}")]
    AdapterNotFound { pattern: String },

    #[error("Bluetooth platform unavailable: {reason}")]
    PlatformUnavailable { reason: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl BluescanError {
    /// Create an unknown mode error
    pub fn unknown_mode<T: Into<String>>(mode: T) -> Self {
        BluescanError::UnknownMode { mode: mode.into() }
    }

    /// Create a platform call error from the operation name and underlying failure
    pub fn platform_call<O: Into<String>, R: ToString>(operation: O, reason: R) -> Self {
        BluescanError::PlatformCall {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a malformed path error
    pub fn malformed_path<T: Into<String>>(path: T) -> Self {
        BluescanError::MalformedPath { path: path.into() }
    }

    /// Create an invalid address error
    pub fn invalid_address<T: Into<String>>(address: T) -> Self {
        BluescanError::InvalidAddress {
            address: address.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        BluescanError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a platform unavailable error with a reason
    pub fn unavailable<T: Into<String>>(reason: T) -> Self {
        BluescanError::PlatformUnavailable {
            reason: reason.into(),
        }
    }

    /// Whether this error came from a failed platform call
    pub fn is_platform_call(&self) -> bool {
        matches!(self, BluescanError::PlatformCall { .. })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, BluescanError>;
