//! Discovery configuration

use std::time::Duration;

use crate::errors::{BluescanError, Result};
use crate::mode::OperationMode;
use crate::protocol::{DEFAULT_DISCOVERY_TIMEOUT, MAX_DISCOVERY_TIMEOUT};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for discovery sessions
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Adapter name (`hci0`) or address to use; the default adapter when unset
    pub adapter: Option<String>,
    /// How long a session keeps discovery running before tearing down
    pub discovery_timeout_secs: u64,
    /// Mode started by the command-line entry point
    pub operation_mode: OperationMode,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT.as_secs(),
            operation_mode: OperationMode::ScanAll,
        }
    }
}

impl DiscoveryConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the adapter by name or address
    pub fn with_adapter<T: Into<String>>(mut self, pattern: T) -> Self {
        self.adapter = Some(pattern.into());
        self
    }

    /// Set the discovery timeout
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the operation mode
    pub fn with_operation_mode(mut self, mode: OperationMode) -> Self {
        self.operation_mode = mode;
        self
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.discovery_timeout_secs == 0 {
            return Err(BluescanError::config_error(
                "Discovery timeout must be greater than 0",
            ));
        }
        if self.discovery_timeout() > MAX_DISCOVERY_TIMEOUT {
            return Err(BluescanError::config_error(format!(
                "Discovery timeout must be at most {}s",
                MAX_DISCOVERY_TIMEOUT.as_secs()
            )));
        }
        if let Some(pattern) = &self.adapter {
            if pattern.trim().is_empty() {
                return Err(BluescanError::config_error("Adapter pattern must not be empty"));
            }
        }
        Ok(())
    }
}
