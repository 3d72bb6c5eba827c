//! Fallback platform for systems without BlueZ

use async_trait::async_trait;
use tracing::warn;

use bluescan_core::{
    AdapterProperties, AdapterSetting, BluescanError, NotificationClass, NotificationStream,
    Platform, PropertyMap, Result,
};

// ----------------------------------------------------------------------------
// Fallback Implementation
// ----------------------------------------------------------------------------

/// Platform for systems without a BlueZ daemon; every call fails
pub struct UnsupportedPlatform {
    pattern: Option<String>,
}

impl UnsupportedPlatform {
    pub fn new(pattern: Option<String>) -> Self {
        Self { pattern }
    }

    fn unavailable<T>(&self) -> Result<T> {
        Err(BluescanError::unavailable(format!(
            "BlueZ is only available on Linux (adapter {})",
            self.pattern.as_deref().unwrap_or("default")
        )))
    }
}

#[async_trait]
impl Platform for UnsupportedPlatform {
    async fn connect(&self) -> Result<String> {
        warn!(
            "Bluetooth discovery not supported on this platform. \
            Use a Linux host with BlueZ, or run with --simulate."
        );
        self.unavailable()
    }

    async fn adapter_properties(&self) -> Result<AdapterProperties> {
        self.unavailable()
    }

    async fn set_adapter_property(&self, _setting: AdapterSetting) -> Result<()> {
        self.unavailable()
    }

    async fn start_discovery(&self) -> Result<()> {
        self.unavailable()
    }

    async fn stop_discovery(&self) -> Result<()> {
        self.unavailable()
    }

    async fn device_properties(&self, _path: &str) -> Result<PropertyMap> {
        self.unavailable()
    }

    async fn managed_devices(&self) -> Result<Vec<(String, PropertyMap)>> {
        self.unavailable()
    }

    async fn remove_device(&self, _path: &str) -> Result<()> {
        self.unavailable()
    }

    async fn subscribe(&self, _class: NotificationClass) -> Result<NotificationStream> {
        self.unavailable()
    }
}
