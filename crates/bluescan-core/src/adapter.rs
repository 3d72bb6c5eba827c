//! Read/write facade over the local Bluetooth adapter
//!
//! Every read fetches a fresh [`AdapterProperties`] snapshot from the platform, so two reads
//! may observe different adapter states. Writes issue exactly one property write each.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::address::{address_to_path, is_device_path, normalize_address, path_to_address};
use crate::errors::Result;
use crate::platform::{AdapterProperties, AdapterSetting, Platform};
use crate::properties::PropertyMap;
use crate::protocol::{PROP_ADAPTER, PROP_ADDRESS, PROP_MODALIAS};

// ----------------------------------------------------------------------------
// Adapter Facade
// ----------------------------------------------------------------------------

/// Facade exposing the adapter's properties and discovery actions
pub struct BluetoothAdapter<P: Platform> {
    platform: Arc<P>,
}

impl<P: Platform> Clone for BluetoothAdapter<P> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
        }
    }
}

impl<P: Platform> BluetoothAdapter<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self { platform }
    }

    /// Fetch the full property snapshot
    pub async fn properties(&self) -> Result<AdapterProperties> {
        self.platform.adapter_properties().await
    }

    pub async fn uuids(&self) -> Result<Vec<Uuid>> {
        Ok(self.properties().await?.uuids)
    }

    pub async fn discoverable(&self) -> Result<bool> {
        Ok(self.properties().await?.discoverable)
    }

    pub async fn discovering(&self) -> Result<bool> {
        Ok(self.properties().await?.discovering)
    }

    pub async fn pairable(&self) -> Result<bool> {
        Ok(self.properties().await?.pairable)
    }

    pub async fn powered(&self) -> Result<bool> {
        Ok(self.properties().await?.powered)
    }

    pub async fn address(&self) -> Result<String> {
        Ok(self.properties().await?.address)
    }

    pub async fn alias(&self) -> Result<String> {
        Ok(self.properties().await?.alias)
    }

    /// Class of device bitfield
    pub async fn device_class(&self) -> Result<u32> {
        Ok(self.properties().await?.class)
    }

    /// Seconds the adapter stays discoverable; 0 means forever
    pub async fn discoverable_timeout(&self) -> Result<u32> {
        Ok(self.properties().await?.discoverable_timeout)
    }

    /// Seconds the adapter stays pairable; 0 means forever
    pub async fn pairable_timeout(&self) -> Result<u32> {
        Ok(self.properties().await?.pairable_timeout)
    }

    pub async fn set_discoverable(&self, discoverable: bool) -> Result<()> {
        self.write(AdapterSetting::Discoverable(discoverable)).await
    }

    pub async fn set_pairable(&self, pairable: bool) -> Result<()> {
        self.write(AdapterSetting::Pairable(pairable)).await
    }

    pub async fn set_powered(&self, powered: bool) -> Result<()> {
        self.write(AdapterSetting::Powered(powered)).await
    }

    pub async fn set_alias<T: Into<String>>(&self, alias: T) -> Result<()> {
        self.write(AdapterSetting::Alias(alias.into())).await
    }

    pub async fn set_discoverable_timeout(&self, seconds: u32) -> Result<()> {
        self.write(AdapterSetting::DiscoverableTimeout(seconds)).await
    }

    pub async fn set_pairable_timeout(&self, seconds: u32) -> Result<()> {
        self.write(AdapterSetting::PairableTimeout(seconds)).await
    }

    async fn write(&self, setting: AdapterSetting) -> Result<()> {
        debug!("Setting adapter property {}", setting.property_name());
        self.platform.set_adapter_property(setting).await
    }

    /// Start discovery; a platform failure is logged and reported as `false`
    pub async fn start_discovery(&self) -> bool {
        match self.platform.start_discovery().await {
            Ok(()) => {
                info!("Discovery started");
                true
            }
            Err(e) => {
                error!("Error while starting discovery: {}", e);
                false
            }
        }
    }

    /// Stop discovery; a platform failure is logged and reported as `false`
    pub async fn stop_discovery(&self) -> bool {
        match self.platform.stop_discovery().await {
            Ok(()) => {
                info!("Discovery stopped");
                true
            }
            Err(e) => {
                error!("Error while stopping discovery: {}", e);
                false
            }
        }
    }

    /// Devices the daemon already knows under this adapter, keyed by address
    ///
    /// Child objects of devices are skipped, and the `Adapter` and `Modalias` entries are
    /// dropped from each property set.
    pub async fn known_devices(&self) -> Result<BTreeMap<String, PropertyMap>> {
        let adapter_path = self.platform.connect().await?;
        let mut devices = BTreeMap::new();

        for (path, mut properties) in self.platform.managed_devices().await? {
            if !is_device_path(&path, &adapter_path) {
                continue;
            }
            let address = match path_to_address(&path) {
                Ok(address) => address,
                Err(e) => {
                    debug!("Skipping {}: {}", path, e);
                    continue;
                }
            };
            properties.remove(PROP_ADAPTER);
            properties.remove(PROP_MODALIAS);
            devices.insert(address, properties);
        }

        Ok(devices)
    }

    /// Full property set of the device with `address`
    pub async fn device_properties(&self, address: &str) -> Result<PropertyMap> {
        let path = self.device_path(address).await?;
        self.platform.device_properties(&path).await
    }

    /// Object path of the known device reporting `address` on this adapter
    ///
    /// Matches the device's `Address` property rather than its path, and only among the
    /// devices of the adapter the platform selected. `None` when no such device is known.
    pub async fn find_device(&self, address: &str) -> Result<Option<String>> {
        let address = normalize_address(address)?;
        let adapter_path = self.platform.connect().await?;

        let found = self
            .platform
            .managed_devices()
            .await?
            .into_iter()
            .find(|(path, properties)| {
                is_device_path(path, &adapter_path)
                    && properties
                        .get(PROP_ADDRESS)
                        .and_then(|value| value.as_str())
                        .is_some_and(|reported| reported.eq_ignore_ascii_case(&address))
            })
            .map(|(path, _)| path);

        if found.is_none() {
            debug!("Device {} not known on {}", address, adapter_path);
        }
        Ok(found)
    }

    /// Ask the daemon to forget the device with `address`; failures are logged and reported
    /// as `false`
    pub async fn remove_device(&self, address: &str) -> bool {
        let path = match self.device_path(address).await {
            Ok(path) => path,
            Err(e) => {
                error!("Cannot remove device {}: {}", address, e);
                return false;
            }
        };

        match self.platform.remove_device(&path).await {
            Ok(()) => {
                info!("Removed device {}", address);
                true
            }
            Err(e) => {
                error!("Error while removing device {}: {}", address, e);
                false
            }
        }
    }

    async fn device_path(&self, address: &str) -> Result<String> {
        let address = normalize_address(address)?;
        let adapter_path = self.platform.connect().await?;
        Ok(address_to_path(&address, &adapter_path))
    }
}
