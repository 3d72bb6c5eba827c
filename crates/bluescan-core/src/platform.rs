//! The seam between the controller and the BlueZ daemon
//!
//! Everything the controller needs from the system bus goes through [`Platform`]. The
//! `bluescan-bluez` crate implements it over `bluer`; [`crate::simulated::SimulatedPlatform`]
//! implements it in memory.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;
use crate::properties::PropertyMap;
use crate::protocol::{DBUS_OBJECT_MANAGER_INTERFACE, DBUS_PROPERTIES_INTERFACE, DEVICE_INTERFACE};

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

/// The three signal categories a discovery session subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationClass {
    InterfacesAdded,
    InterfacesRemoved,
    PropertiesChanged,
}

impl NotificationClass {
    pub const ALL: [NotificationClass; 3] = [
        NotificationClass::InterfacesAdded,
        NotificationClass::InterfacesRemoved,
        NotificationClass::PropertiesChanged,
    ];

    /// D-Bus signal member name
    pub fn signal_name(&self) -> &'static str {
        match self {
            NotificationClass::InterfacesAdded => "InterfacesAdded",
            NotificationClass::InterfacesRemoved => "InterfacesRemoved",
            NotificationClass::PropertiesChanged => "PropertiesChanged",
        }
    }

    /// D-Bus interface emitting the signal
    pub fn dbus_interface(&self) -> &'static str {
        match self {
            NotificationClass::InterfacesAdded | NotificationClass::InterfacesRemoved => {
                DBUS_OBJECT_MANAGER_INTERFACE
            }
            NotificationClass::PropertiesChanged => DBUS_PROPERTIES_INTERFACE,
        }
    }
}

impl fmt::Display for NotificationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.signal_name())
    }
}

/// A signal delivered by the platform
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// An object gained interfaces, with the initial properties of each
    InterfacesAdded {
        path: String,
        interfaces: BTreeMap<String, PropertyMap>,
    },
    /// An object lost interfaces
    InterfacesRemoved {
        path: String,
        interfaces: Vec<String>,
    },
    /// Properties of one interface of an object changed
    PropertiesChanged {
        path: String,
        interface: String,
        changed: PropertyMap,
        invalidated: Vec<String>,
    },
}

impl Notification {
    /// A device object appeared, carrying its initial properties
    pub fn device_added<P: Into<String>>(path: P, properties: PropertyMap) -> Self {
        let mut interfaces = BTreeMap::new();
        interfaces.insert(DEVICE_INTERFACE.to_string(), properties);
        Notification::InterfacesAdded {
            path: path.into(),
            interfaces,
        }
    }

    /// A device object disappeared
    pub fn device_removed<P: Into<String>>(path: P) -> Self {
        Notification::InterfacesRemoved {
            path: path.into(),
            interfaces: vec![DEVICE_INTERFACE.to_string()],
        }
    }

    /// Properties of a device object changed
    pub fn device_changed<P: Into<String>>(path: P, changed: PropertyMap) -> Self {
        Notification::PropertiesChanged {
            path: path.into(),
            interface: DEVICE_INTERFACE.to_string(),
            changed,
            invalidated: Vec::new(),
        }
    }

    pub fn class(&self) -> NotificationClass {
        match self {
            Notification::InterfacesAdded { .. } => NotificationClass::InterfacesAdded,
            Notification::InterfacesRemoved { .. } => NotificationClass::InterfacesRemoved,
            Notification::PropertiesChanged { .. } => NotificationClass::PropertiesChanged,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Notification::InterfacesAdded { path, .. }
            | Notification::InterfacesRemoved { path, .. }
            | Notification::PropertiesChanged { path, .. } => path,
        }
    }
}

/// Stream of notifications for one subscription; dropping it unsubscribes
pub type NotificationStream = BoxStream<'static, Notification>;

// ----------------------------------------------------------------------------
// Adapter Properties
// ----------------------------------------------------------------------------

/// Snapshot of the adapter's properties, fetched fresh on every read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterProperties {
    pub address: String,
    pub alias: String,
    pub class: u32,
    pub powered: bool,
    pub discoverable: bool,
    pub discoverable_timeout: u32,
    pub pairable: bool,
    pub pairable_timeout: u32,
    pub discovering: bool,
    pub uuids: Vec<Uuid>,
}

/// One adapter property write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterSetting {
    Discoverable(bool),
    Pairable(bool),
    Powered(bool),
    Alias(String),
    DiscoverableTimeout(u32),
    PairableTimeout(u32),
}

impl AdapterSetting {
    /// BlueZ property name written by this setting
    pub fn property_name(&self) -> &'static str {
        match self {
            AdapterSetting::Discoverable(_) => "Discoverable",
            AdapterSetting::Pairable(_) => "Pairable",
            AdapterSetting::Powered(_) => "Powered",
            AdapterSetting::Alias(_) => "Alias",
            AdapterSetting::DiscoverableTimeout(_) => "DiscoverableTimeout",
            AdapterSetting::PairableTimeout(_) => "PairableTimeout",
        }
    }
}

// ----------------------------------------------------------------------------
// Platform Trait
// ----------------------------------------------------------------------------

/// Access to the Bluetooth daemon on the system bus
#[async_trait]
pub trait Platform: Send + Sync + 'static {
    /// Open the bus connection if needed and resolve the adapter; returns its object path
    async fn connect(&self) -> Result<String>;

    /// Fetch every adapter property in one round trip
    async fn adapter_properties(&self) -> Result<AdapterProperties>;

    /// Write one adapter property
    async fn set_adapter_property(&self, setting: AdapterSetting) -> Result<()>;

    /// Ask the adapter to start discovery
    async fn start_discovery(&self) -> Result<()>;

    /// Ask the adapter to stop discovery
    async fn stop_discovery(&self) -> Result<()>;

    /// Fetch the full property set of the device object at `path`
    async fn device_properties(&self, path: &str) -> Result<PropertyMap>;

    /// Every device object the daemon currently knows, with its properties
    async fn managed_devices(&self) -> Result<Vec<(String, PropertyMap)>>;

    /// Ask the adapter to forget the device object at `path`
    async fn remove_device(&self, path: &str) -> Result<()>;

    /// Subscribe to one notification class
    async fn subscribe(&self, class: NotificationClass) -> Result<NotificationStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_class_names() {
        assert_eq!(NotificationClass::InterfacesAdded.signal_name(), "InterfacesAdded");
        assert_eq!(
            NotificationClass::PropertiesChanged.dbus_interface(),
            "org.freedesktop.DBus.Properties"
        );
        assert_eq!(
            NotificationClass::InterfacesRemoved.dbus_interface(),
            "org.freedesktop.DBus.ObjectManager"
        );
    }

    #[test]
    fn test_device_notification_constructors() {
        let added = Notification::device_added("/org/bluez/hci0/dev_A", PropertyMap::new());
        assert_eq!(added.class(), NotificationClass::InterfacesAdded);
        assert_eq!(added.path(), "/org/bluez/hci0/dev_A");
        match added {
            Notification::InterfacesAdded { interfaces, .. } => {
                assert!(interfaces.contains_key(DEVICE_INTERFACE));
            }
            other => panic!("unexpected notification {:?}", other),
        }

        let removed = Notification::device_removed("/org/bluez/hci0/dev_A");
        assert_eq!(removed.class(), NotificationClass::InterfacesRemoved);
    }
}
