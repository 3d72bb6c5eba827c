//! BlueZ D-Bus names and constants

use std::time::Duration;

// ----------------------------------------------------------------------------
// Bus Names and Object Paths
// ----------------------------------------------------------------------------

/// Well-known bus name of the BlueZ daemon
pub const BLUEZ_SERVICE_NAME: &str = "org.bluez";

/// Object path namespace under which adapters live
pub const BLUEZ_NAMESPACE: &str = "/org/bluez/";

/// Adapter used when no pattern is configured
pub const DEFAULT_ADAPTER_NAME: &str = "hci0";

/// Prefix of the last path segment of a device object
pub const DEVICE_PATH_PREFIX: &str = "dev_";

// ----------------------------------------------------------------------------
// Interfaces
// ----------------------------------------------------------------------------

/// Adapter interface
pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";

/// Remote device interface
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";

/// Standard properties interface
pub const DBUS_PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Standard object manager interface
pub const DBUS_OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";

// ----------------------------------------------------------------------------
// Device Property Names
// ----------------------------------------------------------------------------

pub const PROP_ADDRESS: &str = "Address";
pub const PROP_NAME: &str = "Name";
pub const PROP_RSSI: &str = "RSSI";
pub const PROP_ADAPTER: &str = "Adapter";
pub const PROP_MODALIAS: &str = "Modalias";

// ----------------------------------------------------------------------------
// Timing
// ----------------------------------------------------------------------------

/// How long a scan-all session keeps discovery running
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest discovery timeout a configuration may ask for (one week)
pub const MAX_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Build the object path of an adapter from its name (`hci0` -> `/org/bluez/hci0`)
pub fn adapter_path(adapter_name: &str) -> String {
    format!("{}{}", BLUEZ_NAMESPACE, adapter_name)
}
