//! Mapping from `bluer` device properties to BlueZ property names and values

use std::collections::BTreeMap;

use bluer::DeviceProperty;
use bluescan_core::{PropertyMap, PropertyValue};

/// BlueZ name and value of one device property
///
/// Returns `None` for properties the session bookkeeping has no use for.
pub(crate) fn device_property(property: DeviceProperty) -> Option<(&'static str, PropertyValue)> {
    let entry = match property {
        DeviceProperty::RemoteAddress(address) => ("Address", address.to_string().into()),
        DeviceProperty::AddressType(kind) => ("AddressType", kind.to_string().into()),
        DeviceProperty::Name(name) => ("Name", name.into()),
        DeviceProperty::Alias(alias) => ("Alias", alias.into()),
        DeviceProperty::Icon(icon) => ("Icon", icon.into()),
        DeviceProperty::Class(class) => ("Class", class.into()),
        DeviceProperty::Appearance(appearance) => {
            ("Appearance", PropertyValue::UInt(appearance.into()))
        }
        DeviceProperty::Uuids(uuids) => {
            let mut uuids: Vec<String> = uuids.iter().map(|uuid| uuid.to_string()).collect();
            uuids.sort();
            ("UUIDs", uuids.into())
        }
        DeviceProperty::Paired(paired) => ("Paired", paired.into()),
        DeviceProperty::Connected(connected) => ("Connected", connected.into()),
        DeviceProperty::Trusted(trusted) => ("Trusted", trusted.into()),
        DeviceProperty::Blocked(blocked) => ("Blocked", blocked.into()),
        DeviceProperty::LegacyPairing(legacy) => ("LegacyPairing", legacy.into()),
        DeviceProperty::Rssi(rssi) => ("RSSI", rssi.into()),
        DeviceProperty::TxPower(power) => ("TxPower", power.into()),
        DeviceProperty::ServicesResolved(resolved) => ("ServicesResolved", resolved.into()),
        DeviceProperty::ManufacturerData(data) => {
            let entries: BTreeMap<String, PropertyValue> = data
                .into_iter()
                .map(|(company, bytes)| (format!("{:#06x}", company), bytes.into()))
                .collect();
            ("ManufacturerData", PropertyValue::Map(entries))
        }
        DeviceProperty::ServiceData(data) => {
            let entries: BTreeMap<String, PropertyValue> = data
                .into_iter()
                .map(|(uuid, bytes)| (uuid.to_string(), bytes.into()))
                .collect();
            ("ServiceData", PropertyValue::Map(entries))
        }
        _ => return None,
    };
    Some(entry)
}

/// Collect a full property list into a map
pub(crate) fn device_properties(properties: Vec<DeviceProperty>) -> PropertyMap {
    properties
        .into_iter()
        .filter_map(device_property)
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
