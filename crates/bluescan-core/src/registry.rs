//! Last-known properties of the devices seen during one discovery session

use std::collections::HashMap;

use crate::properties::{merge_properties, PropertyMap};

// ----------------------------------------------------------------------------
// Device Records
// ----------------------------------------------------------------------------

/// Properties last reported for one device object
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// BlueZ object path of the device
    pub path: String,
    /// Merged property set
    pub properties: PropertyMap,
}

impl DeviceRecord {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            properties: PropertyMap::new(),
        }
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Device path to record mapping plus the session's running device counter
///
/// The counter moves with added and removed notifications, independently of how many records
/// change notifications created.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
    device_counter: usize,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a newly added device and merge its fetched property set
    pub fn record_added(&mut self, path: &str, properties: PropertyMap) -> &DeviceRecord {
        self.device_counter += 1;
        let record = self
            .devices
            .entry(path.to_string())
            .or_insert_with(|| DeviceRecord::new(path));
        merge_properties(&mut record.properties, properties);
        record
    }

    /// Merge changed properties into the record for `path`, creating it when absent
    pub fn merge_changed(&mut self, path: &str, changed: PropertyMap) -> &DeviceRecord {
        let record = self
            .devices
            .entry(path.to_string())
            .or_insert_with(|| DeviceRecord::new(path));
        merge_properties(&mut record.properties, changed);
        record
    }

    /// Drop the record for `path`; the counter only moves when a record existed
    pub fn remove(&mut self, path: &str) -> Option<DeviceRecord> {
        let removed = self.devices.remove(path);
        if removed.is_some() {
            self.device_counter = self.device_counter.saturating_sub(1);
        }
        removed
    }

    pub fn get(&self, path: &str) -> Option<&DeviceRecord> {
        self.devices.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.devices.contains_key(path)
    }

    /// Running device counter
    pub fn device_count(&self) -> usize {
        self.device_counter
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Copy of every record, sorted by path
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self.devices.values().cloned().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    /// Forget every record and zero the counter
    pub fn reset(&mut self) {
        self.devices.clear();
        self.device_counter = 0;
    }
}
