//! In-memory platform
//!
//! [`SimulatedPlatform`] behaves like a small BlueZ daemon with one adapter: it keeps adapter
//! properties and device objects in memory, delivers injected notifications to subscribers,
//! records every call it receives and fails chosen operations on demand. Tests drive the
//! controller with it and `bluescan --simulate` runs a scan against it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use uuid::Uuid;

use crate::address::address_to_path;
use crate::errors::{BluescanError, Result};
use crate::platform::{
    AdapterProperties, AdapterSetting, Notification, NotificationClass, NotificationStream,
    Platform,
};
use crate::properties::{PropertyMap, PropertyValue};
use crate::protocol::{adapter_path, DEFAULT_ADAPTER_NAME, PROP_ADDRESS, PROP_NAME, PROP_RSSI};

// ----------------------------------------------------------------------------
// Call Log
// ----------------------------------------------------------------------------

/// Operations of the [`Platform`] trait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformOperation {
    Connect,
    AdapterProperties,
    SetAdapterProperty,
    StartDiscovery,
    StopDiscovery,
    DeviceProperties,
    ManagedDevices,
    RemoveDevice,
    Subscribe,
}

/// One recorded call with its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Connect,
    AdapterProperties,
    SetAdapterProperty(AdapterSetting),
    StartDiscovery,
    StopDiscovery,
    DeviceProperties(String),
    ManagedDevices,
    RemoveDevice(String),
    Subscribe(NotificationClass),
}

impl PlatformCall {
    pub fn operation(&self) -> PlatformOperation {
        match self {
            PlatformCall::Connect => PlatformOperation::Connect,
            PlatformCall::AdapterProperties => PlatformOperation::AdapterProperties,
            PlatformCall::SetAdapterProperty(_) => PlatformOperation::SetAdapterProperty,
            PlatformCall::StartDiscovery => PlatformOperation::StartDiscovery,
            PlatformCall::StopDiscovery => PlatformOperation::StopDiscovery,
            PlatformCall::DeviceProperties(_) => PlatformOperation::DeviceProperties,
            PlatformCall::ManagedDevices => PlatformOperation::ManagedDevices,
            PlatformCall::RemoveDevice(_) => PlatformOperation::RemoveDevice,
            PlatformCall::Subscribe(_) => PlatformOperation::Subscribe,
        }
    }
}

// ----------------------------------------------------------------------------
// Simulated Platform
// ----------------------------------------------------------------------------

struct SimulatedState {
    adapter_path: String,
    adapter: AdapterProperties,
    devices: BTreeMap<String, PropertyMap>,
    discoverable_devices: Vec<(String, PropertyMap)>,
    subscribers: HashMap<NotificationClass, Vec<mpsc::UnboundedSender<Notification>>>,
    calls: Vec<PlatformCall>,
    failing: HashSet<PlatformOperation>,
    subscribed_at_stop: Option<usize>,
}

/// In-memory stand-in for the BlueZ daemon
pub struct SimulatedPlatform {
    state: Mutex<SimulatedState>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    /// A powered `hci0` adapter with no devices
    pub fn new() -> Self {
        let adapter = AdapterProperties {
            address: "00:1A:7D:DA:71:13".to_string(),
            alias: "bluescan".to_string(),
            class: 0x6c010c,
            powered: true,
            discoverable: false,
            discoverable_timeout: 180,
            pairable: false,
            pairable_timeout: 0,
            discovering: false,
            uuids: vec![
                Uuid::from_u128(0x0000110e_0000_1000_8000_00805f9b34fb),
                Uuid::from_u128(0x00001200_0000_1000_8000_00805f9b34fb),
            ],
        };

        Self {
            state: Mutex::new(SimulatedState {
                adapter_path: adapter_path(DEFAULT_ADAPTER_NAME),
                adapter,
                devices: BTreeMap::new(),
                discoverable_devices: Vec::new(),
                subscribers: HashMap::new(),
                calls: Vec::new(),
                failing: HashSet::new(),
                subscribed_at_stop: None,
            }),
        }
    }

    /// A platform with a few nearby devices that show up once discovery starts
    pub fn demo() -> Self {
        let platform = Self::new();
        let nearby = [
            ("A4:93:3F:5B:3D:84", Some("Living Room Speaker"), -58i16),
            ("F0:99:B6:12:7C:0E", Some("Fitness Band"), -71),
            ("5C:F3:70:8A:41:D2", None, -88),
        ];
        for (address, name, rssi) in nearby {
            let mut props = PropertyMap::new();
            props.insert(PROP_ADDRESS.to_string(), address.into());
            if let Some(name) = name {
                props.insert(PROP_NAME.to_string(), name.into());
            }
            props.insert(PROP_RSSI.to_string(), PropertyValue::from(rssi));
            platform.add_discoverable_device(platform.device_path(address), props);
        }
        platform
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: PlatformCall) -> Result<()> {
        let mut state = self.state();
        let operation = call.operation();
        state.calls.push(call);
        if state.failing.contains(&operation) {
            return Err(BluescanError::platform_call(
                format!("{:?}", operation),
                "org.bluez.Error.Failed: simulated failure",
            ));
        }
        Ok(())
    }

    /// Object path of the device with `address` under the simulated adapter
    pub fn device_path(&self, address: &str) -> String {
        address_to_path(address, &self.state().adapter_path)
    }

    /// Add a device object the daemon already knows about
    pub fn insert_device<P: Into<String>>(&self, path: P, properties: PropertyMap) {
        self.state().devices.insert(path.into(), properties);
    }

    /// Add a device that appears, with an added notification, when discovery starts
    pub fn add_discoverable_device<P: Into<String>>(&self, path: P, properties: PropertyMap) {
        self.state()
            .discoverable_devices
            .push((path.into(), properties));
    }

    /// Make every later call of `operation` fail
    pub fn fail_on(&self, operation: PlatformOperation) {
        self.state().failing.insert(operation);
    }

    /// Let `operation` succeed again
    pub fn recover(&self, operation: PlatformOperation) {
        self.state().failing.remove(&operation);
    }

    /// Deliver a notification to current subscribers of its class; returns how many got it
    pub fn inject(&self, notification: Notification) -> usize {
        let mut state = self.state();
        Self::deliver(&mut state, notification)
    }

    fn deliver(state: &mut SimulatedState, notification: Notification) -> usize {
        let Some(senders) = state.subscribers.get_mut(&notification.class()) else {
            return 0;
        };
        senders.retain(|tx| tx.unbounded_send(notification.clone()).is_ok());
        senders.len()
    }

    /// Live subscriptions of `class`; dropped streams are not counted
    pub fn subscriber_count(&self, class: NotificationClass) -> usize {
        let mut state = self.state();
        match state.subscribers.get_mut(&class) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }

    /// Live subscriptions of every class when stop-discovery was last called
    pub fn subscribed_at_last_stop(&self) -> Option<usize> {
        self.state().subscribed_at_stop
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state().calls.clone()
    }

    /// How many times `operation` was called
    pub fn call_count(&self, operation: PlatformOperation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Current adapter state without recording a call
    pub fn adapter_snapshot(&self) -> AdapterProperties {
        self.state().adapter.clone()
    }

    /// Device objects currently known, without recording a call
    pub fn device_paths(&self) -> Vec<String> {
        self.state().devices.keys().cloned().collect()
    }
}

#[async_trait]
impl Platform for SimulatedPlatform {
    async fn connect(&self) -> Result<String> {
        self.record(PlatformCall::Connect)?;
        Ok(self.state().adapter_path.clone())
    }

    async fn adapter_properties(&self) -> Result<AdapterProperties> {
        self.record(PlatformCall::AdapterProperties)?;
        Ok(self.state().adapter.clone())
    }

    async fn set_adapter_property(&self, setting: AdapterSetting) -> Result<()> {
        self.record(PlatformCall::SetAdapterProperty(setting.clone()))?;
        let mut state = self.state();
        let adapter = &mut state.adapter;
        match setting {
            AdapterSetting::Discoverable(value) => adapter.discoverable = value,
            AdapterSetting::Pairable(value) => adapter.pairable = value,
            AdapterSetting::Powered(value) => adapter.powered = value,
            AdapterSetting::Alias(value) => adapter.alias = value,
            AdapterSetting::DiscoverableTimeout(value) => adapter.discoverable_timeout = value,
            AdapterSetting::PairableTimeout(value) => adapter.pairable_timeout = value,
        }
        Ok(())
    }

    async fn start_discovery(&self) -> Result<()> {
        self.record(PlatformCall::StartDiscovery)?;
        let mut state = self.state();
        if !state.adapter.powered {
            return Err(BluescanError::platform_call(
                "StartDiscovery",
                "org.bluez.Error.NotReady: Resource Not Ready",
            ));
        }
        state.adapter.discovering = true;

        let found = std::mem::take(&mut state.discoverable_devices);
        for (path, properties) in found {
            state.devices.insert(path.clone(), properties.clone());
            Self::deliver(&mut state, Notification::device_added(path, properties));
        }
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<()> {
        {
            let mut state = self.state();
            let live = state
                .subscribers
                .values()
                .flatten()
                .filter(|tx| !tx.is_closed())
                .count();
            state.subscribed_at_stop = Some(live);
        }
        self.record(PlatformCall::StopDiscovery)?;
        let mut state = self.state();
        if !state.adapter.discovering {
            return Err(BluescanError::platform_call(
                "StopDiscovery",
                "org.bluez.Error.Failed: No discovery started",
            ));
        }
        state.adapter.discovering = false;
        Ok(())
    }

    async fn device_properties(&self, path: &str) -> Result<PropertyMap> {
        self.record(PlatformCall::DeviceProperties(path.to_string()))?;
        self.state().devices.get(path).cloned().ok_or_else(|| {
            BluescanError::platform_call(
                "GetAll",
                format!("org.freedesktop.DBus.Error.UnknownObject: {}", path),
            )
        })
    }

    async fn managed_devices(&self) -> Result<Vec<(String, PropertyMap)>> {
        self.record(PlatformCall::ManagedDevices)?;
        Ok(self
            .state()
            .devices
            .iter()
            .map(|(path, props)| (path.clone(), props.clone()))
            .collect())
    }

    async fn remove_device(&self, path: &str) -> Result<()> {
        self.record(PlatformCall::RemoveDevice(path.to_string()))?;
        let mut state = self.state();
        if state.devices.remove(path).is_none() {
            return Err(BluescanError::platform_call(
                "RemoveDevice",
                "org.bluez.Error.DoesNotExist: Does Not Exist",
            ));
        }
        Self::deliver(&mut state, Notification::device_removed(path));
        Ok(())
    }

    async fn subscribe(&self, class: NotificationClass) -> Result<NotificationStream> {
        self.record(PlatformCall::Subscribe(class))?;
        let (tx, rx) = mpsc::unbounded();
        self.state().subscribers.entry(class).or_default().push(tx);
        Ok(rx.boxed())
    }
}
