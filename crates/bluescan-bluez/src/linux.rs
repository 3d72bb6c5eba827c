//! Linux platform using bluer (BlueZ)

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bluer::{Adapter, AdapterEvent, Address, DeviceEvent, Session};
use futures::stream::{self, AbortHandle, Abortable, BoxStream, SelectAll};
use futures::StreamExt;
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bluescan_core::address::{address_to_path, path_to_address};
use bluescan_core::protocol::{adapter_path, DEVICE_INTERFACE};
use bluescan_core::{
    AdapterProperties, AdapterSetting, BluescanError, Notification, NotificationClass,
    NotificationStream, Platform, PropertyMap, Result,
};

use crate::convert::{device_properties, device_property};

// ----------------------------------------------------------------------------
// Connection
// ----------------------------------------------------------------------------

struct Connection {
    // Keeps the D-Bus connection alive for the adapter handle
    _session: Session,
    adapter: Adapter,
    adapter_path: String,
}

impl Connection {
    async fn open(pattern: Option<&str>) -> Result<Self> {
        let session = Session::new()
            .await
            .map_err(|e| BluescanError::unavailable(format!("BlueZ session: {}", e)))?;

        let adapter = match pattern {
            Some(pattern) => find_adapter(&session, pattern).await?,
            None => session
                .default_adapter()
                .await
                .map_err(|e| BluescanError::platform_call("default_adapter", e))?,
        };

        let adapter_path = adapter_path(adapter.name());
        info!("Using Bluetooth adapter {}", adapter_path);
        Ok(Self {
            _session: session,
            adapter,
            adapter_path,
        })
    }

    fn device_address(&self, path: &str) -> Result<Address> {
        path_to_address(path)?
            .parse()
            .map_err(|_| BluescanError::malformed_path(path))
    }

    fn device_path(&self, address: Address) -> String {
        address_to_path(&address.to_string(), &self.adapter_path)
    }
}

/// Find the adapter whose name, object path suffix or address matches `pattern`
async fn find_adapter(session: &Session, pattern: &str) -> Result<Adapter> {
    let names = session
        .adapter_names()
        .await
        .map_err(|e| BluescanError::platform_call("adapter_names", e))?;

    for name in names {
        let adapter = session
            .adapter(&name)
            .map_err(|e| BluescanError::platform_call("adapter", e))?;
        if name == pattern || adapter_path(&name).ends_with(pattern) {
            return Ok(adapter);
        }
        match adapter.address().await {
            Ok(address) if address.to_string().eq_ignore_ascii_case(pattern) => {
                return Ok(adapter);
            }
            Ok(_) => {}
            Err(e) => debug!("Skipping adapter {}: {}", name, e),
        }
    }

    Err(BluescanError::AdapterNotFound {
        pattern: pattern.to_string(),
    })
}

// ----------------------------------------------------------------------------
// BlueZ Platform
// ----------------------------------------------------------------------------

/// [`Platform`] backed by the BlueZ daemon
///
/// The bus connection is opened lazily on first use. Discovery stays active for as long as
/// the internal discovery task holds bluer's discovery stream.
pub struct BluezPlatform {
    pattern: Option<String>,
    connection: OnceCell<Connection>,
    discovery: Mutex<Option<JoinHandle<()>>>,
}

impl BluezPlatform {
    /// Platform for the adapter matching `pattern`, or the default adapter when `None`
    pub fn new(pattern: Option<String>) -> Self {
        Self {
            pattern,
            connection: OnceCell::new(),
            discovery: Mutex::new(None),
        }
    }

    async fn connection(&self) -> Result<&Connection> {
        self.connection
            .get_or_try_init(|| Connection::open(self.pattern.as_deref()))
            .await
    }

    fn discovery(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn object_events(
        connection: &Connection,
        events: impl futures::Stream<Item = AdapterEvent> + Send + 'static,
        class: NotificationClass,
    ) -> NotificationStream {
        let adapter_path = connection.adapter_path.clone();
        events
            .filter_map(move |event| {
                let notification = match (class, event) {
                    (NotificationClass::InterfacesAdded, AdapterEvent::DeviceAdded(address)) => {
                        let path = address_to_path(&address.to_string(), &adapter_path);
                        Some(Notification::device_added(path, PropertyMap::new()))
                    }
                    (NotificationClass::InterfacesRemoved, AdapterEvent::DeviceRemoved(address)) => {
                        let path = address_to_path(&address.to_string(), &adapter_path);
                        Some(Notification::device_removed(path))
                    }
                    _ => None,
                };
                futures::future::ready(notification)
            })
            .boxed()
    }

    /// Merge property changes of every device on the adapter into one stream
    async fn property_changes(connection: &Connection) -> Result<NotificationStream> {
        let adapter = connection.adapter.clone();
        let adapter_path = connection.adapter_path.clone();
        let mut adapter_events = adapter
            .events()
            .await
            .map_err(|e| BluescanError::platform_call("AddMatch PropertiesChanged", e))?;

        let mut devices = DeviceWatches::new();
        let known = adapter
            .device_addresses()
            .await
            .map_err(|e| BluescanError::platform_call("device_addresses", e))?;
        for address in known {
            if let Some(events) = device_events(&adapter, address).await {
                devices.insert(address, events);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    Some(event) = adapter_events.next() => match event {
                        AdapterEvent::DeviceAdded(address) => {
                            if let Some(events) = device_events(&adapter, address).await {
                                devices.insert(address, events);
                            }
                        }
                        AdapterEvent::DeviceRemoved(address) => {
                            if devices.remove(&address) {
                                debug!("Stopped watching {}, {} left", address, devices.len());
                            }
                        }
                        _ => {}
                    },
                    Some((address, event)) = devices.next(), if !devices.is_empty() => {
                        #[allow(unreachable_patterns)]
                        let property = match event {
                            DeviceEvent::PropertyChanged(property) => property,
                            _ => continue,
                        };
                        let Some((name, value)) = device_property(property) else {
                            continue;
                        };
                        let mut changed = PropertyMap::new();
                        changed.insert(name.to_string(), value);
                        let path = address_to_path(&address.to_string(), &adapter_path);
                        if tx.send(Notification::device_changed(path, changed)).is_err() {
                            break;
                        }
                    }
                    else => break,
                }
            }
            debug!("Property change forwarding for {} ended", adapter_path);
        });

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|notification| (notification, rx))
        })
        .boxed())
    }
}

/// Event streams of the devices on an adapter, keyed by address so a removed device's
/// stream can be dropped
struct DeviceWatches<T> {
    streams: SelectAll<Abortable<BoxStream<'static, T>>>,
    handles: HashMap<Address, AbortHandle>,
}

impl<T> DeviceWatches<T> {
    fn new() -> Self {
        Self {
            streams: SelectAll::new(),
            handles: HashMap::new(),
        }
    }

    /// Watch `address`, replacing any stream already held for it
    fn insert(&mut self, address: Address, events: BoxStream<'static, T>) {
        let (events, handle) = stream::abortable(events);
        if let Some(previous) = self.handles.insert(address, handle) {
            previous.abort();
        }
        self.streams.push(events);
    }

    /// Stop watching `address`; its stream ends and leaves the set on the next poll
    fn remove(&mut self, address: &Address) -> bool {
        match self.handles.remove(address) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.handles.len()
    }

    fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    async fn next(&mut self) -> Option<T> {
        self.streams.next().await
    }
}

async fn device_events(
    adapter: &Adapter,
    address: Address,
) -> Option<BoxStream<'static, (Address, DeviceEvent)>> {
    let device = match adapter.device(address) {
        Ok(device) => device,
        Err(e) => {
            warn!("No device object for {}: {}", address, e);
            return None;
        }
    };
    match device.events().await {
        Ok(events) => Some(events.map(move |event| (address, event)).boxed()),
        Err(e) => {
            warn!("Cannot watch device {}: {}", address, e);
            None
        }
    }
}

#[async_trait]
impl Platform for BluezPlatform {
    async fn connect(&self) -> Result<String> {
        Ok(self.connection().await?.adapter_path.clone())
    }

    async fn adapter_properties(&self) -> Result<AdapterProperties> {
        let adapter = &self.connection().await?.adapter;
        let call = |e: bluer::Error| BluescanError::platform_call("GetAll Adapter1", e);

        Ok(AdapterProperties {
            address: adapter.address().await.map_err(call)?.to_string(),
            alias: adapter.alias().await.map_err(call)?,
            class: adapter.class().await.map_err(call)?,
            powered: adapter.is_powered().await.map_err(call)?,
            discoverable: adapter.is_discoverable().await.map_err(call)?,
            discoverable_timeout: adapter.discoverable_timeout().await.map_err(call)?,
            pairable: adapter.is_pairable().await.map_err(call)?,
            pairable_timeout: adapter.pairable_timeout().await.map_err(call)?,
            discovering: adapter.is_discovering().await.map_err(call)?,
            uuids: adapter
                .uuids()
                .await
                .map_err(call)?
                .unwrap_or_default()
                .into_iter()
                .collect(),
        })
    }

    async fn set_adapter_property(&self, setting: AdapterSetting) -> Result<()> {
        let adapter = &self.connection().await?.adapter;
        let name = setting.property_name();
        let result = match setting {
            AdapterSetting::Discoverable(value) => adapter.set_discoverable(value).await,
            AdapterSetting::Pairable(value) => adapter.set_pairable(value).await,
            AdapterSetting::Powered(value) => adapter.set_powered(value).await,
            AdapterSetting::Alias(value) => adapter.set_alias(value).await,
            AdapterSetting::DiscoverableTimeout(value) => {
                adapter.set_discoverable_timeout(value).await
            }
            AdapterSetting::PairableTimeout(value) => adapter.set_pairable_timeout(value).await,
        };
        result.map_err(|e| BluescanError::platform_call(format!("Set {}", name), e))
    }

    async fn start_discovery(&self) -> Result<()> {
        let connection = self.connection().await?;
        let mut discovered = connection
            .adapter
            .discover_devices()
            .await
            .map_err(|e| BluescanError::platform_call("StartDiscovery", e))?;

        // Discovery runs while this stream is alive; device events reach subscribers through
        // their own streams.
        let task = tokio::spawn(async move { while discovered.next().await.is_some() {} });
        let previous = self.discovery().replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<()> {
        let task = self.discovery().take();
        match task {
            Some(task) => {
                task.abort();
                // Wait for the discovery stream to be dropped
                let _ = task.await;
                Ok(())
            }
            None => Err(BluescanError::platform_call(
                "StopDiscovery",
                "No discovery started",
            )),
        }
    }

    async fn device_properties(&self, path: &str) -> Result<PropertyMap> {
        let connection = self.connection().await?;
        let address = connection.device_address(path)?;
        let call = |e: bluer::Error| BluescanError::platform_call("GetAll Device1", e);

        let device = connection.adapter.device(address).map_err(call)?;
        let properties = device.all_properties().await.map_err(call)?;
        Ok(device_properties(properties))
    }

    async fn managed_devices(&self) -> Result<Vec<(String, PropertyMap)>> {
        let connection = self.connection().await?;
        let call = |e: bluer::Error| BluescanError::platform_call("GetManagedObjects", e);

        let mut devices = Vec::new();
        for address in connection.adapter.device_addresses().await.map_err(call)? {
            let device = connection.adapter.device(address).map_err(call)?;
            match device.all_properties().await {
                Ok(properties) => devices.push((
                    connection.device_path(address),
                    device_properties(properties),
                )),
                // The device may vanish between listing and reading
                Err(e) => debug!("Skipping device {}: {}", address, e),
            }
        }
        Ok(devices)
    }

    async fn remove_device(&self, path: &str) -> Result<()> {
        let connection = self.connection().await?;
        let address = connection.device_address(path)?;
        connection
            .adapter
            .remove_device(address)
            .await
            .map_err(|e| BluescanError::platform_call("RemoveDevice", e))
    }

    async fn subscribe(&self, class: NotificationClass) -> Result<NotificationStream> {
        let connection = self.connection().await?;
        debug!(
            "Subscribing to {} on {} for {}",
            class,
            class.dbus_interface(),
            DEVICE_INTERFACE
        );

        match class {
            NotificationClass::InterfacesAdded | NotificationClass::InterfacesRemoved => {
                let events = connection
                    .adapter
                    .events()
                    .await
                    .map_err(|e| BluescanError::platform_call(format!("AddMatch {}", class), e))?;
                Ok(Self::object_events(connection, events, class))
            }
            NotificationClass::PropertiesChanged => Self::property_changes(connection).await,
        }
    }
}

impl Drop for BluezPlatform {
    fn drop(&mut self) {
        if let Some(task) = self.discovery().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_starts_disconnected() {
        let platform = BluezPlatform::new(Some("hci1".to_string()));
        assert!(platform.connection.get().is_none());
        assert!(platform.discovery().is_none());
    }

    #[tokio::test]
    async fn test_stop_without_discovery_fails() {
        let platform = BluezPlatform::new(None);
        let err = platform.stop_discovery().await.unwrap_err();
        assert!(err.is_platform_call());
    }

    #[tokio::test]
    async fn test_removed_device_stream_is_dropped() {
        use futures::FutureExt;

        let speaker = Address::new([0xA4, 0x93, 0x3F, 0x5B, 0x3D, 0x84]);
        let band = Address::new([0xF0, 0x99, 0xB6, 0x12, 0x7C, 0x0E]);

        let mut watches = DeviceWatches::new();
        watches.insert(speaker, stream::pending::<u8>().boxed());
        watches.insert(band, stream::iter([7u8]).chain(stream::pending()).boxed());
        assert_eq!(watches.len(), 2);

        assert!(watches.remove(&speaker));
        assert!(!watches.remove(&speaker));
        assert_eq!(watches.len(), 1);

        assert_eq!(watches.next().await, Some(7));
        assert!(watches.next().now_or_never().is_none());
        assert_eq!(watches.streams.len(), 1);
        assert!(!watches.is_empty());
    }

    #[tokio::test]
    async fn test_rewatching_a_device_replaces_its_stream() {
        use futures::FutureExt;

        let speaker = Address::new([0xA4, 0x93, 0x3F, 0x5B, 0x3D, 0x84]);
        let mut watches = DeviceWatches::new();
        watches.insert(speaker, stream::pending::<u8>().boxed());
        watches.insert(speaker, stream::pending::<u8>().boxed());
        assert_eq!(watches.len(), 1);

        assert!(watches.next().now_or_never().is_none());
        assert_eq!(watches.streams.len(), 1);
    }
}
