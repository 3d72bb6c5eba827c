//! The worker task of one discovery session
//!
//! A session worker owns the merged notification streams, routes every notification to its
//! handler, and performs the teardown when the timer fires or a stop is requested. Handlers run
//! one at a time on the worker, which makes it the registry's only writer.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use futures::stream::SelectAll;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{oneshot, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::address::path_to_address;
use crate::mode::OperationMode;
use crate::platform::{Notification, NotificationStream, Platform};
use crate::properties::PropertyMap;
use crate::protocol::{DEVICE_INTERFACE, PROP_ADDRESS, PROP_NAME, PROP_RSSI};
use crate::registry::DeviceRegistry;

/// Callback invoked with the full property set of each newly found device
pub type DeviceCallback = Arc<dyn Fn(&PropertyMap) + Send + Sync>;

pub(crate) type SharedCallback = Arc<StdRwLock<Option<DeviceCallback>>>;

// ----------------------------------------------------------------------------
// Session Summary
// ----------------------------------------------------------------------------

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionEnd {
    /// The discovery timer fired
    Timeout,
    /// `stop` was called, or a new session replaced this one
    Stopped,
}

/// Report emitted when a session is torn down
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub mode: OperationMode,
    /// Device counter value at teardown
    pub devices_found: usize,
    /// Adapter discovering flag read after stopping discovery
    pub discovering: bool,
    pub elapsed: Duration,
    pub end: SessionEnd,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} session ended ({:?}) after {:.1}s: {} devices found, discovering: {}",
            self.mode,
            self.end,
            self.elapsed.as_secs_f64(),
            self.devices_found,
            self.discovering
        )
    }
}

// ----------------------------------------------------------------------------
// Notification Handlers
// ----------------------------------------------------------------------------

/// Routes notifications into the registry and the user callback
pub(crate) struct SessionHandlers<P: Platform> {
    pub(crate) platform: Arc<P>,
    pub(crate) registry: Arc<RwLock<DeviceRegistry>>,
    pub(crate) callback: SharedCallback,
}

impl<P: Platform> SessionHandlers<P> {
    pub(crate) async fn dispatch(&self, notification: Notification) {
        match notification {
            Notification::InterfacesAdded { path, interfaces } => {
                if interfaces.contains_key(DEVICE_INTERFACE) {
                    self.on_device_added(&path).await;
                }
            }
            Notification::InterfacesRemoved { path, interfaces } => {
                if interfaces.iter().any(|iface| iface == DEVICE_INTERFACE) {
                    self.on_device_removed(&path).await;
                }
            }
            Notification::PropertiesChanged {
                path,
                interface,
                changed,
                ..
            } => {
                if interface == DEVICE_INTERFACE {
                    self.on_device_changed(&path, changed).await;
                }
            }
        }
    }

    async fn on_device_added(&self, path: &str) {
        let properties = match self.platform.device_properties(path).await {
            Ok(properties) => properties,
            Err(e) => {
                warn!("Dropping added device {}: {}", path, e);
                return;
            }
        };

        let count = {
            let mut registry = self.registry.write().await;
            registry.record_added(path, properties.clone());
            registry.device_count()
        };
        debug!("[NEW] PATH : {} ({} devices)", path, count);

        let callback = self
            .callback
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(&properties))).is_err() {
                error!("New device callback panicked for {}", path);
            }
        }
    }

    async fn on_device_changed(&self, path: &str, changed: PropertyMap) {
        let registry = &mut *self.registry.write().await;
        let record = registry.merge_changed(path, changed);

        debug!("[CHG] PATH : {}", path);
        if let Some(address) = record.properties.get(PROP_ADDRESS) {
            debug!("[CHG] BDADDR : {}", address);
        }
        if let Some(name) = record.properties.get(PROP_NAME) {
            debug!("[CHG] NAME : {}", name);
        }
        if let Some(rssi) = record.properties.get(PROP_RSSI) {
            debug!("[CHG] RSSI : {}", rssi);
        }
    }

    async fn on_device_removed(&self, path: &str) {
        let removed = self.registry.write().await.remove(path);
        match removed {
            Some(record) => match record.properties.get(PROP_ADDRESS) {
                Some(address) => debug!("[DEL] BDADDR : {}", address),
                None => debug!(
                    "[DEL] PATH : {} ({})",
                    path,
                    path_to_address(path).unwrap_or_default()
                ),
            },
            None => debug!("Ignoring removal of untracked device {}", path),
        }
    }
}

// ----------------------------------------------------------------------------
// Session Worker
// ----------------------------------------------------------------------------

/// Everything the worker task owns for the lifetime of one session
pub(crate) struct SessionWorker<P: Platform> {
    pub(crate) mode: OperationMode,
    pub(crate) handlers: SessionHandlers<P>,
    pub(crate) notifications: SelectAll<NotificationStream>,
    pub(crate) started_at: Instant,
    pub(crate) deadline: Instant,
}

impl<P: Platform> SessionWorker<P> {
    /// Drive notification delivery until the timer fires or a stop is requested, then tear
    /// the session down
    pub(crate) async fn run(self, mut shutdown: oneshot::Receiver<()>) -> SessionSummary {
        let SessionWorker {
            mode,
            handlers,
            mut notifications,
            started_at,
            deadline,
        } = self;

        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        let end = loop {
            tokio::select! {
                _ = &mut timer => {
                    info!("Discovery timeout.");
                    break SessionEnd::Timeout;
                }
                _ = &mut shutdown => {
                    info!("Stopping operation mode : {}", mode);
                    break SessionEnd::Stopped;
                }
                Some(notification) = notifications.next() => {
                    handlers.dispatch(notification).await;
                }
            }
        };

        teardown(mode, &handlers, notifications, started_at, end).await
    }
}

/// Stop discovery, unsubscribe and reset the registry. Platform failures here are logged,
/// never returned.
async fn teardown<P: Platform>(
    mode: OperationMode,
    handlers: &SessionHandlers<P>,
    notifications: SelectAll<NotificationStream>,
    started_at: Instant,
    end: SessionEnd,
) -> SessionSummary {
    if let Err(e) = handlers.platform.stop_discovery().await {
        warn!("Error while stopping discovery : {}", e);
    }

    let subscriptions = notifications.len();
    drop(notifications);
    debug!("Removed {} notification subscriptions", subscriptions);

    let discovering = match handlers.platform.adapter_properties().await {
        Ok(properties) => properties.discovering,
        Err(e) => {
            warn!("Could not read final discovering state: {}", e);
            false
        }
    };

    let devices_found = {
        let mut registry = handlers.registry.write().await;
        let count = registry.device_count();
        registry.reset();
        count
    };

    let summary = SessionSummary {
        mode,
        devices_found,
        discovering,
        elapsed: started_at.elapsed(),
        end,
    };

    info!("Discovering : {}", summary.discovering);
    info!("{} devices found.", summary.devices_found);
    info!("Stopped operation : {}", summary.mode);
    info!("Summary : {}", summary);

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NotificationClass;
    use crate::properties::PropertyValue;
    use crate::simulated::{PlatformOperation, SimulatedPlatform};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handlers(platform: Arc<SimulatedPlatform>) -> SessionHandlers<SimulatedPlatform> {
        SessionHandlers {
            platform,
            registry: Arc::new(RwLock::new(DeviceRegistry::new())),
            callback: Arc::new(StdRwLock::new(None)),
        }
    }

    fn device_props(address: &str) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(PROP_ADDRESS.to_string(), address.into());
        props.insert(PROP_RSSI.to_string(), PropertyValue::Int(-64));
        props
    }

    #[tokio::test]
    async fn test_added_without_device_interface_is_ignored() {
        let platform = Arc::new(SimulatedPlatform::new());
        let handlers = handlers(platform.clone());

        let mut interfaces = BTreeMap::new();
        interfaces.insert("org.bluez.GattService1".to_string(), PropertyMap::new());
        handlers
            .dispatch(Notification::InterfacesAdded {
                path: "/org/bluez/hci0/dev_A4_93_3F_5B_3D_84/service000a".to_string(),
                interfaces,
            })
            .await;

        assert_eq!(handlers.registry.read().await.device_count(), 0);
        assert_eq!(platform.call_count(PlatformOperation::DeviceProperties), 0);
    }

    #[tokio::test]
    async fn test_added_fetches_and_calls_back() {
        let platform = Arc::new(SimulatedPlatform::new());
        let path = platform.device_path("A4:93:3F:5B:3D:84");
        platform.insert_device(path.clone(), device_props("A4:93:3F:5B:3D:84"));

        let handlers = handlers(platform.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        *handlers.callback.write().unwrap() = Some(Arc::new(move |props: &PropertyMap| {
            assert!(props.contains_key(PROP_ADDRESS));
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        handlers
            .dispatch(Notification::device_added(path.clone(), PropertyMap::new()))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let registry = handlers.registry.read().await;
        assert_eq!(registry.device_count(), 1);
        assert_eq!(registry.get(&path).unwrap().properties.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_drops_notification() {
        let platform = Arc::new(SimulatedPlatform::new());
        let handlers = handlers(platform.clone());

        handlers
            .dispatch(Notification::device_added(
                platform.device_path("A4:93:3F:5B:3D:84"),
                PropertyMap::new(),
            ))
            .await;

        assert_eq!(handlers.registry.read().await.device_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_poison_session() {
        let platform = Arc::new(SimulatedPlatform::new());
        let path = platform.device_path("A4:93:3F:5B:3D:84");
        platform.insert_device(path.clone(), device_props("A4:93:3F:5B:3D:84"));

        let handlers = handlers(platform);
        *handlers.callback.write().unwrap() = Some(Arc::new(|_: &PropertyMap| panic!("boom")));

        handlers
            .dispatch(Notification::device_added(path, PropertyMap::new()))
            .await;
        assert_eq!(handlers.registry.read().await.device_count(), 1);
    }

    #[tokio::test]
    async fn test_changes_on_other_interfaces_are_ignored() {
        let platform = Arc::new(SimulatedPlatform::new());
        let handlers = handlers(platform);

        let mut changed = PropertyMap::new();
        changed.insert("Powered".to_string(), true.into());
        handlers
            .dispatch(Notification::PropertiesChanged {
                path: "/org/bluez/hci0".to_string(),
                interface: "org.bluez.Adapter1".to_string(),
                changed,
                invalidated: Vec::new(),
            })
            .await;

        assert!(handlers.registry.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_resets_counter_and_absorbs_stop_failure() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.fail_on(PlatformOperation::StopDiscovery);
        let handlers = handlers(platform.clone());
        handlers
            .registry
            .write()
            .await
            .record_added("/org/bluez/hci0/dev_A4_93_3F_5B_3D_84", PropertyMap::new());

        let summary = teardown(
            OperationMode::ScanAll,
            &handlers,
            SelectAll::new(),
            Instant::now(),
            SessionEnd::Stopped,
        )
        .await;

        assert_eq!(summary.devices_found, 1);
        assert_eq!(summary.end, SessionEnd::Stopped);
        assert_eq!(handlers.registry.read().await.device_count(), 0);
        assert_eq!(platform.call_count(PlatformOperation::StopDiscovery), 1);
        assert_eq!(platform.subscriber_count(NotificationClass::InterfacesAdded), 0);
    }

    #[tokio::test]
    async fn test_teardown_stops_discovery_before_unsubscribing() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.start_discovery().await.unwrap();
        let handlers = handlers(platform.clone());

        let mut notifications = SelectAll::new();
        for class in NotificationClass::ALL {
            notifications.push(platform.subscribe(class).await.unwrap());
        }

        teardown(
            OperationMode::ScanAll,
            &handlers,
            notifications,
            Instant::now(),
            SessionEnd::Timeout,
        )
        .await;

        assert_eq!(
            platform.subscribed_at_last_stop(),
            Some(NotificationClass::ALL.len())
        );
        for class in NotificationClass::ALL {
            assert_eq!(platform.subscriber_count(class), 0);
        }
    }
}
