//! Bluetooth discovery sessions on top of the BlueZ D-Bus API
//!
//! This crate holds everything that does not touch the system bus directly:
//!
//! - [`controller`] - Session lifecycle, discovery timer and teardown
//! - [`adapter`] - Read/write facade over the local adapter
//! - [`registry`] - Per-session device records and the device counter
//! - [`platform`] - The [`Platform`] trait the controller drives
//! - [`simulated`] - An in-memory [`Platform`] for tests and demos
//! - [`address`] - Conversions between device addresses and object paths
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bluescan_core::{DiscoveryConfig, DiscoveryController, SimulatedPlatform};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let platform = Arc::new(SimulatedPlatform::demo());
//! let controller = DiscoveryController::new(platform, DiscoveryConfig::default());
//!
//! controller.set_on_new_device_found(|properties| {
//!     for (key, value) in properties {
//!         println!("[NEW] {} : {}", key, value);
//!     }
//! });
//!
//! controller.start("scan-all").await?;
//! let summary = controller.wait_idle().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod address;
pub mod config;
pub mod controller;
pub mod errors;
pub mod mode;
pub mod platform;
pub mod properties;
pub mod protocol;
pub mod registry;
mod session;
pub mod simulated;

pub use adapter::BluetoothAdapter;
pub use address::{address_to_path, is_valid_mac_address, normalize_address, path_to_address};
pub use config::DiscoveryConfig;
pub use controller::{DiscoveryController, SessionState};
pub use errors::{BluescanError, Result};
pub use mode::OperationMode;
pub use platform::{
    AdapterProperties, AdapterSetting, Notification, NotificationClass, NotificationStream,
    Platform,
};
pub use properties::{merge_properties, PropertyMap, PropertyValue};
pub use registry::{DeviceRecord, DeviceRegistry};
pub use session::{DeviceCallback, SessionEnd, SessionSummary};
pub use simulated::{PlatformCall, PlatformOperation, SimulatedPlatform};
