//! BlueZ platform for bluescan
//!
//! [`SystemPlatform`] is the [`bluescan_core::Platform`] for the host: on Linux it talks to
//! the BlueZ daemon through `bluer`, elsewhere it is [`UnsupportedPlatform`], which fails
//! every call with a platform-unavailable error.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bluescan_bluez::SystemPlatform;
//! use bluescan_core::{DiscoveryConfig, DiscoveryController};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let platform = Arc::new(SystemPlatform::new(Some("hci0".to_string())));
//! let controller = DiscoveryController::new(platform, DiscoveryConfig::default());
//! controller.start("scan-all").await?;
//! # Ok(())
//! # }
//! ```

#[cfg(target_os = "linux")]
mod convert;
mod fallback;
#[cfg(target_os = "linux")]
mod linux;

pub use fallback::UnsupportedPlatform;
#[cfg(target_os = "linux")]
pub use linux::BluezPlatform;

/// Platform implementation for the current target
#[cfg(target_os = "linux")]
pub type SystemPlatform = linux::BluezPlatform;

/// Platform implementation for the current target
#[cfg(not(target_os = "linux"))]
pub type SystemPlatform = fallback::UnsupportedPlatform;
