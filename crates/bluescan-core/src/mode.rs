//! Operation modes of a discovery session

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BluescanError;
use crate::platform::NotificationClass;

/// What a discovery session does with the devices it sees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationMode {
    /// Scan for every nearby device until the timer expires
    ScanAll,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMode::ScanAll => "scan-all",
        }
    }

    /// Notification classes the mode subscribes to while running
    pub fn notification_classes(&self) -> &'static [NotificationClass] {
        match self {
            OperationMode::ScanAll => &NotificationClass::ALL,
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationMode {
    type Err = BluescanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan-all" => Ok(OperationMode::ScanAll),
            other => Err(BluescanError::unknown_mode(other)),
        }
    }
}
