//! Conversion between Bluetooth addresses and BlueZ device object paths
//!
//! BlueZ names a remote device `<adapter path>/dev_<address>` where the delimiters of the
//! address are replaced by underscores, e.g. `/org/bluez/hci0/dev_A4_93_3F_5B_3D_84`.

use crate::errors::{BluescanError, Result};
use crate::protocol::DEVICE_PATH_PREFIX;

/// Length of a textual address such as `A4:93:3F:5B:3D:84`
const ADDRESS_TEXT_LEN: usize = 17;

/// Build the device object path for `address` on the adapter at `adapter_path`.
///
/// No validation is performed; callers pass a syntactically valid address. Both `:` and
/// `-` delimiters become `_`, the only separator an object path can carry.
pub fn address_to_path(address: &str, adapter_path: &str) -> String {
    format!(
        "{}/{}{}",
        adapter_path.trim_end_matches('/'),
        DEVICE_PATH_PREFIX,
        address.replace([':', '-'], "_")
    )
}

/// Recover the address from a device object path.
///
/// The result is uppercase and colon separated. Fails when the last path segment does not
/// carry the `dev_` prefix followed by at least one character.
pub fn path_to_address(path: &str) -> Result<String> {
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.strip_prefix(DEVICE_PATH_PREFIX) {
        Some(rest) if !rest.is_empty() => Ok(rest.replace('_', ":").to_ascii_uppercase()),
        _ => Err(BluescanError::malformed_path(path)),
    }
}

/// Whether `candidate` is six hex byte pairs delimited uniformly by `:` or by `-`.
pub fn is_valid_mac_address(candidate: &str) -> bool {
    let delimiter = match candidate.as_bytes().get(2) {
        Some(b':') => ':',
        Some(b'-') => '-',
        _ => return false,
    };

    let mut pairs = 0;
    for pair in candidate.split(delimiter) {
        if pair.len() != 2 || !pair.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
        pairs += 1;
    }
    pairs == 6
}

/// Normalize a valid address to the uppercase, colon separated form BlueZ reports.
pub fn normalize_address(address: &str) -> Result<String> {
    if !is_valid_mac_address(address) {
        return Err(BluescanError::invalid_address(address));
    }
    Ok(address.replace('-', ":").to_ascii_uppercase())
}

/// Whether `path` names a device object directly under the adapter at `adapter_path`.
///
/// Child objects of a device (GATT services, characteristics) share its prefix and are
/// rejected by the length check.
pub fn is_device_path(path: &str, adapter_path: &str) -> bool {
    let device_prefix = format!("{}/{}", adapter_path.trim_end_matches('/'), DEVICE_PATH_PREFIX);
    match path.strip_prefix(&device_prefix) {
        Some(suffix) => suffix.len() == ADDRESS_TEXT_LEN && !suffix.contains('/'),
        None => false,
    }
}
