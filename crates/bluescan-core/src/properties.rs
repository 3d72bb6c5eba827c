//! Property values reported by BlueZ objects

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Property name to value mapping of one object
pub type PropertyMap = BTreeMap<String, PropertyValue>;

// ----------------------------------------------------------------------------
// Property Values
// ----------------------------------------------------------------------------

/// A single property value as carried over D-Bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::UInt(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::Str(s) => f.write_str(s),
            PropertyValue::Bytes(bytes) => f.write_str(&hex::encode_upper(bytes)),
            PropertyValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            PropertyValue::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i16> for PropertyValue {
    fn from(value: i16) -> Self {
        PropertyValue::Int(value.into())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::UInt(value.into())
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::UInt(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(value: Vec<u8>) -> Self {
        PropertyValue::Bytes(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::List(value.into_iter().map(PropertyValue::Str).collect())
    }
}

/// Merge `changed` into `target`, overwriting values that changed and keeping every key
/// `changed` does not mention.
pub fn merge_properties(target: &mut PropertyMap, changed: PropertyMap) {
    target.extend(changed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        assert_eq!(PropertyValue::from(-61i16).to_string(), "-61");
        assert_eq!(PropertyValue::from("Pixel").to_string(), "Pixel");
        assert_eq!(
            PropertyValue::Bytes(vec![0x0a, 0xff, 0x01]).to_string(),
            "0AFF01"
        );
        let uuids = PropertyValue::from(vec!["180f".to_string(), "180a".to_string()]);
        assert_eq!(uuids.to_string(), "[180f, 180a]");
    }

    #[test]
    fn test_merge_keeps_untouched_keys() {
        let mut target = PropertyMap::new();
        target.insert("Name".into(), "Pixel".into());
        target.insert("RSSI".into(), PropertyValue::from(-70i16));

        let mut changed = PropertyMap::new();
        changed.insert("RSSI".into(), PropertyValue::from(-55i16));

        merge_properties(&mut target, changed);
        assert_eq!(target.len(), 2);
        assert_eq!(target["RSSI"].as_i64(), Some(-55));
        assert_eq!(target["Name"].as_str(), Some("Pixel"));
    }

    #[test]
    fn test_untagged_json() {
        let mut props = PropertyMap::new();
        props.insert("Paired".into(), true.into());
        props.insert("Alias".into(), "Speaker".into());
        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(json, r#"{"Alias":"Speaker","Paired":true}"#);
    }
}
