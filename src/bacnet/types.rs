//! Value types for addressing remote BACnet properties.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

/// A BACnet object identifier: type tag plus instance number.
///
/// Parsed from the conventional `"type,instance"` string form, e.g.
/// `"analog-value,2"` or `"binary-output,1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId {
    /// Object type tag, e.g. `"analog-input"`.
    pub kind: String,
    /// Instance number within the device.
    pub instance: u32,
}

impl ObjectId {
    /// Creates an object identifier from a type tag and instance number.
    pub fn new(kind: impl Into<String>, instance: u32) -> Self {
        Self {
            kind: kind.into(),
            instance,
        }
    }
}

impl FromStr for ObjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, instance) = s
            .split_once(',')
            .ok_or_else(|| format!("invalid object identifier \"{s}\", expected \"type,instance\""))?;
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(format!("invalid object identifier \"{s}\", empty type tag"));
        }
        let instance = instance
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid instance number in \"{s}\": {e}"))?;
        Ok(Self::new(kind, instance))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.kind, self.instance)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Identifies one remote property: device address, object, property, and an
/// optional array index. Immutable value type; the supervisor addresses it
/// but never owns it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointRef {
    /// Device network address (e.g. `"10.200.200.233"`).
    pub address: String,
    /// Object identifier on the device.
    pub object: ObjectId,
    /// Property identifier; nearly always `"present-value"`.
    #[serde(default = "default_property")]
    pub property: String,
    /// Optional property array index.
    #[serde(default)]
    pub array_index: Option<u32>,
}

fn default_property() -> String {
    "present-value".to_string()
}

impl PointRef {
    /// Creates a reference to the `present-value` property of an object.
    pub fn present_value(address: impl Into<String>, object: ObjectId) -> Self {
        Self {
            address: address.into(),
            object,
            property: default_property(),
            array_index: None,
        }
    }
}

impl fmt::Display for PointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.address, self.object, self.property)
    }
}

/// An atomic property value as read from or written to a device.
///
/// `Null` is the BACnet release sentinel: writing it at a priority
/// relinquishes that priority level's claim on the point. It is never a
/// numeric zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Real(f64),
    Unsigned(u64),
    Boolean(bool),
    /// Priority-array release sentinel.
    Null,
}

impl Value {
    /// Returns the value as a float if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Unsigned(v) => Some(*v as f64),
            Value::Boolean(_) | Value::Null => None,
        }
    }

    /// Returns `true` for the release sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Real(v) => write!(f, "{v}"),
            Value::Unsigned(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Null => write!(f, "null"),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    /// Accepts TOML floats, integers, booleans, and the literal string
    /// `"null"` (the release sentinel). Any other string is a configuration
    /// mistake and is rejected at parse time.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl Visitor<'_> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number, a boolean, or the string \"null\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Real(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Real(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
                Ok(Value::Unsigned(v))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Boolean(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
                if v == "null" {
                    Ok(Value::Null)
                } else {
                    Err(de::Error::custom(format!(
                        "unexpected string \"{v}\", only \"null\" is a valid write value"
                    )))
                }
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}
