use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single decoded reading produced by the sampling loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Unix epoch milliseconds when the reading was taken.
    pub timestamp: i64,

    /// Logical timestamp: the sampling iteration this reading belongs to.
    pub iteration: u32,

    /// Device label, `<bus>:<address>` (e.g., "/dev/ttyUSB0:5").
    pub device: String,

    /// Symbolic variable name (e.g., "TemperatureDet").
    pub variable: String,

    /// The decoded value.
    pub value: DecodedValue,
}

impl Record {
    /// Create a new record with the current timestamp.
    pub fn new(
        iteration: u32,
        device: impl Into<String>,
        variable: impl Into<String>,
        value: DecodedValue,
    ) -> Self {
        Self {
            timestamp: current_timestamp_millis(),
            iteration,
            device: device.into(),
            variable: variable.into(),
            value,
        }
    }
}

/// Typed value decoded from a run of holding registers.
///
/// Exactly one variant is populated per decode; the variant is chosen by
/// the variable's wire type. Serialized with the wire type alongside the
/// number, e.g. `{"type": "Float32", "value": 21.5}`, so a decoded record
/// keeps its type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum DecodedValue {
    /// Unsigned 16-bit integer (one register).
    UInt16(u16),

    /// Signed 16-bit integer (one register).
    Int16(i16),

    /// Unsigned 32-bit integer (two registers).
    UInt32(u32),

    /// Signed 32-bit integer (two registers).
    Int32(i32),

    /// IEEE-754 single precision float (two registers).
    ///
    /// NaN and infinities are written as `"NaN"`, `"inf"` and `"-inf"`.
    Float32(#[serde(with = "float_repr")] f32),
}

impl DecodedValue {
    /// Return the value as an unsigned integer if it is one of the
    /// integer variants and non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            DecodedValue::UInt16(v) => Some(u64::from(v)),
            DecodedValue::Int16(v) => u64::try_from(v).ok(),
            DecodedValue::UInt32(v) => Some(u64::from(v)),
            DecodedValue::Int32(v) => u64::try_from(v).ok(),
            DecodedValue::Float32(_) => None,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::UInt16(v) => write!(f, "{}", v),
            DecodedValue::Int16(v) => write!(f, "{}", v),
            DecodedValue::UInt32(v) => write!(f, "{}", v),
            DecodedValue::Int32(v) => write!(f, "{}", v),
            DecodedValue::Float32(v) => write!(f, "{}", v),
        }
    }
}

impl From<u16> for DecodedValue {
    fn from(v: u16) -> Self {
        DecodedValue::UInt16(v)
    }
}

impl From<f32> for DecodedValue {
    fn from(v: f32) -> Self {
        DecodedValue::Float32(v)
    }
}

/// `f32` encoding that keeps NaN and infinities readable from JSON.
mod float_repr {
    use serde::de::{Error, Unexpected};
    use serde::{Deserialize, Deserializer, Serializer};

    const NAN: &str = "NaN";
    const INF: &str = "inf";
    const NEG_INF: &str = "-inf";

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f32(*value)
        } else if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if value.is_sign_positive() {
            serializer.serialize_str(INF)
        } else {
            serializer.serialize_str(NEG_INF)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f32),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(text) => match text.as_str() {
                NAN => Ok(f32::NAN),
                INF => Ok(f32::INFINITY),
                NEG_INF => Ok(f32::NEG_INFINITY),
                other => Err(D::Error::invalid_value(
                    Unexpected::Str(other),
                    &"a number, \"NaN\", \"inf\" or \"-inf\"",
                )),
            },
        }
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
