//! Register word-order normalization, byte packing and typed decoding.
//!
//! A multi-register value travels through three independent steps:
//!
//! ```text
//! registers --normalize_word_order--> words --pack_bytes--> bytes --decode--> value
//! ```
//!
//! Word order and per-register byte order are separate knobs on
//! [`RegisterLayout`]; a device family may put its most significant
//! register first while keeping each register's bytes little-endian.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thermoscan_common::DecodedValue;

/// Errors raised while decoding registers.
///
/// Both variants indicate a defect in the variable table rather than a bus
/// condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Unsupported wire type: {0}")]
    UnsupportedWireType(String),
    #[error("{wire_type} needs {expected} bytes, got {actual}")]
    LengthMismatch {
        wire_type: WireType,
        expected: usize,
        actual: usize,
    },
}

/// On-the-wire representation of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
}

impl WireType {
    /// Number of 16-bit registers one value occupies.
    pub fn register_count(self) -> u16 {
        match self {
            WireType::UInt16 | WireType::Int16 => 1,
            WireType::UInt32 | WireType::Int32 | WireType::Float32 => 2,
        }
    }

    /// Number of bytes one value occupies.
    pub fn byte_len(self) -> usize {
        usize::from(self.register_count()) * 2
    }

    /// Return the canonical name for this wire type.
    pub fn as_str(&self) -> &'static str {
        match self {
            WireType::UInt16 => "UInt16",
            WireType::Int16 => "Int16",
            WireType::UInt32 => "UInt32",
            WireType::Int32 => "Int32",
            WireType::Float32 => "Float32",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uint16" | "u16" => Ok(WireType::UInt16),
            "int16" | "i16" => Ok(WireType::Int16),
            "uint32" | "u32" => Ok(WireType::UInt32),
            "int32" | "i32" => Ok(WireType::Int32),
            "float32" | "f32" | "single" => Ok(WireType::Float32),
            _ => Err(CodecError::UnsupportedWireType(s.to_string())),
        }
    }
}

/// Order in which the registers of a multi-register value arrive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// Least significant register at the lowest address.
    #[default]
    LsbFirst,
    /// Most significant register at the lowest address.
    MsbFirst,
}

/// Byte order inside a single 16-bit register when packed into the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Register layout of a device family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterLayout {
    #[serde(default)]
    pub word_order: WordOrder,
    #[serde(default)]
    pub byte_order: ByteOrder,
}

impl RegisterLayout {
    pub fn new(word_order: WordOrder, byte_order: ByteOrder) -> Self {
        Self {
            word_order,
            byte_order,
        }
    }

    /// Run the full normalize, pack, decode pipeline.
    pub fn decode_registers(
        &self,
        registers: &[u16],
        wire_type: WireType,
    ) -> Result<DecodedValue, CodecError> {
        let words = normalize_word_order(registers, self.word_order);
        let bytes = pack_bytes(&words, self.byte_order);
        decode(&bytes, wire_type)
    }

    /// Encode a value into the registers a device with this layout would
    /// transmit. Inverse of [`RegisterLayout::decode_registers`].
    pub fn encode(&self, value: DecodedValue) -> Vec<u16> {
        let bytes: Vec<u8> = match value {
            DecodedValue::UInt16(v) => v.to_le_bytes().to_vec(),
            DecodedValue::Int16(v) => v.to_le_bytes().to_vec(),
            DecodedValue::UInt32(v) => v.to_le_bytes().to_vec(),
            DecodedValue::Int32(v) => v.to_le_bytes().to_vec(),
            DecodedValue::Float32(v) => v.to_le_bytes().to_vec(),
        };

        let words: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| match self.byte_order {
                ByteOrder::Little => u16::from_le_bytes([pair[0], pair[1]]),
                ByteOrder::Big => u16::from_be_bytes([pair[0], pair[1]]),
            })
            .collect();

        // Reversal is its own inverse.
        normalize_word_order(&words, self.word_order)
    }
}

/// Put registers into least-significant-first order.
pub fn normalize_word_order(registers: &[u16], order: WordOrder) -> Vec<u16> {
    match order {
        WordOrder::LsbFirst => registers.to_vec(),
        WordOrder::MsbFirst => registers.iter().rev().copied().collect(),
    }
}

/// Concatenate registers into a byte buffer, two bytes per register.
pub fn pack_bytes(words: &[u16], order: ByteOrder) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        match order {
            ByteOrder::Little => bytes.extend_from_slice(&word.to_le_bytes()),
            ByteOrder::Big => bytes.extend_from_slice(&word.to_be_bytes()),
        }
    }
    bytes
}

/// Interpret a little-endian byte buffer as a value of `wire_type`.
pub fn decode(bytes: &[u8], wire_type: WireType) -> Result<DecodedValue, CodecError> {
    let mismatch = || CodecError::LengthMismatch {
        wire_type,
        expected: wire_type.byte_len(),
        actual: bytes.len(),
    };

    match wire_type {
        WireType::UInt16 => {
            let b: [u8; 2] = bytes.try_into().map_err(|_| mismatch())?;
            Ok(DecodedValue::UInt16(u16::from_le_bytes(b)))
        }
        WireType::Int16 => {
            let b: [u8; 2] = bytes.try_into().map_err(|_| mismatch())?;
            Ok(DecodedValue::Int16(i16::from_le_bytes(b)))
        }
        WireType::UInt32 => {
            let b: [u8; 4] = bytes.try_into().map_err(|_| mismatch())?;
            Ok(DecodedValue::UInt32(u32::from_le_bytes(b)))
        }
        WireType::Int32 => {
            let b: [u8; 4] = bytes.try_into().map_err(|_| mismatch())?;
            Ok(DecodedValue::Int32(i32::from_le_bytes(b)))
        }
        WireType::Float32 => {
            let b: [u8; 4] = bytes.try_into().map_err(|_| mismatch())?;
            Ok(DecodedValue::Float32(f32::from_le_bytes(b)))
        }
    }
}
