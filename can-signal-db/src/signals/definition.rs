//! Message and signal definitions
//!
//! Immutable, validated description of the messages on one bus. These are
//! built once from a network description and then used to construct the
//! runtime [`Message`](crate::Message) and [`Signal`](crate::Signal) objects.

use crate::codec::MAX_BIT_LENGTH;
use crate::scaling::{self, RangeMapping};
use crate::types::{
    DatabaseError, MessageKey, Result, MAX_EXTENDED_ID, MAX_FD_DLC, MAX_STANDARD_ID,
};
use std::collections::{HashMap, HashSet};

/// Longest accepted cycle time (about 49 days)
pub const MAX_INTERVAL_MS: u64 = u32::MAX as u64;

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    #[default]
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

impl ByteOrder {
    /// Parse the description spelling (`"little"` / `"big"`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "little" | "intel" => Some(ByteOrder::LittleEndian),
            "big" | "motorola" => Some(ByteOrder::BigEndian),
            _ => None,
        }
    }
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    /// Signed integer
    Signed,
    /// Unsigned integer
    #[default]
    Unsigned,
}

impl ValueType {
    /// Parse the description spelling (`"signed"` / `"unsigned"`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "signed" => Some(ValueType::Signed),
            "unsigned" => Some(ValueType::Unsigned),
            _ => None,
        }
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    /// Signal name (unique within its message)
    pub name: String,
    /// Offset of the first bit inside the message payload
    pub bit_offset: u16,
    /// Length in bits (1..=64)
    pub bit_length: u16,
    /// Byte order of the field
    pub byte_order: ByteOrder,
    /// Value type (signed/unsigned)
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Lower bound of the normalized range mapping
    pub min_value: Option<f64>,
    /// Upper bound of the normalized range mapping
    pub max_value: Option<f64>,
    /// Quantization step of the normalized range mapping
    pub resolution: Option<f64>,
    /// Physical value the signal starts with
    pub default_value: Option<f64>,
}

impl SignalDefinition {
    /// Create an unsigned little-endian signal without scaling
    pub fn new(name: impl Into<String>, bit_offset: u16, bit_length: u16) -> Self {
        Self {
            name: name.into(),
            bit_offset,
            bit_length,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
            min_value: None,
            max_value: None,
            resolution: None,
            default_value: None,
        }
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_scaling(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    pub fn with_range(mut self, min_value: f64, max_value: f64, resolution: f64) -> Self {
        self.min_value = Some(min_value);
        self.max_value = Some(max_value);
        self.resolution = Some(resolution);
        self
    }

    pub fn with_default(mut self, default_value: f64) -> Self {
        self.default_value = Some(default_value);
        self
    }

    /// One past the last bit occupied by this signal
    pub fn end_bit(&self) -> usize {
        self.bit_offset as usize + self.bit_length as usize
    }

    /// Normalized range mapping, if min, max and resolution are all configured
    pub fn range(&self) -> Option<RangeMapping> {
        match (self.min_value, self.max_value, self.resolution) {
            (Some(min), Some(max), Some(resolution)) => Some(RangeMapping {
                min,
                max,
                resolution,
            }),
            _ => None,
        }
    }

    /// Convert a raw field value to its physical value
    pub fn to_physical(&self, raw: i128) -> f64 {
        match self.range() {
            Some(range) => range.to_physical(raw, self.bit_length),
            None => scaling::to_physical(raw, self.factor, self.offset),
        }
    }

    /// Convert a physical value back to the raw field value
    pub fn to_raw(&self, physical: f64) -> i128 {
        match self.range() {
            Some(range) => range.to_raw(physical, self.bit_length),
            None => scaling::to_raw(physical, self.factor, self.offset),
        }
    }

    /// Raw value the signal holds before any update
    pub fn initial_raw(&self) -> i128 {
        self.default_value.map(|v| self.to_raw(v)).unwrap_or(0)
    }

    fn validate(&self, message: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(invalid(format!("message '{}' has a signal without a name", message)));
        }
        if self.bit_length == 0 || self.bit_length > MAX_BIT_LENGTH {
            return Err(invalid(format!(
                "signal '{}.{}' has bit length {} (expected 1..={})",
                message, self.name, self.bit_length, MAX_BIT_LENGTH
            )));
        }
        if !self.factor.is_finite() || self.factor == 0.0 {
            return Err(invalid(format!(
                "signal '{}.{}' has invalid factor {}",
                message, self.name, self.factor
            )));
        }
        if let Some(range) = self.range() {
            if !(range.max > range.min) || !(range.resolution > 0.0) {
                return Err(invalid(format!(
                    "signal '{}.{}' has invalid range {}..{} step {}",
                    message, self.name, range.min, range.max, range.resolution
                )));
            }
        }
        Ok(())
    }

    /// Physical bit positions (byte * 8 + LSB-first bit) occupied by the field
    fn occupied_bits(&self) -> impl Iterator<Item = usize> + '_ {
        (self.bit_offset as usize..self.end_bit()).map(move |n| match self.byte_order {
            ByteOrder::LittleEndian => n,
            ByteOrder::BigEndian => (n / 8) * 8 + (7 - n % 8),
        })
    }
}

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    /// Message name (unique within a bus)
    pub name: String,
    /// CAN arbitration ID
    pub id: u32,
    /// True for a 29-bit identifier
    pub extended: bool,
    /// Payload size in bytes
    pub length: usize,
    /// Sent on demand only (not cyclic)
    pub triggered: bool,
    /// Cycle time in milliseconds (0 = not cyclic)
    pub interval_ms: u64,
    /// All signals in this message, in definition order
    pub signals: Vec<SignalDefinition>,
}

impl MessageDefinition {
    /// Create a message; the length is derived from the signals
    pub fn new(name: impl Into<String>, id: u32, extended: bool, signals: Vec<SignalDefinition>) -> Self {
        let length = derived_length(&signals);
        Self {
            name: name.into(),
            id,
            extended,
            length,
            triggered: false,
            interval_ms: 0,
            signals,
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn with_interval(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_triggered(mut self, triggered: bool) -> Self {
        self.triggered = triggered;
        self
    }

    /// Numeric dispatch key
    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.id, self.extended)
    }

    /// True if the message is transmitted periodically
    pub fn is_cyclic(&self) -> bool {
        self.interval_ms > 0 && !self.triggered
    }

    /// Check the message layout
    ///
    /// Signal names must be unique, every signal must fit into the payload and
    /// no two signals may occupy the same bit.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(invalid(format!("message with ID 0x{:X} has no name", self.id)));
        }
        let max_id = if self.extended { MAX_EXTENDED_ID } else { MAX_STANDARD_ID };
        if self.id > max_id {
            return Err(invalid(format!(
                "message '{}' has ID 0x{:X} outside the {} range",
                self.name,
                self.id,
                if self.extended { "29-bit" } else { "11-bit" }
            )));
        }

        if self.length > MAX_FD_DLC {
            return Err(invalid(format!(
                "message '{}' has length {} (at most {} bytes)",
                self.name, self.length, MAX_FD_DLC
            )));
        }
        if self.interval_ms > MAX_INTERVAL_MS {
            return Err(invalid(format!(
                "message '{}' has interval {} ms (at most {} ms)",
                self.name, self.interval_ms, MAX_INTERVAL_MS
            )));
        }

        let mut names = HashSet::new();
        let mut owner: Vec<Option<usize>> = vec![None; self.length * 8];

        for (idx, signal) in self.signals.iter().enumerate() {
            signal.validate(&self.name)?;

            if !names.insert(signal.name.as_str()) {
                return Err(invalid(format!(
                    "signal '{}' defined twice in message '{}'",
                    signal.name, self.name
                )));
            }
            if signal.end_bit() > self.length * 8 {
                return Err(invalid(format!(
                    "signal '{}.{}' ends at bit {} beyond the {}-byte payload",
                    self.name,
                    signal.name,
                    signal.end_bit(),
                    self.length
                )));
            }

            for bit in signal.occupied_bits() {
                if let Some(other) = owner[bit].replace(idx) {
                    return Err(invalid(format!(
                        "signals '{}' and '{}' of message '{}' overlap at byte {} bit {}",
                        self.signals[other].name,
                        signal.name,
                        self.name,
                        bit / 8,
                        bit % 8
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Payload length covering every signal, rounded up to whole bytes
pub fn derived_length(signals: &[SignalDefinition]) -> usize {
    let max_end = signals.iter().map(SignalDefinition::end_bit).max().unwrap_or(0);
    (max_end + 7) / 8
}

/// Validate a whole bus: each message on its own, plus unique names and keys
pub fn validate_bus(messages: &[MessageDefinition]) -> Result<()> {
    let mut names = HashSet::new();
    let mut keys: HashMap<MessageKey, &str> = HashMap::new();

    for message in messages {
        message.validate()?;

        if !names.insert(message.name.as_str()) {
            return Err(invalid(format!("message '{}' defined twice", message.name)));
        }
        if let Some(previous) = keys.insert(message.key(), message.name.as_str()) {
            return Err(invalid(format!(
                "messages '{}' and '{}' share ID {}",
                previous,
                message.name,
                message.key()
            )));
        }
    }
    Ok(())
}

fn invalid(reason: String) -> DatabaseError {
    DatabaseError::InvalidDescription(reason)
}
