//! Core types for the CAN signal database
//!
//! This module defines the frame type exchanged with transports, the numeric
//! message key used for dispatch, and the library error type.

use chrono::{DateTime, Utc};
use std::fmt;

/// Timestamp type used throughout the library
pub type Timestamp = DateTime<Utc>;

/// Result type for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Bit that marks an extended (29-bit) identifier inside a [`MessageKey`]
pub const EXTENDED_KEY_FLAG: u32 = 1 << 31;

/// Largest standard (11-bit) arbitration ID
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Largest extended (29-bit) arbitration ID
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Maximum payload of a classic CAN frame
pub const MAX_CLASSIC_DLC: usize = 8;

/// Maximum payload of a CAN-FD frame
pub const MAX_FD_DLC: usize = 64;

/// Numeric lookup key of a message: the arbitration ID with the extended
/// flag folded into bit 31, so standard and extended IDs never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey(u32);

impl MessageKey {
    /// Build the key for an arbitration ID
    pub fn new(id: u32, extended: bool) -> Self {
        if extended {
            Self(id | EXTENDED_KEY_FLAG)
        } else {
            Self(id)
        }
    }

    /// Raw key value
    pub fn value(self) -> u32 {
        self.0
    }

    /// Arbitration ID without the extended flag
    pub fn id(self) -> u32 {
        self.0 & !EXTENDED_KEY_FLAG
    }

    /// True if the key belongs to an extended ID
    pub fn is_extended(self) -> bool {
        self.0 & EXTENDED_KEY_FLAG != 0
    }
}

impl From<u32> for MessageKey {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_extended() {
            write!(f, "0x{:08X}x", self.id())
        } else {
            write!(f, "0x{:03X}", self.id())
        }
    }
}

/// A single CAN frame as exchanged with a transport
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrame {
    /// Receive timestamp in nanoseconds since epoch (0 if not stamped)
    pub timestamp_ns: u64,
    /// CAN channel number (e.g., 0, 1, 2...)
    pub channel: u8,
    /// CAN message ID (11-bit or 29-bit)
    pub can_id: u32,
    /// Frame data bytes (0-8 bytes for classic CAN, up to 64 for CAN-FD)
    pub data: Vec<u8>,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended: bool,
    /// True if this is a CAN-FD frame
    pub is_fd: bool,
    /// True if this is an error frame
    pub is_error_frame: bool,
    /// True if this is a remote request frame
    pub is_remote_frame: bool,
}

impl CanFrame {
    /// Create a data frame
    pub fn new(can_id: u32, is_extended: bool, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            timestamp_ns: 0,
            channel: 0,
            can_id,
            is_fd: data.len() > 8,
            data,
            is_extended,
            is_error_frame: false,
            is_remote_frame: false,
        }
    }

    /// Create a remote request frame (no payload)
    pub fn remote(can_id: u32, is_extended: bool) -> Self {
        Self {
            is_remote_frame: true,
            ..Self::new(can_id, is_extended, Vec::new())
        }
    }

    /// Numeric dispatch key of this frame
    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.can_id, self.is_extended)
    }

    /// Convert timestamp from nanoseconds to DateTime<Utc>
    pub fn timestamp(&self) -> Timestamp {
        let secs = (self.timestamp_ns / 1_000_000_000) as i64;
        let nsecs = (self.timestamp_ns % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nsecs).unwrap_or_default()
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())?;
        if self.is_remote_frame {
            return write!(f, " [RTR]");
        }
        write!(f, " [{}]", self.dlc())?;
        for byte in &self.data {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}

/// Errors that can occur while building or driving a database
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Invalid network description: {0}")]
    InvalidDescription(String),

    #[error("Message not found: {0}")]
    UnknownMessage(String),

    #[error("Signal not found: {message}.{signal}")]
    UnknownSignal { message: String, signal: String },

    #[error("Bit span {bit_offset}+{bit_length} exceeds buffer of {buffer_bits} bits")]
    OutOfRange {
        bit_offset: u16,
        bit_length: u16,
        buffer_bits: usize,
    },

    #[error("Value {value} does not fit into {bit_length} bits")]
    ValueOverflow { value: i128, bit_length: u16 },

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
