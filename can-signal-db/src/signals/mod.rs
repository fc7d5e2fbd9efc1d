//! Signal definitions and the JSON network description
//!
//! This module contains the immutable message/signal definitions and the
//! parser that builds them from a network description file.

pub mod definition;
pub mod json;

// Re-export key types for convenience
pub use definition::{
    derived_length, validate_bus, ByteOrder, MessageDefinition, SignalDefinition, ValueType,
};
pub use json::{
    BusDescription, Flag, MessageDescription, NetworkDescription, NumberOrText, SignalDescription,
};
