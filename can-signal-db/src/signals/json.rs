//! JSON network description
//!
//! Deserializes the `{ "buses": { <bus>: { "messages": [...] } } }` network
//! description and converts one bus into validated [`MessageDefinition`]s.
//!
//! Field defaults follow the description format: `bitLength` = 1,
//! `bitOffset` = 0, `endianess` = "little", `type` = "unsigned", `factor` = 1,
//! `offset` = 0. A missing (or zero) message `length` is derived from the
//! signal layout.

use super::definition::{
    derived_length, validate_bus, ByteOrder, MessageDefinition, SignalDefinition, ValueType,
};
use crate::types::{DatabaseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Complete network description (all buses)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NetworkDescription {
    #[serde(default)]
    pub buses: BTreeMap<String, BusDescription>,
}

/// Messages of one bus
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BusDescription {
    #[serde(default)]
    pub messages: Vec<MessageDescription>,
}

/// One message as written in the description
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDescription {
    pub name: String,
    pub id: NumberOrText,
    #[serde(default)]
    pub ext: bool,
    /// `"extended"` marks a 29-bit ID, alternative to `ext`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered: Option<Flag>,
    /// Cycle time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<NumberOrText>,
    #[serde(default)]
    pub signals: Vec<SignalDescription>,
}

/// One signal as written in the description
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDescription {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_offset: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_length: Option<NumberOrText>,
    #[serde(default, alias = "endianness", skip_serializing_if = "Option::is_none")]
    pub endianess: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<f64>,
}

/// Integer written either as a JSON number or as a string (`"256"`, `"0x100"`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(u64),
    Text(String),
}

impl NumberOrText {
    pub fn parse(&self) -> Option<u64> {
        match self {
            NumberOrText::Number(n) => Some(*n),
            NumberOrText::Text(text) => {
                let text = text.trim();
                match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(hex, 16).ok(),
                    None => text.parse().ok(),
                }
            }
        }
    }
}

/// Boolean written either as a JSON bool or as a string (`"true"`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    pub fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(text) => text.trim().eq_ignore_ascii_case("true"),
        }
    }
}

impl NetworkDescription {
    /// Parse a description from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DatabaseError::InvalidDescription(e.to_string()))
    }

    /// Load a description from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        log::info!("Loading network description: {:?}", path);
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| DatabaseError::InvalidDescription(format!("{}: {}", path.display(), e)))
    }

    /// Get the description of one bus
    pub fn bus(&self, name: &str) -> Result<&BusDescription> {
        self.buses
            .get(name)
            .ok_or_else(|| DatabaseError::InvalidDescription(format!("bus '{}' not defined", name)))
    }

    /// Convert one bus into validated message definitions
    pub fn messages(&self, bus: &str) -> Result<Vec<MessageDefinition>> {
        let messages = self
            .bus(bus)?
            .messages
            .iter()
            .map(MessageDescription::to_definition)
            .collect::<Result<Vec<_>>>()?;

        validate_bus(&messages)?;
        Ok(messages)
    }
}

impl MessageDescription {
    /// Apply defaults and convert into a definition (not yet validated)
    pub fn to_definition(&self) -> Result<MessageDefinition> {
        let id = self
            .id
            .parse()
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| {
                DatabaseError::InvalidDescription(format!(
                    "message '{}' has invalid ID {:?}",
                    self.name, self.id
                ))
            })?;

        let interval_ms = match &self.interval {
            Some(interval) => interval.parse().ok_or_else(|| {
                DatabaseError::InvalidDescription(format!(
                    "message '{}' has invalid interval {:?}",
                    self.name, interval
                ))
            })?,
            None => 0,
        };

        let signals = self
            .signals
            .iter()
            .map(|s| s.to_definition(&self.name))
            .collect::<Result<Vec<_>>>()?;

        let length = self
            .length
            .filter(|&len| len > 0)
            .unwrap_or_else(|| derived_length(&signals));

        let extended = self.ext
            || self
                .format
                .as_deref()
                .is_some_and(|f| f.eq_ignore_ascii_case("extended"));

        Ok(MessageDefinition {
            name: self.name.clone(),
            id,
            extended,
            length,
            triggered: self.triggered.as_ref().is_some_and(Flag::is_set),
            interval_ms,
            signals,
        })
    }
}

impl SignalDescription {
    fn to_definition(&self, message: &str) -> Result<SignalDefinition> {
        let invalid = |field: &str, value: &dyn std::fmt::Debug| {
            DatabaseError::InvalidDescription(format!(
                "signal '{}.{}' has invalid {} {:?}",
                message, self.name, field, value
            ))
        };

        let bit_length = match &self.bit_length {
            Some(len) => len
                .parse()
                .and_then(|len| u16::try_from(len).ok())
                .ok_or_else(|| invalid("bitLength", len))?,
            None => 1,
        };

        let byte_order = match &self.endianess {
            Some(name) => ByteOrder::from_name(name).ok_or_else(|| invalid("endianess", name))?,
            None => ByteOrder::LittleEndian,
        };

        let value_type = match &self.value_type {
            Some(name) => ValueType::from_name(name).ok_or_else(|| invalid("type", name))?,
            None => ValueType::Unsigned,
        };

        Ok(SignalDefinition {
            name: self.name.clone(),
            bit_offset: self.bit_offset.unwrap_or(0),
            bit_length,
            byte_order,
            value_type,
            factor: self.factor.unwrap_or(1.0),
            offset: self.offset.unwrap_or(0.0),
            min_value: self.min_value,
            max_value: self.max_value,
            resolution: self.resolution,
            default_value: self.default_value,
        })
    }
}
