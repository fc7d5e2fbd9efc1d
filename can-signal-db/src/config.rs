//! Database configuration types
//!
//! Runtime knobs of a [`Database`](crate::Database). The configuration is
//! serde-friendly so that applications can embed it in their own config files.

use crate::types::MessageKey;
use serde::{Deserialize, Serialize};

/// What `send` does with a value that does not fit its signal's bit width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Abort the send with `ValueOverflow`
    #[default]
    Error,
    /// Wrap the value into the field (two's complement) and log a warning
    Truncate,
}

/// Configuration for a database instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Handling of out-of-range values on send
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Optional: only dispatch frames with these numeric keys
    /// (ID with bit 31 set for extended frames)
    #[serde(default)]
    pub message_filter: Option<Vec<u32>>,
}

impl DatabaseConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the overflow policy
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Builder method: set message filter
    pub fn with_message_filter(mut self, keys: Vec<MessageKey>) -> Self {
        self.message_filter = Some(keys.into_iter().map(MessageKey::value).collect());
        self
    }

    /// Check if a message key should be dispatched
    pub fn should_process_message(&self, key: MessageKey) -> bool {
        match &self.message_filter {
            Some(keys) => keys.contains(&key.value()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_builder() {
        let config = DatabaseConfig::new()
            .with_overflow(OverflowPolicy::Truncate)
            .with_message_filter(vec![MessageKey::new(0x100, false), MessageKey::new(0x100, true)]);

        assert_eq!(config.overflow, OverflowPolicy::Truncate);
        assert_eq!(config.message_filter, Some(vec![0x100, 0x8000_0100]));
    }

    #[test]
    fn test_filter_logic() {
        let config = DatabaseConfig::new().with_message_filter(vec![MessageKey::new(0x123, false)]);

        assert!(config.should_process_message(MessageKey::new(0x123, false)));
        assert!(!config.should_process_message(MessageKey::new(0x123, true)));
        assert!(!config.should_process_message(MessageKey::new(0x456, false)));
    }

    #[test]
    fn test_no_filters() {
        let config = DatabaseConfig::new();
        assert_eq!(config.overflow, OverflowPolicy::Error);
        assert!(config.should_process_message(MessageKey::new(0x1FFF_FFFF, true)));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: DatabaseConfig = serde_json::from_str(r#"{ "overflow": "truncate" }"#).unwrap();
        assert_eq!(config.overflow, OverflowPolicy::Truncate);
        assert!(config.message_filter.is_none());
    }
}
