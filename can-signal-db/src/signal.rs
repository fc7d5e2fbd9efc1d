//! Runtime signal
//!
//! Holds the current raw value of one signal and the listeners interested in
//! it. Listeners fire on every update, whether or not the value changed.

use crate::codec;
use crate::config::OverflowPolicy;
use crate::listeners::{ListenerHandle, ListenerSet};
use crate::signals::SignalDefinition;
use crate::types::Result;

/// A signal of a [`Message`](crate::Message) with its live value
#[derive(Debug)]
pub struct Signal {
    definition: SignalDefinition,
    raw: i128,
    listeners: ListenerSet<Signal>,
}

impl Signal {
    /// Create a signal holding its default value (or 0)
    pub fn new(definition: SignalDefinition) -> Self {
        let raw = definition.initial_raw();
        Self {
            definition,
            raw,
            listeners: ListenerSet::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &SignalDefinition {
        &self.definition
    }

    /// Current raw field value
    pub fn raw_value(&self) -> i128 {
        self.raw
    }

    /// Current physical value
    pub fn value(&self) -> f64 {
        self.definition.to_physical(self.raw)
    }

    /// Set a physical value and notify listeners
    pub fn update(&mut self, value: f64) {
        let raw = self.definition.to_raw(value);
        self.update_raw(raw);
    }

    /// Set the raw value and notify listeners
    pub fn update_raw(&mut self, raw: i128) {
        self.raw = raw;

        let mut listeners = std::mem::take(&mut self.listeners);
        listeners.notify(self);
        self.listeners = listeners;
    }

    /// Register a listener called with this signal on every update
    pub fn register_on_change_listener<F>(&mut self, listener: F) -> ListenerHandle
    where
        F: FnMut(&Signal) + Send + 'static,
    {
        self.listeners.insert(Box::new(listener))
    }

    /// Remove a listener; returns false if it was not registered here
    pub fn unregister_on_change_listener(&mut self, handle: ListenerHandle) -> bool {
        self.listeners.remove(handle)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Extract this signal's raw value from a payload
    pub fn decode(&self, data: &[u8]) -> Result<i128> {
        let def = &self.definition;
        codec::decode(data, def.bit_offset, def.bit_length, def.byte_order, def.value_type)
    }

    /// Write the current raw value into a payload
    pub fn encode(&self, data: &mut [u8], overflow: OverflowPolicy) -> Result<()> {
        let def = &self.definition;
        let mut raw = self.raw;

        if overflow == OverflowPolicy::Truncate && !codec::fits(raw, def.bit_length, def.value_type) {
            let truncated = codec::truncate(raw, def.bit_length, def.value_type);
            log::warn!(
                "Signal '{}' value {} does not fit {} bits, truncated to {}",
                def.name,
                raw,
                def.bit_length,
                truncated
            );
            raw = truncated;
        }

        codec::encode(data, def.bit_offset, def.bit_length, def.byte_order, def.value_type, raw)
    }
}
