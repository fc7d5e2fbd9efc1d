//! Runtime message
//!
//! A message owns its signals in definition order and a set of message-level
//! listeners. Receiving a payload decodes every signal before any of them is
//! updated, so an undecodable payload leaves all values untouched.

use crate::config::OverflowPolicy;
use crate::listeners::{ListenerHandle, ListenerSet};
use crate::signal::Signal;
use crate::signals::MessageDefinition;
use crate::types::{CanFrame, MessageKey, Result, Timestamp};
use std::collections::HashMap;

/// A message of the database with its live signals
#[derive(Debug)]
pub struct Message {
    name: String,
    id: u32,
    extended: bool,
    length: usize,
    triggered: bool,
    interval_ms: u64,
    signals: Vec<Signal>,
    signal_index: HashMap<String, usize>,
    listeners: ListenerSet<Message>,
    last_sent: Option<Timestamp>,
}

impl Message {
    /// Build a message and its signals from a definition
    pub fn new(definition: MessageDefinition) -> Self {
        let signal_index = definition
            .signals
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.name.clone(), idx))
            .collect();

        Self {
            name: definition.name,
            id: definition.id,
            extended: definition.extended,
            length: definition.length,
            triggered: definition.triggered,
            interval_ms: definition.interval_ms,
            signals: definition.signals.into_iter().map(Signal::new).collect(),
            signal_index,
            listeners: ListenerSet::default(),
            last_sent: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arbitration ID
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Numeric dispatch key
    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.id, self.extended)
    }

    /// Payload length in bytes
    pub fn length(&self) -> usize {
        self.length
    }

    /// Cycle time in milliseconds, if the message is sent periodically
    pub fn interval_ms(&self) -> Option<u64> {
        (self.interval_ms > 0 && !self.triggered).then_some(self.interval_ms)
    }

    /// Time of the last transmission through the database
    pub fn last_sent(&self) -> Option<Timestamp> {
        self.last_sent
    }

    pub(crate) fn mark_sent(&mut self, at: Timestamp) {
        self.last_sent = Some(at);
    }

    /// Signals in definition order
    pub fn signals(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter()
    }

    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signal_index.get(name).map(|&idx| &self.signals[idx])
    }

    pub fn signal_mut(&mut self, name: &str) -> Option<&mut Signal> {
        match self.signal_index.get(name) {
            Some(&idx) => Some(&mut self.signals[idx]),
            None => None,
        }
    }

    /// Notify message listeners
    pub fn update(&mut self) {
        let mut listeners = std::mem::take(&mut self.listeners);
        listeners.notify(self);
        self.listeners = listeners;
    }

    /// Register a listener called with this message after each received frame
    pub fn register_on_change_listener<F>(&mut self, listener: F) -> ListenerHandle
    where
        F: FnMut(&Message) + Send + 'static,
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

    /// Decode a received payload into the signals, then notify
    ///
    /// Signal listeners fire in definition order, followed by the message
    /// listeners. Nothing is updated if any signal fails to decode.
    pub fn receive(&mut self, data: &[u8]) -> Result<()> {
        let raws = self
            .signals
            .iter()
            .map(|signal| signal.decode(data))
            .collect::<Result<Vec<_>>>()?;

        for (signal, raw) in self.signals.iter_mut().zip(raws) {
            signal.update_raw(raw);
        }
        self.update();
        Ok(())
    }

    /// Assemble a payload from the current signal values
    pub fn encode(&self, overflow: OverflowPolicy) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.length];
        for signal in &self.signals {
            signal.encode(&mut data, overflow)?;
        }
        Ok(data)
    }

    /// Assemble the data frame carrying the current signal values
    pub fn to_frame(&self, overflow: OverflowPolicy) -> Result<CanFrame> {
        Ok(CanFrame::new(self.id, self.extended, self.encode(overflow)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{ByteOrder, SignalDefinition, ValueType};
    use crate::types::DatabaseError;
    use std::sync::{Arc, Mutex};

    fn status() -> Message {
        Message::new(MessageDefinition::new(
            "Status",
            0x200,
            false,
            vec![
                SignalDefinition::new("Speed", 0, 12).with_scaling(0.1, 0.0),
                SignalDefinition::new("Gear", 12, 4),
                SignalDefinition::new("Temp", 16, 8)
                    .with_value_type(ValueType::Signed)
                    .with_scaling(1.0, 0.0),
            ],
        ))
    }

    #[test]
    fn test_structure() {
        let msg = status();
        assert_eq!(msg.name(), "Status");
        assert_eq!(msg.key(), MessageKey::new(0x200, false));
        assert_eq!(msg.length(), 3);
        assert_eq!(
            msg.signals().map(Signal::name).collect::<Vec<_>>(),
            vec!["Speed", "Gear", "Temp"]
        );
        assert!(msg.signal("Gear").is_some());
        assert!(msg.signal("Missing").is_none());
        assert_eq!(msg.interval_ms(), None);
    }

    #[test]
    fn test_receive_updates_signals_then_message() {
        let mut msg = status();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["Speed", "Gear", "Temp"] {
            let order = Arc::clone(&order);
            msg.signal_mut(name)
                .unwrap()
                .register_on_change_listener(move |s| order.lock().unwrap().push(s.name().to_string()));
        }
        let sink = Arc::clone(&order);
        msg.register_on_change_listener(move |m| sink.lock().unwrap().push(m.name().to_string()));

        // Speed = 0x3E8 (1000), Gear = 3, Temp = -5
        msg.receive(&[0xE8, 0x33, 0xFB]).unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["Speed", "Gear", "Temp", "Status"]);
        assert_eq!(msg.signal("Speed").unwrap().value(), 100.0);
        assert_eq!(msg.signal("Gear").unwrap().raw_value(), 3);
        assert_eq!(msg.signal("Temp").unwrap().raw_value(), -5);
    }

    #[test]
    fn test_short_payload_leaves_values_untouched() {
        let mut msg = status();
        msg.receive(&[0xE8, 0x33, 0xFB]).unwrap();

        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        msg.register_on_change_listener(move |_| *counter.lock().unwrap() += 1);

        let err = msg.receive(&[0x00, 0x00]).unwrap_err();
        assert!(matches!(err, DatabaseError::OutOfRange { .. }));
        assert_eq!(msg.signal("Speed").unwrap().raw_value(), 0x3E8);
        assert_eq!(*fired.lock().unwrap(), 0);
    }

    #[test]
    fn test_encode_round_trip() {
        let mut msg = status();
        msg.signal_mut("Speed").unwrap().update(100.0);
        msg.signal_mut("Gear").unwrap().update(3.0);
        msg.signal_mut("Temp").unwrap().update(-5.0);

        let frame = msg.to_frame(OverflowPolicy::Error).unwrap();
        assert_eq!(frame.can_id, 0x200);
        assert!(!frame.is_remote_frame);
        assert_eq!(frame.data, vec![0xE8, 0x33, 0xFB]);
    }

    #[test]
    fn test_encode_overflow_aborts() {
        let mut msg = status();
        msg.signal_mut("Gear").unwrap().update(16.0);
        assert!(matches!(
            msg.encode(OverflowPolicy::Error),
            Err(DatabaseError::ValueOverflow { .. })
        ));
    }

    #[test]
    fn test_big_endian_payload() {
        let mut msg = Message::new(MessageDefinition::new(
            "Motorola",
            0x300,
            false,
            vec![SignalDefinition::new("Word", 0, 16).with_byte_order(ByteOrder::BigEndian)],
        ));
        msg.receive(&[0x12, 0x34]).unwrap();
        assert_eq!(msg.signal("Word").unwrap().raw_value(), 0x1234);
        assert_eq!(msg.encode(OverflowPolicy::Error).unwrap(), vec![0x12, 0x34]);
    }
}
