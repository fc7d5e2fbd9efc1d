//! Live signal database
//!
//! The [`Database`] owns the runtime messages of one bus and the transport
//! they travel on. Received frames are routed to their message by numeric key,
//! decoded into the signals and announced to listeners; outgoing frames are
//! assembled from the current signal values.
//!
//! Everything runs on the caller's thread. Listeners execute inline with
//! [`Database::dispatch`], so a slow listener delays further frame processing.
//! To share a database between threads, wrap it in a lock.
//!
//! # Example
//!
//! ```
//! use can_signal_db::{CanFrame, Database, DatabaseConfig, NetworkDescription, VirtualChannel};
//!
//! let description = NetworkDescription::from_json_str(r#"{
//!     "buses": { "Powertrain": { "messages": [
//!         { "name": "Engine", "id": 256, "length": 2, "signals": [
//!             { "name": "RPM", "bitOffset": 0, "bitLength": 16, "factor": 0.25 }
//!         ] }
//!     ] } }
//! }"#).unwrap();
//!
//! let mut db = Database::setup(
//!     &description,
//!     "Powertrain",
//!     VirtualChannel::new("vcan0"),
//!     DatabaseConfig::new(),
//! ).unwrap();
//!
//! db.register_listener("Engine.RPM", |update| println!("{} changed", update.name())).unwrap();
//! db.dispatch(&CanFrame::new(0x100, false, vec![0xA0, 0x0F]));
//! assert_eq!(db.signal("Engine", "RPM").unwrap().value(), 1000.0);
//! ```

use crate::config::DatabaseConfig;
use crate::listeners::{ListenerHandle, ListenerPath, Notification};
use crate::message::Message;
use crate::signal::Signal;
use crate::signals::{validate_bus, MessageDefinition, NetworkDescription};
use crate::transport::Transport;
use crate::types::{CanFrame, DatabaseError, MessageKey, Result, Timestamp};
use chrono::{Duration, Utc};
use std::collections::HashMap;

/// The live database of one CAN bus
pub struct Database<T: Transport> {
    transport: T,
    config: DatabaseConfig,
    /// All messages, in definition order
    messages: Vec<Message>,
    /// Message name → index into `messages`
    by_name: HashMap<String, usize>,
    /// Numeric key → index into `messages`
    by_key: HashMap<MessageKey, usize>,
    running: bool,
}

impl<T: Transport> Database<T> {
    /// Build a database from message definitions without starting the transport
    pub fn new(definitions: Vec<MessageDefinition>, transport: T, config: DatabaseConfig) -> Result<Self> {
        validate_bus(&definitions)?;

        let mut by_name = HashMap::with_capacity(definitions.len());
        let mut by_key = HashMap::with_capacity(definitions.len());
        let messages: Vec<Message> = definitions
            .into_iter()
            .enumerate()
            .map(|(idx, definition)| {
                by_name.insert(definition.name.clone(), idx);
                by_key.insert(definition.key(), idx);
                Message::new(definition)
            })
            .collect();

        Ok(Self {
            transport,
            config,
            messages,
            by_name,
            by_key,
            running: false,
        })
    }

    /// Build the database for one bus of a description and start the transport
    ///
    /// Nothing is kept if the description is invalid or the transport fails
    /// to start.
    pub fn setup(
        description: &NetworkDescription,
        bus: &str,
        transport: T,
        config: DatabaseConfig,
    ) -> Result<Self> {
        log::info!("Setting up CAN database for bus '{}'", bus);

        let mut db = Self::new(description.messages(bus)?, transport, config)?;
        db.start()?;

        let stats = db.stats();
        log::info!(
            "CAN database ready: {} messages, {} signals",
            stats.num_messages,
            stats.num_signals
        );
        Ok(db)
    }

    /// Start the transport
    pub fn start(&mut self) -> Result<()> {
        self.transport.start()?;
        self.running = true;
        Ok(())
    }

    /// Stop the transport
    pub fn stop(&mut self) -> Result<()> {
        log::info!("Stopping CAN database");
        self.transport.stop()?;
        self.running = false;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Route one received frame to its message and notify listeners
    ///
    /// Remote request frames, error frames, filtered and unknown IDs are
    /// ignored. A frame whose payload cannot be decoded is logged and
    /// dropped. Returns true if a message was updated.
    pub fn dispatch(&mut self, frame: &CanFrame) -> bool {
        if frame.is_remote_frame || frame.is_error_frame {
            log::trace!("Ignoring non-data frame {}", frame);
            return false;
        }

        let key = frame.key();
        if !self.config.should_process_message(key) {
            log::trace!("Message ID {} filtered", key);
            return false;
        }

        let Some(&idx) = self.by_key.get(&key) else {
            log::trace!("Message ID {} not found", key);
            return false;
        };

        let message = &mut self.messages[idx];
        match message.receive(&frame.data) {
            Ok(()) => {
                log::debug!("Decoded message: {} (ID {})", message.name(), key);
                true
            }
            Err(e) => {
                log::warn!("Dropping frame {} for message '{}': {}", frame, message.name(), e);
                false
            }
        }
    }

    /// Dispatch every frame the transport has pending
    ///
    /// Returns the number of frames read.
    pub fn poll(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Some(frame) = self.transport.recv()? {
            self.dispatch(&frame);
            count += 1;
        }
        Ok(count)
    }

    /// Encode the current signal values of a message and transmit it
    pub fn send(&mut self, message_name: &str) -> Result<()> {
        let idx = self.message_index(message_name)?;
        self.send_index(idx, Utc::now())
    }

    /// Transmit every cyclic message whose interval has elapsed at `now`
    ///
    /// Returns the number of frames sent.
    pub fn send_due(&mut self, now: Timestamp) -> Result<usize> {
        let due: Vec<usize> = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, message)| match (message.interval_ms(), message.last_sent()) {
                (Some(_), None) => true,
                (Some(interval), Some(last)) => i64::try_from(interval)
                    .ok()
                    .and_then(Duration::try_milliseconds)
                    .is_some_and(|period| now - last >= period),
                (None, _) => false,
            })
            .map(|(idx, _)| idx)
            .collect();

        for &idx in &due {
            self.send_index(idx, now)?;
        }
        Ok(due.len())
    }

    fn send_index(&mut self, idx: usize, now: Timestamp) -> Result<()> {
        let message = &self.messages[idx];
        let frame = message.to_frame(self.config.overflow)?;
        log::debug!("Sending message: {} as {}", message.name(), frame);

        self.transport.send(&frame)?;
        self.messages[idx].mark_sent(now);
        Ok(())
    }

    /// Set the physical value of a signal and notify its listeners
    ///
    /// The value goes out with the next `send` of its message.
    pub fn update_signal_value(&mut self, message_name: &str, signal_name: &str, value: f64) -> Result<()> {
        self.signal_mut(message_name, signal_name)?.update(value);
        Ok(())
    }

    /// Register a listener by `"Message"` or `"Message.Signal"` name
    pub fn register_listener<F>(&mut self, path: &str, mut listener: F) -> Result<ListenerHandle>
    where
        F: FnMut(Notification<'_>) + Send + 'static,
    {
        match ListenerPath::parse(path) {
            ListenerPath::Message(message) => self.register_message_listener(message, move |m| {
                listener(Notification::Message(m))
            }),
            ListenerPath::Signal { message, signal } => {
                self.register_signal_listener(message, signal, move |s| listener(Notification::Signal(s)))
            }
        }
    }

    /// Remove a listener registered under `"Message"` or `"Message.Signal"`
    ///
    /// Returns false if the handle was not registered on that target.
    pub fn unregister_listener(&mut self, path: &str, handle: ListenerHandle) -> Result<bool> {
        match ListenerPath::parse(path) {
            ListenerPath::Message(message) => self.unregister_message_listener(message, handle),
            ListenerPath::Signal { message, signal } => {
                self.unregister_signal_listener(message, signal, handle)
            }
        }
    }

    pub fn register_message_listener<F>(&mut self, message_name: &str, listener: F) -> Result<ListenerHandle>
    where
        F: FnMut(&Message) + Send + 'static,
    {
        Ok(self.message_mut(message_name)?.register_on_change_listener(listener))
    }

    pub fn unregister_message_listener(&mut self, message_name: &str, handle: ListenerHandle) -> Result<bool> {
        Ok(self.message_mut(message_name)?.unregister_on_change_listener(handle))
    }

    pub fn register_signal_listener<F>(
        &mut self,
        message_name: &str,
        signal_name: &str,
        listener: F,
    ) -> Result<ListenerHandle>
    where
        F: FnMut(&Signal) + Send + 'static,
    {
        Ok(self
            .signal_mut(message_name, signal_name)?
            .register_on_change_listener(listener))
    }

    pub fn unregister_signal_listener(
        &mut self,
        message_name: &str,
        signal_name: &str,
        handle: ListenerHandle,
    ) -> Result<bool> {
        Ok(self
            .signal_mut(message_name, signal_name)?
            .unregister_on_change_listener(handle))
    }

    /// Get a message by name
    pub fn message(&self, name: &str) -> Result<&Message> {
        Ok(&self.messages[self.message_index(name)?])
    }

    /// Get a message by name for direct manipulation
    pub fn message_mut(&mut self, name: &str) -> Result<&mut Message> {
        let idx = self.message_index(name)?;
        Ok(&mut self.messages[idx])
    }

    /// Get a message by numeric key
    pub fn message_by_key(&self, key: MessageKey) -> Option<&Message> {
        self.by_key.get(&key).map(|&idx| &self.messages[idx])
    }

    /// All messages, in definition order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Get a signal by message and signal name
    pub fn signal(&self, message_name: &str, signal_name: &str) -> Result<&Signal> {
        self.message(message_name)?
            .signal(signal_name)
            .ok_or_else(|| unknown_signal(message_name, signal_name))
    }

    fn signal_mut(&mut self, message_name: &str, signal_name: &str) -> Result<&mut Signal> {
        self.message_mut(message_name)?
            .signal_mut(signal_name)
            .ok_or_else(|| unknown_signal(message_name, signal_name))
    }

    fn message_index(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| DatabaseError::UnknownMessage(name.to_string()))
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.iter().map(|m| m.signals().count()).sum(),
        }
    }
}

impl<T: Transport> Drop for Database<T> {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.transport.stop() {
                log::warn!("Failed to stop transport: {}", e);
            }
        }
    }
}

fn unknown_signal(message: &str, signal: &str) -> DatabaseError {
    DatabaseError::UnknownSignal {
        message: message.to_string(),
        signal: signal.to_string(),
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of messages
    pub num_messages: usize,
    /// Total number of signals
    pub num_signals: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::signals::{SignalDefinition, ValueType};
    use crate::transport::VirtualChannel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn definitions() -> Vec<MessageDefinition> {
        vec![
            MessageDefinition::new(
                "Engine",
                0x100,
                false,
                vec![SignalDefinition::new("RPM", 0, 16).with_scaling(0.25, 0.0)],
            )
            .with_length(2),
            MessageDefinition::new(
                "EngineExt",
                0x100,
                true,
                vec![SignalDefinition::new("Load", 0, 8)],
            ),
            MessageDefinition::new(
                "Climate",
                0x321,
                false,
                vec![
                    SignalDefinition::new("Temp", 0, 8)
                        .with_value_type(ValueType::Signed)
                        .with_default(21.0),
                    SignalDefinition::new("Fan", 8, 3),
                ],
            )
            .with_interval(100),
        ]
    }

    fn database() -> Database<VirtualChannel> {
        let mut db = Database::new(definitions(), VirtualChannel::new("vcan0"), DatabaseConfig::new()).unwrap();
        db.start().unwrap();
        db
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut(Notification<'_>) + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_: Notification<'_>| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_indices_agree() {
        let db = database();
        assert_eq!(db.stats(), DatabaseStats { num_messages: 3, num_signals: 4 });

        for message in db.messages() {
            let by_key = db.message_by_key(message.key()).unwrap();
            assert_eq!(by_key.name(), message.name());
            assert_eq!(db.message(message.name()).unwrap().key(), message.key());
        }
    }

    #[test]
    fn test_new_rejects_invalid_definitions() {
        let mut defs = definitions();
        defs.push(MessageDefinition::new("Engine", 0x555, false, vec![]));
        let result = Database::new(defs, VirtualChannel::new("vcan0"), DatabaseConfig::new());
        assert!(matches!(result, Err(DatabaseError::InvalidDescription(_))));
    }

    #[test]
    fn test_new_rejects_unbounded_interval() {
        let mut defs = definitions();
        defs.push(
            MessageDefinition::new("Slow", 0x400, false, vec![SignalDefinition::new("A", 0, 8)])
                .with_interval(1 << 63),
        );
        let result = Database::new(defs, VirtualChannel::new("vcan0"), DatabaseConfig::new());
        assert!(matches!(result, Err(DatabaseError::InvalidDescription(_))));
    }

    #[test]
    fn test_dispatch_decodes_and_notifies() {
        let mut db = database();
        let (signal_count, on_signal) = counter();
        let (message_count, on_message) = counter();
        db.register_listener("Engine.RPM", on_signal).unwrap();
        db.register_listener("Engine", on_message).unwrap();

        assert!(db.dispatch(&CanFrame::new(0x100, false, vec![0xA0, 0x0F])));

        assert_eq!(db.signal("Engine", "RPM").unwrap().value(), 1000.0);
        assert_eq!(signal_count.load(Ordering::SeqCst), 1);
        assert_eq!(message_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_routes_by_extended_flag() {
        let mut db = database();
        let (standard, on_standard) = counter();
        let (extended, on_extended) = counter();
        db.register_listener("Engine", on_standard).unwrap();
        db.register_listener("EngineExt", on_extended).unwrap();

        db.dispatch(&CanFrame::new(0x100, true, vec![0x7F]));
        assert_eq!(standard.load(Ordering::SeqCst), 0);
        assert_eq!(extended.load(Ordering::SeqCst), 1);
        assert_eq!(db.signal("EngineExt", "Load").unwrap().raw_value(), 0x7F);
        assert_eq!(db.signal("Engine", "RPM").unwrap().raw_value(), 0);
    }

    #[test]
    fn test_dispatch_ignores_unknown_remote_and_short_frames() {
        let mut db = database();
        let (count, on_any) = counter();
        db.register_listener("Engine", on_any).unwrap();

        assert!(!db.dispatch(&CanFrame::new(0x7AB, false, vec![1, 2, 3])));
        assert!(!db.dispatch(&CanFrame::remote(0x100, false)));
        assert!(!db.dispatch(&CanFrame::new(0x100, false, vec![0xA0])));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(db.signal("Engine", "RPM").unwrap().raw_value(), 0);
    }

    #[test]
    fn test_dispatch_respects_message_filter() {
        let config = DatabaseConfig::new().with_message_filter(vec![MessageKey::new(0x321, false)]);
        let mut db = Database::new(definitions(), VirtualChannel::new("vcan0"), config).unwrap();

        assert!(!db.dispatch(&CanFrame::new(0x100, false, vec![0xA0, 0x0F])));
        assert!(db.dispatch(&CanFrame::new(0x321, false, vec![0x05, 0x01])));
    }

    #[test]
    fn test_send_encodes_current_values() {
        let mut db = database();
        db.update_signal_value("Engine", "RPM", 1000.0).unwrap();
        db.send("Engine").unwrap();

        let sent = db.transport().sent_frames();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].can_id, 0x100);
        assert!(!sent[0].is_extended);
        assert!(!sent[0].is_remote_frame);
        assert_eq!(sent[0].data, vec![0xA0, 0x0F]);
    }

    #[test]
    fn test_send_uses_default_values() {
        let mut db = database();
        db.send("Climate").unwrap();
        assert_eq!(db.transport().sent_frames()[0].data, vec![21, 0]);
    }

    #[test]
    fn test_send_full_width_range_signal() {
        let defs = vec![MessageDefinition::new(
            "Level",
            0x50,
            false,
            vec![SignalDefinition::new("Fill", 0, 64).with_range(1.0, 100.0, 1.0)],
        )];
        let mut db = Database::new(defs, VirtualChannel::new("vcan0"), DatabaseConfig::new()).unwrap();
        db.start().unwrap();

        db.update_signal_value("Level", "Fill", 100.0).unwrap();
        db.send("Level").unwrap();
        assert_eq!(db.transport().sent_frames()[0].data, vec![0xFF; 8]);

        db.update_signal_value("Level", "Fill", 1.0).unwrap();
        db.send("Level").unwrap();
        assert_eq!(db.transport().sent_frames()[1].data, vec![0x00; 8]);
    }

    #[test]
    fn test_send_overflow() {
        let mut db = database();
        db.update_signal_value("Climate", "Fan", 9.0).unwrap();
        assert!(matches!(db.send("Climate"), Err(DatabaseError::ValueOverflow { .. })));
        assert!(db.transport().sent_frames().is_empty());

        let config = DatabaseConfig::new().with_overflow(OverflowPolicy::Truncate);
        let mut db = Database::new(definitions(), VirtualChannel::new("vcan0"), config).unwrap();
        db.start().unwrap();
        db.update_signal_value("Climate", "Fan", 9.0).unwrap();
        db.send("Climate").unwrap();
        assert_eq!(db.transport().sent_frames()[0].data, vec![21, 1]);
    }

    #[test]
    fn test_send_requires_started_transport() {
        let mut db = Database::new(definitions(), VirtualChannel::new("vcan0"), DatabaseConfig::new()).unwrap();
        assert!(matches!(db.send("Engine"), Err(DatabaseError::TransportFailure(_))));
    }

    #[test]
    fn test_lookup_errors() {
        let mut db = database();
        assert!(matches!(db.send("Nope"), Err(DatabaseError::UnknownMessage(_))));
        assert!(matches!(
            db.update_signal_value("Engine", "Nope", 1.0),
            Err(DatabaseError::UnknownSignal { .. })
        ));
        assert!(matches!(
            db.register_listener("Nope.RPM", |_| {}),
            Err(DatabaseError::UnknownMessage(_))
        ));
        assert!(matches!(
            db.register_listener("Engine.Nope", |_| {}),
            Err(DatabaseError::UnknownSignal { .. })
        ));
        assert!(matches!(
            db.register_listener("Nope", |_| {}),
            Err(DatabaseError::UnknownMessage(_))
        ));
    }

    #[test]
    fn test_unregister_listener() {
        let mut db = database();
        let (count, on_rpm) = counter();
        let handle = db.register_listener("Engine.RPM", on_rpm).unwrap();

        db.dispatch(&CanFrame::new(0x100, false, vec![0, 0]));
        assert!(db.unregister_listener("Engine.RPM", handle).unwrap());
        // Wrong target or already removed: no-op
        assert!(!db.unregister_listener("Engine", handle).unwrap());
        assert!(!db.unregister_listener("Engine.RPM", handle).unwrap());
        db.dispatch(&CanFrame::new(0x100, false, vec![0, 0]));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(db.unregister_listener("Engine.Nope", handle).is_err());
    }

    #[test]
    fn test_update_signal_value_notifies() {
        let mut db = database();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        db.register_signal_listener("Climate", "Temp", move |s| sink.lock().unwrap().push(s.value()))
            .unwrap();

        db.update_signal_value("Climate", "Temp", -3.0).unwrap();
        db.update_signal_value("Climate", "Temp", -3.0).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![-3.0, -3.0]);
    }

    #[test]
    fn test_poll_dispatches_pending_frames() {
        let mut db = database();
        db.transport_mut().inject(CanFrame::new(0x100, false, vec![0xA0, 0x0F]));
        db.transport_mut().inject(CanFrame::new(0x555, false, vec![]));

        assert_eq!(db.poll().unwrap(), 2);
        assert_eq!(db.signal("Engine", "RPM").unwrap().value(), 1000.0);
        assert_eq!(db.poll().unwrap(), 0);
    }

    #[test]
    fn test_send_due_cyclic_messages() {
        let mut db = database();
        let start = Utc::now();

        assert_eq!(db.send_due(start).unwrap(), 1);
        assert_eq!(db.send_due(start + Duration::milliseconds(50)).unwrap(), 0);
        assert_eq!(db.send_due(start + Duration::milliseconds(100)).unwrap(), 1);

        let sent = db.transport().sent_frames();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|f| f.can_id == 0x321));
        assert_eq!(
            db.message("Climate").unwrap().last_sent(),
            Some(start + Duration::milliseconds(100))
        );
    }

    #[test]
    fn test_stop() {
        let mut db = database();
        db.stop().unwrap();
        assert!(!db.is_running());
        assert!(!db.transport().is_running());
        assert!(db.stop().is_err());
    }
}
