//! CAN Signal Database Library
//!
//! A runtime database of CAN messages and signals built from a JSON network
//! description. It decodes received frames into physical signal values,
//! notifies registered listeners and encodes signal values back into frames
//! for transmission.
//!
//! # Architecture
//!
//! - [`codec`] packs and unpacks bit fields of a payload
//! - [`signals`] holds the immutable definitions and the description parser
//! - [`Signal`] and [`Message`] carry the live values and their listeners
//! - [`Database`] routes frames between a [`Transport`] and the messages
//!
//! The library does NOT:
//! - Parse DBC, ARXML or other database formats
//! - Multiplex signals or reassemble transport-protocol segments
//! - Schedule anything on its own; cyclic sending is driven by the caller
//!   through [`Database::send_due`]
//!
//! # Example Usage
//!
//! ```no_run
//! use can_signal_db::{Database, DatabaseConfig, NetworkDescription, VirtualChannel};
//! use std::path::Path;
//!
//! let description = NetworkDescription::from_file(Path::new("network.json")).unwrap();
//! let mut db = Database::setup(
//!     &description,
//!     "Powertrain",
//!     VirtualChannel::new("vcan0"),
//!     DatabaseConfig::new(),
//! ).unwrap();
//!
//! db.register_listener("Engine.RPM", |update| {
//!     if let can_signal_db::Notification::Signal(signal) = update {
//!         println!("RPM = {}", signal.value());
//!     }
//! }).unwrap();
//!
//! db.update_signal_value("Throttle", "Position", 42.5).unwrap();
//! db.send("Throttle").unwrap();
//!
//! loop {
//!     db.poll().unwrap();
//! }
//! ```

// Public modules
pub mod codec;
pub mod config;
pub mod database;
pub mod listeners;
pub mod message;
pub mod scaling;
pub mod signal;
pub mod signals;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::{DatabaseConfig, OverflowPolicy};
pub use database::{Database, DatabaseStats};
pub use listeners::{Listener, ListenerHandle, ListenerPath, Notification};
pub use message::Message;
pub use signal::Signal;
pub use signals::{
    ByteOrder, MessageDefinition, NetworkDescription, SignalDefinition, ValueType,
};
pub use transport::{RxFilter, Transport, VirtualChannel};
#[cfg(feature = "use-socketcan")]
pub use transport::SocketCanChannel;
pub use types::{CanFrame, DatabaseError, MessageKey, Result, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
