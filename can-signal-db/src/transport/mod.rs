//! CAN transports
//!
//! A transport moves frames between a [`Database`](crate::Database) and a CAN
//! interface. The database only starts and stops it, sends frames and polls
//! for received ones; interface bring-up is the transport's business.

use crate::types::{CanFrame, Result};

pub mod virtual_channel;
#[cfg(feature = "use-socketcan")]
pub mod socket_can;

// Re-export transport types
pub use virtual_channel::{RxFilter, VirtualChannel};
#[cfg(feature = "use-socketcan")]
pub use socket_can::SocketCanChannel;

/// Frame send/receive primitive consumed by the database
pub trait Transport {
    /// Bring the channel up
    fn start(&mut self) -> Result<()>;

    /// Tear the channel down
    fn stop(&mut self) -> Result<()>;

    /// Transmit one frame
    fn send(&mut self, frame: &CanFrame) -> Result<()>;

    /// Next received frame, or `None` if nothing is pending (never blocks)
    fn recv(&mut self) -> Result<Option<CanFrame>>;
}
