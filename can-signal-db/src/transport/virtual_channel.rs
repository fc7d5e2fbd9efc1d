//! In-process virtual CAN channel
//!
//! Stands in for a virtual CAN interface: frames handed to [`inject`] are
//! delivered by `recv`, frames passed to `send` are recorded (and optionally
//! looped back to the receive queue, like a socket with own-message reception
//! enabled).
//!
//! [`inject`]: VirtualChannel::inject

use super::Transport;
use crate::types::{
    CanFrame, DatabaseError, MessageKey, Result, MAX_CLASSIC_DLC, MAX_EXTENDED_ID, MAX_FD_DLC,
    MAX_STANDARD_ID,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Receive filter: a frame passes if `key & mask == id & mask`
///
/// Keys carry the extended flag in bit 31, so a filter can tell standard
/// and extended frames apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxFilter {
    pub id: u32,
    pub mask: u32,
}

impl RxFilter {
    pub fn new(id: u32, mask: u32) -> Self {
        Self { id, mask }
    }

    /// Filter that passes exactly one message key
    pub fn exact(key: MessageKey) -> Self {
        Self::new(key.value(), u32::MAX)
    }

    pub fn matches(&self, key: MessageKey) -> bool {
        key.value() & self.mask == self.id & self.mask
    }
}

/// Virtual CAN channel
#[derive(Debug, Default)]
pub struct VirtualChannel {
    name: String,
    channel: u8,
    timestamps: bool,
    loopback: bool,
    running: bool,
    rx_filters: Vec<RxFilter>,
    inbound: VecDeque<CanFrame>,
    sent: Vec<CanFrame>,
}

impl VirtualChannel {
    /// Create a channel (e.g. named after the interface it replaces)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder method: stamp received frames with the current time
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Builder method: deliver sent frames back to the receive queue
    pub fn with_loopback(mut self, enabled: bool) -> Self {
        self.loopback = enabled;
        self
    }

    /// Builder method: channel number written into received frames
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Replace the receive filters (empty = accept everything)
    pub fn set_rx_filters(&mut self, filters: Vec<RxFilter>) {
        self.rx_filters = filters;
    }

    /// Queue a frame as if it had arrived from the bus
    ///
    /// Returns false if the receive filters rejected it.
    pub fn inject(&mut self, mut frame: CanFrame) -> bool {
        if !self.accepts(&frame) {
            log::trace!("{}: frame {} rejected by receive filters", self.name, frame);
            return false;
        }

        frame.channel = self.channel;
        if self.timestamps && frame.timestamp_ns == 0 {
            frame.timestamp_ns = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        }
        self.inbound.push_back(frame);
        true
    }

    /// Frames transmitted so far
    pub fn sent_frames(&self) -> &[CanFrame] {
        &self.sent
    }

    /// Take the transmitted frames, leaving the record empty
    pub fn take_sent(&mut self) -> Vec<CanFrame> {
        std::mem::take(&mut self.sent)
    }

    /// Number of received frames not yet polled
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    fn accepts(&self, frame: &CanFrame) -> bool {
        self.rx_filters.is_empty() || self.rx_filters.iter().any(|f| f.matches(frame.key()))
    }

    fn ensure_running(&self) -> Result<()> {
        if self.running {
            Ok(())
        } else {
            Err(DatabaseError::TransportFailure(format!(
                "channel '{}' is not started",
                self.name
            )))
        }
    }
}

impl Transport for VirtualChannel {
    fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(DatabaseError::TransportFailure(format!(
                "channel '{}' already started",
                self.name
            )));
        }
        log::debug!("{}: channel started", self.name);
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.ensure_running()?;
        log::debug!("{}: channel stopped", self.name);
        self.running = false;
        Ok(())
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        self.ensure_running()?;

        let max_id = if frame.is_extended { MAX_EXTENDED_ID } else { MAX_STANDARD_ID };
        if frame.can_id > max_id {
            return Err(DatabaseError::TransportFailure(format!(
                "ID 0x{:X} out of range for {} frame",
                frame.can_id,
                if frame.is_extended { "extended" } else { "standard" }
            )));
        }
        let max_dlc = if frame.is_fd { MAX_FD_DLC } else { MAX_CLASSIC_DLC };
        if frame.dlc() > max_dlc {
            return Err(DatabaseError::TransportFailure(format!(
                "payload of {} bytes exceeds {} bytes",
                frame.dlc(),
                max_dlc
            )));
        }

        log::trace!("{}: TX {}", self.name, frame);
        self.sent.push(frame.clone());
        if self.loopback {
            self.inject(frame.clone());
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<Option<CanFrame>> {
        self.ensure_running()?;
        Ok(self.inbound.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut channel = VirtualChannel::new("vcan0");
        assert!(channel.send(&CanFrame::new(0x1, false, vec![1])).is_err());
        assert!(channel.recv().is_err());
        assert!(channel.stop().is_err());

        channel.start().unwrap();
        assert!(channel.is_running());
        assert!(channel.start().is_err());
        channel.stop().unwrap();
        assert!(!channel.is_running());
    }

    #[test]
    fn test_send_records_frames() {
        let mut channel = VirtualChannel::new("vcan0");
        channel.start().unwrap();

        channel.send(&CanFrame::new(0x100, false, vec![0xA0, 0x0F])).unwrap();
        assert_eq!(channel.sent_frames().len(), 1);
        assert_eq!(channel.sent_frames()[0].data, vec![0xA0, 0x0F]);
        assert_eq!(channel.pending(), 0);

        assert_eq!(channel.take_sent().len(), 1);
        assert!(channel.sent_frames().is_empty());
    }

    #[test]
    fn test_send_rejects_invalid_frames() {
        let mut channel = VirtualChannel::new("vcan0");
        channel.start().unwrap();

        assert!(channel.send(&CanFrame::new(0x800, false, vec![])).is_err());
        assert!(channel.send(&CanFrame::new(0x800, true, vec![])).is_ok());

        let mut oversized = CanFrame::new(0x1, false, vec![0; 9]);
        oversized.is_fd = false;
        assert!(channel.send(&oversized).is_err());
        assert!(channel.send(&CanFrame::new(0x1, false, vec![0; 12])).is_ok());
    }

    #[test]
    fn test_inject_and_recv() {
        let mut channel = VirtualChannel::new("vcan0").with_channel(2).with_timestamps(true);
        channel.start().unwrap();

        assert!(channel.inject(CanFrame::new(0x10, false, vec![1])));
        assert!(channel.inject(CanFrame::new(0x20, false, vec![2])));

        let first = channel.recv().unwrap().unwrap();
        assert_eq!(first.can_id, 0x10);
        assert_eq!(first.channel, 2);
        assert!(first.timestamp_ns > 0);
        assert_eq!(channel.recv().unwrap().unwrap().can_id, 0x20);
        assert!(channel.recv().unwrap().is_none());
    }

    #[test]
    fn test_rx_filters() {
        let mut channel = VirtualChannel::new("vcan0");
        channel.set_rx_filters(vec![
            RxFilter::exact(MessageKey::new(0x100, false)),
            RxFilter::new(0x8000_0200, 0x8000_0F00),
        ]);

        assert!(channel.inject(CanFrame::new(0x100, false, vec![])));
        assert!(!channel.inject(CanFrame::new(0x100, true, vec![])));
        assert!(channel.inject(CanFrame::new(0x1234_0201, true, vec![])));
        assert!(!channel.inject(CanFrame::new(0x201, false, vec![])));
        assert_eq!(channel.pending(), 2);
    }

    #[test]
    fn test_loopback() {
        let mut channel = VirtualChannel::new("vcan0").with_loopback(true);
        channel.start().unwrap();
        channel.send(&CanFrame::new(0x7FF, false, vec![0xFF])).unwrap();
        assert_eq!(channel.recv().unwrap().unwrap().can_id, 0x7FF);
    }
}
