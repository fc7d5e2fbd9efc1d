//! Linux SocketCAN transport (feature `use-socketcan`)

use super::Transport;
use crate::types::{CanFrame, DatabaseError, Result, MAX_STANDARD_ID};
use chrono::Utc;
use socketcan::{CANFrame, CANSocket};
use std::io;

/// Raw CAN socket bound to one interface (e.g. `can0`, `vcan0`)
pub struct SocketCanChannel {
    interface: String,
    timestamps: bool,
    socket: Option<CANSocket>,
}

impl SocketCanChannel {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            timestamps: false,
            socket: None,
        }
    }

    /// Builder method: stamp received frames with the current time
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    fn socket(&self) -> Result<&CANSocket> {
        self.socket.as_ref().ok_or_else(|| {
            DatabaseError::TransportFailure(format!("interface '{}' is not started", self.interface))
        })
    }

    fn failure(&self, what: &str, err: impl std::fmt::Display) -> DatabaseError {
        DatabaseError::TransportFailure(format!("{} on '{}': {}", what, self.interface, err))
    }
}

/// The socket derives the frame format from the ID value alone, so an
/// extended frame needs an ID above the 11-bit range and a standard frame
/// one inside it.
fn check_format(frame: &CanFrame) -> Result<()> {
    if frame.is_extended != (frame.can_id > MAX_STANDARD_ID) {
        return Err(DatabaseError::TransportFailure(format!(
            "ID 0x{:X} cannot be sent as {} frame on SocketCAN",
            frame.can_id,
            if frame.is_extended { "an extended" } else { "a standard" }
        )));
    }
    Ok(())
}

impl Transport for SocketCanChannel {
    fn start(&mut self) -> Result<()> {
        let socket = CANSocket::open(&self.interface).map_err(|e| self.failure("open", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| self.failure("set_nonblocking", e))?;

        log::info!("Opened SocketCAN interface {}", self.interface);
        self.socket = Some(socket);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.socket()?;
        self.socket = None;
        log::info!("Closed SocketCAN interface {}", self.interface);
        Ok(())
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        check_format(frame)?;

        let raw = CANFrame::new(frame.can_id, &frame.data, frame.is_remote_frame, false)
            .map_err(|e| self.failure("build frame", e))?;
        self.socket()?
            .write_frame(&raw)
            .map_err(|e| self.failure("write", e))
    }

    fn recv(&mut self) -> Result<Option<CanFrame>> {
        match self.socket()?.read_frame() {
            Ok(raw) => {
                let mut frame = CanFrame::new(raw.id(), raw.is_extended(), raw.data().to_vec());
                frame.is_remote_frame = raw.is_rtr();
                frame.is_error_frame = raw.is_error();
                if self.timestamps {
                    frame.timestamp_ns = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
                }
                Ok(Some(frame))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(self.failure("read", e)),
        }
    }
}
