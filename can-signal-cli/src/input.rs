//! Parsing of command line frame and assignment arguments

use anyhow::{anyhow, bail, Context, Result};
use can_signal_db::CanFrame;

/// Parse a frame in candump notation: `123#DEADBEEF`, `18FF0000#01.02`, `123#R`
///
/// IDs written with more than three hex digits are extended.
pub fn parse_frame(text: &str) -> Result<CanFrame> {
    let (id_text, data_text) = text
        .split_once('#')
        .ok_or_else(|| anyhow!("Frame '{}' is not in ID#DATA form", text))?;

    let can_id = u32::from_str_radix(id_text, 16)
        .with_context(|| format!("Invalid frame ID '{}'", id_text))?;
    let extended = id_text.len() > 3;

    if data_text.eq_ignore_ascii_case("r") {
        return Ok(CanFrame::remote(can_id, extended));
    }

    let hex: String = data_text.chars().filter(|&c| c != '.').collect();
    if !hex.is_ascii() {
        bail!("Frame data '{}' is not hexadecimal", data_text);
    }
    if hex.len() % 2 != 0 {
        bail!("Frame data '{}' has an odd number of hex digits", data_text);
    }
    let data = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .with_context(|| format!("Invalid frame data '{}'", data_text))?;

    Ok(CanFrame::new(can_id, extended, data))
}

/// A `Message.Signal=VALUE` assignment
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub message: String,
    pub signal: String,
    pub value: f64,
}

pub fn parse_assignment(text: &str) -> Result<Assignment> {
    let (path, value) = text
        .split_once('=')
        .ok_or_else(|| anyhow!("Assignment '{}' is not in Message.Signal=VALUE form", text))?;
    let (message, signal) = path
        .trim()
        .split_once('.')
        .ok_or_else(|| anyhow!("'{}' does not name a signal as Message.Signal", path))?;
    let value = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value in assignment '{}'", text))?;

    Ok(Assignment {
        message: message.to_string(),
        signal: signal.to_string(),
        value,
    })
}
