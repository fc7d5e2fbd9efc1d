//! Raw ↔ physical value conversion
//!
//! Two mappings exist. The linear one applies `factor` and `offset`. The
//! normalized range mapping spreads the full raw range of a field over
//! `min..max` and quantizes the result to `resolution` steps; it ignores
//! factor and offset.

/// Apply factor and offset to a raw value
pub fn to_physical(raw: i128, factor: f64, offset: f64) -> f64 {
    raw as f64 * factor + offset
}

/// Invert factor and offset, rounding to the nearest integer
pub fn to_raw(physical: f64, factor: f64, offset: f64) -> i128 {
    ((physical - offset) / factor).round() as i128
}

/// Normalized range mapping of a signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeMapping {
    pub min: f64,
    pub max: f64,
    pub resolution: f64,
}

impl RangeMapping {
    /// Map a raw value onto `min..max`, floored to a multiple of `resolution`
    pub fn to_physical(&self, raw: i128, bit_length: u16) -> f64 {
        let percentage = raw as f64 / source_range(bit_length);
        let exact = percentage * (self.max - self.min);
        let quantized = (exact / self.resolution).floor() * self.resolution;
        quantized + self.min
    }

    /// Map a physical value back to the nearest raw value
    ///
    /// Values outside `min..max` saturate at the ends of the raw range.
    pub fn to_raw(&self, physical: f64, bit_length: u16) -> i128 {
        let percentage = (physical - self.min) / (self.max - self.min);
        let raw = (percentage * source_range(bit_length)).round() as i128;
        raw.clamp(0, max_raw(bit_length))
    }
}

/// Largest raw value of an unsigned field, as a float
fn source_range(bit_length: u16) -> f64 {
    2f64.powi(bit_length as i32) - 1.0
}

/// Largest raw value of an unsigned field
fn max_raw(bit_length: u16) -> i128 {
    (1i128 << bit_length.min(64)) - 1
}
