//! Bit codec
//!
//! Moves integer values in and out of arbitrary bit fields of a frame payload.
//! Whole-byte fields on a byte boundary are plain fixed-width integer loads and
//! stores; everything else goes through generic bit extraction over the
//! minimal byte span that covers the field.
//!
//! Bit numbering depends on the byte order of the field:
//! - Little-endian (Intel): bit `n` is bit `n % 8` (LSB = 0) of byte `n / 8`,
//!   and the field grows towards more significant bits.
//! - Big-endian (Motorola): bit `n` is counted MSB-first inside byte `n / 8`,
//!   so the first bit of the field is its most significant bit.
//!
//! Raw values are carried as `i128` so that both the full unsigned 64-bit
//! range and the full signed 64-bit range are representable.

use crate::signals::{ByteOrder, ValueType};
use crate::types::{DatabaseError, Result};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Largest supported field width in bits
pub const MAX_BIT_LENGTH: u16 = 64;

/// Byte span covering one bit field
#[derive(Debug, Clone, Copy)]
struct BitSpan {
    first_byte: usize,
    end_byte: usize,
    /// Bit offset inside the first byte (0..=7)
    bit_in_byte: u32,
    bit_length: u32,
}

impl BitSpan {
    fn new(buffer_len: usize, bit_offset: u16, bit_length: u16) -> Result<Self> {
        let end_bit = bit_offset as usize + bit_length as usize;
        if bit_length == 0 || bit_length > MAX_BIT_LENGTH || end_bit > buffer_len * 8 {
            return Err(DatabaseError::OutOfRange {
                bit_offset,
                bit_length,
                buffer_bits: buffer_len * 8,
            });
        }

        Ok(Self {
            first_byte: bit_offset as usize / 8,
            end_byte: (end_bit + 7) / 8,
            bit_in_byte: (bit_offset % 8) as u32,
            bit_length: bit_length as u32,
        })
    }

    /// Width of the covered byte span in bits
    fn width(&self) -> u32 {
        ((self.end_byte - self.first_byte) * 8) as u32
    }

    /// Position of the field's least significant bit inside the working integer
    fn shift(&self, byte_order: ByteOrder) -> u32 {
        match byte_order {
            ByteOrder::LittleEndian => self.bit_in_byte,
            ByteOrder::BigEndian => self.width() - self.bit_in_byte - self.bit_length,
        }
    }

    fn is_aligned(&self) -> bool {
        self.bit_in_byte == 0 && matches!(self.bit_length, 8 | 16 | 32 | 64)
    }

    /// Assemble the covered bytes into one working integer
    fn load(&self, data: &[u8], byte_order: ByteOrder) -> u128 {
        let bytes = &data[self.first_byte..self.end_byte];
        match byte_order {
            ByteOrder::LittleEndian => bytes
                .iter()
                .rev()
                .fold(0u128, |acc, &b| (acc << 8) | b as u128),
            ByteOrder::BigEndian => bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128),
        }
    }

    /// Write a working integer back over the covered bytes
    fn store(&self, data: &mut [u8], byte_order: ByteOrder, mut word: u128) {
        let bytes = &mut data[self.first_byte..self.end_byte];
        match byte_order {
            ByteOrder::LittleEndian => {
                for b in bytes.iter_mut() {
                    *b = word as u8;
                    word >>= 8;
                }
            }
            ByteOrder::BigEndian => {
                for b in bytes.iter_mut().rev() {
                    *b = word as u8;
                    word >>= 8;
                }
            }
        }
    }
}

/// Mask with the lowest `bit_length` bits set
fn mask(bit_length: u32) -> u128 {
    (1u128 << bit_length) - 1
}

/// Sign-extend a value from N bits
///
/// If the value's MSB is 1, the result is the negative two's-complement value.
fn sign_extend(bits: u128, bit_length: u32) -> i128 {
    let sign_bit = 1u128 << (bit_length - 1);
    if bits & sign_bit != 0 {
        bits as i128 - (1i128 << bit_length)
    } else {
        bits as i128
    }
}

/// Decode the integer stored in `[bit_offset, bit_offset + bit_length)` of `data`
///
/// Unsigned fields yield `0..2^bit_length`, signed fields are sign-extended
/// from bit `bit_length - 1`.
pub fn decode(
    data: &[u8],
    bit_offset: u16,
    bit_length: u16,
    byte_order: ByteOrder,
    value_type: ValueType,
) -> Result<i128> {
    let span = BitSpan::new(data.len(), bit_offset, bit_length)?;

    let bits = if span.is_aligned() {
        read_aligned(&data[span.first_byte..], span.bit_length, byte_order) as u128
    } else {
        (span.load(data, byte_order) >> span.shift(byte_order)) & mask(span.bit_length)
    };

    Ok(match value_type {
        ValueType::Unsigned => bits as i128,
        ValueType::Signed => sign_extend(bits, span.bit_length),
    })
}

/// Encode `value` into `[bit_offset, bit_offset + bit_length)` of `data`
///
/// All bits outside the field are left untouched. Fails with `ValueOverflow`
/// if `value` is not representable in the field; use [`truncate`] first to
/// wrap a value into range instead.
pub fn encode(
    data: &mut [u8],
    bit_offset: u16,
    bit_length: u16,
    byte_order: ByteOrder,
    value_type: ValueType,
    value: i128,
) -> Result<()> {
    let span = BitSpan::new(data.len(), bit_offset, bit_length)?;
    if !fits(value, bit_length, value_type) {
        return Err(DatabaseError::ValueOverflow { value, bit_length });
    }

    let m = mask(span.bit_length);
    let bits = (value as u128) & m;

    if span.is_aligned() {
        write_aligned(&mut data[span.first_byte..], span.bit_length, byte_order, bits as u64);
        return Ok(());
    }

    let shift = span.shift(byte_order);
    let word = span.load(data, byte_order);
    let word = (word & !(m << shift)) | (bits << shift);
    span.store(data, byte_order, word);
    Ok(())
}

/// True if `value` is representable in a field of `bit_length` bits
pub fn fits(value: i128, bit_length: u16, value_type: ValueType) -> bool {
    if bit_length == 0 || bit_length > MAX_BIT_LENGTH {
        return false;
    }
    let bits = bit_length as u32;
    match value_type {
        ValueType::Unsigned => value >= 0 && value <= mask(bits) as i128,
        ValueType::Signed => {
            let half = 1i128 << (bits - 1);
            value >= -half && value < half
        }
    }
}

/// Wrap `value` into the representable range of the field (two's complement)
pub fn truncate(value: i128, bit_length: u16, value_type: ValueType) -> i128 {
    let bits = bit_length.clamp(1, MAX_BIT_LENGTH) as u32;
    let masked = (value as u128) & mask(bits);
    match value_type {
        ValueType::Unsigned => masked as i128,
        ValueType::Signed => sign_extend(masked, bits),
    }
}

fn read_aligned(bytes: &[u8], bit_length: u32, byte_order: ByteOrder) -> u64 {
    match (bit_length, byte_order) {
        (8, _) => bytes[0] as u64,
        (16, ByteOrder::LittleEndian) => LittleEndian::read_u16(bytes) as u64,
        (16, ByteOrder::BigEndian) => BigEndian::read_u16(bytes) as u64,
        (32, ByteOrder::LittleEndian) => LittleEndian::read_u32(bytes) as u64,
        (32, ByteOrder::BigEndian) => BigEndian::read_u32(bytes) as u64,
        (_, ByteOrder::LittleEndian) => LittleEndian::read_u64(bytes),
        (_, ByteOrder::BigEndian) => BigEndian::read_u64(bytes),
    }
}

fn write_aligned(bytes: &mut [u8], bit_length: u32, byte_order: ByteOrder, bits: u64) {
    match (bit_length, byte_order) {
        (8, _) => bytes[0] = bits as u8,
        (16, ByteOrder::LittleEndian) => LittleEndian::write_u16(bytes, bits as u16),
        (16, ByteOrder::BigEndian) => BigEndian::write_u16(bytes, bits as u16),
        (32, ByteOrder::LittleEndian) => LittleEndian::write_u32(bytes, bits as u32),
        (32, ByteOrder::BigEndian) => BigEndian::write_u32(bytes, bits as u32),
        (_, ByteOrder::LittleEndian) => LittleEndian::write_u64(bytes, bits),
        (_, ByteOrder::BigEndian) => BigEndian::write_u64(bytes, bits),
    }
}
