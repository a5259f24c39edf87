// SPDX-License-Identifier: MIT
//! Variable-length and fixed-width integer codecs, plus the scalar
//! content encodings built on them (float, decimal, timestamp, string).
//!
//! Two base-128 encodings are used throughout the format:
//!
//! - **VarUInt**: most significant group first, bit 0x80 set on the
//!   final byte only.
//! - **VarInt**: same grouping, but the first byte reserves bit 0x40 as
//!   the sign flag and carries only 6 payload bits.
//!
//! The value 0 encodes as zero bytes unless a caller forces the single
//! byte `0x80`. "No bytes at all" is meaningful on its own in this
//! format, so every writer here reports how many bytes it produced.

use crate::error::{Error, Result};
use crate::types::{Decimal, Timestamp};

/// Encoded length of a VarUInt (zero encodes as zero bytes)
pub fn len_var_uint(value: u64) -> usize {
    if value == 0 {
        return 0;
    }
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Encoded length of a VarInt; the sign bit costs one payload bit
pub fn len_var_int(value: i64) -> usize {
    let magnitude = value.unsigned_abs();
    if magnitude == 0 {
        return 0;
    }
    let bits = 64 - magnitude.leading_zeros() as usize;
    (bits + 1).div_ceil(7)
}

/// Encoded length of a big-endian fixed-width unsigned integer
pub fn len_uint_be(value: u64) -> usize {
    if value == 0 {
        return 0;
    }
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8)
}

/// Fixed-width length of an int value's magnitude (sign lives in the
/// type code, not the payload)
pub fn len_int_magnitude(value: i64) -> usize {
    len_uint_be(value.unsigned_abs())
}

/// Size of the length field that accompanies a type descriptor: zero
/// when the length fits the low nibble, else the VarUInt size
pub fn len_length_field(value_len: usize) -> usize {
    if value_len < crate::format::length_code::VAR_LEN as usize {
        0
    } else {
        len_var_uint(value_len as u64)
    }
}

pub fn write_var_uint(out: &mut Vec<u8>, value: u64, force_zero: bool) -> usize {
    if value == 0 {
        if force_zero {
            out.push(0x80);
            return 1;
        }
        return 0;
    }
    let len = len_var_uint(value);
    for group in (0..len).rev() {
        let mut byte = ((value >> (7 * group)) & 0x7F) as u8;
        if group == 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    len
}

pub fn write_var_int(out: &mut Vec<u8>, value: i64, force_zero: bool) -> usize {
    let magnitude = value.unsigned_abs();
    if magnitude == 0 {
        if force_zero {
            out.push(0x80);
            return 1;
        }
        return 0;
    }
    let len = len_var_int(value);
    let mut first = ((magnitude >> (7 * (len - 1))) & 0x3F) as u8;
    if value < 0 {
        first |= 0x40;
    }
    if len == 1 {
        first |= 0x80;
    }
    out.push(first);
    for group in (0..len - 1).rev() {
        let mut byte = ((magnitude >> (7 * group)) & 0x7F) as u8;
        if group == 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    len
}

/// The single-byte negative-zero VarInt (sign and terminator bits, no
/// magnitude). Reserved for "absent" slots such as an unknown timestamp
/// offset; the integer writers never produce it.
pub fn write_var_int_negative_zero(out: &mut Vec<u8>) -> usize {
    out.push(0xC0);
    1
}

pub fn write_uint_be(out: &mut Vec<u8>, value: u64, len: usize) -> usize {
    for byte in (0..len).rev() {
        out.push((value >> (8 * byte)) as u8);
    }
    len
}

/// Float content: positive zero is the unique zero-length encoding,
/// everything else (negative zero included) is 8 bytes of IEEE-754
/// binary64, big-endian.
pub fn write_float_content(out: &mut Vec<u8>, value: f64) -> usize {
    if value.to_bits() == 0 {
        return 0;
    }
    write_uint_be(out, value.to_bits(), 8)
}

pub fn len_float(value: f64) -> usize {
    if value.to_bits() == 0 {
        0
    } else {
        8
    }
}

/// Byte length of a decimal's sign-and-magnitude coefficient, including
/// the extra leading byte when the magnitude occupies the sign bit
fn len_coefficient(magnitude: u128) -> usize {
    let bits = 128 - magnitude.leading_zeros() as usize;
    (bits + 1).div_ceil(8)
}

pub fn len_decimal(value: &Decimal) -> usize {
    if value.is_zero() && value.exponent() == 0 {
        return 0;
    }
    // exponent is always at least one byte when content is present
    let exp_len = len_var_int(value.exponent() as i64).max(1);
    exp_len + len_coefficient(value.coefficient().unsigned_abs())
}

/// Decimal content: VarInt exponent, then the coefficient magnitude
/// big-endian with the sign in the high bit of its first byte.
pub fn write_decimal_content(out: &mut Vec<u8>, value: &Decimal) -> usize {
    if value.is_zero() && value.exponent() == 0 {
        return 0;
    }
    let mut written = write_var_int(out, value.exponent() as i64, true);

    let magnitude = value.coefficient().unsigned_abs();
    let len = len_coefficient(magnitude);
    let start = out.len();
    for byte in (0..len).rev() {
        out.push((magnitude >> (8 * byte)) as u8);
    }
    if value.coefficient() < 0 {
        out[start] |= 0x80;
    }
    written += len;
    written
}

pub fn len_timestamp(value: &Timestamp) -> usize {
    let offset_len = match value.offset_minutes() {
        Some(minutes) => len_var_int(minutes as i64).max(1),
        None => 1,
    };
    offset_len + len_decimal(&Decimal::new(value.millis() as i128, 0))
}

/// Timestamp content: VarInt offset in minutes (negative zero when the
/// offset is unknown), then decimal-encoded epoch milliseconds.
pub fn write_timestamp_content(out: &mut Vec<u8>, value: &Timestamp) -> usize {
    let mut written = match value.offset_minutes() {
        Some(minutes) => write_var_int(out, minutes as i64, true),
        None => write_var_int_negative_zero(out),
    };
    written += write_decimal_content(out, &Decimal::new(value.millis() as i128, 0));
    written
}

/// A bounds-checked read cursor over an in-memory buffer.
///
/// All reads fail rather than run past the end; `position` can be saved
/// and restored for the reader's look-ahead scans.
#[derive(Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(Error::malformed("position past end of buffer", pos));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        let end = self.pos.checked_add(len)
            .ok_or(Error::Overflow("skip length overflows usize"))?;
        if end > self.buf.len() {
            return Err(Error::malformed("skip past end of buffer", self.pos));
        }
        self.pos = end;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Borrow the next `len` bytes without consuming them
    pub fn peek_bytes(&self, len: usize) -> Option<&'a [u8]> {
        self.buf.get(self.pos..self.pos + len)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.buf.get(self.pos)
            .ok_or(Error::malformed("unexpected end of input", self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len)
            .ok_or(Error::Overflow("read length overflows usize"))?;
        let bytes = self.buf.get(self.pos..end)
            .ok_or(Error::malformed("unexpected end of input", self.pos))?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_var_uint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        loop {
            let byte = self.read_u8()?;
            if value >> 57 != 0 {
                return Err(Error::Overflow("VarUInt does not fit in 64 bits"));
            }
            value = (value << 7) | (byte & 0x7F) as u64;
            if byte & 0x80 != 0 {
                return Ok(value);
            }
        }
    }

    pub fn read_var_uint32(&mut self) -> Result<u32> {
        u32::try_from(self.read_var_uint()?)
            .map_err(|_| Error::Overflow("VarUInt does not fit in 32 bits"))
    }

    fn read_var_int_raw(&mut self) -> Result<(bool, u64)> {
        let first = self.read_u8()?;
        let negative = first & 0x40 != 0;
        let mut magnitude = (first & 0x3F) as u64;
        if first & 0x80 != 0 {
            return Ok((negative, magnitude));
        }
        loop {
            let byte = self.read_u8()?;
            if magnitude >> 57 != 0 {
                return Err(Error::Overflow("VarInt does not fit in 64 bits"));
            }
            magnitude = (magnitude << 7) | (byte & 0x7F) as u64;
            if byte & 0x80 != 0 {
                return Ok((negative, magnitude));
            }
        }
    }

    pub fn read_var_int(&mut self) -> Result<i64> {
        let (negative, magnitude) = self.read_var_int_raw()?;
        if negative {
            if magnitude > i64::MAX as u64 + 1 {
                return Err(Error::Overflow("VarInt does not fit in i64"));
            }
            Ok((magnitude as i64).wrapping_neg())
        } else {
            if magnitude > i64::MAX as u64 {
                return Err(Error::Overflow("VarInt does not fit in i64"));
            }
            Ok(magnitude as i64)
        }
    }

    /// VarInt where negative zero means "absent"
    pub fn read_var_int_or_absent(&mut self) -> Result<Option<i64>> {
        let (negative, magnitude) = self.read_var_int_raw()?;
        if negative && magnitude == 0 {
            return Ok(None);
        }
        if magnitude > i64::MAX as u64 {
            return Err(Error::Overflow("VarInt does not fit in i64"));
        }
        let value = magnitude as i64;
        Ok(Some(if negative { -value } else { value }))
    }

    pub fn read_uint_be(&mut self, len: usize) -> Result<u64> {
        if len > 8 {
            return Err(Error::Overflow("fixed-width integer wider than 8 bytes"));
        }
        let mut value: u64 = 0;
        for &byte in self.read_bytes(len)? {
            value = (value << 8) | byte as u64;
        }
        Ok(value)
    }

    pub fn read_float_content(&mut self, len: usize) -> Result<f64> {
        match len {
            0 => Ok(0.0),
            8 => Ok(f64::from_bits(self.read_uint_be(8)?)),
            _ => Err(Error::malformed("float content must be 0 or 8 bytes", self.pos)),
        }
    }

    pub fn read_decimal_content(&mut self, len: usize) -> Result<Decimal> {
        if len == 0 {
            return Ok(Decimal::ZERO);
        }
        let start = self.pos;
        let exponent = self.read_var_int()?;
        let exponent = i32::try_from(exponent)
            .map_err(|_| Error::Overflow("decimal exponent does not fit in i32"))?;

        let magnitude_len = len - (self.pos - start);
        if magnitude_len > 16 {
            return Err(Error::Overflow("decimal coefficient wider than 128 bits"));
        }
        let bytes = self.read_bytes(magnitude_len)?;
        if bytes.is_empty() {
            return Ok(Decimal::new(0, exponent));
        }
        let negative = bytes[0] & 0x80 != 0;
        let mut magnitude: u128 = (bytes[0] & 0x7F) as u128;
        for &byte in &bytes[1..] {
            magnitude = (magnitude << 8) | byte as u128;
        }
        if magnitude > i128::MAX as u128 {
            return Err(Error::Overflow("decimal coefficient does not fit in i128"));
        }
        let coefficient = if negative { -(magnitude as i128) } else { magnitude as i128 };
        Ok(Decimal::new(coefficient, exponent))
    }

    pub fn read_timestamp_content(&mut self, len: usize) -> Result<Timestamp> {
        if len == 0 {
            return Err(Error::malformed("timestamp content must not be empty", self.pos));
        }
        let start = self.pos;
        let offset = self.read_var_int_or_absent()?;
        let offset = match offset {
            Some(minutes) => Some(
                i32::try_from(minutes)
                    .map_err(|_| Error::Overflow("timestamp offset does not fit in i32"))?,
            ),
            None => None,
        };

        let decimal = self.read_decimal_content(len - (self.pos - start))?;
        let millis = scale_to_millis(&decimal)?;
        Ok(match offset {
            Some(minutes) => Timestamp::new(millis, minutes),
            None => Timestamp::unknown_offset(millis),
        })
    }

    pub fn read_string(&mut self, len: usize) -> Result<&'a str> {
        let start = self.pos;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map_err(|_| Error::malformed("invalid UTF-8 in string content", start))
    }
}

/// Apply a decimal's exponent to recover whole milliseconds
fn scale_to_millis(decimal: &Decimal) -> Result<i64> {
    let mut value = decimal.coefficient();
    let exponent = decimal.exponent();
    if exponent > 0 {
        for _ in 0..exponent {
            value = value.checked_mul(10)
                .ok_or(Error::Overflow("timestamp milliseconds out of range"))?;
        }
    } else {
        for _ in 0..(-exponent) {
            value /= 10;
        }
    }
    i64::try_from(value).map_err(|_| Error::Overflow("timestamp milliseconds out of range"))
}
