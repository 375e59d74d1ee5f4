//! Variable-length 7-bit unsigned integer encoding.
//!
//! Each octet has a continuation bit (MSB) and 7 data bits. The least
//! significant group is written first. Used for string lengths and the body
//! size of variable-size records.

use std::io::Read;

use crate::bytestream::{ByteReader, ByteWriter};
use crate::{Error, Result};

/// Encodes a `u64` as a variable-length unsigned integer.
#[inline]
pub fn encode(writer: &mut ByteWriter, value: u64) {
    if value < 128 {
        // Fast-Path: Single-Byte (kurze Namen und Werte)
        writer.write_u8(value as u8);
        return;
    }
    let mut v = value;
    loop {
        let low7 = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            writer.write_u8(low7);
            break;
        }
        writer.write_u8(0x80 | low7);
    }
}

/// Anzahl Bytes, die `encode(value)` schreiben würde.
pub fn encoded_len(value: u64) -> usize {
    let mut v = value >> 7;
    let mut n = 1;
    while v != 0 {
        v >>= 7;
        n += 1;
    }
    n
}

/// Decodes a variable-length unsigned integer from the stream.
#[inline]
pub fn decode<R: Read>(reader: &mut ByteReader<R>) -> Result<u64> {
    let byte = reader.read_u8()?;
    if byte & 0x80 == 0 {
        return Ok(u64::from(byte));
    }
    let mut result = u64::from(byte & 0x7F);
    let mut shift: u32 = 7;
    loop {
        let byte = reader.read_u8()?;
        let data = u64::from(byte & 0x7F);
        // Bei shift 63 (10. Byte) ist nur Daten-Bit 0 gültig.
        if shift == 63 && (data > 1 || byte & 0x80 != 0) {
            return Err(Error::IntegerOverflow);
        }
        result |= data << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}
