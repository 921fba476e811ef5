//! Unsigned LEB128 varints.
//!
//! Little-endian groups of 7 bits, high bit set on every byte except the
//! last. A `u64` needs at most [`MAX_VARINT_LEN64`] bytes, and the tenth byte
//! may only carry the value 0 or 1.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut};

/// Maximum encoded length of a 64-bit value.
pub const MAX_VARINT_LEN64: usize = 10;

/// Appends `x` to `buf` and returns the number of bytes written.
pub fn put_uvarint(buf: &mut impl BufMut, mut x: u64) -> usize {
    let mut n = 1;
    while x >= 0x80 {
        buf.put_u8((x as u8) | 0x80);
        x >>= 7;
        n += 1;
    }
    buf.put_u8(x as u8);
    n
}

/// Encodes `x` into a fixed stack buffer, returning it with the used length.
pub fn encode_uvarint(x: u64) -> ([u8; MAX_VARINT_LEN64], usize) {
    let mut out = [0u8; MAX_VARINT_LEN64];
    let n = put_uvarint(&mut &mut out[..], x);
    (out, n)
}

/// Number of bytes `x` occupies once encoded.
pub fn uvarint_len(x: u64) -> usize {
    let bits = 64 - (x | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Incremental decoder, fed one byte at a time.
///
/// Shared by the buffered and the streaming readers so that both enforce the
/// same overflow rule.
#[derive(Debug, Default, Clone)]
pub struct UvarintDecoder {
    value: u64,
    shift: u32,
    count: usize,
}

impl UvarintDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next byte. Returns `Ok(Some(value))` once the terminating
    /// byte has been seen.
    pub fn push(&mut self, b: u8) -> Result<Option<u64>, ProtocolError> {
        if self.count == MAX_VARINT_LEN64 - 1 && b > 1 {
            return Err(ProtocolError::VarintOverflow);
        }
        self.count += 1;
        if b < 0x80 {
            return Ok(Some(self.value | (u64::from(b) << self.shift)));
        }
        self.value |= u64::from(b & 0x7f) << self.shift;
        self.shift += 7;
        Ok(None)
    }
}

/// Reads a varint from the front of `buf`, advancing past it.
pub fn get_uvarint(buf: &mut impl Buf) -> Result<u64, ProtocolError> {
    let mut decoder = UvarintDecoder::new();
    while buf.has_remaining() {
        if let Some(x) = decoder.push(buf.get_u8())? {
            return Ok(x);
        }
    }
    Err(ProtocolError::TruncatedVarint)
}
