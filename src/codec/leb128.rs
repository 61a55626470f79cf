//! LEB128 varints.
//!
//! Used for `UInt64Leb128` value streams and for the variable-length fields
//! of the paged header and page index. Signed values go through zigzag.

use crate::error::{CsTableError, Result};

/// Longest encoding of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// Append `value` to `buf` as unsigned LEB128.
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Encoded length of `value` without encoding it.
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Decode an unsigned LEB128 value from `buf` at `*pos`, advancing `*pos`.
pub fn decode_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let start = *pos;
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        if *pos >= buf.len() {
            return Err(CsTableError::overflow(*pos - start + 1, 0));
        }
        let byte = buf[*pos];
        *pos += 1;

        let payload = (byte & 0x7F) as u64;
        if shift > 63 || (shift == 63 && payload > 1) {
            return Err(CsTableError::InvalidFormat("varint overflows u64".into()));
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Zigzag-encode a signed i64. Maps 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3.
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ (-((value & 1) as i64))
}
