//! Bounds-checked read cursor over a column or header byte region.
//!
//! Every read checks the remaining length first and fails with
//! `BufferOverflow` instead of reading past the end. The region is either
//! borrowed from a memory mapping or owned (pages copied out of a
//! non-contiguous run).

use std::borrow::Cow;

use super::leb128;
use crate::error::{CsTableError, Result};

#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: Cow<'a, [u8]>,
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: Cow<'a, [u8]>) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self::new(Cow::Borrowed(buf))
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if needed > self.remaining() {
            return Err(CsTableError::overflow(needed, self.remaining()));
        }
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.ensure(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..start + n])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut pos = self.pos;
        let value = leb128::decode_varint(&self.buf, &mut pos)?;
        self.pos = pos;
        Ok(value)
    }

    /// Varint length followed by that many UTF-8 bytes.
    pub fn read_lenenc_string(&mut self) -> Result<String> {
        let len = self.read_varint()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| CsTableError::InvalidFormat(format!("string is not UTF-8: {}", e)))
    }

    /// Split off the next `n` bytes as their own region, keeping the borrow
    /// when the cursor itself borrows.
    pub fn take(&mut self, n: usize) -> Result<Cow<'a, [u8]>> {
        self.ensure(n)?;
        let range = self.pos..self.pos + n;
        self.pos += n;
        Ok(match &self.buf {
            Cow::Borrowed(b) => {
                let slice: &'a [u8] = *b;
                Cow::Borrowed(&slice[range])
            }
            Cow::Owned(v) => Cow::Owned(v[range].to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_reads() {
        let mut buf = Vec::new();
        buf.push(7u8);
        buf.extend_from_slice(&0x1234u16.to_le_bytes());
        buf.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(&1.5f64.to_le_bytes());

        let mut cur = ByteCursor::from_slice(&buf);
        assert_eq!(cur.read_u8().unwrap(), 7);
        assert_eq!(cur.read_u16().unwrap(), 0x1234);
        assert_eq!(cur.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(cur.read_u64().unwrap(), u64::MAX);
        assert_eq!(cur.read_f64().unwrap(), 1.5);
        assert!(cur.is_empty());
    }

    #[test]
    fn test_read_past_end() {
        let buf = [1u8, 2, 3];
        let mut cur = ByteCursor::from_slice(&buf);
        let err = cur.read_u32().unwrap_err();
        assert_eq!(err.to_string(), "Buffer overflow: need 4 bytes, 3 remaining");
        // failed reads do not move the cursor
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn test_take_borrows() {
        let buf = [1u8, 2, 3, 4, 5];
        let mut cur = ByteCursor::from_slice(&buf);
        cur.skip(1).unwrap();
        let section = cur.take(3).unwrap();
        assert!(matches!(section, Cow::Borrowed(_)));
        assert_eq!(&*section, &[2, 3, 4]);
        assert_eq!(cur.remaining(), 1);
        assert!(cur.take(2).is_err());
    }

    #[test]
    fn test_lenenc_string() {
        let mut buf = Vec::new();
        leb128::encode_varint(5, &mut buf);
        buf.extend_from_slice(b"hello");
        let mut cur = ByteCursor::new(Cow::Owned(buf));
        assert_eq!(cur.read_lenenc_string().unwrap(), "hello");

        let bad = [2u8, 0xC3, 0x28];
        let mut cur = ByteCursor::from_slice(&bad);
        assert_eq!(cur.read_lenenc_string().unwrap_err().code(), "INVALID_FORMAT");
    }
}
