//! Fixed-width bit-packing of bounded unsigned integers.
//!
//! Values are packed in batches of [`BITPACK_BATCH`] (128). Each value
//! occupies `bits` bits where `bits = 32 - max.leading_zeros()`, so a full
//! batch takes exactly `bits * 16` bytes. Bits are laid out LSB-first.
//!
//! ```text
//! batch 0: [bits*16 bytes] batch 1: [bits*16 bytes] ... (last batch zero-padded)
//! ```
//!
//! A bound of 0 needs no bits at all: the stream is empty and every decoded
//! value is 0.

use std::borrow::Cow;

use super::cursor::ByteCursor;
use crate::error::{CsTableError, Result};
use crate::types::BITPACK_BATCH;

/// Bit width needed to store values in `[0, max]`.
#[inline]
pub fn bits_required(max: u32) -> u32 {
    32 - max.leading_zeros()
}

/// Size in bytes of `count` values packed against `max`.
pub fn packed_size(count: usize, max: u32) -> usize {
    count.div_ceil(BITPACK_BATCH) * bits_required(max) as usize * 16
}

fn pack_batch(values: &[u32; BITPACK_BATCH], bits: u32, out: &mut Vec<u8>) {
    let mut acc: u64 = 0;
    let mut nbits: u32 = 0;
    for &v in values.iter() {
        acc |= (v as u64) << nbits;
        nbits += bits;
        while nbits >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            nbits -= 8;
        }
    }
    debug_assert_eq!(nbits, 0);
}

fn unpack_batch(chunk: &[u8], bits: u32, values: &mut [u32; BITPACK_BATCH]) {
    let mask = (1u64 << bits) - 1;
    let mut acc: u64 = 0;
    let mut nbits: u32 = 0;
    let mut bytes = chunk.iter();
    for slot in values.iter_mut() {
        while nbits < bits {
            // chunk length is exactly bits * 16
            let byte = bytes.next().copied().unwrap_or(0);
            acc |= (byte as u64) << nbits;
            nbits += 8;
        }
        *slot = (acc & mask) as u32;
        acc >>= bits;
        nbits -= bits;
    }
}

// ── Encoder ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BitPackEncoder {
    max: u32,
    bits: u32,
    batch: [u32; BITPACK_BATCH],
    batch_len: usize,
    count: usize,
    out: Vec<u8>,
}

impl BitPackEncoder {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            bits: bits_required(max),
            batch: [0; BITPACK_BATCH],
            batch_len: 0,
            count: 0,
            out: Vec::new(),
        }
    }

    pub fn max_value(&self) -> u32 {
        self.max
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of values encoded so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn encode(&mut self, value: u32) -> Result<()> {
        if value > self.max {
            return Err(CsTableError::IllegalArgument(format!(
                "value {} exceeds bit-packing bound {}",
                value, self.max
            )));
        }
        self.count += 1;
        if self.bits == 0 {
            return Ok(());
        }
        self.batch[self.batch_len] = value;
        self.batch_len += 1;
        if self.batch_len == BITPACK_BATCH {
            pack_batch(&self.batch, self.bits, &mut self.out);
            self.batch_len = 0;
        }
        Ok(())
    }

    /// Size the stream will have once flushed.
    pub fn flushed_size(&self) -> usize {
        packed_size(self.count, self.max)
    }

    /// Pack the partial final batch (zero-padded) and return the stream.
    pub fn finish(mut self) -> Vec<u8> {
        if self.batch_len > 0 {
            self.batch[self.batch_len..].fill(0);
            pack_batch(&self.batch, self.bits, &mut self.out);
            self.batch_len = 0;
        }
        self.out
    }
}

// ── Decoder ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BitPackDecoder<'a> {
    cursor: ByteCursor<'a>,
    bits: u32,
    window: [u32; BITPACK_BATCH],
    window_pos: usize,
}

impl<'a> BitPackDecoder<'a> {
    pub fn new(data: Cow<'a, [u8]>, max: u32) -> Self {
        Self {
            cursor: ByteCursor::new(data),
            bits: bits_required(max),
            window: [0; BITPACK_BATCH],
            window_pos: BITPACK_BATCH,
        }
    }

    fn fill(&mut self) -> Result<()> {
        let chunk = self.cursor.read_bytes(self.bits as usize * 16)?;
        unpack_batch(chunk, self.bits, &mut self.window);
        self.window_pos = 0;
        Ok(())
    }

    pub fn next(&mut self) -> Result<u32> {
        let value = self.peek()?;
        if self.bits > 0 {
            self.window_pos += 1;
        }
        Ok(value)
    }

    pub fn peek(&mut self) -> Result<u32> {
        if self.bits == 0 {
            return Ok(0);
        }
        if self.window_pos == BITPACK_BATCH {
            self.fill()?;
        }
        Ok(self.window[self.window_pos])
    }

    /// True when the window and the remaining stream are both used up.
    /// Always true for zero-width streams, which carry no data.
    pub fn at_end(&self) -> bool {
        self.bits == 0 || (self.window_pos == BITPACK_BATCH && self.cursor.is_empty())
    }
}
