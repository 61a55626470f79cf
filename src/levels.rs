//! Repetition/definition level streams.
//!
//! A column keeps one level encoder for repetition levels (bound `r_max`) and
//! one for definition levels (bound `d_max`); both are plain bit-packed
//! streams.

use std::borrow::Cow;

use crate::codec::{BitPackDecoder, BitPackEncoder};
use crate::error::{CsTableError, Result};

#[derive(Debug, Clone)]
pub struct LevelEncoder {
    inner: BitPackEncoder,
}

impl LevelEncoder {
    pub fn new(max_level: u32) -> Self {
        Self {
            inner: BitPackEncoder::new(max_level),
        }
    }

    pub fn max_level(&self) -> u32 {
        self.inner.max_value()
    }

    pub fn encode(&mut self, level: u32) -> Result<()> {
        if level > self.max_level() {
            return Err(CsTableError::IllegalArgument(format!(
                "level {} out of range [0, {}]",
                level,
                self.max_level()
            )));
        }
        self.inner.encode(level)
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }

    pub fn finish(self) -> Vec<u8> {
        self.inner.finish()
    }
}

#[derive(Debug, Clone)]
pub struct LevelDecoder<'a> {
    inner: BitPackDecoder<'a>,
}

impl<'a> LevelDecoder<'a> {
    pub fn new(data: Cow<'a, [u8]>, max_level: u32) -> Self {
        Self {
            inner: BitPackDecoder::new(data, max_level),
        }
    }

    pub fn next(&mut self) -> Result<u32> {
        self.inner.next()
    }

    pub fn peek(&mut self) -> Result<u32> {
        self.inner.peek()
    }

    pub fn at_end(&self) -> bool {
        self.inner.at_end()
    }
}
