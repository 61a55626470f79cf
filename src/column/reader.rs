//! Column reader.
//!
//! Reads back the triples written by a [`ColumnWriter`](super::ColumnWriter)
//! from a flat body or from three page streams. Every stream is consumed
//! through a bounds-checked cursor; a read crossing the end of a stream fails
//! with `BufferOverflow`.
//!
//! The reader does not know how many triples the column holds. Callers stop
//! after [`CSTableReader::num_records`](crate::CSTableReader::num_records)
//! records, using [`ColumnReader::peek_rep_level`] to find record ends.

use std::borrow::Cow;

use crate::codec::{zigzag_decode, BitPackDecoder, ByteCursor};
use crate::column::value::{ColumnEntry, Datum};
use crate::error::{CsTableError, Result};
use crate::levels::LevelDecoder;
use crate::types::{ColumnEncoding, ColumnType};

// ── Value decoders ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ValueDecoder<'a> {
    Boolean(BitPackDecoder<'a>),
    UInt16Plain(ByteCursor<'a>),
    UInt32BitPacked(BitPackDecoder<'a>),
    UInt32Plain(ByteCursor<'a>),
    UInt64Plain(ByteCursor<'a>),
    UInt64Leb128(ByteCursor<'a>),
    FloatIeee754(ByteCursor<'a>),
    StringPlain(ByteCursor<'a>),
}

fn integer_datum<'v>(logical_type: ColumnType, raw: u64, zigzag: bool) -> Datum<'v> {
    match logical_type {
        ColumnType::SignedInt if zigzag => Datum::SignedInt(zigzag_decode(raw)),
        ColumnType::SignedInt => Datum::SignedInt(raw as i64),
        ColumnType::DateTime => Datum::DateTime(raw),
        _ => Datum::UnsignedInt(raw),
    }
}

impl<'a> ValueDecoder<'a> {
    fn new(encoding: ColumnEncoding, data: Cow<'a, [u8]>) -> Result<Self> {
        Ok(match encoding {
            ColumnEncoding::BooleanBitPacked => {
                ValueDecoder::Boolean(BitPackDecoder::new(data, 1))
            }
            ColumnEncoding::UInt32BitPacked => {
                let mut cursor = ByteCursor::new(data);
                let bound = cursor.read_u32()?;
                let packed = cursor.take(cursor.remaining())?;
                ValueDecoder::UInt32BitPacked(BitPackDecoder::new(packed, bound))
            }
            ColumnEncoding::UInt16Plain => ValueDecoder::UInt16Plain(ByteCursor::new(data)),
            ColumnEncoding::UInt32Plain => ValueDecoder::UInt32Plain(ByteCursor::new(data)),
            ColumnEncoding::UInt64Plain => ValueDecoder::UInt64Plain(ByteCursor::new(data)),
            ColumnEncoding::UInt64Leb128 => ValueDecoder::UInt64Leb128(ByteCursor::new(data)),
            ColumnEncoding::FloatIeee754 => ValueDecoder::FloatIeee754(ByteCursor::new(data)),
            ColumnEncoding::StringPlain => ValueDecoder::StringPlain(ByteCursor::new(data)),
        })
    }

    fn decode(&mut self, logical_type: ColumnType) -> Result<Datum<'_>> {
        Ok(match self {
            ValueDecoder::Boolean(dec) => Datum::Boolean(dec.next()? != 0),
            ValueDecoder::UInt16Plain(cur) => Datum::UnsignedInt(cur.read_u16()? as u64),
            ValueDecoder::UInt32BitPacked(dec) => Datum::UnsignedInt(dec.next()? as u64),
            ValueDecoder::UInt32Plain(cur) => Datum::UnsignedInt(cur.read_u32()? as u64),
            ValueDecoder::UInt64Plain(cur) => integer_datum(logical_type, cur.read_u64()?, false),
            ValueDecoder::UInt64Leb128(cur) => {
                integer_datum(logical_type, cur.read_varint()?, true)
            }
            ValueDecoder::FloatIeee754(cur) => Datum::Float(cur.read_f64()?),
            ValueDecoder::StringPlain(cur) => {
                let len = cur.read_u32()? as usize;
                let bytes = cur.read_bytes(len)?;
                let s = std::str::from_utf8(bytes).map_err(|e| {
                    CsTableError::InvalidFormat(format!("string value is not UTF-8: {}", e))
                })?;
                Datum::String(s)
            }
        })
    }
}

// ── Reader ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ColumnReader<'a> {
    logical_type: ColumnType,
    encoding: ColumnEncoding,
    rlevel_max: u32,
    dlevel_max: u32,
    rlevels: LevelDecoder<'a>,
    dlevels: LevelDecoder<'a>,
    values: ValueDecoder<'a>,
}

impl<'a> ColumnReader<'a> {
    /// Reader over a serialized body
    /// (`[u64 rlen][u64 dlen][u64 vlen][rlevels][dlevels][values]`).
    pub fn from_body(
        body: Cow<'a, [u8]>,
        logical_type: ColumnType,
        encoding: ColumnEncoding,
        rlevel_max: u32,
        dlevel_max: u32,
    ) -> Result<Self> {
        let mut cursor = ByteCursor::new(body);
        let rlen = cursor.read_u64()?;
        let dlen = cursor.read_u64()?;
        let vlen = cursor.read_u64()?;
        let rdata = cursor.take(section_len(rlen)?)?;
        let ddata = cursor.take(section_len(dlen)?)?;
        let vdata = cursor.take(section_len(vlen)?)?;
        Self::from_streams(
            rdata,
            ddata,
            vdata,
            logical_type,
            encoding,
            rlevel_max,
            dlevel_max,
        )
    }

    /// Reader over three separately stored streams.
    pub fn from_streams(
        rlevels: Cow<'a, [u8]>,
        dlevels: Cow<'a, [u8]>,
        values: Cow<'a, [u8]>,
        logical_type: ColumnType,
        encoding: ColumnEncoding,
        rlevel_max: u32,
        dlevel_max: u32,
    ) -> Result<Self> {
        if !encoding.supports(logical_type) {
            return Err(CsTableError::InvalidFormat(format!(
                "encoding {:?} cannot hold {} values",
                encoding,
                logical_type.as_str()
            )));
        }
        Ok(Self {
            logical_type,
            encoding,
            rlevel_max,
            dlevel_max,
            rlevels: LevelDecoder::new(rlevels, rlevel_max),
            dlevels: LevelDecoder::new(dlevels, dlevel_max),
            values: ValueDecoder::new(encoding, values)?,
        })
    }

    pub fn logical_type(&self) -> ColumnType {
        self.logical_type
    }

    pub fn encoding(&self) -> ColumnEncoding {
        self.encoding
    }

    pub fn rlevel_max(&self) -> u32 {
        self.rlevel_max
    }

    pub fn dlevel_max(&self) -> u32 {
        self.dlevel_max
    }

    /// Read the next triple. The value is present iff
    /// `def_level == d_max`.
    pub fn next(&mut self) -> Result<ColumnEntry<'_>> {
        let rep_level = self.rlevels.next()?;
        let def_level = self.dlevels.next()?;
        if rep_level > self.rlevel_max || def_level > self.dlevel_max {
            return Err(CsTableError::InvalidFormat(format!(
                "levels ({}, {}) above max ({}, {})",
                rep_level, def_level, self.rlevel_max, self.dlevel_max
            )));
        }
        let value = if def_level == self.dlevel_max {
            Some(self.values.decode(self.logical_type)?)
        } else {
            None
        };
        Ok(ColumnEntry {
            rep_level,
            def_level,
            value,
        })
    }

    /// Repetition level of the next triple without consuming it. `None` once
    /// the level stream is used up, and always for columns with `r_max == 0`.
    pub fn peek_rep_level(&mut self) -> Result<Option<u32>> {
        if self.rlevels.at_end() {
            return Ok(None);
        }
        self.rlevels.peek().map(Some)
    }
}

fn section_len(len: u64) -> Result<usize> {
    usize::try_from(len)
        .map_err(|_| CsTableError::InvalidFormat(format!("section length {} too large", len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnWriter;

    fn body(writer: ColumnWriter) -> Vec<u8> {
        writer.commit().to_bytes().unwrap()
    }

    fn open(bytes: &[u8], ty: ColumnType, enc: ColumnEncoding, r: u32, d: u32) -> ColumnReader<'_> {
        ColumnReader::from_body(Cow::Borrowed(bytes), ty, enc, r, d).unwrap()
    }

    #[test]
    fn test_repeated_string_with_absent_record() {
        let mut w = ColumnWriter::new(ColumnType::String, ColumnEncoding::StringPlain, 1, 2)
            .unwrap();
        w.add_datum(0, 2, Datum::String("a")).unwrap();
        w.add_datum(1, 2, Datum::String("b")).unwrap();
        w.add_null(0, 1).unwrap();
        let bytes = body(w);

        let mut r = open(&bytes, ColumnType::String, ColumnEncoding::StringPlain, 1, 2);
        let e = r.next().unwrap();
        assert_eq!((e.rep_level, e.def_level, e.value), (0, 2, Some(Datum::String("a"))));
        assert_eq!(r.peek_rep_level().unwrap(), Some(1));
        let e = r.next().unwrap();
        assert_eq!((e.rep_level, e.def_level, e.value), (1, 2, Some(Datum::String("b"))));
        let e = r.next().unwrap();
        assert_eq!((e.rep_level, e.def_level), (0, 1));
        assert!(!e.has_value());
    }

    #[test]
    fn test_signed_leb128_and_plain() {
        for enc in [ColumnEncoding::UInt64Leb128, ColumnEncoding::UInt64Plain] {
            let mut w = ColumnWriter::new(ColumnType::SignedInt, enc, 0, 0).unwrap();
            for v in [0i64, -1, i64::MIN, i64::MAX, 42] {
                w.add_datum(0, 0, Datum::SignedInt(v)).unwrap();
            }
            let bytes = body(w);
            let mut r = open(&bytes, ColumnType::SignedInt, enc, 0, 0);
            for v in [0i64, -1, i64::MIN, i64::MAX, 42] {
                assert_eq!(r.next().unwrap().value, Some(Datum::SignedInt(v)));
            }
            assert_eq!(r.peek_rep_level().unwrap(), None);
        }
    }

    #[test]
    fn test_bitpacked_uint32() {
        let mut w = ColumnWriter::with_max_value(
            ColumnType::UnsignedInt,
            ColumnEncoding::UInt32BitPacked,
            0,
            1,
            1000,
        )
        .unwrap();
        for v in 0..300u64 {
            if v % 7 == 0 {
                w.add_null(0, 0).unwrap();
            } else {
                w.add_datum(0, 1, Datum::UnsignedInt(v)).unwrap();
            }
        }
        let bytes = body(w);
        let mut r = open(&bytes, ColumnType::UnsignedInt, ColumnEncoding::UInt32BitPacked, 0, 1);
        for v in 0..300u64 {
            let e = r.next().unwrap();
            if v % 7 == 0 {
                assert_eq!(e.value, None);
            } else {
                assert_eq!(e.value, Some(Datum::UnsignedInt(v)));
            }
        }
    }

    #[test]
    fn test_booleans_floats_datetimes() {
        let mut b = ColumnWriter::new(ColumnType::Boolean, ColumnEncoding::BooleanBitPacked, 0, 0)
            .unwrap();
        b.add_datum(0, 0, Datum::Boolean(true)).unwrap();
        b.add_datum(0, 0, Datum::Boolean(false)).unwrap();
        let bytes = body(b);
        let mut r = open(&bytes, ColumnType::Boolean, ColumnEncoding::BooleanBitPacked, 0, 0);
        assert_eq!(r.next().unwrap().value, Some(Datum::Boolean(true)));
        assert_eq!(r.next().unwrap().value, Some(Datum::Boolean(false)));

        let mut f = ColumnWriter::new(ColumnType::Float, ColumnEncoding::FloatIeee754, 0, 0)
            .unwrap();
        f.add_datum(0, 0, Datum::Float(-2.25)).unwrap();
        let bytes = body(f);
        let mut r = open(&bytes, ColumnType::Float, ColumnEncoding::FloatIeee754, 0, 0);
        assert_eq!(r.next().unwrap().value, Some(Datum::Float(-2.25)));

        let mut t = ColumnWriter::new(ColumnType::DateTime, ColumnEncoding::UInt64Leb128, 0, 0)
            .unwrap();
        t.add_datum(0, 0, Datum::DateTime(1_700_000_000_000_000)).unwrap();
        let bytes = body(t);
        let mut r = open(&bytes, ColumnType::DateTime, ColumnEncoding::UInt64Leb128, 0, 0);
        assert_eq!(r.next().unwrap().value, Some(Datum::DateTime(1_700_000_000_000_000)));
    }

    #[test]
    fn test_truncated_value_stream() {
        let mut w = ColumnWriter::new(ColumnType::UnsignedInt, ColumnEncoding::UInt64Plain, 0, 0)
            .unwrap();
        w.add_datum(0, 0, Datum::UnsignedInt(1)).unwrap();
        w.add_datum(0, 0, Datum::UnsignedInt(2)).unwrap();
        let bytes = body(w);

        // the declared value length no longer fits
        let err = ColumnReader::from_body(
            Cow::Borrowed(&bytes[..bytes.len() - 1]),
            ColumnType::UnsignedInt,
            ColumnEncoding::UInt64Plain,
            0,
            0,
        )
        .unwrap_err();
        assert_eq!(err.code(), "BUFFER_OVERFLOW");

        // reading past the last value
        let mut r = open(&bytes, ColumnType::UnsignedInt, ColumnEncoding::UInt64Plain, 0, 0);
        r.next().unwrap();
        r.next().unwrap();
        assert_eq!(r.next().unwrap_err().code(), "BUFFER_OVERFLOW");
    }

    #[test]
    fn test_invalid_utf8() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&6u64.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0xC3, 0x28]);
        let mut r = open(&bytes, ColumnType::String, ColumnEncoding::StringPlain, 0, 0);
        assert_eq!(r.next().unwrap_err().code(), "INVALID_FORMAT");
    }
}
