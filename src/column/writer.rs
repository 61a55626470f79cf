//! Column writer.
//!
//! A writer accumulates `(rep_level, def_level, value)` triples into three
//! streams: repetition levels, definition levels and a value stream whose
//! shape depends on the encoding. The protocol is carried in the type:
//!
//! ```text
//! ColumnWriter<Building> --commit()--> ColumnWriter<Committed> --write()--> bytes
//! ```
//!
//! Serialized body layout:
//!
//! ```text
//! [u64 rlevel_len][u64 dlevel_len][u64 value_len][rlevels][dlevels][values]
//! ```

use std::io::Write;

use crate::codec::{encode_varint, zigzag_encode, BitPackEncoder};
use crate::column::value::Datum;
use crate::error::{CsTableError, Result};
use crate::levels::LevelEncoder;
use crate::types::{ColumnEncoding, ColumnType};

/// Size of the three length prefixes of a serialized body.
pub const BODY_HEADER_SIZE: u64 = 24;

// ── Value encoders ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ValueEncoder {
    Boolean(BitPackEncoder),
    UInt16Plain(Vec<u8>),
    UInt32BitPacked { bound: u32, packer: BitPackEncoder },
    UInt32Plain(Vec<u8>),
    UInt64Plain(Vec<u8>),
    UInt64Leb128(Vec<u8>),
    FloatIeee754(Vec<u8>),
    StringPlain { max_len: u64, buf: Vec<u8> },
}

fn too_wide(value: u64, width: &str) -> CsTableError {
    CsTableError::IllegalArgument(format!("value {} does not fit in {}", value, width))
}

fn fits(value: u64, max: u64, width: &str) -> Result<()> {
    if value > max {
        return Err(too_wide(value, width));
    }
    Ok(())
}

impl ValueEncoder {
    fn new(encoding: ColumnEncoding, max_value: u64) -> Result<Self> {
        Ok(match encoding {
            ColumnEncoding::BooleanBitPacked => ValueEncoder::Boolean(BitPackEncoder::new(1)),
            ColumnEncoding::UInt16Plain => ValueEncoder::UInt16Plain(Vec::new()),
            ColumnEncoding::UInt32BitPacked => {
                let bound = match max_value {
                    0 => u32::MAX,
                    v => u32::try_from(v).map_err(|_| too_wide(v, "a u32 bit-packing bound"))?,
                };
                ValueEncoder::UInt32BitPacked {
                    bound,
                    packer: BitPackEncoder::new(bound),
                }
            }
            ColumnEncoding::UInt32Plain => ValueEncoder::UInt32Plain(Vec::new()),
            ColumnEncoding::UInt64Plain => ValueEncoder::UInt64Plain(Vec::new()),
            ColumnEncoding::UInt64Leb128 => ValueEncoder::UInt64Leb128(Vec::new()),
            ColumnEncoding::FloatIeee754 => ValueEncoder::FloatIeee754(Vec::new()),
            ColumnEncoding::StringPlain => ValueEncoder::StringPlain {
                max_len: max_value,
                buf: Vec::new(),
            },
        })
    }

    /// Validate a value against the encoding without encoding it.
    fn check(&self, datum: Datum<'_>) -> Result<()> {
        match (self, datum) {
            (ValueEncoder::Boolean(_), Datum::Boolean(_)) => Ok(()),
            (ValueEncoder::UInt16Plain(_), Datum::UnsignedInt(v)) => fits(v, u16::MAX as u64, "u16"),
            (ValueEncoder::UInt32BitPacked { bound, .. }, Datum::UnsignedInt(v)) => {
                if v > *bound as u64 {
                    return Err(CsTableError::IllegalArgument(format!(
                        "value {} exceeds bit-packing bound {}",
                        v, bound
                    )));
                }
                Ok(())
            }
            (ValueEncoder::UInt32Plain(_), Datum::UnsignedInt(v)) => fits(v, u32::MAX as u64, "u32"),
            (
                ValueEncoder::UInt64Plain(_) | ValueEncoder::UInt64Leb128(_),
                Datum::UnsignedInt(_) | Datum::SignedInt(_) | Datum::DateTime(_),
            ) => Ok(()),
            (ValueEncoder::FloatIeee754(_), Datum::Float(_)) => Ok(()),
            (ValueEncoder::StringPlain { max_len, .. }, Datum::String(s)) => {
                let len = s.len() as u64;
                if *max_len > 0 && len > *max_len {
                    return Err(CsTableError::IllegalArgument(format!(
                        "string of {} bytes exceeds max length {}",
                        len, max_len
                    )));
                }
                fits(len, u32::MAX as u64, "a u32 length")
            }
            (_, other) => Err(CsTableError::IllegalArgument(format!(
                "value encoder cannot store {} values",
                other.column_type().as_str()
            ))),
        }
    }

    /// Encode one value. Nothing is appended when the value is rejected.
    fn encode(&mut self, datum: Datum<'_>) -> Result<()> {
        self.check(datum)?;
        match (self, datum) {
            (ValueEncoder::Boolean(packer), Datum::Boolean(b)) => packer.encode(b as u32)?,
            (ValueEncoder::UInt16Plain(buf), Datum::UnsignedInt(v)) => {
                buf.extend_from_slice(&(v as u16).to_le_bytes())
            }
            (ValueEncoder::UInt32BitPacked { packer, .. }, Datum::UnsignedInt(v)) => {
                packer.encode(v as u32)?
            }
            (ValueEncoder::UInt32Plain(buf), Datum::UnsignedInt(v)) => {
                buf.extend_from_slice(&(v as u32).to_le_bytes())
            }
            (ValueEncoder::UInt64Plain(buf), Datum::UnsignedInt(v) | Datum::DateTime(v)) => {
                buf.extend_from_slice(&v.to_le_bytes())
            }
            (ValueEncoder::UInt64Plain(buf), Datum::SignedInt(i)) => {
                buf.extend_from_slice(&i.to_le_bytes())
            }
            (ValueEncoder::UInt64Leb128(buf), Datum::UnsignedInt(v) | Datum::DateTime(v)) => {
                encode_varint(v, buf)
            }
            (ValueEncoder::UInt64Leb128(buf), Datum::SignedInt(i)) => {
                encode_varint(zigzag_encode(i), buf)
            }
            (ValueEncoder::FloatIeee754(buf), Datum::Float(f)) => {
                buf.extend_from_slice(&f.to_le_bytes())
            }
            (ValueEncoder::StringPlain { buf, .. }, Datum::String(s)) => {
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            // rejected by check()
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Vec<u8> {
        match self {
            ValueEncoder::Boolean(packer) => packer.finish(),
            ValueEncoder::UInt32BitPacked { bound, packer } => {
                let packed = packer.finish();
                let mut out = Vec::with_capacity(4 + packed.len());
                out.extend_from_slice(&bound.to_le_bytes());
                out.extend_from_slice(&packed);
                out
            }
            ValueEncoder::UInt16Plain(buf)
            | ValueEncoder::UInt32Plain(buf)
            | ValueEncoder::UInt64Plain(buf)
            | ValueEncoder::UInt64Leb128(buf)
            | ValueEncoder::FloatIeee754(buf)
            | ValueEncoder::StringPlain { buf, .. } => buf,
        }
    }
}

// ── States ─────────────────────────────────────────────────────────

/// Accepting triples.
#[derive(Debug, Clone)]
pub struct Building {
    rlevels: LevelEncoder,
    dlevels: LevelEncoder,
    values: ValueEncoder,
}

/// Streams flushed; ready to be sized and serialized.
#[derive(Debug, Clone)]
pub struct Committed {
    rlevels: Vec<u8>,
    dlevels: Vec<u8>,
    values: Vec<u8>,
}

// ── Writer ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ColumnWriter<S = Building> {
    logical_type: ColumnType,
    encoding: ColumnEncoding,
    rlevel_max: u32,
    dlevel_max: u32,
    max_value: u64,
    num_entries: u64,
    num_records: u64,
    state: S,
}

impl<S> ColumnWriter<S> {
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

    pub fn max_value(&self) -> u64 {
        self.max_value
    }

    /// Triples written so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Triples with repetition level 0, i.e. records started.
    pub fn num_records(&self) -> u64 {
        self.num_records
    }
}

impl ColumnWriter<Building> {
    pub fn new(
        logical_type: ColumnType,
        encoding: ColumnEncoding,
        rlevel_max: u32,
        dlevel_max: u32,
    ) -> Result<Self> {
        Self::with_max_value(logical_type, encoding, rlevel_max, dlevel_max, 0)
    }

    /// `max_value` is the bit-packing bound for `UInt32BitPacked` and the
    /// maximum string length for `StringPlain`; 0 leaves it unbounded.
    pub fn with_max_value(
        logical_type: ColumnType,
        encoding: ColumnEncoding,
        rlevel_max: u32,
        dlevel_max: u32,
        max_value: u64,
    ) -> Result<Self> {
        if !encoding.supports(logical_type) {
            return Err(CsTableError::IllegalArgument(format!(
                "encoding {:?} cannot store {} values",
                encoding,
                logical_type.as_str()
            )));
        }
        Ok(Self {
            logical_type,
            encoding,
            rlevel_max,
            dlevel_max,
            max_value,
            num_entries: 0,
            num_records: 0,
            state: Building {
                rlevels: LevelEncoder::new(rlevel_max),
                dlevels: LevelEncoder::new(dlevel_max),
                values: ValueEncoder::new(encoding, max_value)?,
            },
        })
    }

    fn check_levels(&self, rep_level: u32, def_level: u32) -> Result<()> {
        if rep_level > self.rlevel_max {
            return Err(CsTableError::IllegalArgument(format!(
                "repetition level {} out of range [0, {}]",
                rep_level, self.rlevel_max
            )));
        }
        if def_level > self.dlevel_max {
            return Err(CsTableError::IllegalArgument(format!(
                "definition level {} out of range [0, {}]",
                def_level, self.dlevel_max
            )));
        }
        Ok(())
    }

    /// Validate a triple exactly as `add` would, without writing it.
    pub fn check(&self, rep_level: u32, def_level: u32, value: Option<Datum<'_>>) -> Result<()> {
        self.check_levels(rep_level, def_level)?;
        if def_level < self.dlevel_max {
            return Ok(());
        }
        match value {
            None => Err(CsTableError::IllegalArgument(format!(
                "null at full definition level {}",
                def_level
            ))),
            Some(datum) if datum.column_type() != self.logical_type => {
                Err(CsTableError::IllegalArgument(format!(
                    "expected {} value, got {}",
                    self.logical_type.as_str(),
                    datum.column_type().as_str()
                )))
            }
            Some(datum) => self.state.values.check(datum),
        }
    }

    fn push_levels(&mut self, rep_level: u32, def_level: u32) -> Result<()> {
        self.state.rlevels.encode(rep_level)?;
        self.state.dlevels.encode(def_level)?;
        self.num_entries += 1;
        if rep_level == 0 {
            self.num_records += 1;
        }
        Ok(())
    }

    /// Append a triple. The value is stored iff `def_level == d_max`; at
    /// lower definition levels only the levels are kept.
    pub fn add_datum(&mut self, rep_level: u32, def_level: u32, value: Datum<'_>) -> Result<()> {
        self.check(rep_level, def_level, Some(value))?;
        if def_level == self.dlevel_max {
            self.state.values.encode(value)?;
        }
        self.push_levels(rep_level, def_level)
    }

    /// Append an absent position. `def_level` must be below `d_max`.
    pub fn add_null(&mut self, rep_level: u32, def_level: u32) -> Result<()> {
        self.check(rep_level, def_level, None)?;
        self.push_levels(rep_level, def_level)
    }

    /// Like `add_datum`, but `None` writes an absent position.
    pub fn add(&mut self, rep_level: u32, def_level: u32, value: Option<Datum<'_>>) -> Result<()> {
        match value {
            Some(datum) => self.add_datum(rep_level, def_level, datum),
            None => self.add_null(rep_level, def_level),
        }
    }

    /// Flush all three streams. Consumes the building writer, so a second
    /// commit does not type-check.
    pub fn commit(self) -> ColumnWriter<Committed> {
        let Building {
            rlevels,
            dlevels,
            values,
        } = self.state;
        ColumnWriter {
            logical_type: self.logical_type,
            encoding: self.encoding,
            rlevel_max: self.rlevel_max,
            dlevel_max: self.dlevel_max,
            max_value: self.max_value,
            num_entries: self.num_entries,
            num_records: self.num_records,
            state: Committed {
                rlevels: rlevels.finish(),
                dlevels: dlevels.finish(),
                values: values.finish(),
            },
        }
    }
}

impl ColumnWriter<Committed> {
    pub fn rlevel_data(&self) -> &[u8] {
        &self.state.rlevels
    }

    pub fn dlevel_data(&self) -> &[u8] {
        &self.state.dlevels
    }

    pub fn value_data(&self) -> &[u8] {
        &self.state.values
    }

    /// Serialized size, length prefixes included.
    pub fn body_size(&self) -> u64 {
        BODY_HEADER_SIZE
            + self.state.rlevels.len() as u64
            + self.state.dlevels.len() as u64
            + self.state.values.len() as u64
    }

    /// Serialize the body. Returns the number of bytes written.
    pub fn write<W: Write>(self, writer: &mut W) -> Result<u64> {
        let Committed {
            rlevels,
            dlevels,
            values,
        } = &self.state;
        writer.write_all(&(rlevels.len() as u64).to_le_bytes())?;
        writer.write_all(&(dlevels.len() as u64).to_le_bytes())?;
        writer.write_all(&(values.len() as u64).to_le_bytes())?;
        writer.write_all(rlevels)?;
        writer.write_all(dlevels)?;
        writer.write_all(values)?;
        Ok(self.body_size())
    }

    pub fn to_bytes(self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.body_size() as usize);
        self.write(&mut buf)?;
        Ok(buf)
    }
}
