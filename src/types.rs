//! cstable format types and constants.
//!
//! Logical column types, physical encodings, the format version tag and the
//! page addressing types shared by the writer and reader sides.

use serde::{Deserialize, Serialize};

use crate::error::{CsTableError, Result};

// ── Constants ──────────────────────────────────────────────────────

/// Magic bytes at offset 0 of every cstable file.
pub const MAGIC: [u8; 4] = [0x23, 0x17, 0x23, 0x17];

/// Size of the common prelude: magic (4) + version (2).
pub const PRELUDE_SIZE: usize = 6;

/// Header alignment for the paged format.
pub const SECTOR_SIZE: u64 = 512;

/// Default maximum page size for the paged format (64 KiB).
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 64 * 1024;

/// Values per bit-packing batch.
pub const BITPACK_BATCH: usize = 128;

// ── Format Version ─────────────────────────────────────────────────

/// On-disk container layout, selected by the `u16` version in the prelude.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryFormatVersion {
    /// Flat directory header followed by contiguous column bodies.
    #[serde(rename = "v0.1.0")]
    V0_1_0,
    /// Page-addressed bodies, a page index and A/B MetaBlocks.
    #[default]
    #[serde(rename = "v0.2.0")]
    V0_2_0,
}

impl BinaryFormatVersion {
    pub fn as_u16(self) -> u16 {
        match self {
            BinaryFormatVersion::V0_1_0 => 1,
            BinaryFormatVersion::V0_2_0 => 2,
        }
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(Self::V0_1_0),
            2 => Some(Self::V0_2_0),
            _ => None,
        }
    }
}

// ── Column Type ────────────────────────────────────────────────────

/// Logical type of a column (stored as u8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ColumnType {
    Subrecord = 0,
    Boolean = 1,
    UnsignedInt = 2,
    SignedInt = 3,
    String = 4,
    Float = 5,
    DateTime = 6,
}

impl ColumnType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Subrecord),
            1 => Some(Self::Boolean),
            2 => Some(Self::UnsignedInt),
            3 => Some(Self::SignedInt),
            4 => Some(Self::String),
            5 => Some(Self::Float),
            6 => Some(Self::DateTime),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Subrecord => "SUBRECORD",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::UnsignedInt => "UNSIGNED_INT",
            ColumnType::SignedInt => "SIGNED_INT",
            ColumnType::String => "STRING",
            ColumnType::Float => "FLOAT",
            ColumnType::DateTime => "DATETIME",
        }
    }

    /// The encoding a schema picks when none is given.
    pub fn default_encoding(self) -> Option<ColumnEncoding> {
        match self {
            ColumnType::Subrecord => None,
            ColumnType::Boolean => Some(ColumnEncoding::BooleanBitPacked),
            ColumnType::UnsignedInt | ColumnType::SignedInt | ColumnType::DateTime => {
                Some(ColumnEncoding::UInt64Leb128)
            }
            ColumnType::String => Some(ColumnEncoding::StringPlain),
            ColumnType::Float => Some(ColumnEncoding::FloatIeee754),
        }
    }
}

impl std::str::FromStr for ColumnType {
    type Err = CsTableError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SUBRECORD" | "OBJECT" | "RECORD" => Ok(Self::Subrecord),
            "BOOLEAN" | "BOOL" => Ok(Self::Boolean),
            "UNSIGNED_INT" | "UINT64" | "UINT32" => Ok(Self::UnsignedInt),
            "SIGNED_INT" | "INT64" | "INT32" => Ok(Self::SignedInt),
            "STRING" => Ok(Self::String),
            "FLOAT" | "DOUBLE" => Ok(Self::Float),
            "DATETIME" => Ok(Self::DateTime),
            _ => Err(CsTableError::IllegalArgument(format!(
                "invalid column type: {}",
                s
            ))),
        }
    }
}

// ── Column Encoding ────────────────────────────────────────────────

/// Physical encoding of a column's value stream (stored as u32/varint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnEncoding {
    #[serde(rename = "boolean_bitpacked")]
    BooleanBitPacked = 1,
    #[serde(rename = "uint16_plain")]
    UInt16Plain = 9,
    #[serde(rename = "uint32_bitpacked")]
    UInt32BitPacked = 10,
    #[serde(rename = "uint32_plain")]
    UInt32Plain = 11,
    #[serde(rename = "uint64_plain")]
    UInt64Plain = 12,
    #[serde(rename = "uint64_leb128")]
    UInt64Leb128 = 13,
    #[serde(rename = "float_ieee754")]
    FloatIeee754 = 14,
    #[serde(rename = "string_plain")]
    StringPlain = 100,
}

impl ColumnEncoding {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::BooleanBitPacked),
            9 => Some(Self::UInt16Plain),
            10 => Some(Self::UInt32BitPacked),
            11 => Some(Self::UInt32Plain),
            12 => Some(Self::UInt64Plain),
            13 => Some(Self::UInt64Leb128),
            14 => Some(Self::FloatIeee754),
            100 => Some(Self::StringPlain),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether values of `ty` can be stored with this encoding.
    pub fn supports(self, ty: ColumnType) -> bool {
        use ColumnEncoding::*;
        match self {
            BooleanBitPacked => ty == ColumnType::Boolean,
            UInt16Plain | UInt32BitPacked | UInt32Plain => ty == ColumnType::UnsignedInt,
            UInt64Plain | UInt64Leb128 => matches!(
                ty,
                ColumnType::UnsignedInt | ColumnType::SignedInt | ColumnType::DateTime
            ),
            FloatIeee754 => ty == ColumnType::Float,
            StringPlain => ty == ColumnType::String,
        }
    }

    /// Logical type implied by the encoding alone. Used by the flat format,
    /// whose directory does not persist logical types.
    pub fn implied_type(self) -> ColumnType {
        use ColumnEncoding::*;
        match self {
            BooleanBitPacked => ColumnType::Boolean,
            UInt16Plain | UInt32BitPacked | UInt32Plain | UInt64Plain | UInt64Leb128 => {
                ColumnType::UnsignedInt
            }
            FloatIeee754 => ColumnType::Float,
            StringPlain => ColumnType::String,
        }
    }
}

// ── Column Config ──────────────────────────────────────────────────

/// Schema entry for one leaf column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnConfig {
    pub column_id: u32,
    pub column_name: String,
    pub logical_type: ColumnType,
    pub encoding: ColumnEncoding,
    pub rlevel_max: u32,
    pub dlevel_max: u32,
    /// Declared value bound (bit-packed ints) or max string length; 0 = none.
    pub max_value: u64,
    /// Flat format only.
    pub body_offset: u64,
    /// Flat format only.
    pub body_size: u64,
}

impl ColumnConfig {
    pub fn new(
        column_id: u32,
        column_name: impl Into<String>,
        logical_type: ColumnType,
        encoding: ColumnEncoding,
        rlevel_max: u32,
        dlevel_max: u32,
    ) -> Self {
        Self {
            column_id,
            column_name: column_name.into(),
            logical_type,
            encoding,
            rlevel_max,
            dlevel_max,
            max_value: 0,
            body_offset: 0,
            body_size: 0,
        }
    }

    pub fn with_max_value(mut self, max_value: u64) -> Self {
        self.max_value = max_value;
        self
    }
}

// ── Pages ──────────────────────────────────────────────────────────

/// Reference to a byte range inside the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub offset: u64,
    pub size: u32,
}

impl PageRef {
    /// One past the last byte, or `None` if the range wraps `u64`.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size as u64)
    }
}

/// Which stream of a column a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PageIndexEntryType {
    Data = 1,
    RLevel = 2,
    DLevel = 3,
}

impl PageIndexEntryType {
    pub fn from_u64(v: u64) -> Option<Self> {
        match v {
            1 => Some(Self::Data),
            2 => Some(Self::RLevel),
            3 => Some(Self::DLevel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageIndexKey {
    pub column_id: u32,
    pub entry_type: PageIndexEntryType,
}

impl PageIndexKey {
    pub fn new(column_id: u32, entry_type: PageIndexEntryType) -> Self {
        Self {
            column_id,
            entry_type,
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Round `val` up to the next multiple of [`SECTOR_SIZE`].
pub fn pad_to_next_sector(val: u64) -> u64 {
    val.div_ceil(SECTOR_SIZE) * SECTOR_SIZE
}
