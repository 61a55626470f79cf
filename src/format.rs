//! On-disk container headers.
//!
//! Every file starts with the same prelude; the version selects the layout.
//!
//! ```text
//! Prelude (6 bytes):
//!   [0..4]  magic 23 17 23 17
//!   [4..6]  version u16 LE (1 = flat v0.1.0, 2 = paged v0.2.0)
//!
//! Flat v0.1.0 header (follows the prelude):
//!   u64 flags, u64 num_rows, u32 ncols
//!   per column:
//!     u32 encoding, u32 name_len, name, u32 r_max, u32 d_max,
//!     u64 body_offset, u64 body_size
//!
//! Paged v0.2.0 header (follows the prelude, padded to 512 bytes):
//!   [6..14]    u64 flags
//!   [14..82]   MetaBlock slot 0
//!   [82..150]  MetaBlock slot 1
//!   [150..278] reserved
//!   varint ncols
//!   per column:
//!     varint type, varint encoding, varint id, lenenc name,
//!     varint r_max, varint d_max
//!
//! MetaBlock (68 bytes):
//!   u64 transaction_id, u64 num_rows, u64 index_offset,
//!   u32 index_size, u64 file_size, [32] blake3 of the preceding 36 bytes
//! ```
//!
//! All integers are little-endian.

use crate::codec::{encode_varint, ByteCursor};
use crate::error::{CsTableError, Result};
use crate::types::{
    pad_to_next_sector, BinaryFormatVersion, ColumnConfig, ColumnEncoding, ColumnType, PageRef,
    MAGIC, PRELUDE_SIZE,
};

/// Offset of the first MetaBlock slot in a paged header.
pub const METABLOCK_OFFSET: u64 = PRELUDE_SIZE as u64 + 8;

/// Encoded MetaBlock size, checksum included.
pub const METABLOCK_SIZE: usize = 68;

const METABLOCK_BODY_SIZE: usize = 36;

/// Reserved bytes between the MetaBlock slots and the column list.
pub const HEADER_RESERVED: usize = 128;

/// A header that fails to parse is malformed, whatever the read that failed.
fn malformed(err: CsTableError) -> CsTableError {
    match err {
        CsTableError::BufferOverflow { .. } => {
            CsTableError::InvalidFormat(format!("truncated header: {}", err))
        }
        other => other,
    }
}

// ── Prelude ────────────────────────────────────────────────────────

pub fn write_prelude(buf: &mut Vec<u8>, version: BinaryFormatVersion) {
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&version.as_u16().to_le_bytes());
}

pub fn read_prelude(cursor: &mut ByteCursor<'_>) -> Result<BinaryFormatVersion> {
    let magic = cursor.read_bytes(4).map_err(malformed)?;
    if magic != MAGIC {
        return Err(CsTableError::InvalidFormat(format!(
            "invalid magic: expected {:02x?}, got {:02x?}",
            MAGIC, magic
        )));
    }
    let version = cursor.read_u16().map_err(malformed)?;
    BinaryFormatVersion::from_u16(version)
        .ok_or_else(|| CsTableError::InvalidFormat(format!("unsupported version: {}", version)))
}

// ── Flat v0.1.0 ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatHeader {
    pub flags: u64,
    pub num_rows: u64,
    pub columns: Vec<ColumnConfig>,
}

impl FlatHeader {
    /// Encoded size, prelude included.
    pub fn serialized_size(&self) -> usize {
        PRELUDE_SIZE
            + 8
            + 8
            + 4
            + self
                .columns
                .iter()
                .map(|c| 4 + 4 + c.column_name.len() + 4 + 4 + 8 + 8)
                .sum::<usize>()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        write_prelude(&mut buf, BinaryFormatVersion::V0_1_0);
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.num_rows.to_le_bytes());
        buf.extend_from_slice(&u32_len(self.columns.len(), "column count")?.to_le_bytes());
        for col in &self.columns {
            buf.extend_from_slice(&col.encoding.as_u32().to_le_bytes());
            buf.extend_from_slice(&u32_len(col.column_name.len(), "column name")?.to_le_bytes());
            buf.extend_from_slice(col.column_name.as_bytes());
            buf.extend_from_slice(&col.rlevel_max.to_le_bytes());
            buf.extend_from_slice(&col.dlevel_max.to_le_bytes());
            buf.extend_from_slice(&col.body_offset.to_le_bytes());
            buf.extend_from_slice(&col.body_size.to_le_bytes());
        }
        debug_assert_eq!(buf.len(), self.serialized_size());
        Ok(buf)
    }

    /// Parse the header after the prelude. Columns come back sorted by
    /// name with ids 1..=n in that order; logical types are implied by the
    /// encoding.
    ///
    /// The cursor must span the whole file: the first column body starts
    /// where the directory ends, so a column count that disagrees with the
    /// entries is caught here.
    pub fn read_from(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Self::parse(cursor).map_err(malformed)
    }

    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let flags = cursor.read_u64()?;
        let num_rows = cursor.read_u64()?;
        let ncols = cursor.read_u32()?;

        let mut columns = Vec::new();
        for _ in 0..ncols {
            let raw = cursor.read_u32()?;
            let encoding = ColumnEncoding::from_u32(raw).ok_or_else(|| {
                CsTableError::InvalidFormat(format!("unknown column encoding {}", raw))
            })?;
            let name_len = cursor.read_u32()? as usize;
            let name = std::str::from_utf8(cursor.read_bytes(name_len)?)
                .map_err(|e| CsTableError::InvalidFormat(format!("column name: {}", e)))?
                .to_owned();
            let rlevel_max = cursor.read_u32()?;
            let dlevel_max = cursor.read_u32()?;
            let mut col =
                ColumnConfig::new(0, name, encoding.implied_type(), encoding, rlevel_max, dlevel_max);
            col.body_offset = cursor.read_u64()?;
            col.body_size = cursor.read_u64()?;
            columns.push(col);
        }

        let header_end = cursor.position() as u64;
        if let Some(first_body) = columns.iter().map(|c| c.body_offset).min() {
            if first_body != header_end {
                return Err(CsTableError::InvalidFormat(format!(
                    "directory of {} columns ends at {}, first column body at {}",
                    ncols, header_end, first_body
                )));
            }
        }

        columns.sort_by(|a, b| a.column_name.cmp(&b.column_name));
        for (i, col) in columns.iter_mut().enumerate() {
            col.column_id = i as u32 + 1;
        }

        Ok(Self {
            flags,
            num_rows,
            columns,
        })
    }
}

// ── MetaBlock ──────────────────────────────────────────────────────

/// Root of one committed table version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaBlock {
    pub transaction_id: u64,
    pub num_rows: u64,
    pub index_offset: u64,
    pub index_size: u32,
    pub file_size: u64,
}

impl MetaBlock {
    pub fn index_page(&self) -> PageRef {
        PageRef {
            offset: self.index_offset,
            size: self.index_size,
        }
    }

    /// Header slot this version goes to; consecutive versions alternate.
    pub fn slot(&self) -> usize {
        (self.transaction_id % 2) as usize
    }

    pub fn slot_offset(&self) -> u64 {
        METABLOCK_OFFSET + (self.slot() * METABLOCK_SIZE) as u64
    }

    pub fn to_bytes(&self) -> [u8; METABLOCK_SIZE] {
        let mut buf = [0u8; METABLOCK_SIZE];
        buf[0..8].copy_from_slice(&self.transaction_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.num_rows.to_le_bytes());
        buf[16..24].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[24..28].copy_from_slice(&self.index_size.to_le_bytes());
        buf[28..36].copy_from_slice(&self.file_size.to_le_bytes());
        let hash = blake3::hash(&buf[..METABLOCK_BODY_SIZE]);
        buf[METABLOCK_BODY_SIZE..].copy_from_slice(hash.as_bytes());
        buf
    }

    /// Decode one slot. An all-zero slot was never written (`Ok(None)`);
    /// a checksum mismatch is `InvalidFormat`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Option<Self>> {
        if bytes.len() < METABLOCK_SIZE {
            return Err(CsTableError::InvalidFormat(format!(
                "MetaBlock too short: {} bytes, need {}",
                bytes.len(),
                METABLOCK_SIZE
            )));
        }
        let bytes = &bytes[..METABLOCK_SIZE];
        if bytes.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let expected = blake3::hash(&bytes[..METABLOCK_BODY_SIZE]);
        if expected.as_bytes()[..] != bytes[METABLOCK_BODY_SIZE..] {
            return Err(CsTableError::InvalidFormat("MetaBlock checksum mismatch".into()));
        }

        let mut cursor = ByteCursor::from_slice(&bytes[..METABLOCK_BODY_SIZE]);
        Ok(Some(Self {
            transaction_id: cursor.read_u64()?,
            num_rows: cursor.read_u64()?,
            index_offset: cursor.read_u64()?,
            index_size: cursor.read_u32()?,
            file_size: cursor.read_u64()?,
        }))
    }
}

// ── Paged v0.2.0 ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedHeader {
    pub flags: u64,
    pub columns: Vec<ColumnConfig>,
}

/// Outcome of reading both MetaBlock slots.
#[derive(Debug, Clone, Default)]
pub struct MetaBlockSlots {
    pub valid: Vec<MetaBlock>,
    /// Slots holding data that failed validation.
    pub corrupt: Vec<usize>,
}

impl MetaBlockSlots {
    /// The committed version with the highest transaction id.
    pub fn latest(&self) -> Option<MetaBlock> {
        self.valid.iter().copied().max_by_key(|m| m.transaction_id)
    }
}

impl PagedHeader {
    /// Encode with empty MetaBlock slots, zero-padded to a sector boundary.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        write_prelude(&mut buf, BinaryFormatVersion::V0_2_0);
        buf.extend_from_slice(&self.flags.to_le_bytes());
        debug_assert_eq!(buf.len() as u64, METABLOCK_OFFSET);
        buf.resize(buf.len() + 2 * METABLOCK_SIZE + HEADER_RESERVED, 0);

        encode_varint(self.columns.len() as u64, &mut buf);
        for col in &self.columns {
            encode_varint(col.logical_type as u64, &mut buf);
            encode_varint(col.encoding.as_u32() as u64, &mut buf);
            encode_varint(col.column_id as u64, &mut buf);
            encode_varint(col.column_name.len() as u64, &mut buf);
            buf.extend_from_slice(col.column_name.as_bytes());
            encode_varint(col.rlevel_max as u64, &mut buf);
            encode_varint(col.dlevel_max as u64, &mut buf);
        }

        let padded = pad_to_next_sector(buf.len() as u64) as usize;
        buf.resize(padded, 0);
        Ok(buf)
    }

    /// Parse the header after the prelude, returning it with the decoded
    /// MetaBlock slots.
    pub fn read_from(cursor: &mut ByteCursor<'_>) -> Result<(Self, MetaBlockSlots)> {
        Self::parse(cursor).map_err(malformed)
    }

    fn parse(cursor: &mut ByteCursor<'_>) -> Result<(Self, MetaBlockSlots)> {
        let flags = cursor.read_u64()?;

        let mut slots = MetaBlockSlots::default();
        for slot in 0..2 {
            match MetaBlock::from_bytes(cursor.read_bytes(METABLOCK_SIZE)?) {
                Ok(Some(meta)) if meta.slot() == slot => slots.valid.push(meta),
                Ok(Some(_)) | Err(_) => slots.corrupt.push(slot),
                Ok(None) => {}
            }
        }
        cursor.skip(HEADER_RESERVED)?;

        let ncols = cursor.read_varint()?;
        let mut columns = Vec::new();
        for _ in 0..ncols {
            let raw_type = cursor.read_varint()?;
            let logical_type = u8::try_from(raw_type)
                .ok()
                .and_then(ColumnType::from_u8)
                .ok_or_else(|| {
                    CsTableError::InvalidFormat(format!("unknown column type {}", raw_type))
                })?;
            let raw_enc = cursor.read_varint()?;
            let encoding = u32::try_from(raw_enc)
                .ok()
                .and_then(ColumnEncoding::from_u32)
                .ok_or_else(|| {
                    CsTableError::InvalidFormat(format!("unknown column encoding {}", raw_enc))
                })?;
            let column_id = varint_u32(cursor.read_varint()?, "column id")?;
            let name = cursor.read_lenenc_string()?;
            let rlevel_max = varint_u32(cursor.read_varint()?, "r_max")?;
            let dlevel_max = varint_u32(cursor.read_varint()?, "d_max")?;
            columns.push(ColumnConfig::new(
                column_id,
                name,
                logical_type,
                encoding,
                rlevel_max,
                dlevel_max,
            ));
        }

        Ok((Self { flags, columns }, slots))
    }
}

fn varint_u32(v: u64, what: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| CsTableError::InvalidFormat(format!("{} {} out of range", what, v)))
}

fn u32_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| CsTableError::IllegalArgument(format!("{} too long: {}", what, len)))
}
