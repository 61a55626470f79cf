//! Table reader.
//!
//! Opens a committed table read-only, memory-mapped. The column directory
//! is parsed once at open; column readers are created on request, each with
//! its own cursor, and borrow the mapping owned by the table reader.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::codec::ByteCursor;
use crate::column::ColumnReader;
use crate::error::{CsTableError, Result};
use crate::format::{read_prelude, FlatHeader, PagedHeader};
use crate::page::{PageIndexReader, PageReader};
use crate::types::{
    BinaryFormatVersion, ColumnConfig, ColumnEncoding, ColumnType, PageIndexEntryType,
    PageIndexKey,
};

enum Backing {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Mmap(m) => m,
            Backing::Owned(v) => v,
        }
    }
}

enum Layout {
    Flat,
    Paged(PageIndexReader),
}

pub struct CSTableReader {
    data: Backing,
    version: BinaryFormatVersion,
    num_rows: u64,
    columns: Vec<ColumnConfig>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<u32, usize>,
    layout: Layout,
}

impl CSTableReader {
    /// Open a table file (memory-mapped).
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(CsTableError::InvalidFormat(format!(
                "{} is empty",
                path.display()
            )));
        }
        let mmap = unsafe { Mmap::map(&file) }?;
        let reader = Self::parse(Backing::Mmap(mmap))?;
        debug!(
            path = %path.display(),
            format = ?reader.version,
            rows = reader.num_rows,
            columns = reader.columns.len(),
            "cstable opened"
        );
        Ok(reader)
    }

    /// Open a table held in memory (for testing / embedding).
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::parse(Backing::Owned(bytes))
    }

    fn parse(data: Backing) -> Result<Self> {
        let mut cursor = ByteCursor::from_slice(&data);

        // 1. Prelude selects the layout
        let version = read_prelude(&mut cursor)?;

        // 2. Column directory (and, for the paged layout, the MetaBlock)
        let (num_rows, columns, layout) = match version {
            BinaryFormatVersion::V0_1_0 => {
                let header = FlatHeader::read_from(&mut cursor)?;
                (header.num_rows, header.columns, Layout::Flat)
            }
            BinaryFormatVersion::V0_2_0 => {
                let (header, slots) = PagedHeader::read_from(&mut cursor)?;
                for slot in &slots.corrupt {
                    warn!(slot = *slot, "MetaBlock slot failed validation, ignoring");
                }
                let meta = slots.latest().ok_or_else(|| {
                    CsTableError::InvalidFormat("no committed MetaBlock".into())
                })?;
                debug!(
                    transaction_id = meta.transaction_id,
                    rows = meta.num_rows,
                    index_offset = meta.index_offset,
                    "MetaBlock selected"
                );
                let len = data.len() as u64;
                if len < meta.file_size {
                    return Err(CsTableError::overflow(
                        meta.file_size as usize,
                        len as usize,
                    ));
                }

                // 3. Page index
                let index_bytes = PageReader::new(&data).read_page(&meta.index_page())?;
                let known: HashSet<u32> =
                    header.columns.iter().map(|c| c.column_id).collect();
                let index = PageIndexReader::parse(index_bytes, |id| known.contains(&id))?;
                (meta.num_rows, header.columns, Layout::Paged(index))
            }
        };

        // 4. Lookup maps
        let mut by_name = HashMap::with_capacity(columns.len());
        let mut by_id = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if by_name.insert(col.column_name.clone(), i).is_some()
                || by_id.insert(col.column_id, i).is_some()
            {
                return Err(CsTableError::InvalidFormat(format!(
                    "duplicate column in directory: {} (id {})",
                    col.column_name, col.column_id
                )));
            }
        }

        Ok(Self {
            data,
            version,
            num_rows,
            columns,
            by_name,
            by_id,
            layout,
        })
    }

    pub fn version(&self) -> BinaryFormatVersion {
        self.version
    }

    pub fn num_records(&self) -> u64 {
        self.num_rows
    }

    pub fn columns(&self) -> &[ColumnConfig] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn column_config(&self, name: &str) -> Result<&ColumnConfig> {
        self.by_name
            .get(name)
            .map(|&i| &self.columns[i])
            .ok_or_else(|| CsTableError::Index(format!("unknown column: {}", name)))
    }

    pub fn column_config_by_id(&self, column_id: u32) -> Result<&ColumnConfig> {
        self.by_id
            .get(&column_id)
            .map(|&i| &self.columns[i])
            .ok_or_else(|| CsTableError::Index(format!("unknown column id: {}", column_id)))
    }

    pub fn column_type(&self, name: &str) -> Result<ColumnType> {
        Ok(self.column_config(name)?.logical_type)
    }

    pub fn column_encoding(&self, name: &str) -> Result<ColumnEncoding> {
        Ok(self.column_config(name)?.encoding)
    }

    pub fn column_reader(&self, name: &str) -> Result<ColumnReader<'_>> {
        let config = self.column_config(name)?;
        self.reader_for(config)
    }

    pub fn column_reader_by_id(&self, column_id: u32) -> Result<ColumnReader<'_>> {
        let config = self.column_config_by_id(column_id)?;
        self.reader_for(config)
    }

    fn flat_body(&self, config: &ColumnConfig) -> Result<&[u8]> {
        let len = self.data.len() as u64;
        let end = config.body_offset.saturating_add(config.body_size);
        if end > len {
            return Err(CsTableError::overflow(
                config.body_size as usize,
                len.saturating_sub(config.body_offset) as usize,
            ));
        }
        Ok(&self.data[config.body_offset as usize..end as usize])
    }

    fn reader_for(&self, config: &ColumnConfig) -> Result<ColumnReader<'_>> {
        let pages = PageReader::new(&self.data);
        match &self.layout {
            Layout::Flat => {
                let body = self.flat_body(config)?;
                ColumnReader::from_body(
                    Cow::Borrowed(body),
                    config.logical_type,
                    config.encoding,
                    config.rlevel_max,
                    config.dlevel_max,
                )
            }
            Layout::Paged(index) => {
                let stream = |entry_type: PageIndexEntryType| {
                    pages.read_stream(index.pages(&PageIndexKey::new(config.column_id, entry_type)))
                };
                ColumnReader::from_streams(
                    stream(PageIndexEntryType::RLevel)?,
                    stream(PageIndexEntryType::DLevel)?,
                    stream(PageIndexEntryType::Data)?,
                    config.logical_type,
                    config.encoding,
                    config.rlevel_max,
                    config.dlevel_max,
                )
            }
        }
    }
}

impl std::fmt::Debug for CSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CSTableReader")
            .field("version", &self.version)
            .field("num_rows", &self.num_rows)
            .field("columns", &self.columns.len())
            .field("bytes", &self.data.len())
            .finish()
    }
}
