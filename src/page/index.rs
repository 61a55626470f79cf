//! Page index: `(column_id, entry_type) -> [PageRef]`.
//!
//! Serialized as back-to-back varint entries, one per page, in key order:
//!
//! ```text
//! [entry_type][column_id][offset][size] [entry_type][column_id][offset][size] ...
//! ```
//!
//! A key's pages appear in stream order.

use std::collections::{BTreeMap, HashMap};
use std::io::{Seek, Write};

use super::manager::PageManager;
use crate::codec::{encode_varint, ByteCursor};
use crate::error::{CsTableError, Result};
use crate::types::{PageIndexEntryType, PageIndexKey, PageRef};

// ── Writer side ────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct PageIndex {
    entries: BTreeMap<PageIndexKey, Vec<PageRef>>,
}

impl PageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the pages of one stream. Pages added for the same key are
    /// appended.
    pub fn add_pages(&mut self, key: PageIndexKey, pages: &[PageRef]) {
        self.entries.entry(key).or_default().extend_from_slice(pages);
    }

    pub fn pages(&self, key: &PageIndexKey) -> &[PageRef] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_pages(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (key, pages) in &self.entries {
            for page in pages {
                encode_varint(key.entry_type as u64, &mut buf);
                encode_varint(key.column_id as u64, &mut buf);
                encode_varint(page.offset, &mut buf);
                encode_varint(page.size as u64, &mut buf);
            }
        }
        buf
    }

    /// Allocate one page at the end of the file, write the index into it
    /// and return its reference for the MetaBlock.
    pub fn write<W: Write + Seek>(&self, manager: &mut PageManager<W>) -> Result<PageRef> {
        let bytes = self.encode();
        let size = u32::try_from(bytes.len()).map_err(|_| {
            CsTableError::Runtime(format!("page index of {} bytes too large", bytes.len()))
        })?;
        let page = manager.alloc_page(size);
        manager.write_page(&page, &bytes)?;
        Ok(page)
    }
}

// ── Reader side ────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct PageIndexReader {
    entries: HashMap<PageIndexKey, Vec<PageRef>>,
}

impl PageIndexReader {
    /// Parse an index page. `is_known_column` rejects entries for columns
    /// missing from the directory.
    pub fn parse(data: &[u8], is_known_column: impl Fn(u32) -> bool) -> Result<Self> {
        let mut cursor = ByteCursor::from_slice(data);
        let mut entries: HashMap<PageIndexKey, Vec<PageRef>> = HashMap::new();

        while !cursor.is_empty() {
            let raw_type = cursor.read_varint()?;
            let entry_type = PageIndexEntryType::from_u64(raw_type).ok_or_else(|| {
                CsTableError::InvalidFormat(format!("unknown page index entry type {}", raw_type))
            })?;
            let column_id = narrow_u32(cursor.read_varint()?, "column id")?;
            if !is_known_column(column_id) {
                return Err(CsTableError::InvalidFormat(format!(
                    "page index references unknown column {}",
                    column_id
                )));
            }
            let offset = cursor.read_varint()?;
            let size = narrow_u32(cursor.read_varint()?, "page size")?;
            let page = PageRef { offset, size };
            if page.end().is_none() {
                return Err(CsTableError::overflow(size as usize, 0));
            }

            entries
                .entry(PageIndexKey::new(column_id, entry_type))
                .or_default()
                .push(page);
        }

        Ok(Self { entries })
    }

    pub fn pages(&self, key: &PageIndexKey) -> &[PageRef] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_keys(&self) -> usize {
        self.entries.len()
    }
}

fn narrow_u32(v: u64, what: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| CsTableError::InvalidFormat(format!("{} {} out of range", what, v)))
}
