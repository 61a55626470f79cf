//! Append-only page allocation over one backing file.
//!
//! The manager owns the file and a monotonically advancing end offset.
//! Allocation is a pure offset bump with no free list; writes are
//! positioned, so a region reserved early (the header) can be filled in
//! last.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use crate::error::{CsTableError, Result};
use crate::format::MetaBlock;
use crate::types::PageRef;

#[derive(Debug)]
pub struct PageManager<W = File> {
    file: W,
    end: u64,
}

impl<W: Write + Seek> PageManager<W> {
    /// Manager whose first allocation starts at `start`.
    pub fn new(file: W, start: u64) -> Self {
        Self { file, end: start }
    }

    /// Bytes reserved so far, i.e. the file length once everything is written.
    pub fn allocated_bytes(&self) -> u64 {
        self.end
    }

    /// Reserve `size` bytes at the end. Returns the region's offset.
    pub fn alloc(&mut self, size: u64) -> u64 {
        let offset = self.end;
        self.end += size;
        offset
    }

    pub fn alloc_page(&mut self, size: u32) -> PageRef {
        PageRef {
            offset: self.alloc(size as u64),
            size,
        }
    }

    /// Positioned write of `data` at `offset`. The region must have been
    /// allocated.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if offset + data.len() as u64 > self.end {
            return Err(CsTableError::Runtime(format!(
                "write of {} bytes at {} beyond allocated end {}",
                data.len(),
                offset,
                self.end
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    pub fn write_page(&mut self, page: &PageRef, data: &[u8]) -> Result<()> {
        if data.len() > page.size as usize {
            return Err(CsTableError::IllegalArgument(format!(
                "{} bytes do not fit a page of {}",
                data.len(),
                page.size
            )));
        }
        self.write_at(page.offset, data)
    }

    /// Write `meta` into its header slot, making its table version the one
    /// readers pick.
    pub fn write_transaction(&mut self, meta: &MetaBlock) -> Result<()> {
        let bytes = meta.to_bytes();
        self.write_at(meta.slot_offset(), &bytes)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.file
    }
}

impl PageManager<File> {
    /// Flush file data and metadata to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
