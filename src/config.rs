//! Writer options.
//!
//! Options can be kept next to a table as pretty JSON and loaded back with
//! [`WriterOptions::read_from`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CsTableError, Result};
use crate::types::{BinaryFormatVersion, DEFAULT_MAX_PAGE_SIZE};

/// Smallest page size accepted; keeps the page index from outgrowing the data.
pub const MIN_PAGE_SIZE: u32 = 512;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WriterOptions {
    /// Container layout to write.
    pub format: BinaryFormatVersion,
    /// Streams longer than this are split across several pages
    /// (paged format only).
    pub max_page_size: u32,
    /// fsync around the header/MetaBlock commit.
    pub sync: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            format: BinaryFormatVersion::V0_2_0,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            sync: true,
        }
    }
}

impl WriterOptions {
    pub fn flat() -> Self {
        Self {
            format: BinaryFormatVersion::V0_1_0,
            ..Self::default()
        }
    }

    pub fn paged() -> Self {
        Self::default()
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_page_size < MIN_PAGE_SIZE {
            return Err(CsTableError::IllegalArgument(format!(
                "max_page_size {} below minimum {}",
                self.max_page_size, MIN_PAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Read options from a JSON file. Returns None if the file doesn't exist.
    pub fn read_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&contents)?;
        options.validate()?;
        Ok(Some(options))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
