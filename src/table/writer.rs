//! Table writer.
//!
//! Column writers are registered by name, filled (directly or through a
//! [`RecordShredder`](crate::RecordShredder)) and written out by a single
//! `commit()`. Nothing becomes visible to readers before the commit's final
//! header (flat format) or MetaBlock (paged format) write.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::column::{ColumnWriter, Committed};
use crate::config::WriterOptions;
use crate::error::{CsTableError, Result};
use crate::format::{FlatHeader, MetaBlock, PagedHeader};
use crate::page::{PageIndex, PageManager, PageWriter};
use crate::schema::TableSchema;
use crate::types::{BinaryFormatVersion, ColumnConfig, PageIndexEntryType, PageIndexKey};

/// What a commit wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitStats {
    pub format: BinaryFormatVersion,
    pub num_rows: u64,
    pub num_columns: usize,
    pub file_size: u64,
}

struct ColumnSlot {
    config: ColumnConfig,
    writer: ColumnWriter,
}

pub struct CSTableWriter {
    path: PathBuf,
    file: File,
    options: WriterOptions,
    columns: Vec<ColumnSlot>,
    by_name: HashMap<String, usize>,
    num_rows: u64,
}

impl CSTableWriter {
    /// Create (or truncate) `path` for a new table in the default format.
    pub fn create(path: &Path) -> Result<Self> {
        Self::create_with_options(path, WriterOptions::default())
    }

    pub fn create_with_options(path: &Path, options: WriterOptions) -> Result<Self> {
        options.validate()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            options,
            columns: Vec::new(),
            by_name: HashMap::new(),
            num_rows: 0,
        })
    }

    /// Create a table with one column writer per leaf of `schema`.
    pub fn create_from_schema(
        path: &Path,
        schema: &TableSchema,
        options: WriterOptions,
    ) -> Result<Self> {
        let mut table = Self::create_with_options(path, options)?;
        for col in schema.flat_columns()? {
            let writer = ColumnWriter::with_max_value(
                col.logical_type,
                col.encoding,
                col.rlevel_max,
                col.dlevel_max,
                col.max_value,
            )?;
            table.add_column(col.column_name, writer)?;
        }
        Ok(table)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Register a column. Ids are assigned 1..=n in registration order.
    pub fn add_column(&mut self, name: impl Into<String>, writer: ColumnWriter) -> Result<u32> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(CsTableError::IllegalArgument(format!(
                "duplicate column name: {}",
                name
            )));
        }
        let column_id = self.columns.len() as u32 + 1;
        let config = ColumnConfig::new(
            column_id,
            name.clone(),
            writer.logical_type(),
            writer.encoding(),
            writer.rlevel_max(),
            writer.dlevel_max(),
        )
        .with_max_value(writer.max_value());
        self.by_name.insert(name, self.columns.len());
        self.columns.push(ColumnSlot { config, writer });
        Ok(column_id)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnConfig> {
        self.columns.iter().map(|slot| &slot.config)
    }

    pub fn column_config(&self, name: &str) -> Result<&ColumnConfig> {
        let idx = self.index_of(name)?;
        Ok(&self.columns[idx].config)
    }

    pub fn column(&self, name: &str) -> Result<&ColumnWriter> {
        let idx = self.index_of(name)?;
        Ok(&self.columns[idx].writer)
    }

    pub fn column_writer(&mut self, name: &str) -> Result<&mut ColumnWriter> {
        let idx = self.index_of(name)?;
        Ok(&mut self.columns[idx].writer)
    }

    pub fn column_writer_by_id(&mut self, column_id: u32) -> Result<&mut ColumnWriter> {
        let idx = (column_id as usize)
            .checked_sub(1)
            .filter(|&i| i < self.columns.len())
            .ok_or_else(|| CsTableError::Index(format!("unknown column id: {}", column_id)))?;
        Ok(&mut self.columns[idx].writer)
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CsTableError::Index(format!("unknown column: {}", name)))
    }

    /// Count `n` more complete records.
    pub fn add_rows(&mut self, n: u64) {
        self.num_rows += n;
    }

    pub fn add_row(&mut self) {
        self.add_rows(1);
    }

    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    /// Commit every column and write the table. Consumes the writer; a
    /// table is committed exactly once.
    pub fn commit(self) -> Result<CommitStats> {
        let CSTableWriter {
            path,
            file,
            options,
            columns,
            num_rows,
            ..
        } = self;

        // Step 1: Every column must hold exactly num_rows records.
        for slot in &columns {
            if slot.writer.num_records() != num_rows {
                return Err(CsTableError::Runtime(format!(
                    "column {} holds {} records, table has {}",
                    slot.config.column_name,
                    slot.writer.num_records(),
                    num_rows
                )));
            }
        }

        // Step 2: Flush all column streams.
        let committed: Vec<(ColumnConfig, ColumnWriter<Committed>)> = columns
            .into_iter()
            .map(|slot| (slot.config, slot.writer.commit()))
            .collect();
        let num_columns = committed.len();

        let mut pm = PageManager::new(file, 0);
        let file_size = match options.format {
            BinaryFormatVersion::V0_1_0 => write_flat(&mut pm, committed, num_rows, &options)?,
            BinaryFormatVersion::V0_2_0 => write_paged(&mut pm, committed, num_rows, &options)?,
        };

        info!(
            path = %path.display(),
            format = ?options.format,
            rows = num_rows,
            columns = num_columns,
            bytes = file_size,
            "cstable committed"
        );

        Ok(CommitStats {
            format: options.format,
            num_rows,
            num_columns,
            file_size,
        })
    }
}

fn sync_or_flush(pm: &mut PageManager<File>, options: &WriterOptions) -> Result<()> {
    if options.sync {
        pm.sync()
    } else {
        pm.flush()
    }
}

/// Flat layout: bodies first, directory header last.
fn write_flat(
    pm: &mut PageManager<File>,
    committed: Vec<(ColumnConfig, ColumnWriter<Committed>)>,
    num_rows: u64,
    options: &WriterOptions,
) -> Result<u64> {
    let mut header = FlatHeader {
        flags: 0,
        num_rows,
        columns: committed.iter().map(|(config, _)| config.clone()).collect(),
    };
    let header_offset = pm.alloc(header.serialized_size() as u64);

    for ((_, writer), config) in committed.into_iter().zip(header.columns.iter_mut()) {
        config.body_size = writer.body_size();
        config.body_offset = pm.alloc(config.body_size);
        let body = writer.to_bytes()?;
        pm.write_at(config.body_offset, &body)?;
        debug!(column = %config.column_name, offset = config.body_offset, size = config.body_size, "column body written");
    }
    sync_or_flush(pm, options)?;

    pm.write_at(header_offset, &header.to_bytes()?)?;
    sync_or_flush(pm, options)?;
    Ok(pm.allocated_bytes())
}

/// Paged layout: header with empty MetaBlocks, column pages, page index,
/// then the MetaBlock that makes it all visible.
fn write_paged(
    pm: &mut PageManager<File>,
    committed: Vec<(ColumnConfig, ColumnWriter<Committed>)>,
    num_rows: u64,
    options: &WriterOptions,
) -> Result<u64> {
    let header = PagedHeader {
        flags: 0,
        columns: committed.iter().map(|(config, _)| config.clone()).collect(),
    };
    let header_bytes = header.to_bytes()?;
    let header_offset = pm.alloc(header_bytes.len() as u64);

    let mut index = PageIndex::new();
    {
        let mut pages = PageWriter::new(pm, options.max_page_size);
        for (config, writer) in &committed {
            for (entry_type, data) in [
                (PageIndexEntryType::RLevel, writer.rlevel_data()),
                (PageIndexEntryType::DLevel, writer.dlevel_data()),
                (PageIndexEntryType::Data, writer.value_data()),
            ] {
                let refs = pages.write_stream(data)?;
                index.add_pages(PageIndexKey::new(config.column_id, entry_type), &refs);
            }
        }
    }
    let index_page = index.write(pm)?;
    debug!(pages = index.num_pages(), index_size = index_page.size, "page index written");

    pm.write_at(header_offset, &header_bytes)?;
    sync_or_flush(pm, options)?;

    let meta = MetaBlock {
        transaction_id: 1,
        num_rows,
        index_offset: index_page.offset,
        index_size: index_page.size,
        file_size: pm.allocated_bytes(),
    };
    pm.write_transaction(&meta)?;
    sync_or_flush(pm, options)?;
    Ok(meta.file_size)
}
