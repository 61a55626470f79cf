//! cstable: columnar storage for nested records.
//!
//! Records are shredded into one column per schema leaf. Every stored value
//! carries a repetition level (which repeated ancestor it repeats at) and a
//! definition level (how many optional/repeated ancestors are present), so a
//! record can be rebuilt from its columns alone.
//!
//! Two file layouts exist:
//! - `v0.1.0`: column directory header followed by contiguous column bodies
//! - `v0.2.0`: fixed header with A/B MetaBlock slots, column streams split
//!   into pages, and a page index located by the latest valid MetaBlock
//!
//! ```no_run
//! use cstable::{CSTableReader, CSTableWriter, RecordMaterializer, RecordShredder, TableSchema, WriterOptions};
//! use serde_json::json;
//!
//! # fn main() -> cstable::Result<()> {
//! let mut schema = TableSchema::new();
//! schema.add_string("name", false, false)?;
//! schema.add_unsigned_int("tags", true, false)?;
//!
//! let path = std::path::Path::new("people.cst");
//! let mut table = CSTableWriter::create_from_schema(path, &schema, WriterOptions::default())?;
//! RecordShredder::new(&mut table, &schema)
//!     .add_record_from_json(&json!({"name": "ada", "tags": [1, 2]}))?;
//! table.commit()?;
//!
//! let reader = CSTableReader::open(path)?;
//! let mut records = RecordMaterializer::new(&schema, &reader)?;
//! while let Some(record) = records.next_record()? {
//!     println!("{}", record);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod column;
pub mod config;
pub mod error;
pub mod format;
pub mod levels;
pub mod materializer;
pub mod page;
pub mod schema;
pub mod shredder;
pub mod table;
pub mod types;

pub use column::{ColumnEntry, ColumnReader, ColumnWriter, Datum};
pub use config::WriterOptions;
pub use error::{CsTableError, Result};
pub use levels::{LevelDecoder, LevelEncoder};
pub use materializer::RecordMaterializer;
pub use schema::{SchemaField, TableSchema};
pub use shredder::RecordShredder;
pub use table::{CSTableReader, CSTableWriter, CommitStats};
pub use types::*;
