//! Column writers and readers.
//!
//! One writer/reader pair covers every encoding; the per-encoding value
//! stream is a closed enum chosen at construction.

pub mod reader;
pub mod value;
pub mod writer;

pub use reader::ColumnReader;
pub use value::{ColumnEntry, Datum};
pub use writer::{Building, ColumnWriter, Committed, BODY_HEADER_SIZE};
