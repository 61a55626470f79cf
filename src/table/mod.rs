//! Table container: binds named columns to the flat or paged file layout.

pub mod reader;
pub mod writer;

pub use reader::CSTableReader;
pub use writer::{CSTableWriter, CommitStats};
