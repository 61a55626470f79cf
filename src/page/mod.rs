//! Page-addressed physical layout.
//!
//! - [`PageManager`] reserves byte ranges at the end of the file and writes
//!   them in place.
//! - [`PageWriter`] splits a stream into pages of bounded size.
//! - [`PageIndex`] records which pages hold which column stream and is
//!   written once per commit; [`PageIndexReader`] parses it back.
//! - [`PageReader`] turns page lists back into streams over the mapping.

pub mod index;
pub mod manager;
pub mod reader;
pub mod writer;

pub use index::{PageIndex, PageIndexReader};
pub use manager::PageManager;
pub use reader::PageReader;
pub use writer::PageWriter;
