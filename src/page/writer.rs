//! Splits a byte stream into pages of bounded size.

use std::io::{Seek, Write};

use super::manager::PageManager;
use crate::error::Result;
use crate::types::PageRef;

pub struct PageWriter<'m, W> {
    manager: &'m mut PageManager<W>,
    max_page_size: u32,
}

impl<'m, W: Write + Seek> PageWriter<'m, W> {
    pub fn new(manager: &'m mut PageManager<W>, max_page_size: u32) -> Self {
        Self {
            manager,
            max_page_size: max_page_size.max(1),
        }
    }

    /// Allocate and write `data` as consecutive pages. An empty stream
    /// takes no pages.
    pub fn write_stream(&mut self, data: &[u8]) -> Result<Vec<PageRef>> {
        let mut pages = Vec::with_capacity(data.len().div_ceil(self.max_page_size as usize));
        for chunk in data.chunks(self.max_page_size as usize) {
            let page = self.manager.alloc_page(chunk.len() as u32);
            self.manager.write_page(&page, chunk)?;
            pages.push(page);
        }
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_split_into_pages() {
        let mut pm = PageManager::new(Cursor::new(Vec::new()), 0);
        let data: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        let pages = PageWriter::new(&mut pm, 1024).write_stream(&data).unwrap();
        let sizes: Vec<u32> = pages.iter().map(|p| p.size).collect();
        assert_eq!(sizes, vec![1024, 1024, 452]);
        assert_eq!(pages[1].offset, 1024);
        assert_eq!(pm.into_inner().into_inner(), data);
    }

    #[test]
    fn test_empty_stream() {
        let mut pm = PageManager::new(Cursor::new(Vec::new()), 0);
        let pages = PageWriter::new(&mut pm, 1024).write_stream(&[]).unwrap();
        assert!(pages.is_empty());
        assert_eq!(pm.allocated_bytes(), 0);
    }
}
