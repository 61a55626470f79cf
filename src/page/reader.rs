//! Resolves page references against a mapped file.

use std::borrow::Cow;

use crate::error::{CsTableError, Result};
use crate::types::PageRef;

#[derive(Debug, Clone, Copy)]
pub struct PageReader<'a> {
    data: &'a [u8],
}

impl<'a> PageReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn read_page(&self, page: &PageRef) -> Result<&'a [u8]> {
        let end = self.checked_end(page)?;
        Ok(&self.data[page.offset as usize..end])
    }

    /// End of `page` in the mapping; a range that wraps or runs past the
    /// end is `BufferOverflow`.
    fn checked_end(&self, page: &PageRef) -> Result<usize> {
        let len = self.data.len() as u64;
        match page.end() {
            Some(end) if end <= len => Ok(end as usize),
            _ => Err(CsTableError::overflow(
                page.size as usize,
                len.saturating_sub(page.offset) as usize,
            )),
        }
    }

    /// Concatenate a page list into one stream. Borrows when the pages are
    /// contiguous, copies otherwise.
    pub fn read_stream(&self, pages: &[PageRef]) -> Result<Cow<'a, [u8]>> {
        let slices = pages
            .iter()
            .map(|p| self.read_page(p))
            .collect::<Result<Vec<_>>>()?;

        let contiguous = pages.windows(2).all(|w| w[0].end() == Some(w[1].offset));
        match (pages.first(), pages.last()) {
            (None, _) | (_, None) => Ok(Cow::Borrowed(&[])),
            (Some(first), Some(last)) if contiguous => Ok(Cow::Borrowed(
                &self.data[first.offset as usize..self.checked_end(last)?],
            )),
            _ => Ok(Cow::Owned(slices.concat())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_pages_borrow() {
        let data: Vec<u8> = (0..100u8).collect();
        let reader = PageReader::new(&data);
        let pages = [PageRef { offset: 10, size: 5 }, PageRef { offset: 15, size: 5 }];
        let stream = reader.read_stream(&pages).unwrap();
        assert!(matches!(stream, Cow::Borrowed(_)));
        assert_eq!(&*stream, &data[10..20]);
    }

    #[test]
    fn test_scattered_pages_copy() {
        let data: Vec<u8> = (0..100u8).collect();
        let reader = PageReader::new(&data);
        let pages = [PageRef { offset: 50, size: 2 }, PageRef { offset: 10, size: 2 }];
        let stream = reader.read_stream(&pages).unwrap();
        assert!(matches!(stream, Cow::Owned(_)));
        assert_eq!(&*stream, &[50, 51, 10, 11]);
    }

    #[test]
    fn test_page_past_end() {
        let data = [0u8; 16];
        let reader = PageReader::new(&data);
        let err = reader.read_page(&PageRef { offset: 10, size: 8 }).unwrap_err();
        assert_eq!(err.to_string(), "Buffer overflow: need 8 bytes, 6 remaining");
        assert!(reader.read_stream(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_wrapping_page_is_overflow() {
        let data = [0u8; 16];
        let reader = PageReader::new(&data);
        let page = PageRef { offset: u64::MAX - 2, size: 8 };
        assert_eq!(reader.read_page(&page).unwrap_err().code(), "BUFFER_OVERFLOW");
        assert_eq!(reader.read_stream(&[page]).unwrap_err().code(), "BUFFER_OVERFLOW");
    }
}
