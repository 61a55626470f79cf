//! Integration test: damaged and partially written tables.
//!
//! Validates that:
//! - Truncated files fail with `BufferOverflow`, never a panic
//! - Damaged headers fail with `InvalidFormat`
//! - A corrupt MetaBlock slot falls back to the other slot
//! - A paged table with no valid MetaBlock is not readable
//! - Page index entries past the end of the file are `BufferOverflow`
//! - A flat directory whose column count disagrees with its entries is
//!   `InvalidFormat`

use std::fs;
use std::path::Path;

use cstable::format::{MetaBlock, METABLOCK_OFFSET, METABLOCK_SIZE};
use cstable::page::PageIndex;
use cstable::{
    CSTableReader, CSTableWriter, ColumnEncoding, ColumnType, ColumnWriter, Datum,
    PageIndexEntryType, PageIndexKey, PageRef, WriterOptions,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_table(path: &Path, options: WriterOptions, rows: u64) {
    let mut table = CSTableWriter::create_with_options(path, options).unwrap();
    table
        .add_column(
            "n",
            ColumnWriter::new(ColumnType::UnsignedInt, ColumnEncoding::UInt64Plain, 0, 0).unwrap(),
        )
        .unwrap();
    for i in 0..rows {
        table.column_writer("n").unwrap().add_datum(0, 0, Datum::UnsignedInt(i)).unwrap();
        table.add_row();
    }
    table.commit().unwrap();
}

/// Route `warn!`/`debug!` output to the test harness.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn slot_range(slot: usize) -> std::ops::Range<usize> {
    let start = METABLOCK_OFFSET as usize + slot * METABLOCK_SIZE;
    start..start + METABLOCK_SIZE
}

fn read_n(reader: &CSTableReader) -> Vec<u64> {
    let mut col = reader.column_reader("n").unwrap();
    (0..reader.num_records())
        .map(|_| match col.next().unwrap().value {
            Some(Datum::UnsignedInt(v)) => v,
            other => panic!("unexpected value {:?}", other),
        })
        .collect()
}

/// Replace the page index (the last page) and re-sign the MetaBlock so only
/// the index itself is wrong.
fn replace_index(mut bytes: Vec<u8>, index: &PageIndex) -> Vec<u8> {
    let meta = MetaBlock::from_bytes(&bytes[slot_range(1)]).unwrap().unwrap();
    bytes.truncate(meta.index_offset as usize);
    let encoded = index.encode();
    bytes.extend_from_slice(&encoded);
    let meta = MetaBlock {
        index_size: encoded.len() as u32,
        file_size: bytes.len() as u64,
        ..meta
    };
    bytes[slot_range(meta.slot())].copy_from_slice(&meta.to_bytes());
    bytes
}

// ---------------------------------------------------------------------------
// Tests: truncation
// ---------------------------------------------------------------------------

#[test]
fn truncated_flat_body_is_buffer_overflow() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.cst");
    write_table(&path, WriterOptions::flat(), 100);

    let mut bytes = fs::read(&path).unwrap();
    bytes.pop();
    let reader = CSTableReader::from_bytes(bytes).unwrap();
    let err = reader.column_reader("n").unwrap_err();
    assert_eq!(err.code(), "BUFFER_OVERFLOW");
}

#[test]
fn truncated_paged_file_is_buffer_overflow() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.cst");
    write_table(&path, WriterOptions::paged(), 100);

    let mut bytes = fs::read(&path).unwrap();
    bytes.pop();
    let err = CSTableReader::from_bytes(bytes).unwrap_err();
    assert_eq!(err.code(), "BUFFER_OVERFLOW");
}

#[test]
fn metablock_file_size_past_end_is_buffer_overflow() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.cst");
    write_table(&path, WriterOptions::paged(), 10);

    // The index page is intact; only the recorded size says bytes are missing.
    let mut bytes = fs::read(&path).unwrap();
    let meta = MetaBlock::from_bytes(&bytes[slot_range(1)]).unwrap().unwrap();
    let grown = MetaBlock {
        file_size: meta.file_size + 4096,
        ..meta
    };
    bytes[slot_range(1)].copy_from_slice(&grown.to_bytes());
    let err = CSTableReader::from_bytes(bytes).unwrap_err();
    assert_eq!(err.code(), "BUFFER_OVERFLOW");
}

#[test]
fn truncated_header_is_invalid_format() {
    let dir = TempDir::new().unwrap();
    for options in [WriterOptions::flat(), WriterOptions::paged()] {
        let path = dir.path().join(format!("{:?}.cst", options.format));
        write_table(&path, options, 3);

        let bytes = fs::read(&path).unwrap();
        for len in [0, 3, 10, 20] {
            let err = CSTableReader::from_bytes(bytes[..len].to_vec()).unwrap_err();
            assert_eq!(err.code(), "INVALID_FORMAT", "len {}", len);
        }
    }
}

#[test]
fn empty_file_is_invalid_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.cst");
    fs::write(&path, b"").unwrap();
    assert_eq!(CSTableReader::open(&path).unwrap_err().code(), "INVALID_FORMAT");
}

#[test]
fn bad_magic_is_invalid_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.cst");
    write_table(&path, WriterOptions::paged(), 3);

    let mut bytes = fs::read(&path).unwrap();
    bytes[0] ^= 0xff;
    assert_eq!(CSTableReader::from_bytes(bytes).unwrap_err().code(), "INVALID_FORMAT");
}

// ---------------------------------------------------------------------------
// Tests: MetaBlock slots
// ---------------------------------------------------------------------------

#[test]
fn corrupt_only_metablock_makes_table_unreadable() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.cst");
    write_table(&path, WriterOptions::paged(), 10);

    // The first commit has transaction id 1 and lands in slot 1.
    let mut bytes = fs::read(&path).unwrap();
    let slot = slot_range(1);
    bytes[slot.start + 8] ^= 0x01;
    let err = CSTableReader::from_bytes(bytes).unwrap_err();
    assert_eq!(err.code(), "INVALID_FORMAT");
    assert!(err.to_string().contains("no committed MetaBlock"));
}

#[test]
fn newer_metablock_wins_and_corruption_falls_back() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.cst");
    write_table(&path, WriterOptions::paged(), 10);

    let mut bytes = fs::read(&path).unwrap();
    let first = MetaBlock::from_bytes(&bytes[slot_range(1)]).unwrap().unwrap();
    assert_eq!(first.transaction_id, 1);
    assert_eq!(first.num_rows, 10);
    assert_eq!(first.file_size, bytes.len() as u64);

    // A second version exposing only the first 4 rows.
    let second = MetaBlock {
        transaction_id: 2,
        num_rows: 4,
        ..first
    };
    assert_eq!(second.slot(), 0);
    bytes[slot_range(0)].copy_from_slice(&second.to_bytes());

    let reader = CSTableReader::from_bytes(bytes.clone()).unwrap();
    assert_eq!(reader.num_records(), 4);
    assert_eq!(read_n(&reader), vec![0, 1, 2, 3]);

    // Damage the newer slot: the reader goes back to version 1.
    bytes[slot_range(0).start] ^= 0x80;
    let reader = CSTableReader::from_bytes(bytes).unwrap();
    assert_eq!(reader.num_records(), 10);
    assert_eq!(read_n(&reader), (0..10).collect::<Vec<_>>());
}

#[test]
fn damaged_page_index_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.cst");
    write_table(&path, WriterOptions::paged(), 10);

    let mut bytes = fs::read(&path).unwrap();
    let meta = MetaBlock::from_bytes(&bytes[slot_range(1)]).unwrap().unwrap();
    // First entry starts with its entry type varint; 0x7f is no known type.
    bytes[meta.index_offset as usize] = 0x7f;
    assert_eq!(CSTableReader::from_bytes(bytes).unwrap_err().code(), "INVALID_FORMAT");
}

#[test]
fn page_offset_near_u64_max_is_buffer_overflow() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.cst");
    write_table(&path, WriterOptions::paged(), 10);

    let bytes = fs::read(&path).unwrap();
    let column_id = CSTableReader::from_bytes(bytes.clone())
        .unwrap()
        .column_config("n")
        .unwrap()
        .column_id;

    let mut index = PageIndex::new();
    index.add_pages(
        PageIndexKey::new(column_id, PageIndexEntryType::Data),
        &[PageRef { offset: u64::MAX - 2, size: 8 }],
    );
    let err = CSTableReader::from_bytes(replace_index(bytes.clone(), &index)).unwrap_err();
    assert_eq!(err.code(), "BUFFER_OVERFLOW");

    // In range of u64 but past the end of the file: caught when the column
    // is opened.
    let mut index = PageIndex::new();
    index.add_pages(
        PageIndexKey::new(column_id, PageIndexEntryType::Data),
        &[PageRef { offset: 1 << 40, size: 8 }],
    );
    let reader = CSTableReader::from_bytes(replace_index(bytes, &index)).unwrap();
    assert_eq!(reader.column_reader("n").unwrap_err().code(), "BUFFER_OVERFLOW");
}

// ---------------------------------------------------------------------------
// Tests: flat directory
// ---------------------------------------------------------------------------

#[test]
fn flat_column_count_mismatch_is_invalid_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.cst");
    let mut table = CSTableWriter::create_with_options(&path, WriterOptions::flat()).unwrap();
    for name in ["a", "b"] {
        table
            .add_column(
                name,
                ColumnWriter::new(ColumnType::UnsignedInt, ColumnEncoding::UInt64Leb128, 0, 0)
                    .unwrap(),
            )
            .unwrap();
    }
    for i in 0..5u64 {
        for name in ["a", "b"] {
            table.column_writer(name).unwrap().add_datum(0, 0, Datum::UnsignedInt(i)).unwrap();
        }
        table.add_row();
    }
    table.commit().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(CSTableReader::from_bytes(bytes.clone()).unwrap().columns().len(), 2);

    // ncols sits after magic, version, flags and num_rows.
    for ncols in [1u32, 3] {
        let mut damaged = bytes.clone();
        damaged[22..26].copy_from_slice(&ncols.to_le_bytes());
        let err = CSTableReader::from_bytes(damaged).unwrap_err();
        assert_eq!(err.code(), "INVALID_FORMAT", "ncols {}", ncols);
    }
}
