//! Column codec and table benchmarks.
//!
//! Methodology:
//! - Codec benchmarks encode/decode in memory, no I/O.
//! - Table benchmarks use `iter_batched` so TempDir setup stays out of the
//!   measurement; `sync` is off to measure formatting, not the disk.
//! - Record benchmarks use the Dremel paper's document shape.
//!
//! Run: cargo bench --bench column_codec

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use cstable::codec::{BitPackDecoder, BitPackEncoder};
use cstable::{
    CSTableReader, CSTableWriter, ColumnEncoding, ColumnType, ColumnWriter, Datum,
    RecordMaterializer, RecordShredder, TableSchema, WriterOptions,
};
use serde_json::{json, Value};
use std::borrow::Cow;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn document_schema() -> TableSchema {
    let mut language = TableSchema::new();
    language.add_string("code", false, false).unwrap();
    language.add_string("country", false, true).unwrap();

    let mut name = TableSchema::new();
    name.add_subrecord("language", language, true, false).unwrap();
    name.add_string("url", false, true).unwrap();

    let mut doc = TableSchema::new();
    doc.add_unsigned_int("doc_id", false, false).unwrap();
    doc.add_subrecord("name", name, true, false).unwrap();
    doc
}

fn make_documents(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "doc_id": i,
                "name": (0..i % 4).map(|k| json!({
                    "language": [{"code": format!("c{}", k), "country": "xx"}],
                    "url": format!("http://{}/{}", i, k),
                })).collect::<Vec<_>>(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_bitpack(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitpack");
    for &max in &[1u32, 255, 65_535] {
        let values: Vec<u32> = (0..100_000u32).map(|i| i % (max + 1)).collect();

        group.bench_with_input(BenchmarkId::new("encode", max), &values, |b, values| {
            b.iter(|| {
                let mut enc = BitPackEncoder::new(max);
                for &v in values {
                    enc.encode(v).unwrap();
                }
                black_box(enc.finish())
            })
        });

        let mut enc = BitPackEncoder::new(max);
        for &v in &values {
            enc.encode(v).unwrap();
        }
        let packed = enc.finish();
        group.bench_with_input(BenchmarkId::new("decode", max), &packed, |b, packed| {
            b.iter(|| {
                let mut dec = BitPackDecoder::new(Cow::Borrowed(packed.as_slice()), max);
                let mut sum = 0u64;
                for _ in 0..values.len() {
                    sum += dec.next().unwrap() as u64;
                }
                black_box(sum)
            })
        });
    }
    group.finish();
}

fn bench_column_writer(c: &mut Criterion) {
    let mut group = c.benchmark_group("column_writer");
    for encoding in [ColumnEncoding::UInt64Leb128, ColumnEncoding::UInt64Plain] {
        group.bench_function(format!("{:?}", encoding), |b| {
            b.iter(|| {
                let mut col = ColumnWriter::new(ColumnType::UnsignedInt, encoding, 1, 1).unwrap();
                for i in 0..50_000u64 {
                    let r = if i % 3 == 0 { 0 } else { 1 };
                    col.add_datum(r, 1, Datum::UnsignedInt(i * 31)).unwrap();
                }
                black_box(col.commit().to_bytes().unwrap())
            })
        });
    }
    group.finish();
}

fn bench_records(c: &mut Criterion) {
    let schema = document_schema();
    let docs = make_documents(5_000);
    let mut group = c.benchmark_group("records");

    for options in [WriterOptions::flat(), WriterOptions::paged()] {
        let options = options.with_sync(false);

        group.bench_function(BenchmarkId::new("shred_commit", format!("{:?}", options.format)), |b| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |dir| {
                    let path = dir.path().join("docs.cst");
                    let mut table = CSTableWriter::create_from_schema(&path, &schema, options).unwrap();
                    let mut shredder = RecordShredder::new(&mut table, &schema);
                    for doc in &docs {
                        shredder.add_record_from_json(doc).unwrap();
                    }
                    black_box(table.commit().unwrap());
                },
                BatchSize::PerIteration,
            )
        });

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docs.cst");
        let mut table = CSTableWriter::create_from_schema(&path, &schema, options).unwrap();
        let mut shredder = RecordShredder::new(&mut table, &schema);
        for doc in &docs {
            shredder.add_record_from_json(doc).unwrap();
        }
        table.commit().unwrap();

        group.bench_function(BenchmarkId::new("materialize", format!("{:?}", options.format)), |b| {
            b.iter(|| {
                let reader = CSTableReader::open(&path).unwrap();
                let mut records = RecordMaterializer::new(&schema, &reader).unwrap();
                let mut n = 0;
                while let Some(record) = records.next_record().unwrap() {
                    black_box(&record);
                    n += 1;
                }
                n
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_bitpack, bench_column_writer, bench_records);
criterion_main!(benches);
