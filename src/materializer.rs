//! Record materializer.
//!
//! Rebuilds JSON records from a table by replaying each column's levels.
//! For every leaf column the materializer keeps the chain of subrecord
//! ancestors with their definition levels; a triple's repetition level says
//! which repeated ancestor advanced, which picks the array slot the value
//! lands in.
//!
//! Absent optional fields and empty repeated fields are left out of the
//! output object.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::codec::zigzag_decode;
use crate::column::{ColumnReader, Datum};
use crate::error::{CsTableError, Result};
use crate::schema::{SchemaField, TableSchema};
use crate::table::CSTableReader;
use crate::types::{ColumnEncoding, ColumnType};

#[derive(Debug, Clone)]
struct Ancestor {
    name: String,
    repeated: bool,
    /// Definition level at which this subrecord is present.
    dlevel: u32,
}

struct ColumnState<'a> {
    field_name: String,
    repeated: bool,
    /// Logical type declared by the schema; flat files only store encodings.
    column_type: ColumnType,
    ancestors: Vec<Ancestor>,
    reader: ColumnReader<'a>,
}

pub struct RecordMaterializer<'a> {
    columns: Vec<ColumnState<'a>>,
    remaining: u64,
}

impl<'a> RecordMaterializer<'a> {
    /// Materialize every column of `schema` present in the table.
    pub fn new(schema: &TableSchema, reader: &'a CSTableReader) -> Result<Self> {
        Self::build(schema, reader, None)
    }

    /// Materialize only the named columns (dotted paths).
    pub fn with_columns(
        schema: &TableSchema,
        reader: &'a CSTableReader,
        columns: &[&str],
    ) -> Result<Self> {
        let projection: HashSet<&str> = columns.iter().copied().collect();
        Self::build(schema, reader, Some(&projection))
    }

    fn build(
        schema: &TableSchema,
        reader: &'a CSTableReader,
        projection: Option<&HashSet<&str>>,
    ) -> Result<Self> {
        let mut columns = Vec::new();
        for field in schema.fields() {
            collect_columns("", 0, &[], field, reader, projection, &mut columns)?;
        }
        Ok(Self {
            columns,
            remaining: reader.num_records(),
        })
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Records left to read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn next_record(&mut self) -> Result<Option<Value>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let mut record = Map::new();
        for column in &mut self.columns {
            load_column(column, &mut record)?;
        }
        self.remaining -= 1;
        Ok(Some(Value::Object(record)))
    }

    /// Skip one record. Returns false once all records are read.
    pub fn skip_record(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        for column in &mut self.columns {
            loop {
                column.reader.next()?;
                if !continues_record(&mut column.reader)? {
                    break;
                }
            }
        }
        self.remaining -= 1;
        Ok(true)
    }
}

fn collect_columns<'a>(
    prefix: &str,
    dmax: u32,
    ancestors: &[Ancestor],
    field: &SchemaField,
    reader: &'a CSTableReader,
    projection: Option<&HashSet<&str>>,
    out: &mut Vec<ColumnState<'a>>,
) -> Result<()> {
    let name = format!("{}{}", prefix, field.name);
    let dmax = dmax + field.is_nullable() as u32;

    if let Some(subschema) = field.subschema.as_ref().filter(|_| !field.is_leaf()) {
        let mut chain = ancestors.to_vec();
        chain.push(Ancestor {
            name: field.name.clone(),
            repeated: field.repeated,
            dlevel: dmax,
        });
        let prefix = format!("{}.", name);
        for sub in subschema.fields() {
            collect_columns(&prefix, dmax, &chain, sub, reader, projection, out)?;
        }
        return Ok(());
    }

    let wanted = projection.map_or(true, |p| p.contains(name.as_str()));
    if wanted && reader.has_column(&name) {
        out.push(ColumnState {
            field_name: field.name.clone(),
            repeated: field.repeated,
            column_type: field.column_type,
            ancestors: ancestors.to_vec(),
            reader: reader.column_reader(&name)?,
        });
    }
    Ok(())
}

/// Whether the next triple belongs to the record being read.
fn continues_record(reader: &mut ColumnReader<'_>) -> Result<bool> {
    Ok(matches!(reader.peek_rep_level()?, Some(r) if r > 0))
}

fn load_column(column: &mut ColumnState<'_>, record: &mut Map<String, Value>) -> Result<()> {
    let mut indexes = vec![0usize; column.reader.rlevel_max() as usize];
    loop {
        let (rep_level, def_level, value) = {
            let encoding = column.reader.encoding();
            let entry = column.reader.next()?;
            let value = entry
                .value
                .map(|datum| leaf_json(datum, column.column_type, encoding));
            (entry.rep_level, entry.def_level, value)
        };

        if rep_level > 0 {
            let r = rep_level as usize;
            indexes[r - 1] += 1;
            for idx in indexes.iter_mut().skip(r) {
                *idx = 0;
            }
        }

        match value {
            Some(value) => insert_value(
                record,
                &column.ancestors,
                &indexes,
                &column.field_name,
                column.repeated,
                value,
            )?,
            None => insert_null(record, &column.ancestors, &indexes, def_level)?,
        }

        if !continues_record(&mut column.reader)? {
            return Ok(());
        }
    }
}

/// JSON for a leaf value, reinterpreting integers the file stored as
/// unsigned when the schema declares them signed.
fn leaf_json(datum: Datum<'_>, column_type: ColumnType, encoding: ColumnEncoding) -> Value {
    match (datum, column_type) {
        (Datum::UnsignedInt(raw), ColumnType::SignedInt) => {
            let v = if encoding == ColumnEncoding::UInt64Leb128 {
                zigzag_decode(raw)
            } else {
                raw as i64
            };
            Value::from(v)
        }
        (datum, _) => datum.to_json(),
    }
}

fn shape_error(name: &str) -> CsTableError {
    CsTableError::Runtime(format!("field {} has conflicting shapes", name))
}

/// Walk one ancestor down from `record`, creating the object (or the array
/// slot, for repeated ancestors) when missing.
fn descend<'m>(
    record: &'m mut Map<String, Value>,
    ancestor: &Ancestor,
    indexes: &[usize],
) -> Result<(&'m mut Map<String, Value>, usize)> {
    if ancestor.repeated {
        let target = indexes.first().copied().unwrap_or(0);
        let items = record
            .entry(ancestor.name.clone())
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| shape_error(&ancestor.name))?;
        while items.len() <= target {
            items.push(Value::Object(Map::new()));
        }
        let child = items[target]
            .as_object_mut()
            .ok_or_else(|| shape_error(&ancestor.name))?;
        Ok((child, 1))
    } else {
        let child = record
            .entry(ancestor.name.clone())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| shape_error(&ancestor.name))?;
        Ok((child, 0))
    }
}

fn insert_value(
    record: &mut Map<String, Value>,
    ancestors: &[Ancestor],
    indexes: &[usize],
    field_name: &str,
    repeated: bool,
    value: Value,
) -> Result<()> {
    match ancestors.split_first() {
        Some((ancestor, rest)) => {
            let (child, used) = descend(record, ancestor, indexes)?;
            insert_value(child, rest, &indexes[used..], field_name, repeated, value)
        }
        None if repeated => {
            record
                .entry(field_name.to_owned())
                .or_insert_with(|| Value::Array(Vec::new()))
                .as_array_mut()
                .ok_or_else(|| shape_error(field_name))?
                .push(value);
            Ok(())
        }
        None => {
            record.insert(field_name.to_owned(), value);
            Ok(())
        }
    }
}

/// An absent leaf still materializes every ancestor defined at `def_level`.
fn insert_null(
    record: &mut Map<String, Value>,
    ancestors: &[Ancestor],
    indexes: &[usize],
    def_level: u32,
) -> Result<()> {
    match ancestors.split_first() {
        Some((ancestor, rest)) if ancestor.dlevel <= def_level => {
            let (child, used) = descend(record, ancestor, indexes)?;
            insert_null(child, rest, &indexes[used..], def_level)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_value_paths() {
        let ancestors = vec![
            Ancestor {
                name: "name".into(),
                repeated: true,
                dlevel: 1,
            },
            Ancestor {
                name: "language".into(),
                repeated: true,
                dlevel: 2,
            },
        ];
        let mut record = Map::new();
        insert_value(&mut record, &ancestors, &[0, 0], "code", false, json!("en-us")).unwrap();
        insert_value(&mut record, &ancestors, &[0, 1], "code", false, json!("en")).unwrap();
        insert_null(&mut record, &ancestors, &[1, 0], 1).unwrap();
        insert_value(&mut record, &ancestors, &[2, 0], "code", false, json!("en-gb")).unwrap();

        assert_eq!(
            Value::Object(record),
            json!({"name": [
                {"language": [{"code": "en-us"}, {"code": "en"}]},
                {},
                {"language": [{"code": "en-gb"}]}
            ]})
        );
    }

    #[test]
    fn test_null_below_undefined_ancestor() {
        let ancestors = vec![Ancestor {
            name: "links".into(),
            repeated: false,
            dlevel: 1,
        }];
        let mut record = Map::new();
        insert_null(&mut record, &ancestors, &[0], 0).unwrap();
        assert!(record.is_empty());
        insert_null(&mut record, &ancestors, &[0], 1).unwrap();
        assert_eq!(Value::Object(record), json!({"links": {}}));
    }

    #[test]
    fn test_signed_from_flat_column() {
        let raw = crate::codec::zigzag_encode(-5);
        let v = leaf_json(Datum::UnsignedInt(raw), ColumnType::SignedInt, ColumnEncoding::UInt64Leb128);
        assert_eq!(v, json!(-5));
        let v = leaf_json(Datum::SignedInt(-5), ColumnType::SignedInt, ColumnEncoding::UInt64Leb128);
        assert_eq!(v, json!(-5));
        let v = leaf_json(Datum::UnsignedInt(7), ColumnType::UnsignedInt, ColumnEncoding::UInt64Leb128);
        assert_eq!(v, json!(7));
    }

    #[test]
    fn test_repeated_leaf_appends() {
        let mut record = Map::new();
        insert_value(&mut record, &[], &[0], "tags", true, json!("a")).unwrap();
        insert_value(&mut record, &[], &[1], "tags", true, json!("b")).unwrap();
        assert_eq!(Value::Object(record), json!({"tags": ["a", "b"]}));
    }
}
