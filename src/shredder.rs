//! Record shredder.
//!
//! Walks one nested record against the table schema and emits a
//! `(rep_level, def_level, value)` triple per leaf occurrence:
//!
//! - entering a repeated or optional field raises the definition level by one,
//! - entering a repeated field raises the repetition bound by one; its first
//!   occurrence keeps the parent's repetition level and every further
//!   occurrence uses the raised bound,
//! - an absent field writes a null with the parent's levels to every leaf
//!   below it; an absent required field is an error.
//!
//! A record's triples are buffered and validated against the column writers
//! before any of them is written, so a rejected record leaves the table
//! untouched.

use serde_json::{Map, Value};

use crate::column::Datum;
use crate::error::{CsTableError, Result};
use crate::schema::{SchemaField, TableSchema};
use crate::table::CSTableWriter;
use crate::types::ColumnType;

#[derive(Debug, Clone, PartialEq)]
struct PendingTriple<'r> {
    column: String,
    rep_level: u32,
    def_level: u32,
    value: Option<Datum<'r>>,
}

pub struct RecordShredder<'a> {
    writer: &'a mut CSTableWriter,
    schema: &'a TableSchema,
}

impl<'a> RecordShredder<'a> {
    pub fn new(writer: &'a mut CSTableWriter, schema: &'a TableSchema) -> Self {
        Self { writer, schema }
    }

    pub fn num_rows(&self) -> u64 {
        self.writer.num_rows()
    }

    /// Shred one JSON object. `null` and missing keys are absent values;
    /// repeated fields take arrays.
    pub fn add_record_from_json(&mut self, record: &Value) -> Result<()> {
        let object = record.as_object().ok_or_else(|| {
            CsTableError::IllegalArgument("record must be a JSON object".into())
        })?;
        let mut pending = Vec::new();
        shred_fields(0, 0, 0, object, "", self.schema, &mut pending)?;
        self.flush(pending)
    }

    /// Shred one flat row whose values line up with `header`. Empty, `null`
    /// and `NULL` values are absent; trailing values may be left off.
    /// Schema columns missing from the header are written as absent.
    pub fn add_row_from_strings<S: AsRef<str>>(&mut self, header: &[S], row: &[S]) -> Result<()> {
        if row.len() > header.len() {
            return Err(CsTableError::IllegalArgument(format!(
                "row has {} values, header has {} columns",
                row.len(),
                header.len()
            )));
        }
        if let Some(col) = self.writer.columns().find(|c| c.rlevel_max > 0) {
            return Err(CsTableError::IllegalArgument(format!(
                "repeated column {} cannot be read from flat rows",
                col.column_name
            )));
        }

        let mut pending = Vec::new();
        for (i, name) in header.iter().enumerate() {
            let name = name.as_ref();
            if header[..i].iter().any(|h| h.as_ref() == name) {
                return Err(CsTableError::IllegalArgument(format!(
                    "duplicate header column: {}",
                    name
                )));
            }
            let config = self.writer.column_config(name)?;
            let raw = row.get(i).map(AsRef::as_ref).unwrap_or("");
            let value = if is_null(raw) {
                if config.dlevel_max == 0 {
                    return Err(CsTableError::IllegalArgument(format!(
                        "missing value for required column: {}",
                        name
                    )));
                }
                None
            } else {
                Some(parse_datum(raw, config.logical_type, name)?)
            };
            pending.push(PendingTriple {
                column: name.to_owned(),
                rep_level: 0,
                def_level: if value.is_some() { config.dlevel_max } else { 0 },
                value,
            });
        }

        for config in self.writer.columns() {
            if header.iter().any(|h| h.as_ref() == config.column_name) {
                continue;
            }
            if config.dlevel_max == 0 {
                return Err(CsTableError::IllegalArgument(format!(
                    "missing required column: {}",
                    config.column_name
                )));
            }
            pending.push(PendingTriple {
                column: config.column_name.clone(),
                rep_level: 0,
                def_level: 0,
                value: None,
            });
        }

        self.flush(pending)
    }

    fn flush(&mut self, pending: Vec<PendingTriple<'_>>) -> Result<()> {
        // Step 1: Validate every triple; nothing has been written yet.
        for t in &pending {
            self.writer
                .column(&t.column)?
                .check(t.rep_level, t.def_level, t.value)?;
        }

        // Step 2: Write.
        for t in pending {
            self.writer
                .column_writer(&t.column)?
                .add(t.rep_level, t.def_level, t.value)?;
        }
        self.writer.add_row();
        Ok(())
    }
}

fn shred_fields<'r>(
    r: u32,
    rmax: u32,
    d: u32,
    object: &'r Map<String, Value>,
    prefix: &str,
    schema: &TableSchema,
    out: &mut Vec<PendingTriple<'r>>,
) -> Result<()> {
    for field in schema.fields() {
        shred_field(r, rmax, d, object.get(&field.name), prefix, field, out)?;
    }
    Ok(())
}

fn shred_field<'r>(
    r: u32,
    rmax: u32,
    d: u32,
    value: Option<&'r Value>,
    prefix: &str,
    field: &SchemaField,
    out: &mut Vec<PendingTriple<'r>>,
) -> Result<()> {
    let column = format!("{}{}", prefix, field.name);
    let rmax = rmax + field.repeated as u32;
    let next_d = d + field.is_nullable() as u32;

    let occurrences: Vec<&'r Value> = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) if field.repeated => {
            items.iter().filter(|v| !v.is_null()).collect()
        }
        Some(_) if field.repeated => {
            return Err(CsTableError::IllegalArgument(format!(
                "repeated field {} must be an array",
                column
            )));
        }
        Some(v) => vec![v],
    };

    if occurrences.is_empty() {
        if !field.is_nullable() {
            return Err(CsTableError::IllegalArgument(format!("missing field: {}", column)));
        }
        push_nulls(r, d, &column, field, out)?;
        return Ok(());
    }

    let mut next_r = r;
    for occurrence in occurrences {
        match &field.subschema {
            Some(subschema) if !field.is_leaf() => {
                let object = occurrence.as_object().ok_or_else(|| {
                    CsTableError::IllegalArgument(format!("field {} must be an object", column))
                })?;
                let prefix = format!("{}.", column);
                shred_fields(next_r, rmax, next_d, object, &prefix, subschema, out)?;
            }
            _ => out.push(PendingTriple {
                column: column.clone(),
                rep_level: next_r,
                def_level: next_d,
                value: Some(json_datum(occurrence, field.column_type, &column)?),
            }),
        }
        next_r = rmax;
    }
    Ok(())
}

fn push_nulls(
    r: u32,
    d: u32,
    column: &str,
    field: &SchemaField,
    out: &mut Vec<PendingTriple<'_>>,
) -> Result<()> {
    if field.is_leaf() {
        out.push(PendingTriple {
            column: column.to_owned(),
            rep_level: r,
            def_level: d,
            value: None,
        });
        return Ok(());
    }
    let subschema = field.subschema.as_ref().ok_or_else(|| {
        CsTableError::IllegalArgument(format!("subrecord {} has no schema", column))
    })?;
    for sub in subschema.fields() {
        push_nulls(r, d, &format!("{}.{}", column, sub.name), sub, out)?;
    }
    Ok(())
}

fn json_datum<'r>(value: &'r Value, ty: ColumnType, column: &str) -> Result<Datum<'r>> {
    let datum = match ty {
        ColumnType::Boolean => value.as_bool().map(Datum::Boolean),
        ColumnType::UnsignedInt => value.as_u64().map(Datum::UnsignedInt),
        ColumnType::SignedInt => value.as_i64().map(Datum::SignedInt),
        ColumnType::Float => value.as_f64().map(Datum::Float),
        ColumnType::String => value.as_str().map(Datum::String),
        ColumnType::DateTime => value.as_u64().map(Datum::DateTime),
        ColumnType::Subrecord => None,
    };
    datum.ok_or_else(|| {
        CsTableError::IllegalArgument(format!(
            "field {}: expected {}, got {}",
            column,
            ty.as_str(),
            value
        ))
    })
}

fn is_null(raw: &str) -> bool {
    raw.is_empty() || raw == "null" || raw == "NULL"
}

fn parse_datum<'r>(raw: &'r str, ty: ColumnType, column: &str) -> Result<Datum<'r>> {
    let cannot = || {
        CsTableError::IllegalArgument(format!(
            "column {}: can't convert '{}' to {}",
            column,
            raw,
            ty.as_str()
        ))
    };
    Ok(match ty {
        ColumnType::String => Datum::String(raw),
        ColumnType::UnsignedInt => Datum::UnsignedInt(raw.trim().parse().map_err(|_| cannot())?),
        ColumnType::SignedInt => Datum::SignedInt(raw.trim().parse().map_err(|_| cannot())?),
        ColumnType::Float => Datum::Float(raw.trim().parse().map_err(|_| cannot())?),
        ColumnType::DateTime => Datum::DateTime(raw.trim().parse().map_err(|_| cannot())?),
        ColumnType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Datum::Boolean(true),
            "false" | "0" | "no" => Datum::Boolean(false),
            _ => return Err(cannot()),
        },
        ColumnType::Subrecord => return Err(cannot()),
    })
}
