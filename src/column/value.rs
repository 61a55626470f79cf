//! Typed column values.

use serde_json::Value;

use crate::types::ColumnType;

/// One value of a leaf column. Strings borrow from the caller on the write
/// side and from the column body on the read side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Datum<'a> {
    Boolean(bool),
    UnsignedInt(u64),
    SignedInt(i64),
    Float(f64),
    String(&'a str),
    /// Microseconds since the Unix epoch.
    DateTime(u64),
}

impl<'a> Datum<'a> {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Datum::Boolean(_) => ColumnType::Boolean,
            Datum::UnsignedInt(_) => ColumnType::UnsignedInt,
            Datum::SignedInt(_) => ColumnType::SignedInt,
            Datum::Float(_) => ColumnType::Float,
            Datum::String(_) => ColumnType::String,
            Datum::DateTime(_) => ColumnType::DateTime,
        }
    }

    /// JSON rendering used by the record materializer. Non-finite floats
    /// have no JSON form and become `null`.
    pub fn to_json(&self) -> Value {
        match *self {
            Datum::Boolean(b) => Value::Bool(b),
            Datum::UnsignedInt(v) | Datum::DateTime(v) => Value::from(v),
            Datum::SignedInt(v) => Value::from(v),
            Datum::Float(v) => serde_json::Number::from_f64(v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Datum::String(s) => Value::String(s.to_owned()),
        }
    }
}

/// One decoded position of a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnEntry<'a> {
    pub rep_level: u32,
    pub def_level: u32,
    /// Present iff `def_level == d_max`.
    pub value: Option<Datum<'a>>,
}

impl ColumnEntry<'_> {
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datum_types() {
        assert_eq!(Datum::Boolean(true).column_type(), ColumnType::Boolean);
        assert_eq!(Datum::String("x").column_type(), ColumnType::String);
        assert_eq!(Datum::DateTime(0).column_type(), ColumnType::DateTime);
    }

    #[test]
    fn test_datum_to_json() {
        assert_eq!(Datum::SignedInt(-4).to_json(), serde_json::json!(-4));
        assert_eq!(Datum::String("a").to_json(), serde_json::json!("a"));
        assert_eq!(Datum::Float(f64::NAN).to_json(), Value::Null);
        assert_eq!(Datum::Float(0.5).to_json(), serde_json::json!(0.5));
    }
}
