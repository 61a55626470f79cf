//! Table schema.
//!
//! A schema is a tree of named fields. Leaves are typed columns; subrecords
//! carry a nested schema. Flattening the tree gives the leaf columns with
//! their Dremel level bounds:
//!
//! - `r_max` counts the repeated fields on the path,
//! - `d_max` counts the fields on the path that are repeated or optional.

use serde::{Deserialize, Serialize};

use crate::error::{CsTableError, Result};
use crate::types::{ColumnConfig, ColumnEncoding, ColumnType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Leaf encoding; the type's default encoding when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<ColumnEncoding>,
    #[serde(default)]
    pub repeated: bool,
    #[serde(default)]
    pub optional: bool,
    /// Bit-packing bound or max string length, 0 for none.
    #[serde(default)]
    pub max_value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subschema: Option<Box<TableSchema>>,
}

impl SchemaField {
    pub fn is_leaf(&self) -> bool {
        self.column_type != ColumnType::Subrecord
    }

    /// Whether a record may omit this field.
    pub fn is_nullable(&self) -> bool {
        self.repeated || self.optional
    }

    fn leaf_encoding(&self) -> Result<ColumnEncoding> {
        let encoding = match self.encoding {
            Some(enc) => enc,
            None => self.column_type.default_encoding().ok_or_else(|| {
                CsTableError::IllegalArgument(format!("field {} has no encoding", self.name))
            })?,
        };
        if !encoding.supports(self.column_type) {
            return Err(CsTableError::IllegalArgument(format!(
                "field {}: encoding {:?} cannot store {} values",
                self.name,
                encoding,
                self.column_type.as_str()
            )));
        }
        Ok(encoding)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    fields: Vec<SchemaField>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn push(&mut self, field: SchemaField) -> Result<()> {
        if self.field(&field.name).is_some() {
            return Err(CsTableError::IllegalArgument(format!(
                "duplicate field name: {}",
                field.name
            )));
        }
        if field.name.is_empty() || field.name.contains('.') {
            return Err(CsTableError::IllegalArgument(format!(
                "invalid field name: {:?}",
                field.name
            )));
        }
        if field.is_leaf() {
            field.leaf_encoding()?;
        }
        self.fields.push(field);
        Ok(())
    }

    /// Add a leaf column with an explicit encoding.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        column_type: ColumnType,
        encoding: ColumnEncoding,
        repeated: bool,
        optional: bool,
        max_value: u64,
    ) -> Result<()> {
        if column_type == ColumnType::Subrecord {
            return Err(CsTableError::IllegalArgument(
                "use add_subrecord for subrecord fields".into(),
            ));
        }
        self.push(SchemaField {
            name: name.into(),
            column_type,
            encoding: Some(encoding),
            repeated,
            optional,
            max_value,
            subschema: None,
        })
    }

    fn add_default(
        &mut self,
        name: impl Into<String>,
        column_type: ColumnType,
        repeated: bool,
        optional: bool,
    ) -> Result<()> {
        self.push(SchemaField {
            name: name.into(),
            column_type,
            encoding: None,
            repeated,
            optional,
            max_value: 0,
            subschema: None,
        })
    }

    pub fn add_bool(&mut self, name: impl Into<String>, repeated: bool, optional: bool) -> Result<()> {
        self.add_default(name, ColumnType::Boolean, repeated, optional)
    }

    pub fn add_unsigned_int(
        &mut self,
        name: impl Into<String>,
        repeated: bool,
        optional: bool,
    ) -> Result<()> {
        self.add_default(name, ColumnType::UnsignedInt, repeated, optional)
    }

    pub fn add_signed_int(
        &mut self,
        name: impl Into<String>,
        repeated: bool,
        optional: bool,
    ) -> Result<()> {
        self.add_default(name, ColumnType::SignedInt, repeated, optional)
    }

    pub fn add_float(&mut self, name: impl Into<String>, repeated: bool, optional: bool) -> Result<()> {
        self.add_default(name, ColumnType::Float, repeated, optional)
    }

    pub fn add_string(&mut self, name: impl Into<String>, repeated: bool, optional: bool) -> Result<()> {
        self.add_default(name, ColumnType::String, repeated, optional)
    }

    pub fn add_datetime(
        &mut self,
        name: impl Into<String>,
        repeated: bool,
        optional: bool,
    ) -> Result<()> {
        self.add_default(name, ColumnType::DateTime, repeated, optional)
    }

    pub fn add_subrecord(
        &mut self,
        name: impl Into<String>,
        subschema: TableSchema,
        repeated: bool,
        optional: bool,
    ) -> Result<()> {
        self.push(SchemaField {
            name: name.into(),
            column_type: ColumnType::Subrecord,
            encoding: None,
            repeated,
            optional,
            max_value: 0,
            subschema: Some(Box::new(subschema)),
        })
    }

    /// Leaf columns in depth-first order, ids 1..=n.
    pub fn flat_columns(&self) -> Result<Vec<ColumnConfig>> {
        let mut out = Vec::new();
        self.flatten_into("", 0, 0, &mut out)?;
        Ok(out)
    }

    fn flatten_into(
        &self,
        prefix: &str,
        r_max: u32,
        d_max: u32,
        out: &mut Vec<ColumnConfig>,
    ) -> Result<()> {
        for field in &self.fields {
            let name = format!("{}{}", prefix, field.name);
            let r = r_max + field.repeated as u32;
            let d = d_max + field.is_nullable() as u32;

            if field.is_leaf() {
                let id = out.len() as u32 + 1;
                out.push(
                    ColumnConfig::new(id, name, field.column_type, field.leaf_encoding()?, r, d)
                        .with_max_value(field.max_value),
                );
                continue;
            }

            let subschema = field.subschema.as_ref().ok_or_else(|| {
                CsTableError::IllegalArgument(format!("subrecord {} has no schema", name))
            })?;
            subschema.flatten_into(&format!("{}.", name), r, d, out)?;
        }
        Ok(())
    }
}
