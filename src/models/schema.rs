// Table shape model
//
// Fields, their types and the ordered schema of a dataset.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{IngestError, Result};

/// Primitive column types plus the semi-structured kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Int,
    Integer,
    BigInt,
    SmallInt,
    TinyInt,
    Float,
    Double,
    Real,
    Decimal,
    Numeric,
    Boolean,
    Char,
    Varchar,
    String,
    Text,
    Date,
    Time,
    DateTime,
    Timestamp,
    TimestampNtz,
    TimestampTz,
    Binary,
    Variant,
    Json,
}

impl DataType {
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            DataType::Char | DataType::Varchar | DataType::String | DataType::Text
        )
    }

    pub fn is_semi_structured(&self) -> bool {
        matches!(self, DataType::Variant | DataType::Json)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    pub data_type: DataType,
    pub length: Option<u32>,
    pub scale: Option<u32>,
}

impl FieldType {
    pub fn of(data_type: DataType) -> Self {
        Self {
            data_type,
            length: None,
            scale: None,
        }
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// A single column of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl Field {
    /// Create a nullable, non-key field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::of(data_type),
            nullable: true,
            primary_key: false,
        }
    }

    /// Mark the field as part of the primary key. Key fields are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.field_type = self.field_type.with_length(length);
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.field_type = self.field_type.with_scale(scale);
        self
    }

    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn without_primary_key(mut self) -> Self {
        self.primary_key = false;
        self
    }

    pub fn data_type(&self) -> DataType {
        self.field_type.data_type
    }
}

/// Ordered sequence of fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting duplicate names and nullable key fields.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(IngestError::configuration(format!(
                    "Duplicate field '{}' in schema",
                    field.name
                )));
            }
            if field.primary_key && field.nullable {
                return Err(IngestError::configuration(format!(
                    "Primary key field '{}' cannot be nullable",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Internal constructor for schemas derived from already-validated ones.
    pub(crate) fn derived(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn primary_keys(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_is_not_nullable() {
        let field = Field::new("id", DataType::Integer).primary_key();
        assert!(field.primary_key);
        assert!(!field.nullable);
    }

    #[test]
    fn test_schema_rejects_nullable_primary_key() {
        let mut field = Field::new("id", DataType::Integer).primary_key();
        field.nullable = true;
        let result = Schema::new(vec![field]);
        assert!(matches!(result, Err(IngestError::Configuration(_))));
    }

    #[test]
    fn test_schema_rejects_duplicate_fields() {
        let result = Schema::new(vec![
            Field::new("id", DataType::Integer),
            Field::new("id", DataType::Varchar),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_lookups() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Integer).primary_key(),
            Field::new("name", DataType::Varchar).primary_key(),
            Field::new("amount", DataType::Double),
        ])
        .unwrap();

        assert_eq!(schema.primary_keys(), vec!["id", "name"]);
        assert!(schema.contains("amount"));
        assert!(!schema.contains("digest"));
        assert_eq!(schema.field_names().len(), 3);
    }

    #[test]
    fn test_string_types() {
        assert!(DataType::Varchar.is_string());
        assert!(DataType::Text.is_string());
        assert!(!DataType::Integer.is_string());
        assert!(DataType::Variant.is_semi_structured());
    }
}
