// BigQuery dialect
//
// Backtick identifiers, GoogleSQL types and external tables over staged files. Files are
// never transformed while loading, so bulk loads go through an external table.

use super::dialect::{with_precision, Renderer, SqlDialect};
use super::translator::DialectId;
use crate::error::Result;
use crate::logical_plan::{Copy, DigestColumn};
use crate::models::{
    Capabilities, Capability, DataType, Dataset, DatasetKind, FieldType, FileFormat, LoadOption,
    StagedFilesProperties,
};

pub struct BigQueryDialect;

impl BigQueryDialect {
    /// `uris=[...], format='CSV'` plus format and load options
    fn file_options(r: &Renderer, properties: &StagedFilesProperties) -> String {
        let uris: Vec<String> = properties
            .file_paths
            .iter()
            .chain(properties.file_patterns.iter())
            .map(|uri| r.string_literal(uri))
            .collect();
        let mut options = vec![format!("uris=[{}]", uris.join(","))];
        match &properties.format {
            FileFormat::Csv {
                field_delimiter,
                skip_header,
            } => {
                options.push("format='CSV'".to_string());
                if let Some(delimiter) = field_delimiter {
                    options.push(format!("field_delimiter={}", r.string_literal(delimiter)));
                }
                if *skip_header > 0 {
                    options.push(format!("skip_leading_rows={}", skip_header));
                }
            }
            FileFormat::Json => options.push("format='NEWLINE_DELIMITED_JSON'".to_string()),
            other => options.push(format!("format={}", r.string_literal(other.type_name()))),
        }
        for (key, value) in &properties.load_options {
            let value = match value {
                LoadOption::Text(text) => r.string_literal(text),
                LoadOption::Number(n) => n.to_string(),
                LoadOption::Bool(b) => b.to_string(),
            };
            options.push(format!("{}={}", key.to_lowercase(), value));
        }
        options.join(", ")
    }
}

impl SqlDialect for BigQueryDialect {
    fn id(&self) -> DialectId {
        DialectId::BigQuery
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::SafeCast, Capability::Merge])
    }

    fn quote(&self) -> char {
        '`'
    }

    fn data_type(&self, field_type: &FieldType) -> String {
        let name = match field_type.data_type {
            DataType::Int
            | DataType::Integer
            | DataType::BigInt
            | DataType::SmallInt
            | DataType::TinyInt => "INT64",
            DataType::Float | DataType::Double | DataType::Real => "FLOAT64",
            DataType::Decimal | DataType::Numeric => return with_precision("NUMERIC", field_type),
            DataType::Boolean => "BOOL",
            DataType::Char | DataType::Varchar | DataType::String | DataType::Text => {
                return with_precision("STRING", &FieldType { scale: None, ..*field_type })
            }
            DataType::Date => "DATE",
            DataType::Time => "TIME",
            DataType::DateTime | DataType::TimestampNtz => "DATETIME",
            DataType::Timestamp | DataType::TimestampTz => "TIMESTAMP",
            DataType::Binary => "BYTES",
            DataType::Variant | DataType::Json => "JSON",
        };
        name.to_string()
    }

    fn batch_start_timestamp(&self, literal: &str) -> String {
        format!("PARSE_DATETIME('%Y-%m-%d %H:%M:%E6S','{}')", literal)
    }

    fn batch_end_timestamp(&self) -> String {
        "CURRENT_DATETIME()".to_string()
    }

    fn cast(&self, value: String, field_type: &FieldType, safe: bool) -> Result<String> {
        let function = if safe { "SAFE_CAST" } else { "CAST" };
        Ok(format!("{}({} AS {})", function, value, self.data_type(field_type)))
    }

    /// `udf(TO_JSON(STRUCT(v1 as `c1`,...)))`
    fn digest_udf(&self, r: &Renderer, udf_name: &str, columns: &[DigestColumn]) -> Result<String> {
        let fields = columns
            .iter()
            .map(|c| Ok(format!("{} as {}", r.value(&c.value)?, r.ident(&c.name))))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{}(TO_JSON(STRUCT({})))", udf_name, fields.join(",")))
    }

    fn create(&self, r: &Renderer, dataset: &Dataset, if_not_exists: bool) -> Result<String> {
        match &dataset.kind {
            DatasetKind::External(properties) => Ok(format!(
                "CREATE OR REPLACE EXTERNAL TABLE {}({}) OPTIONS ({})",
                r.table(&dataset.reference, false),
                r.column_definitions(dataset).join(","),
                Self::file_options(r, properties)
            )),
            DatasetKind::Table => r.create_table(dataset, if_not_exists),
        }
    }

    /// `LOAD DATA INTO target (columns) FROM FILES (...)`
    fn copy(&self, r: &Renderer, copy: &Copy) -> Result<String> {
        Ok(format!(
            "LOAD DATA INTO {} FROM FILES ({})",
            r.table(&copy.target, false),
            Self::file_options(r, &copy.properties)
        ))
    }

    fn primary_key_suffix(&self) -> &'static str {
        " NOT ENFORCED"
    }

    fn requires_where_clause(&self) -> bool {
        true
    }
}
