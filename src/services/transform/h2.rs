// H2 dialect
//
// In-process database used by local tests. Loads a single CSV file with CSVREAD and
// converts each column on the way in.

use super::dialect::{ansi_data_type, with_precision, Renderer, SqlDialect};
use super::translator::DialectId;
use crate::error::{IngestError, Result};
use crate::logical_plan::{Copy, DigestColumn, FunctionName, Source, Value};
use crate::models::{Capabilities, Capability, DataType, FieldType, FileFormat};

pub struct H2Dialect;

impl H2Dialect {
    fn single_file(copy: &Copy) -> Result<&str> {
        match copy.properties.file_paths.as_slice() {
            [path] if copy.properties.file_patterns.is_empty() => Ok(path),
            _ => Err(IngestError::transform(format!(
                "H2 loads exactly one file path into '{}'",
                copy.target.name
            ))),
        }
    }

    /// Staged file names resolve to the one file being read.
    fn bind_file_name(value: &Value, file: &str) -> Value {
        match value {
            Value::MetadataFileName { .. } => Value::String(file.to_string()),
            Value::Aliased { value, alias } => Value::Aliased {
                value: Box::new(Self::bind_file_name(value, file)),
                alias: alias.clone(),
            },
            other => other.clone(),
        }
    }

    fn csv_options(r: &Renderer, format: &FileFormat) -> Result<String> {
        match format {
            FileFormat::Csv {
                field_delimiter: Some(delimiter),
                ..
            } => Ok(r.string_literal(&format!("fieldSeparator={}", delimiter))),
            FileFormat::Csv { .. } => Ok("NULL".to_string()),
            other => Err(IngestError::transform(format!(
                "H2 cannot read {} files",
                other.type_name()
            ))),
        }
    }
}

impl SqlDialect for H2Dialect {
    fn id(&self) -> DialectId {
        DialectId::H2
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::DryRun, Capability::TransformWhileCopy])
    }

    fn data_type(&self, field_type: &FieldType) -> String {
        match field_type.data_type {
            DataType::Json | DataType::Variant => "JSON".to_string(),
            DataType::DateTime | DataType::TimestampNtz => "TIMESTAMP".to_string(),
            DataType::TimestampTz => "TIMESTAMP WITH TIME ZONE".to_string(),
            DataType::String | DataType::Text => with_precision("VARCHAR", field_type),
            _ => ansi_data_type(field_type),
        }
    }

    fn function(&self, name: FunctionName, args: Vec<String>) -> String {
        match name {
            FunctionName::ParseJson => format!("{} FORMAT JSON", args.join(",")),
            _ => format!("{}({})", name.as_str(), args.join(",")),
        }
    }

    /// `CONVERT("column",TYPE)` over the CSVREAD column of the same name
    fn staged_field(
        &self,
        r: &Renderer,
        _dataset: Option<&str>,
        _index: usize,
        name: &str,
        field_type: &FieldType,
    ) -> Result<String> {
        Ok(format!("CONVERT({},{})", r.ident(name), self.data_type(field_type)))
    }

    fn metadata_row_number(&self, _r: &Renderer, _dataset: Option<&str>) -> Result<String> {
        Ok("ROWNUM()".to_string())
    }

    /// Staged columns are hashed as read, before conversion.
    fn digest_udf(&self, r: &Renderer, udf_name: &str, columns: &[DigestColumn]) -> Result<String> {
        let names: Vec<String> = columns.iter().map(|c| r.string_literal(&c.name)).collect();
        let values = columns
            .iter()
            .map(|c| match &c.value {
                Value::StagedFilesField { name, .. } => Ok(format!("CONVERT({},VARCHAR)", r.ident(name))),
                other => r.value(other),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "{}(ARRAY[{}],ARRAY[{}])",
            udf_name,
            names.join(","),
            values.join(",")
        ))
    }

    /// `INSERT INTO target (columns) SELECT values FROM CSVREAD('file','c1,c2',options)`
    fn copy(&self, r: &Renderer, copy: &Copy) -> Result<String> {
        if copy.validation_mode {
            return Err(IngestError::transform("H2 has no validation mode"));
        }
        let file = Self::single_file(copy)?;
        let values: Vec<Value> = copy
            .source
            .fields
            .iter()
            .map(|v| Self::bind_file_name(v, file))
            .collect();
        let columns: Vec<String> = match &copy.source.source {
            Some(Source::StagedFiles(files)) => files
                .schema
                .field_names()
                .into_iter()
                .map(|n| r.options().case_conversion.apply(&n))
                .collect(),
            _ => Vec::new(),
        };
        Ok(format!(
            "INSERT INTO {} ({}) SELECT {} FROM CSVREAD({},{},{})",
            r.table(&copy.target, false),
            r.values(&copy.fields, ", ")?,
            r.values(&values, ",")?,
            r.string_literal(file),
            r.string_literal(&columns.join(",")),
            Self::csv_options(r, &copy.properties.format)?
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Auditing, BulkLoad, Dataset, DatasetReference, Datasets, DigestGeneration, Field, IngestMode,
        Schema, StagedFilesDataset, StagedFilesProperties, StagingDataset,
    };
    use crate::planner::test_support::options;
    use crate::planner::{planner_for, Resources, ValidationCategory};
    use crate::services::transform::{TransformOptions, Transformer};
    use chrono::{TimeZone, Utc};

    fn transformer() -> Transformer {
        Transformer::new(
            DialectId::H2,
            TransformOptions::new(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
                .with_batch_id_pattern("{NEXT_BATCH_ID_PATTERN}"),
        )
        .unwrap()
    }

    fn bulk_datasets(paths: Vec<String>) -> Datasets {
        staged_datasets(StagedFilesProperties::files(paths))
    }

    fn staged_datasets(properties: StagedFilesProperties) -> Datasets {
        let files = StagedFilesDataset::new(
            DatasetReference::new("staged_files"),
            Schema::new(vec![
                Field::new("col_int", DataType::Integer).not_null(),
                Field::new("col_string", DataType::Varchar),
            ])
            .unwrap(),
            properties,
        )
        .unwrap();
        Datasets::new(
            Dataset::new(DatasetReference::new("main").with_group("TEST_DB"), Schema::empty()),
            StagingDataset::StagedFiles(files),
        )
    }

    fn bulk_mode() -> IngestMode {
        BulkLoad::new("batch_id")
            .with_digest_generation(DigestGeneration::Udf {
                udf_name: "LAKEHOUSE_MD5".to_string(),
                digest_field: "digest".to_string(),
            })
            .with_auditing(Auditing::date_time("append_time"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_csvread_load() {
        let planner = planner_for(
            bulk_datasets(vec!["/tmp/data/input.csv".to_string()]),
            bulk_mode(),
            options(),
            H2Dialect.capabilities(),
        )
        .unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        let sql = transformer().generate_physical_plan(&plan).unwrap();
        assert_eq!(
            sql.statements()[0],
            "INSERT INTO \"TEST_DB\".\"main\" (\"col_int\", \"col_string\", \"digest\", \"batch_id\", \"append_time\") \
             SELECT CONVERT(\"col_int\",INTEGER) as \"col_int\",CONVERT(\"col_string\",VARCHAR) as \"col_string\",\
             LAKEHOUSE_MD5(ARRAY['col_int','col_string'],ARRAY[CONVERT(\"col_int\",VARCHAR),CONVERT(\"col_string\",VARCHAR)]),\
             {NEXT_BATCH_ID_PATTERN},'2000-01-01 00:00:00.000000' \
             FROM CSVREAD('/tmp/data/input.csv','col_int,col_string',NULL)"
        );
    }

    #[test]
    fn test_validation_table_load() {
        let planner = planner_for(
            bulk_datasets(vec!["/tmp/data/input.csv".to_string()]),
            bulk_mode(),
            options(),
            H2Dialect.capabilities(),
        )
        .unwrap();
        let transformer = transformer();
        let dry_run = transformer
            .generate_physical_plan(&planner.build_logical_plan_for_dry_run().unwrap())
            .unwrap();
        assert_eq!(
            dry_run.statements()[1],
            "INSERT INTO \"TEST_DB\".\"main_validation_lp_075605\" (\"col_int\", \"col_string\", \"FILE\", \"ROW_NUMBER\") \
             SELECT CONVERT(\"col_int\",VARCHAR) as \"col_int\",CONVERT(\"col_string\",VARCHAR) as \"col_string\",\
             '/tmp/data/input.csv' as \"FILE\",ROWNUM() as \"ROW_NUMBER\" \
             FROM CSVREAD('/tmp/data/input.csv','col_int,col_string',NULL)"
        );

        let checks = planner.build_logical_plans_for_dry_run_validation().unwrap();
        let conversion = &checks[&ValidationCategory::DatatypeConversion];
        assert_eq!(conversion.len(), 1);
        assert_eq!(conversion[0].fields, vec!["col_int".to_string()]);
        let sql = transformer.generate_physical_plan(&conversion[0].plan).unwrap();
        assert!(sql.statements()[0]
            .contains("(CAST(main_validation_lp_075605.\"col_int\" AS INTEGER) IS NULL)"));
    }

    #[test]
    fn test_validation_mode_files_use_validation_table() {
        let properties =
            StagedFilesProperties::files(vec!["/tmp/data/input.csv".to_string()]).with_validation_mode();
        let planner = planner_for(
            staged_datasets(properties),
            bulk_mode(),
            options(),
            H2Dialect.capabilities(),
        )
        .unwrap();
        let dry_run = transformer()
            .generate_physical_plan(&planner.build_logical_plan_for_dry_run().unwrap())
            .unwrap();
        assert_eq!(dry_run.len(), 2);
        assert_eq!(
            dry_run.statements()[0],
            "DELETE FROM \"TEST_DB\".\"main_validation_lp_075605\" as main_validation_lp_075605"
        );
        assert!(dry_run.statements()[1].starts_with("INSERT INTO \"TEST_DB\".\"main_validation_lp_075605\""));
        assert!(dry_run.statements()[1].ends_with("FROM CSVREAD('/tmp/data/input.csv','col_int,col_string',NULL)"));
        assert!(!planner.build_logical_plans_for_dry_run_validation().unwrap().is_empty());
    }

    #[test]
    fn test_multiple_files_rejected() {
        let planner = planner_for(
            bulk_datasets(vec!["/tmp/a.csv".to_string(), "/tmp/b.csv".to_string()]),
            bulk_mode(),
            options(),
            H2Dialect.capabilities(),
        )
        .unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        assert!(matches!(
            transformer().generate_physical_plan(&plan),
            Err(IngestError::Transform(_))
        ));
    }

    #[test]
    fn test_parse_json_function() {
        assert_eq!(
            H2Dialect.function(FunctionName::ParseJson, vec!["\"payload\"".to_string()]),
            "\"payload\" FORMAT JSON"
        );
    }
}
