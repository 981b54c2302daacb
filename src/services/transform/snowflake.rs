// Snowflake dialect
//
// COPY INTO with in-flight projection, TRY_CAST and VALIDATION_MODE dry runs. Staged
// file columns are addressed positionally.

use super::dialect::{pattern_regex, with_precision, Renderer, SqlDialect};
use super::translator::DialectId;
use crate::error::{IngestError, Result};
use crate::logical_plan::{Copy, DigestColumn};
use crate::models::{
    Capabilities, Capability, DataType, FieldType, FileFormat, LoadOption, StagedFilesDataset,
    StagedFilesProperties,
};

const DEFAULT_ON_ERROR: &str = "ABORT_STATEMENT";

pub struct SnowflakeDialect;

impl SnowflakeDialect {
    fn location(properties: &StagedFilesProperties) -> Result<&str> {
        properties.location.as_deref().ok_or_else(|| {
            IngestError::transform("Snowflake COPY requires a stage location")
        })
    }

    fn file_format(r: &Renderer, format: &FileFormat) -> String {
        match format {
            FileFormat::Named(name) => format!("FILE_FORMAT = (FORMAT_NAME = {})", r.string_literal(name)),
            FileFormat::Csv {
                field_delimiter,
                skip_header,
            } => {
                let mut options = vec!["TYPE = 'CSV'".to_string()];
                if let Some(delimiter) = field_delimiter {
                    options.push(format!("FIELD_DELIMITER = {}", r.string_literal(delimiter)));
                }
                if *skip_header > 0 {
                    options.push(format!("SKIP_HEADER = {}", skip_header));
                }
                format!("FILE_FORMAT = ({})", options.join(", "))
            }
            other => format!("FILE_FORMAT = (TYPE = {})", r.string_literal(other.type_name())),
        }
    }

    fn load_option(r: &Renderer, value: &LoadOption) -> String {
        match value {
            LoadOption::Text(text) => r.string_literal(text),
            LoadOption::Number(n) => n.to_string(),
            LoadOption::Bool(b) => b.to_string().to_uppercase(),
        }
    }

    /// FILES/PATTERN, FILE_FORMAT and load options, in that order.
    fn copy_options(r: &Renderer, properties: &StagedFilesProperties) -> Vec<String> {
        let mut options = Vec::new();
        if !properties.file_paths.is_empty() {
            options.push(format!("FILES = ({})", r.string_list(&properties.file_paths)));
        } else if !properties.file_patterns.is_empty() {
            options.push(format!(
                "PATTERN = {}",
                r.string_literal(&pattern_regex(&properties.file_patterns))
            ));
        }
        options.push(Self::file_format(r, &properties.format));
        for (key, value) in &properties.load_options {
            options.push(format!("{} = {}", key.to_uppercase(), Self::load_option(r, value)));
        }
        if !properties
            .load_options
            .keys()
            .any(|k| k.eq_ignore_ascii_case("ON_ERROR"))
        {
            options.push(format!("ON_ERROR = '{}'", DEFAULT_ON_ERROR));
        }
        options
    }
}

impl SqlDialect for SnowflakeDialect {
    fn id(&self) -> DialectId {
        DialectId::Snowflake
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[
            Capability::DryRun,
            Capability::TransformWhileCopy,
            Capability::SafeCast,
            Capability::ValidationMode,
            Capability::Merge,
        ])
    }

    fn data_type(&self, field_type: &FieldType) -> String {
        match field_type.data_type {
            DataType::Json | DataType::Variant => "VARIANT".to_string(),
            DataType::Text | DataType::String => with_precision("VARCHAR", field_type),
            DataType::DateTime => "DATETIME".to_string(),
            _ => super::dialect::ansi_data_type(field_type),
        }
    }

    fn cast(&self, value: String, field_type: &FieldType, safe: bool) -> Result<String> {
        let function = if safe { "TRY_CAST" } else { "CAST" };
        Ok(format!("{}({} AS {})", function, value, self.data_type(field_type)))
    }

    fn staged_field(
        &self,
        r: &Renderer,
        dataset: Option<&str>,
        index: usize,
        _name: &str,
        field_type: &FieldType,
    ) -> Result<String> {
        let column = match dataset {
            Some(alias) => format!("{}.${}", r.alias(alias), index),
            None => format!("${}", index),
        };
        Ok(if field_type.data_type.is_semi_structured() {
            format!("TO_VARIANT(PARSE_JSON({}))", column)
        } else {
            column
        })
    }

    fn metadata_file_name(&self, _r: &Renderer, _dataset: Option<&str>) -> Result<String> {
        Ok("METADATA$FILENAME".to_string())
    }

    fn metadata_row_number(&self, _r: &Renderer, _dataset: Option<&str>) -> Result<String> {
        Ok("METADATA$FILE_ROW_NUMBER".to_string())
    }

    /// `udf(OBJECT_CONSTRUCT('c1',v1,...))`
    fn digest_udf(&self, r: &Renderer, udf_name: &str, columns: &[DigestColumn]) -> Result<String> {
        let pairs = columns
            .iter()
            .map(|c| Ok(format!("{},{}", r.string_literal(&c.name), r.value(&c.value)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{}(OBJECT_CONSTRUCT({}))", udf_name, pairs.join(",")))
    }

    fn staged_files_source(&self, r: &Renderer, files: &StagedFilesDataset) -> Result<String> {
        let location = Self::location(&files.properties)?;
        Ok(match &files.reference.alias {
            Some(alias) => format!("{} as {}", location, r.alias(alias)),
            None => location.to_string(),
        })
    }

    fn copy(&self, r: &Renderer, copy: &Copy) -> Result<String> {
        let target = r.table(&copy.target, false);
        let mut sql = if copy.validation_mode {
            format!("COPY INTO {} FROM {}", target, Self::location(&copy.properties)?)
        } else {
            format!(
                "COPY INTO {} ({}) FROM ({})",
                target,
                r.values(&copy.fields, ", ")?,
                r.selection(&copy.source)?
            )
        };
        for option in Self::copy_options(r, &copy.properties) {
            sql.push(' ');
            sql.push_str(&option);
        }
        if copy.validation_mode {
            sql.push_str(" VALIDATION_MODE = 'RETURN_ERRORS'");
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::Operation;
    use crate::models::{
        Auditing, BulkLoad, DatasetReference, Dataset, Datasets, DigestGeneration, Field, IngestMode,
        Schema, StagingDataset, Partitioning, TransactionMilestoning, UnitemporalSnapshot,
    };
    use crate::planner::test_support::{datasets, options};
    use crate::planner::{planner_for, Resources, ValidationCategory};
    use crate::services::transform::{TransformOptions, Transformer};
    use chrono::{TimeZone, Utc};

    fn transformer() -> Transformer {
        Transformer::new(
            DialectId::Snowflake,
            TransformOptions::new(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()),
        )
        .unwrap()
    }

    fn bulk_datasets(properties: StagedFilesProperties) -> Datasets {
        let files = StagedFilesDataset::new(
            DatasetReference::new("staged_files"),
            Schema::new(vec![
                Field::new("col_int", DataType::Integer).not_null(),
                Field::new("col_string", DataType::Varchar),
                Field::new("col_variant", DataType::Variant),
            ])
            .unwrap(),
            properties,
        )
        .unwrap();
        Datasets::new(
            Dataset::new(DatasetReference::new("main").with_database("my_db"), Schema::empty()),
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
    fn test_bulk_load_copy() {
        let properties = StagedFilesProperties::files(vec![
            "/path/xyz/file1.csv".to_string(),
            "/path/xyz/file2.csv".to_string(),
        ])
        .with_location("@my_stage");
        let planner = planner_for(
            bulk_datasets(properties),
            bulk_mode(),
            options(),
            SnowflakeDialect.capabilities(),
        )
        .unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        let sql = transformer().generate_physical_plan(&plan).unwrap();
        assert_eq!(
            sql.statements()[0],
            "COPY INTO \"my_db\".\"main\" (\"col_int\", \"col_string\", \"col_variant\", \"digest\", \"batch_id\", \"append_time\") \
             FROM (SELECT staged_files.$1 as \"col_int\",staged_files.$2 as \"col_string\",TO_VARIANT(PARSE_JSON(staged_files.$3)) as \"col_variant\",\
             LAKEHOUSE_MD5(OBJECT_CONSTRUCT('col_int',staged_files.$1,'col_string',staged_files.$2,'col_variant',TO_VARIANT(PARSE_JSON(staged_files.$3)))),\
             (SELECT COALESCE(MAX(batch_metadata.\"table_batch_id\"),0)+1 FROM \"batch_metadata\" as batch_metadata WHERE UPPER(batch_metadata.\"table_name\") = 'MAIN'),\
             '2000-01-01 00:00:00.000000' FROM @my_stage as staged_files) \
             FILES = ('/path/xyz/file1.csv', '/path/xyz/file2.csv') FILE_FORMAT = (TYPE = 'CSV') ON_ERROR = 'ABORT_STATEMENT'"
        );
    }

    #[test]
    fn test_validation_mode_dry_run() {
        let properties = StagedFilesProperties::patterns(vec!["(?i).*xyz.*".to_string()])
            .with_location("@my_stage")
            .with_format(FileFormat::Csv {
                field_delimiter: Some(",".to_string()),
                skip_header: 1,
            })
            .with_load_option("ON_ERROR", LoadOption::Text("CONTINUE".to_string()))
            .with_validation_mode();
        let planner = planner_for(
            bulk_datasets(properties),
            bulk_mode(),
            options(),
            SnowflakeDialect.capabilities(),
        )
        .unwrap();
        let transformer = transformer();

        let pre = transformer
            .generate_physical_plan(&planner.build_logical_plan_for_dry_run_pre_actions().unwrap())
            .unwrap();
        assert_eq!(
            pre.statements(),
            &["CREATE TABLE IF NOT EXISTS \"my_db\".\"main_validation_lp_075605\"\
               (\"col_int\" INTEGER NOT NULL,\"col_string\" VARCHAR,\"col_variant\" VARIANT)"
                .to_string()]
        );

        let sql = transformer
            .generate_physical_plan(&planner.build_logical_plan_for_dry_run().unwrap())
            .unwrap();
        assert_eq!(
            sql.statements(),
            &["COPY INTO \"my_db\".\"main_validation_lp_075605\" FROM @my_stage PATTERN = '(?i).*xyz.*' \
               FILE_FORMAT = (TYPE = 'CSV', FIELD_DELIMITER = ',', SKIP_HEADER = 1) \
               ON_ERROR = 'CONTINUE' VALIDATION_MODE = 'RETURN_ERRORS'"
                .to_string()]
        );

        let cleanup = transformer
            .generate_physical_plan(&planner.build_logical_plan_for_dry_run_post_cleanup().unwrap())
            .unwrap();
        assert_eq!(
            cleanup.statements(),
            &["DROP TABLE IF EXISTS \"my_db\".\"main_validation_lp_075605\"".to_string()]
        );
    }

    #[test]
    fn test_validation_table_dry_run() {
        let properties =
            StagedFilesProperties::files(vec!["/path/xyz/file1.csv".to_string()]).with_location("@my_stage");
        let planner = planner_for(
            bulk_datasets(properties),
            bulk_mode(),
            options(),
            SnowflakeDialect.capabilities(),
        )
        .unwrap();
        let transformer = transformer();

        let pre = transformer
            .generate_physical_plan(&planner.build_logical_plan_for_dry_run_pre_actions().unwrap())
            .unwrap();
        assert_eq!(
            pre.statements()[0],
            "CREATE TABLE IF NOT EXISTS \"my_db\".\"main_validation_lp_075605\"(\"col_int\" VARCHAR,\"col_string\" VARCHAR,\
             \"col_variant\" VARCHAR,\"FILE\" VARCHAR,\"ROW_NUMBER\" BIGINT)"
        );

        let dry_run = transformer
            .generate_physical_plan(&planner.build_logical_plan_for_dry_run().unwrap())
            .unwrap();
        assert_eq!(
            dry_run.statements()[0],
            "DELETE FROM \"my_db\".\"main_validation_lp_075605\" as main_validation_lp_075605"
        );
        assert!(dry_run.statements()[1].contains(
            "FROM (SELECT staged_files.$1 as \"col_int\",staged_files.$2 as \"col_string\",staged_files.$3 as \"col_variant\",\
             METADATA$FILENAME as \"FILE\",METADATA$FILE_ROW_NUMBER as \"ROW_NUMBER\" FROM @my_stage as staged_files)"
        ));

        let checks = planner.build_logical_plans_for_dry_run_validation().unwrap();
        let nulls = transformer
            .generate_physical_plan(&checks[&ValidationCategory::NullValues][0].plan)
            .unwrap();
        assert_eq!(
            nulls.statements()[0],
            "SELECT main_validation_lp_075605.\"col_int\",main_validation_lp_075605.\"col_string\",\
             main_validation_lp_075605.\"col_variant\",main_validation_lp_075605.\"FILE\",main_validation_lp_075605.\"ROW_NUMBER\" \
             FROM \"my_db\".\"main_validation_lp_075605\" as main_validation_lp_075605 \
             WHERE main_validation_lp_075605.\"col_int\" IS NULL LIMIT 20"
        );
        let conversion = &checks[&ValidationCategory::DatatypeConversion];
        assert_eq!(conversion.len(), 1);
        assert_eq!(conversion[0].fields, vec!["col_int".to_string(), "col_variant".to_string()]);
        let cast = transformer.generate_physical_plan(&conversion[0].plan).unwrap();
        assert!(cast.statements()[0].contains(
            "WHERE (NOT (main_validation_lp_075605.\"col_int\" IS NULL)) AND \
             (TRY_CAST(main_validation_lp_075605.\"col_int\" AS INTEGER) IS NULL)"
        ));
    }

    #[test]
    fn test_missing_location_is_a_transform_error() {
        let properties = StagedFilesProperties::files(vec!["/path/xyz/file1.csv".to_string()]);
        let planner = planner_for(
            bulk_datasets(properties),
            bulk_mode(),
            options(),
            SnowflakeDialect.capabilities(),
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
    fn test_merge_renders() {
        let mode = crate::models::NontemporalDelta::new("digest").build().unwrap();
        let planner = planner_for(datasets(), mode, options(), SnowflakeDialect.capabilities()).unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        assert!(matches!(plan.operations()[0], Operation::Merge(_)));
        let sql = transformer().generate_physical_plan(&plan).unwrap();
        assert!(sql.statements()[0].starts_with(
            "MERGE INTO \"mydb\".\"main\" as sink USING \"mydb\".\"staging\" as stage ON (sink.\"id\" = stage.\"id\") AND (sink.\"name\" = stage.\"name\")"
        ));
        assert!(sql.statements()[0].contains("WHEN NOT MATCHED THEN INSERT (\"id\", \"name\", \"amount\", \"biz_date\", \"digest\")"));
    }

    #[test]
    fn test_partitioned_snapshot_renders_like_baseline() {
        let mode = UnitemporalSnapshot::new(
            "digest",
            TransactionMilestoning::batch_id("batch_id_in", "batch_id_out"),
        )
        .with_partitioning(Partitioning::fields(vec!["biz_date".to_string()]))
        .build()
        .unwrap();
        let planner = planner_for(datasets(), mode, options(), SnowflakeDialect.capabilities()).unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        let sql = transformer().generate_physical_plan(&plan).unwrap();
        assert!(sql.statements()[0].starts_with(
            "UPDATE \"mydb\".\"main\" as sink SET sink.\"batch_id_out\" = (SELECT COALESCE(MAX(batch_metadata.\"table_batch_id\"),0)+1"
        ));
        assert!(sql.statements()[0].contains(")-1 WHERE (sink.\"batch_id_out\" = 999999999)"));
    }
}
