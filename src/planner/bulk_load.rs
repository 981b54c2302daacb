// Bulk load planner
//
// Loads staged files into an append-only main table, deriving digest, batch id and audit
// columns on the way. With dry-run support the files can be validated first.

use std::collections::BTreeMap;
use tracing::debug;

use super::context::PlanContext;
use super::statistics;
use super::{Planner, Resources, StatisticName, ValidationCategory, ValidationPlans, ValidationQuery};
use crate::error::{IngestError, Result};
use crate::logical_plan::{
    Condition, Copy, DigestColumn, LogicalPlan, Operation, Selection, Source, Value,
};
use crate::models::{
    Capability, DataType, Dataset, DatasetReference, DigestGeneration, Field, FieldType,
    IngestMode, Schema, StagedFilesDataset,
};

pub const FILE_FIELD: &str = "FILE";
pub const ROW_NUMBER_FIELD: &str = "ROW_NUMBER";

pub struct BulkLoadPlanner {
    ctx: PlanContext,
    files: StagedFilesDataset,
    /// Table over the staged files, when the dialect cannot transform while copying.
    external: Option<Dataset>,
    validation: Dataset,
    /// Dry runs use the warehouse's own validation instead of loading the validation table.
    validation_mode: bool,
}

impl BulkLoadPlanner {
    pub fn new(ctx: PlanContext) -> Result<Self> {
        let files = ctx.staged_files()?.clone();
        let suffix = ctx.run_suffix();
        let main = &ctx.main.reference;

        let external = if ctx.capabilities.contains(Capability::TransformWhileCopy) {
            None
        } else {
            let reference = main
                .sibling(format!("{}_temp_lp_{}", main.name, suffix))
                .with_alias(files.reference.alias.clone().unwrap_or_default());
            Some(Dataset::external(
                reference,
                files.schema.clone(),
                files.properties.clone(),
            ))
        };

        let validation_mode = ctx.capabilities.contains(Capability::DryRun)
            && ctx.capabilities.contains(Capability::ValidationMode)
            && files.properties.validation_mode_supported;
        let validation_name = format!("{}_validation_lp_{}", main.name, suffix);
        let validation_reference = main.sibling(validation_name.clone()).with_alias(validation_name);
        let validation = if validation_mode {
            Dataset::new(validation_reference, files.schema.clone())
        } else {
            Self::validation_table(validation_reference, &files)
        };

        Ok(Self {
            ctx,
            files,
            external,
            validation,
            validation_mode,
        })
    }

    /// Every file column as raw text, plus the source file and row number.
    fn validation_table(reference: DatasetReference, files: &StagedFilesDataset) -> Dataset {
        let mut validation_fields: Vec<Field> = files
            .schema
            .fields()
            .iter()
            .map(|f| Field::new(f.name.clone(), DataType::Varchar))
            .collect();
        validation_fields.push(Field::new(FILE_FIELD, DataType::Varchar));
        validation_fields.push(Field::new(ROW_NUMBER_FIELD, DataType::BigInt));
        Dataset::new(reference, Schema::derived(validation_fields))
    }

    fn mode(&self) -> Result<&crate::models::BulkLoad> {
        match &self.ctx.mode {
            IngestMode::BulkLoad(m) => Ok(m),
            other => Err(IngestError::configuration(format!(
                "{} is not a bulk load",
                other.name()
            ))),
        }
    }

    fn file_fields(&self) -> &[Field] {
        self.files.schema.fields()
    }

    fn staged_value(&self, index: usize, field: &Field) -> Value {
        Value::StagedFilesField {
            dataset: self.files.reference.alias.clone(),
            index: index + 1,
            name: field.name.clone(),
            field_type: field.field_type,
        }
    }

    /// Target columns and values: file columns, then digest, batch id and audit time.
    fn load_columns(&self, file_values: Vec<Value>) -> Result<(Vec<Value>, Vec<Value>)> {
        let mode = self.mode()?;
        let mut fields: Vec<Value> = self
            .file_fields()
            .iter()
            .map(|f| Value::unqualified(f.name.clone()))
            .collect();

        let mut values: Vec<Value> = self
            .file_fields()
            .iter()
            .zip(file_values.iter())
            .map(|(f, v)| match v {
                Value::StagedFilesField { .. } => v.clone().alias(f.name.clone()),
                other => other.clone(),
            })
            .collect();

        if let DigestGeneration::Udf {
            udf_name,
            digest_field,
        } = &mode.digest_generation
        {
            let columns = self
                .file_fields()
                .iter()
                .zip(file_values.into_iter())
                .map(|(f, value)| DigestColumn {
                    name: f.name.clone(),
                    value,
                    field_type: f.field_type,
                })
                .collect();
            fields.push(Value::unqualified(digest_field.clone()));
            values.push(Value::DigestUdf {
                udf_name: udf_name.clone(),
                columns,
            });
        }

        fields.push(Value::unqualified(mode.batch_id_field.clone()));
        values.push(self.ctx.batch_id());

        if let Some(audit) = mode.auditing.field() {
            fields.push(Value::unqualified(audit));
            values.push(Value::BatchStartTimestamp);
        }
        Ok((fields, values))
    }

    fn dry_run_supported(&self) -> bool {
        self.ctx.capabilities.contains(Capability::DryRun)
    }

    fn uses_validation_table(&self) -> bool {
        self.dry_run_supported() && !self.validation_mode
    }

    fn validation_columns(&self) -> Vec<Value> {
        let alias = self.validation.alias();
        self.validation
            .schema
            .fields()
            .iter()
            .map(|f| Value::field(alias, f.name.clone()))
            .collect()
    }

    fn validation_query(&self, condition: Condition) -> LogicalPlan {
        Selection::from(Source::Dataset(self.validation.reference.clone()))
            .fields(self.validation_columns())
            .filter(condition)
            .limit(self.ctx.options.sample_row_count)
            .into()
    }
}

impl Planner for BulkLoadPlanner {
    fn context(&self) -> &PlanContext {
        &self.ctx
    }

    fn build_logical_plan_for_ingest(&self, _resources: &Resources) -> Result<LogicalPlan> {
        let target = self.ctx.main.reference.clone().without_alias();
        match &self.external {
            None => {
                debug!("planning bulk load as a transforming copy");
                let file_values = self
                    .file_fields()
                    .iter()
                    .enumerate()
                    .map(|(i, f)| self.staged_value(i, f))
                    .collect();
                let (fields, values) = self.load_columns(file_values)?;
                Ok(Operation::Copy(Copy {
                    target,
                    fields,
                    source: Selection::from(Source::StagedFiles(self.files.clone())).fields(values),
                    properties: self.files.properties.clone(),
                    validation_mode: false,
                })
                .into())
            }
            Some(external) => {
                let file_values = self
                    .file_fields()
                    .iter()
                    .map(|f| Value::field_of(external, f.name.clone()))
                    .collect();
                let (fields, values) = self.load_columns(file_values)?;
                Ok(Operation::Insert {
                    target,
                    fields,
                    source: Selection::from(Source::Dataset(external.reference.clone())).fields(values),
                }
                .into())
            }
        }
    }

    fn build_logical_plan_for_pre_actions(&self) -> Result<LogicalPlan> {
        let mut operations = vec![
            Operation::create(self.ctx.main.clone()),
            Operation::create(self.ctx.metadata.to_dataset()),
        ];
        if self.ctx.options.enable_concurrent_safety {
            operations.push(Operation::create(self.ctx.lock.to_dataset()));
        }
        if let Some(external) = &self.external {
            operations.push(Operation::create(external.clone()));
        }
        Ok(LogicalPlan::of(operations))
    }

    fn build_logical_plan_for_post_cleanup(&self) -> Result<LogicalPlan> {
        Ok(match &self.external {
            Some(external) => Operation::drop(external.reference.clone()).into(),
            None => LogicalPlan::empty(),
        })
    }

    fn build_logical_plan_for_dry_run_pre_actions(&self) -> Result<LogicalPlan> {
        if !self.dry_run_supported() {
            return Ok(LogicalPlan::empty());
        }
        Ok(Operation::create(self.validation.clone()).into())
    }

    fn build_logical_plan_for_dry_run(&self) -> Result<LogicalPlan> {
        if !self.dry_run_supported() {
            return Ok(LogicalPlan::empty());
        }
        let raw = FieldType::of(DataType::Varchar);
        let staged: Vec<Value> = self
            .file_fields()
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let field_type = if self.uses_validation_table() { raw } else { f.field_type };
                Value::StagedFilesField {
                    dataset: self.files.reference.alias.clone(),
                    index: i + 1,
                    name: f.name.clone(),
                    field_type,
                }
                .alias(f.name.clone())
            })
            .collect();
        let file_columns: Vec<Value> = self
            .file_fields()
            .iter()
            .map(|f| Value::unqualified(f.name.clone()))
            .collect();

        if !self.uses_validation_table() {
            return Ok(Operation::Copy(Copy {
                target: self.validation.reference.clone().without_alias(),
                fields: file_columns,
                source: Selection::from(Source::StagedFiles(self.files.clone())).fields(staged),
                properties: self.files.properties.clone(),
                validation_mode: true,
            })
            .into());
        }

        let mut fields = file_columns;
        fields.push(Value::unqualified(FILE_FIELD));
        fields.push(Value::unqualified(ROW_NUMBER_FIELD));
        let mut values = staged;
        values.push(
            Value::MetadataFileName {
                dataset: self.files.reference.alias.clone(),
            }
            .alias(FILE_FIELD),
        );
        values.push(
            Value::MetadataRowNumber {
                dataset: self.files.reference.alias.clone(),
            }
            .alias(ROW_NUMBER_FIELD),
        );
        Ok(LogicalPlan::of(vec![
            Operation::delete_all(self.validation.reference.clone()),
            Operation::Copy(Copy {
                target: self.validation.reference.clone().without_alias(),
                fields,
                source: Selection::from(Source::StagedFiles(self.files.clone())).fields(values),
                properties: self.files.properties.clone(),
                validation_mode: false,
            }),
        ]))
    }

    fn build_logical_plans_for_dry_run_validation(&self) -> Result<ValidationPlans> {
        let mut plans = BTreeMap::new();
        if !self.uses_validation_table() {
            return Ok(plans);
        }
        let alias = self.validation.alias();

        let required: Vec<&Field> = self.file_fields().iter().filter(|f| !f.nullable).collect();
        if !required.is_empty() {
            let condition = Condition::or(
                required
                    .iter()
                    .map(|f| Condition::IsNull(Value::field(alias, f.name.clone())))
                    .collect(),
            );
            plans.insert(
                ValidationCategory::NullValues,
                vec![ValidationQuery {
                    fields: required.iter().map(|f| f.name.clone()).collect(),
                    plan: self.validation_query(condition),
                }],
            );
        }

        let typed: Vec<&Field> = self
            .file_fields()
            .iter()
            .filter(|f| !f.data_type().is_string())
            .collect();
        if typed.is_empty() {
            return Ok(plans);
        }
        let safe = self.ctx.capabilities.contains(Capability::SafeCast);
        let cast_fails = |f: &Field| {
            let value = Value::field(alias, f.name.clone());
            Condition::and(vec![
                Condition::is_not_null(value.clone()),
                Condition::IsNull(Value::cast(value, f.field_type, safe)),
            ])
        };

        let queries = if safe {
            vec![ValidationQuery {
                fields: typed.iter().map(|f| f.name.clone()).collect(),
                plan: self.validation_query(Condition::or(typed.iter().map(|f| cast_fails(*f)).collect())),
            }]
        } else {
            // A failed CAST aborts the whole query, so each column gets its own.
            typed
                .iter()
                .map(|f| ValidationQuery {
                    fields: vec![f.name.clone()],
                    plan: self.validation_query(cast_fails(f)),
                })
                .collect()
        };
        plans.insert(ValidationCategory::DatatypeConversion, queries);
        Ok(plans)
    }

    fn build_logical_plan_for_dry_run_post_cleanup(&self) -> Result<LogicalPlan> {
        if !self.dry_run_supported() {
            return Ok(LogicalPlan::empty());
        }
        Ok(Operation::drop(self.validation.reference.clone()).into())
    }

    fn build_logical_plans_for_post_run_statistics(
        &self,
    ) -> Result<BTreeMap<StatisticName, LogicalPlan>> {
        let mode = self.mode()?;
        let condition = Condition::equals(
            Value::field(self.ctx.main_alias(), mode.batch_id_field.clone()),
            self.ctx.batch_id(),
        );
        let mut stats = BTreeMap::new();
        stats.insert(
            StatisticName::RowsInserted,
            statistics::main_row_count(&self.ctx, StatisticName::RowsInserted, Some(condition)),
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Auditing, BulkLoad, Capabilities, DatasetReference, Datasets, StagedFilesProperties,
        StagingDataset,
    };
    use crate::planner::planner_for;
    use crate::planner::test_support::options;

    fn file_fields() -> Vec<Field> {
        vec![
            Field::new("col_int", DataType::Integer).not_null(),
            Field::new("col_string", DataType::Varchar),
            Field::new("col_decimal", DataType::Decimal).with_length(5).with_scale(2),
            Field::new("col_datetime", DataType::DateTime),
        ]
    }

    fn datasets(properties: StagedFilesProperties, main_fields: Vec<Field>) -> Datasets {
        let files = StagedFilesDataset::new(
            DatasetReference::new("staged_files"),
            Schema::new(file_fields()).unwrap(),
            properties,
        )
        .unwrap();
        let main = Dataset::new(
            DatasetReference::new("main").with_database("my_db"),
            Schema::new(main_fields).unwrap(),
        );
        Datasets::new(main, StagingDataset::StagedFiles(files))
    }

    fn files() -> StagedFilesProperties {
        StagedFilesProperties::files(vec!["/path/xyz/file1.csv".to_string()])
    }

    fn mode() -> IngestMode {
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
    fn test_primary_keys_rejected() {
        let main_fields = vec![Field::new("col_int", DataType::Integer).primary_key()];
        let result = planner_for(
            datasets(files(), main_fields),
            mode(),
            options(),
            Capabilities::none(),
        );
        assert!(matches!(result, Err(IngestError::Configuration(_))));
    }

    #[test]
    fn test_transform_while_copy_single_copy() {
        let planner = planner_for(
            datasets(files(), vec![]),
            mode(),
            options(),
            Capabilities::of(&[Capability::TransformWhileCopy]),
        )
        .unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        assert_eq!(plan.len(), 1);
        match &plan.operations()[0] {
            Operation::Copy(copy) => {
                let names: Vec<_> = copy.fields.iter().filter_map(|f| f.field_name()).collect();
                assert_eq!(
                    names,
                    vec![
                        "col_int",
                        "col_string",
                        "col_decimal",
                        "col_datetime",
                        "digest",
                        "batch_id",
                        "append_time"
                    ]
                );
                assert!(!copy.validation_mode);
            }
            other => panic!("unexpected operation {:?}", other),
        }
        assert!(planner.build_logical_plan_for_post_cleanup().unwrap().is_empty());
    }

    #[test]
    fn test_external_table_without_transform_while_copy() {
        let planner = planner_for(
            datasets(files(), vec![]),
            mode(),
            options(),
            Capabilities::none(),
        )
        .unwrap();
        let pre = planner.build_logical_plan_for_pre_actions().unwrap();
        assert_eq!(pre.len(), 3);
        let ingest = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        assert_eq!(ingest.operations()[0].kind(), "INSERT");
        let cleanup = planner.build_logical_plan_for_post_cleanup().unwrap();
        assert_eq!(cleanup.operations()[0].kind(), "DROP");
        // No dry run without the capability.
        assert!(planner.build_logical_plan_for_dry_run().unwrap().is_empty());
    }

    #[test]
    fn test_cast_checks_per_column_without_safe_cast() {
        let planner = planner_for(
            datasets(files(), vec![]),
            mode(),
            options(),
            Capabilities::of(&[Capability::DryRun, Capability::TransformWhileCopy]),
        )
        .unwrap();
        let checks = planner.build_logical_plans_for_dry_run_validation().unwrap();
        assert_eq!(checks[&ValidationCategory::NullValues].len(), 1);
        assert_eq!(checks[&ValidationCategory::DatatypeConversion].len(), 3);

        let dry_run = planner.build_logical_plan_for_dry_run().unwrap();
        let kinds: Vec<_> = dry_run.operations().iter().map(|o| o.kind()).collect();
        assert_eq!(kinds, vec!["DELETE", "COPY"]);
    }

    #[test]
    fn test_single_cast_check_with_safe_cast() {
        let planner = planner_for(
            datasets(files(), vec![]),
            mode(),
            options(),
            Capabilities::of(&[Capability::DryRun, Capability::SafeCast]),
        )
        .unwrap();
        let checks = planner.build_logical_plans_for_dry_run_validation().unwrap();
        let conversion = &checks[&ValidationCategory::DatatypeConversion];
        assert_eq!(conversion.len(), 1);
        assert_eq!(conversion[0].fields.len(), 3);
    }

    #[test]
    fn test_staged_file_primary_keys_rejected() {
        let files = StagedFilesDataset::new(
            DatasetReference::new("staged_files"),
            Schema::new(vec![
                Field::new("col_int", DataType::Integer).primary_key(),
                Field::new("col_string", DataType::Varchar),
            ])
            .unwrap(),
            files(),
        )
        .unwrap();
        let main = Dataset::new(DatasetReference::new("main"), Schema::empty());
        let result = planner_for(
            Datasets::new(main, StagingDataset::StagedFiles(files)),
            mode(),
            options(),
            Capabilities::none(),
        );
        match result {
            Err(IngestError::Configuration(message)) => assert!(message.contains("staged files")),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_semi_structured_columns_get_cast_checks() {
        let files = StagedFilesDataset::new(
            DatasetReference::new("staged_files"),
            Schema::new(vec![
                Field::new("col_string", DataType::Varchar),
                Field::new("col_variant", DataType::Variant),
            ])
            .unwrap(),
            files(),
        )
        .unwrap();
        let main = Dataset::new(DatasetReference::new("main"), Schema::empty());
        let planner = planner_for(
            Datasets::new(main, StagingDataset::StagedFiles(files)),
            mode(),
            options(),
            Capabilities::of(&[Capability::DryRun]),
        )
        .unwrap();
        let checks = planner.build_logical_plans_for_dry_run_validation().unwrap();
        let conversion = &checks[&ValidationCategory::DatatypeConversion];
        assert_eq!(conversion.len(), 1);
        assert_eq!(conversion[0].fields, vec!["col_variant".to_string()]);
    }

    #[test]
    fn test_validation_mode_copy() {
        let planner = planner_for(
            datasets(files().with_validation_mode(), vec![]),
            mode(),
            options(),
            Capabilities::of(&[Capability::DryRun, Capability::ValidationMode]),
        )
        .unwrap();
        let dry_run = planner.build_logical_plan_for_dry_run().unwrap();
        assert_eq!(dry_run.len(), 1);
        match &dry_run.operations()[0] {
            Operation::Copy(copy) => {
                assert!(copy.validation_mode);
                assert_eq!(copy.target.name, "main_validation_lp_075605");
            }
            other => panic!("unexpected operation {:?}", other),
        }
        assert!(planner.build_logical_plans_for_dry_run_validation().unwrap().is_empty());

        let pre = planner.build_logical_plan_for_dry_run_pre_actions().unwrap();
        assert_eq!(pre.len(), 1);
        assert_eq!(pre.operations()[0].kind(), "CREATE");
        let cleanup = planner.build_logical_plan_for_dry_run_post_cleanup().unwrap();
        assert_eq!(cleanup.len(), 1);
        assert_eq!(cleanup.operations()[0].kind(), "DROP");
    }

    #[test]
    fn test_validation_mode_needs_warehouse_support() {
        let planner = planner_for(
            datasets(files().with_validation_mode(), vec![]),
            mode(),
            options(),
            Capabilities::of(&[Capability::DryRun]),
        )
        .unwrap();
        let dry_run = planner.build_logical_plan_for_dry_run().unwrap();
        let kinds: Vec<_> = dry_run.operations().iter().map(|o| o.kind()).collect();
        assert_eq!(kinds, vec!["DELETE", "COPY"]);
        assert!(matches!(&dry_run.operations()[1], Operation::Copy(c) if !c.validation_mode));
        assert!(!planner.build_logical_plans_for_dry_run_validation().unwrap().is_empty());
    }
}
