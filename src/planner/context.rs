// Planning context
//
// Resolves the concrete datasets one run works with (derived main schema, temp staging,
// lock table) and the milestoning/batch helpers every temporal planner shares.

use super::PlannerOptions;
use crate::error::{IngestError, Result};
use crate::logical_plan::{Condition, FunctionName, Selection, Source, Value};
use crate::models::{
    Capabilities, DataType, Dataset, DatasetReference, Datasets, Field, IngestMode,
    LockInfoDataset, MetadataDataset, Schema, StagedFilesDataset, StagingDataset,
    TransactionMilestoning, VersionResolver, VersioningStrategy, STAGING_ALIAS,
};
use crate::validation;

pub const BATCH_ID_OPEN: i64 = 999_999_999;
pub const DATE_TIME_OPEN: &str = "9999-12-31 23:59:59";
pub const DEDUP_COUNT_FIELD: &str = "dedup_count";
pub const VERSION_RANK_FIELD: &str = "version_rank";
pub const DATA_SPLIT_LOWER_BOUND_PLACEHOLDER: &str = "{DATA_SPLIT_LOWER_BOUND_PLACEHOLDER}";
pub const DATA_SPLIT_UPPER_BOUND_PLACEHOLDER: &str = "{DATA_SPLIT_UPPER_BOUND_PLACEHOLDER}";

/// Everything a planner needs, fixed at construction.
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub(crate) main: Dataset,
    pub(crate) staging: StagingDataset,
    /// Rewritten copy of the staging table when deduplication or stage versioning runs.
    pub(crate) temp_staging: Option<Dataset>,
    pub(crate) metadata: MetadataDataset,
    pub(crate) lock: LockInfoDataset,
    pub(crate) mode: IngestMode,
    pub(crate) options: PlannerOptions,
    pub(crate) capabilities: Capabilities,
    pub(crate) primary_keys: Vec<String>,
}

impl PlanContext {
    pub fn new(
        datasets: Datasets,
        mode: IngestMode,
        options: PlannerOptions,
        capabilities: Capabilities,
    ) -> Result<Self> {
        validation::validate_datasets(&datasets, &mode)?;

        let Datasets {
            main,
            staging,
            metadata,
            lock,
        } = datasets;

        let primary_keys = staging.schema().primary_keys();
        let main = if main.schema.is_empty() {
            let derived = derive_main_schema(staging.schema(), &mode);
            main.with_schema(derived)
        } else {
            main
        };
        let lock = lock.unwrap_or_else(|| LockInfoDataset::for_main(&main.reference));

        let temp_staging = match &staging {
            StagingDataset::Table(table) if needs_temp_staging(&mode) => Some(temp_staging_dataset(
                table,
                &mode,
                &run_suffix(&options.ingest_run_id),
            )),
            _ => None,
        };

        Ok(Self {
            main,
            staging,
            temp_staging,
            metadata,
            lock,
            mode,
            options,
            capabilities,
            primary_keys,
        })
    }

    pub fn main(&self) -> &Dataset {
        &self.main
    }

    pub fn mode(&self) -> &IngestMode {
        &self.mode
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn temp_staging(&self) -> Option<&Dataset> {
        self.temp_staging.as_ref()
    }

    pub(crate) fn main_alias(&self) -> Option<&str> {
        self.main.alias()
    }

    pub(crate) fn staging_table(&self) -> Result<&Dataset> {
        self.staging.as_table().ok_or_else(|| {
            IngestError::plan_validation(format!(
                "{} requires a staging table, got staged files",
                self.mode.name()
            ))
        })
    }

    pub(crate) fn staged_files(&self) -> Result<&StagedFilesDataset> {
        self.staging.as_staged_files().ok_or_else(|| {
            IngestError::plan_validation("BulkLoad requires a staged files dataset")
        })
    }

    /// Staging as read by the ingest phase.
    pub(crate) fn ingest_staging(&self) -> Result<&Dataset> {
        match &self.temp_staging {
            Some(temp) => Ok(temp),
            None => self.staging_table(),
        }
    }

    pub(crate) fn run_suffix(&self) -> String {
        run_suffix(&self.options.ingest_run_id)
    }

    /// Staging columns that carry business data into main.
    pub(crate) fn staging_data_fields(&self) -> Vec<String> {
        let excluded = excluded_staging_fields(&self.mode);
        self.staging
            .schema()
            .fields()
            .iter()
            .filter(|f| !excluded.contains(&f.name))
            .map(|f| f.name.clone())
            .collect()
    }

    /// `SELECT COALESCE(MAX(table_batch_id),0)+1 FROM metadata WHERE UPPER(table_name) = 'MAIN'`
    pub(crate) fn batch_id(&self) -> Value {
        let metadata = self.metadata.reference();
        let alias = metadata.alias.clone();
        let max = Value::function(
            FunctionName::Max,
            vec![Value::field(alias.as_deref(), self.metadata.table_batch_id_field.clone())],
        );
        let next = Value::add(
            Value::function(FunctionName::Coalesce, vec![max, Value::Number(0)]),
            Value::Number(1),
        );
        let selection = Selection::from(Source::Dataset(metadata))
            .fields(vec![next])
            .filter(self.metadata_table_filter());
        Value::BatchId(Box::new(selection))
    }

    pub(crate) fn metadata_table_filter(&self) -> Condition {
        let alias = self.metadata.reference().alias;
        Condition::equals(
            Value::function(
                FunctionName::Upper,
                vec![Value::field(alias.as_deref(), self.metadata.table_name_field.clone())],
            ),
            Value::string(self.main.name().to_uppercase()),
        )
    }

    pub(crate) fn previous_batch_id(&self) -> Value {
        Value::subtract(self.batch_id(), Value::Number(1))
    }

    fn milestoning(&self) -> Result<&TransactionMilestoning> {
        self.mode.milestoning().ok_or_else(|| {
            IngestError::plan_validation(format!(
                "{} has no transaction milestoning",
                self.mode.name()
            ))
        })
    }

    /// Rows still current: batch id out (or time out) equals the open sentinel.
    pub(crate) fn open_condition(&self, alias: Option<&str>) -> Result<Condition> {
        let milestoning = self.milestoning()?;
        Ok(match milestoning.batch_id_fields() {
            Some((_, out)) => Condition::equals(Value::field(alias, out), Value::Number(BATCH_ID_OPEN)),
            None => {
                let (_, out) = milestoning
                    .date_time_fields()
                    .ok_or_else(|| IngestError::plan_validation("Milestoning has no fields"))?;
                Condition::equals(Value::field(alias, out), Value::string(DATE_TIME_OPEN))
            }
        })
    }

    /// Assignments that close a current row at this batch.
    pub(crate) fn close_assignments(&self, alias: Option<&str>) -> Result<Vec<(Value, Value)>> {
        let milestoning = self.milestoning()?;
        let mut assignments = Vec::new();
        if let Some((_, out)) = milestoning.batch_id_fields() {
            assignments.push((Value::field(alias, out), self.previous_batch_id()));
        }
        if let Some((_, out)) = milestoning.date_time_fields() {
            assignments.push((Value::field(alias, out), Value::BatchStartTimestamp));
        }
        Ok(assignments)
    }

    /// Milestoning columns and the values a freshly opened row receives.
    pub(crate) fn open_row_columns(&self) -> Result<(Vec<Value>, Vec<Value>)> {
        let milestoning = self.milestoning()?;
        let mut fields = Vec::new();
        let mut values = Vec::new();
        if let Some((batch_in, batch_out)) = milestoning.batch_id_fields() {
            fields.push(Value::unqualified(batch_in));
            fields.push(Value::unqualified(batch_out));
            values.push(self.batch_id());
            values.push(Value::Number(BATCH_ID_OPEN));
        }
        if let Some((time_in, time_out)) = milestoning.date_time_fields() {
            fields.push(Value::unqualified(time_in));
            fields.push(Value::unqualified(time_out));
            values.push(Value::BatchStartTimestamp);
            values.push(Value::string(DATE_TIME_OPEN));
        }
        Ok((fields, values))
    }

    /// Conditions opened and closed at this batch, used by statistics.
    pub(crate) fn opened_in_batch(&self, alias: Option<&str>) -> Result<Condition> {
        let milestoning = self.milestoning()?;
        Ok(match milestoning.batch_id_fields() {
            Some((batch_in, _)) => Condition::equals(Value::field(alias, batch_in), self.batch_id()),
            None => {
                let (time_in, _) = milestoning
                    .date_time_fields()
                    .ok_or_else(|| IngestError::plan_validation("Milestoning has no fields"))?;
                Condition::equals(Value::field(alias, time_in), Value::BatchStartTimestamp)
            }
        })
    }

    pub(crate) fn closed_in_batch(&self, alias: Option<&str>) -> Result<Condition> {
        let milestoning = self.milestoning()?;
        Ok(match milestoning.batch_id_fields() {
            Some((_, batch_out)) => {
                Condition::equals(Value::field(alias, batch_out), self.previous_batch_id())
            }
            None => {
                let (_, time_out) = milestoning
                    .date_time_fields()
                    .ok_or_else(|| IngestError::plan_validation("Milestoning has no fields"))?;
                Condition::equals(Value::field(alias, time_out), Value::BatchStartTimestamp)
            }
        })
    }

    /// Restrict reads of staging to the data split being applied.
    pub(crate) fn data_split_condition(&self, alias: Option<&str>) -> Option<Condition> {
        let field = self.mode.versioning().data_split_field()?;
        Some(Condition::and(vec![
            Condition::GreaterThanEqualTo(
                Value::field(alias, field),
                Value::string(DATA_SPLIT_LOWER_BOUND_PLACEHOLDER),
            ),
            Condition::LessThanEqualTo(
                Value::field(alias, field),
                Value::string(DATA_SPLIT_UPPER_BOUND_PLACEHOLDER),
            ),
        ]))
    }

    /// The staged row supersedes the main row: a different digest, or a greater version
    /// when versions are ordered by column.
    pub(crate) fn record_changed(&self, sink: Option<&str>, stage: Option<&str>) -> Condition {
        match (self.mode.versioning().resolver(), self.mode.versioning().version_field()) {
            (Some(VersionResolver::VersionColumnBased), Some(version)) => Condition::GreaterThan(
                Value::field(stage, version),
                Value::field(sink, version),
            ),
            _ => {
                let digest = self.mode.digest_field().unwrap_or_default();
                Condition::NotEquals(Value::field(sink, digest), Value::field(stage, digest))
            }
        }
    }

    /// The main row already holds the staged row's content (or a later version).
    pub(crate) fn record_unchanged(&self, sink: Option<&str>, stage: Option<&str>) -> Condition {
        match (self.mode.versioning().resolver(), self.mode.versioning().version_field()) {
            (Some(VersionResolver::VersionColumnBased), Some(version)) => Condition::LessThanEqualTo(
                Value::field(stage, version),
                Value::field(sink, version),
            ),
            _ => {
                let digest = self.mode.digest_field().unwrap_or_default();
                Condition::equals(Value::field(sink, digest), Value::field(stage, digest))
            }
        }
    }

    /// Staged rows flagged for deletion.
    pub(crate) fn delete_indicator_condition(&self, alias: Option<&str>) -> Option<Condition> {
        let indicator = self.mode.delete_indicator()?;
        Some(Condition::in_values(
            Value::field(alias, indicator.field.clone()),
            indicator.values.iter().map(|v| Value::string(v.clone())).collect(),
        ))
    }
}

/// First six alphanumerics of the run id, lowercased.
pub(crate) fn run_suffix(run_id: &str) -> String {
    run_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(6)
        .collect::<String>()
        .to_lowercase()
}

pub(crate) fn needs_temp_staging(mode: &IngestMode) -> bool {
    !matches!(mode, IngestMode::BulkLoad(_))
        && (mode.deduplication().is_enabled() || mode.versioning().performs_stage_versioning())
}

fn temp_staging_dataset(staging: &Dataset, mode: &IngestMode, suffix: &str) -> Dataset {
    let mut fields: Vec<Field> = staging_carried_fields(staging, mode)
        .into_iter()
        .map(|f| f.without_primary_key())
        .collect();
    if mode.deduplication().is_enabled() {
        fields.push(Field::new(DEDUP_COUNT_FIELD, DataType::Integer));
    }
    if let Some(split) = ranked_data_split(mode) {
        fields.push(Field::new(split, DataType::Integer));
    }
    let reference = staging
        .reference
        .sibling(format!("{}_temp_staging_lp_{}", staging.name(), suffix))
        .with_alias(staging.alias().unwrap_or(STAGING_ALIAS));
    Dataset::new(reference, Schema::derived(fields))
}

/// Staging fields copied as-is into the temp staging table.
pub(crate) fn staging_carried_fields(staging: &Dataset, mode: &IngestMode) -> Vec<Field> {
    let ranked = ranked_data_split(mode);
    staging
        .schema
        .fields()
        .iter()
        .filter(|f| Some(f.name.as_str()) != ranked)
        .cloned()
        .collect()
}

/// Data split column computed during stage versioning, if any.
pub(crate) fn ranked_data_split(mode: &IngestMode) -> Option<&str> {
    match mode.versioning() {
        VersioningStrategy::AllVersions {
            data_split_field,
            perform_stage_versioning: true,
            ..
        } => Some(data_split_field),
        _ => None,
    }
}

fn excluded_staging_fields(mode: &IngestMode) -> Vec<String> {
    let mut excluded = Vec::new();
    if let Some(indicator) = mode.delete_indicator() {
        excluded.push(indicator.field.clone());
    }
    if let Some(split) = mode.versioning().data_split_field() {
        excluded.push(split.to_string());
    }
    excluded
}

/// Main schema implied by staging plus the mode's bookkeeping columns.
pub(crate) fn derive_main_schema(staging: &Schema, mode: &IngestMode) -> Schema {
    let excluded = excluded_staging_fields(mode);
    let mut fields: Vec<Field> = Vec::new();

    for field in staging.fields() {
        if excluded.contains(&field.name) {
            continue;
        }
        match mode {
            IngestMode::BitemporalSnapshot(m) if field.name == m.validity.source_from_field => {
                fields.push(field.clone().with_name(m.validity.from_field.clone()).primary_key());
            }
            IngestMode::BitemporalDelta(m) if field.name == m.validity.source_from_field => {
                fields.push(field.clone().with_name(m.validity.from_field.clone()).primary_key());
            }
            IngestMode::BitemporalSnapshot(m) if field.name == m.validity.source_through_field => {
                fields.push(field.clone().with_name(m.validity.through_field.clone()));
            }
            IngestMode::BitemporalDelta(m) if field.name == m.validity.source_through_field => {
                fields.push(field.clone().with_name(m.validity.through_field.clone()));
            }
            _ => fields.push(field.clone()),
        }
    }

    if let Some(milestoning) = mode.milestoning() {
        if let Some((batch_in, batch_out)) = milestoning.batch_id_fields() {
            fields.push(Field::new(batch_in, DataType::Integer).primary_key());
            fields.push(Field::new(batch_out, DataType::Integer));
        }
        if let Some((time_in, time_out)) = milestoning.date_time_fields() {
            fields.push(Field::new(time_in, DataType::DateTime).primary_key());
            fields.push(Field::new(time_out, DataType::DateTime));
        }
    }

    if let IngestMode::BulkLoad(m) = mode {
        if let Some(digest) = mode.digest_field() {
            fields.push(Field::new(digest, DataType::Varchar));
        }
        fields.push(Field::new(m.batch_id_field.clone(), DataType::Integer));
    }

    if let Some(audit) = mode.auditing().and_then(|a| a.field()) {
        fields.push(Field::new(audit, DataType::DateTime));
    }

    Schema::derived(fields)
}

/// Main dataset as a reference carrying the given alias, used for self-joins.
pub(crate) fn aliased(reference: &DatasetReference, alias: &str) -> DatasetReference {
    reference.clone().with_alias(alias)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UnitemporalSnapshot, DeduplicationStrategy};

    fn staging_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Integer).primary_key(),
            Field::new("name", DataType::Varchar).primary_key(),
            Field::new("amount", DataType::Double),
            Field::new("digest", DataType::Varchar),
        ])
        .unwrap()
    }

    #[test]
    fn test_run_suffix() {
        assert_eq!(run_suffix("075605E3-bada-47d7"), "075605");
        assert_eq!(run_suffix("ab"), "ab");
    }

    #[test]
    fn test_derived_main_schema_adds_milestoning() {
        let mode = UnitemporalSnapshot::new(
            "digest",
            TransactionMilestoning::batch_id_and_date_time(
                "batch_id_in",
                "batch_id_out",
                "batch_time_in",
                "batch_time_out",
            ),
        )
        .build()
        .unwrap();
        let schema = derive_main_schema(&staging_schema(), &mode);
        assert_eq!(
            schema.field_names(),
            vec![
                "id",
                "name",
                "amount",
                "digest",
                "batch_id_in",
                "batch_id_out",
                "batch_time_in",
                "batch_time_out"
            ]
        );
        assert_eq!(
            schema.primary_keys(),
            vec!["id", "name", "batch_id_in", "batch_time_in"]
        );
    }

    #[test]
    fn test_temp_staging_strips_keys_and_adds_count() {
        let mode = UnitemporalSnapshot::new(
            "digest",
            TransactionMilestoning::date_time("batch_time_in", "batch_time_out"),
        )
        .with_deduplication(DeduplicationStrategy::FilterDuplicates)
        .build()
        .unwrap();
        let staging = Dataset::new(
            DatasetReference::new("staging").with_database("mydb").with_alias("stage"),
            staging_schema(),
        );
        let temp = temp_staging_dataset(&staging, &mode, "075605");
        assert_eq!(temp.name(), "staging_temp_staging_lp_075605");
        assert_eq!(temp.alias(), Some("stage"));
        assert!(temp.schema.primary_keys().is_empty());
        assert!(temp.schema.contains(DEDUP_COUNT_FIELD));
        assert_eq!(temp.reference.database.as_deref(), Some("mydb"));
    }
}
