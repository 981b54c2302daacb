// Ingestion SQL generator
//
// Runs every planner phase through the dialect transformer and bundles the rendered
// statements. Phases are generated independently; a failing phase fails the call
// without touching the planner or transformer state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::Result;
use crate::logical_plan::LogicalPlan;
use crate::models::{Capability, Datasets, IngestMode};
use crate::planner::{
    planner_for, DedupErrorCheck, Planner, PlannerOptions, Resources, StatisticName,
    ValidationCategory,
};
use crate::services::transform::{CaseConversion, DialectId, SqlPlan, TransformOptions, Transformer};

/// Everything a generation run needs besides the datasets and the mode.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub dialect: DialectId,
    pub case_conversion: CaseConversion,
    pub planner: PlannerOptions,
    pub batch_start_timestamp_pattern: Option<String>,
    pub batch_id_pattern: Option<String>,
    /// Clock of the run. Fix it to get byte-identical output across calls.
    pub execution_time: DateTime<Utc>,
}

impl GeneratorOptions {
    pub fn new(dialect: DialectId) -> Self {
        Self {
            dialect,
            case_conversion: CaseConversion::None,
            planner: PlannerOptions::default(),
            batch_start_timestamp_pattern: None,
            batch_id_pattern: None,
            execution_time: Utc::now(),
        }
    }

    pub fn with_execution_time(mut self, execution_time: DateTime<Utc>) -> Self {
        self.execution_time = execution_time;
        self
    }

    pub fn with_case_conversion(mut self, case_conversion: CaseConversion) -> Self {
        self.case_conversion = case_conversion;
        self
    }

    pub fn with_planner_options(mut self, planner: PlannerOptions) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_batch_id_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.batch_id_pattern = Some(pattern.into());
        self
    }

    pub fn with_batch_start_timestamp_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.batch_start_timestamp_pattern = Some(pattern.into());
        self
    }

    fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            execution_time: self.execution_time,
            case_conversion: self.case_conversion,
            batch_start_timestamp_pattern: self.batch_start_timestamp_pattern.clone(),
            batch_id_pattern: self.batch_id_pattern.clone(),
        }
    }
}

/// Rendered dry-run check and the columns it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationSql {
    pub fields: Vec<String>,
    pub sql: SqlPlan,
}

/// Every phase of one run, rendered. Phases the mode or dialect does not need are empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GeneratorResult {
    pub pre_actions: SqlPlan,
    pub initialize_lock: SqlPlan,
    pub acquire_lock: SqlPlan,
    pub idempotency_check: SqlPlan,
    pub deduplication_and_versioning: SqlPlan,
    pub dedup_error_checks: BTreeMap<DedupErrorCheck, SqlPlan>,
    pub pre_run_statistics: BTreeMap<StatisticName, SqlPlan>,
    pub ingest: SqlPlan,
    pub post_run_statistics: BTreeMap<StatisticName, SqlPlan>,
    pub metadata_ingest: SqlPlan,
    pub post_actions: SqlPlan,
    pub post_cleanup: SqlPlan,
}

/// Rendered dry run: set-up, load, checks and teardown.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DryRunResult {
    pub pre_actions: SqlPlan,
    pub dry_run: SqlPlan,
    pub validations: BTreeMap<ValidationCategory, Vec<ValidationSql>>,
    pub post_cleanup: SqlPlan,
}

/// Generates SQL for one table family in one dialect.
pub struct Generator {
    planner: Box<dyn Planner>,
    transformer: Transformer,
}

impl Generator {
    /// Create a generator, validating the datasets against the mode
    ///
    /// # Arguments
    /// * `datasets` - Main, staging, metadata and lock datasets of the table family
    /// * `mode` - Already-constructed ingest mode
    /// * `options` - Dialect, clock and planner options
    ///
    /// # Errors
    /// Returns a configuration or plan validation error when the datasets do not fit the mode,
    /// or an unknown dialect error
    pub fn new(datasets: Datasets, mode: IngestMode, options: GeneratorOptions) -> Result<Self> {
        let transformer = Transformer::new(options.dialect, options.transform_options())?;
        let planner = planner_for(datasets, mode, options.planner, transformer.capabilities())?;
        Ok(Self {
            planner,
            transformer,
        })
    }

    pub fn dialect(&self) -> DialectId {
        self.transformer.dialect()
    }

    fn render(&self, phase: &str, plan: LogicalPlan) -> Result<SqlPlan> {
        let sql = self.transformer.generate_physical_plan(&plan)?;
        info!(
            phase,
            dialect = self.dialect().as_str(),
            statements = sql.len(),
            "generated phase"
        );
        Ok(sql)
    }

    fn render_map<K: Ord>(
        &self,
        phase: &str,
        plans: BTreeMap<K, LogicalPlan>,
    ) -> Result<BTreeMap<K, SqlPlan>> {
        plans
            .into_iter()
            .map(|(key, plan)| Ok((key, self.render(phase, plan)?)))
            .collect()
    }

    pub fn pre_actions(&self) -> Result<SqlPlan> {
        self.render("pre_actions", self.planner.build_logical_plan_for_pre_actions()?)
    }

    pub fn ingest(&self, resources: &Resources) -> Result<SqlPlan> {
        self.render("ingest", self.planner.build_logical_plan_for_ingest(resources)?)
    }

    pub fn metadata_ingest(&self) -> Result<SqlPlan> {
        self.render(
            "metadata_ingest",
            self.planner.build_logical_plan_for_metadata_ingest()?,
        )
    }

    pub fn post_cleanup(&self) -> Result<SqlPlan> {
        self.render("post_cleanup", self.planner.build_logical_plan_for_post_cleanup()?)
    }

    /// Render every non-dry-run phase
    ///
    /// # Arguments
    /// * `resources` - What the execution layer already knows about the batch
    ///
    /// # Returns
    /// GeneratorResult with one SqlPlan per phase; statistics only when collection is on
    pub fn generate_operations(&self, resources: &Resources) -> Result<GeneratorResult> {
        let planner = &self.planner;
        let collect_statistics = planner.context().options().collect_statistics;
        let (pre_run_statistics, post_run_statistics) = if collect_statistics {
            (
                self.render_map(
                    "pre_run_statistics",
                    planner.build_logical_plans_for_pre_run_statistics()?,
                )?,
                self.render_map(
                    "post_run_statistics",
                    planner.build_logical_plans_for_post_run_statistics()?,
                )?,
            )
        } else {
            (BTreeMap::new(), BTreeMap::new())
        };

        Ok(GeneratorResult {
            pre_actions: self.pre_actions()?,
            initialize_lock: self.render(
                "initialize_lock",
                planner.build_logical_plan_for_initialize_lock()?,
            )?,
            acquire_lock: self.render("acquire_lock", planner.build_logical_plan_for_acquire_lock()?)?,
            idempotency_check: self.render(
                "idempotency_check",
                planner.build_logical_plan_for_idempotency_check()?,
            )?,
            deduplication_and_versioning: self.render(
                "deduplication_and_versioning",
                planner.build_logical_plan_for_deduplication_and_versioning()?,
            )?,
            dedup_error_checks: self.render_map(
                "dedup_error_checks",
                planner.build_logical_plans_for_dedup_error_checks()?,
            )?,
            pre_run_statistics,
            ingest: self.ingest(resources)?,
            post_run_statistics,
            metadata_ingest: self.metadata_ingest()?,
            post_actions: self.render("post_actions", planner.build_logical_plan_for_post_actions()?)?,
            post_cleanup: self.post_cleanup()?,
        })
    }

    /// Render the dry-run phases
    ///
    /// Dialects without dry-run support get an empty result, not an error.
    pub fn generate_dry_run(&self) -> Result<DryRunResult> {
        if !self.transformer.capabilities().contains(Capability::DryRun) {
            warn!(
                dialect = self.dialect().as_str(),
                "dry run is not supported, returning an empty plan"
            );
            return Ok(DryRunResult::default());
        }
        let planner = &self.planner;
        let validations = planner
            .build_logical_plans_for_dry_run_validation()?
            .into_iter()
            .map(|(category, queries)| {
                let rendered = queries
                    .into_iter()
                    .map(|query| {
                        Ok(ValidationSql {
                            fields: query.fields,
                            sql: self.render(category.as_str(), query.plan)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((category, rendered))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(DryRunResult {
            pre_actions: self.render(
                "dry_run_pre_actions",
                planner.build_logical_plan_for_dry_run_pre_actions()?,
            )?,
            dry_run: self.render("dry_run", planner.build_logical_plan_for_dry_run()?)?,
            validations,
            post_cleanup: self.render(
                "dry_run_post_cleanup",
                planner.build_logical_plan_for_dry_run_post_cleanup()?,
            )?,
        })
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("mode", &self.planner.context().mode().name())
            .field("transformer", &self.transformer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::models::{
        Auditing, BulkLoad, Dataset, DatasetReference, DataType, EmptyDatasetHandling, Field,
        NontemporalSnapshot, Schema, StagedFilesDataset, StagedFilesProperties, StagingDataset,
        TransactionMilestoning, UnitemporalSnapshot,
    };
    use crate::planner::test_support::{datasets, options};
    use chrono::TimeZone;

    fn generator_options(dialect: DialectId) -> GeneratorOptions {
        GeneratorOptions::new(dialect)
            .with_execution_time(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
            .with_planner_options(options())
    }

    fn snapshot_mode() -> IngestMode {
        UnitemporalSnapshot::new(
            "digest",
            TransactionMilestoning::batch_id("batch_id_in", "batch_id_out"),
        )
        .build()
        .unwrap()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_generate_operations() {
        init_tracing();
        let generator =
            Generator::new(datasets(), snapshot_mode(), generator_options(DialectId::Ansi)).unwrap();
        let result = generator.generate_operations(&Resources::default()).unwrap();
        assert_eq!(result.pre_actions.len(), 2);
        assert_eq!(result.ingest.len(), 2);
        assert!(result.ingest.statements()[0].starts_with("UPDATE \"mydb\".\"main\" as sink"));
        assert!(result.ingest.statements()[1].starts_with("INSERT INTO \"mydb\".\"main\""));
        assert_eq!(result.metadata_ingest.len(), 1);
        assert!(result.initialize_lock.is_empty());
        assert!(result.pre_run_statistics.is_empty());
        assert!(result.post_run_statistics.is_empty());
        assert!(result.post_cleanup.is_empty());
    }

    #[test]
    fn test_statistics_when_enabled() {
        let mut planner_options = options();
        planner_options.collect_statistics = true;
        let generator = Generator::new(
            datasets(),
            NontemporalSnapshot::new().build().unwrap(),
            generator_options(DialectId::Ansi).with_planner_options(planner_options),
        )
        .unwrap();
        let result = generator.generate_operations(&Resources::default()).unwrap();
        assert!(result.pre_run_statistics.contains_key(&StatisticName::RowsDeleted));
        assert!(result.post_run_statistics.contains_key(&StatisticName::RowsInserted));
        assert!(result.post_run_statistics.contains_key(&StatisticName::IncomingRecordCount));
    }

    #[test]
    fn test_concurrent_safety_phases() {
        let mut planner_options = options();
        planner_options.enable_concurrent_safety = true;
        let generator = Generator::new(
            datasets(),
            snapshot_mode(),
            generator_options(DialectId::Ansi).with_planner_options(planner_options),
        )
        .unwrap();
        let result = generator.generate_operations(&Resources::default()).unwrap();
        assert_eq!(result.pre_actions.len(), 3);
        assert_eq!(result.initialize_lock.len(), 1);
        assert_eq!(result.acquire_lock.len(), 1);
    }

    #[test]
    fn test_repeated_generation_is_identical() {
        let first = Generator::new(datasets(), snapshot_mode(), generator_options(DialectId::Ansi))
            .unwrap()
            .generate_operations(&Resources::default())
            .unwrap();
        let second = Generator::new(datasets(), snapshot_mode(), generator_options(DialectId::Ansi))
            .unwrap()
            .generate_operations(&Resources::default())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_empty_batch_fails_ingest_only() {
        let mode = UnitemporalSnapshot::new(
            "digest",
            TransactionMilestoning::batch_id("batch_id_in", "batch_id_out"),
        )
        .with_empty_dataset_handling(EmptyDatasetHandling::FailEmptyBatch)
        .build()
        .unwrap();
        let generator = Generator::new(datasets(), mode, generator_options(DialectId::Ansi)).unwrap();
        let empty = Resources {
            staging_empty: true,
        };
        assert!(matches!(
            generator.ingest(&empty),
            Err(IngestError::PlanValidation(_))
        ));
        assert_eq!(generator.pre_actions().unwrap().len(), 2);
    }

    #[test]
    fn test_dry_run_unsupported_is_empty() {
        let generator =
            Generator::new(datasets(), snapshot_mode(), generator_options(DialectId::Ansi)).unwrap();
        assert_eq!(generator.generate_dry_run().unwrap(), DryRunResult::default());
    }

    #[test]
    fn test_snowflake_dry_run() {
        let files = StagedFilesDataset::new(
            DatasetReference::new("staged_files"),
            Schema::new(vec![
                Field::new("col_int", DataType::Integer).not_null(),
                Field::new("col_date", DataType::Date),
                Field::new("col_string", DataType::Varchar),
            ])
            .unwrap(),
            StagedFilesProperties::files(vec!["/data/file1.csv".to_string()]).with_location("@stage"),
        )
        .unwrap();
        let datasets = Datasets::new(
            Dataset::new(DatasetReference::new("main"), Schema::empty()),
            StagingDataset::StagedFiles(files),
        );
        let mode = BulkLoad::new("batch_id")
            .with_auditing(Auditing::date_time("append_time"))
            .build()
            .unwrap();
        let generator =
            Generator::new(datasets, mode, generator_options(DialectId::Snowflake)).unwrap();
        let dry_run = generator.generate_dry_run().unwrap();
        assert_eq!(dry_run.pre_actions.len(), 1);
        assert_eq!(dry_run.dry_run.len(), 2);
        assert_eq!(dry_run.post_cleanup.len(), 1);
        let conversions = &dry_run.validations[&ValidationCategory::DatatypeConversion];
        assert_eq!(conversions.len(), 1);
        assert_eq!(conversions[0].fields, vec!["col_int".to_string(), "col_date".to_string()]);
        assert!(conversions[0].sql.statements()[0].contains("TRY_CAST"));
    }

    #[test]
    fn test_case_conversion_option() {
        let generator = Generator::new(
            datasets(),
            snapshot_mode(),
            generator_options(DialectId::Ansi).with_case_conversion(CaseConversion::ToUpper),
        )
        .unwrap();
        let result = generator.generate_operations(&Resources::default()).unwrap();
        assert!(result.pre_actions.statements()[0].starts_with("CREATE TABLE IF NOT EXISTS \"MYDB\".\"MAIN\""));
    }
}
