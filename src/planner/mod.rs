// Planners
//
// One planner per ingest mode family. A planner turns (datasets, mode, options,
// capabilities) into per-phase logical plans; it never renders SQL.

pub mod append_only;
pub mod bitemporal;
pub mod bulk_load;
pub mod context;
pub mod dedup;
pub mod metadata;
pub mod nontemporal;
pub mod statistics;
pub mod unitemporal;

pub use context::PlanContext;

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Result;
use crate::logical_plan::{LogicalPlan, Operation};
use crate::models::{Capabilities, Datasets, IngestMode, StagingDataset};

pub const DEFAULT_SAMPLE_ROW_COUNT: u64 = 20;
pub const DEFAULT_BATCH_SUCCESS_STATUS: &str = "DONE";

/// Caller-supplied knobs for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannerOptions {
    pub cleanup_staging_data: bool,
    pub collect_statistics: bool,
    pub enable_concurrent_safety: bool,
    /// Rows returned by error-sample queries.
    pub sample_row_count: u64,
    pub ingest_run_id: String,
    pub batch_success_status: String,
    pub additional_metadata: BTreeMap<String, serde_json::Value>,
    pub bulk_load_event_id: Option<String>,
    pub ingest_request_id: Option<String>,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            cleanup_staging_data: false,
            collect_statistics: false,
            enable_concurrent_safety: false,
            sample_row_count: DEFAULT_SAMPLE_ROW_COUNT,
            ingest_run_id: uuid::Uuid::new_v4().to_string(),
            batch_success_status: DEFAULT_BATCH_SUCCESS_STATUS.to_string(),
            additional_metadata: BTreeMap::new(),
            bulk_load_event_id: None,
            ingest_request_id: None,
        }
    }
}

/// Facts about the run only the execution layer can know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Resources {
    pub staging_empty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum StatisticName {
    IncomingRecordCount,
    RowsInserted,
    RowsUpdated,
    RowsDeleted,
    RowsTerminated,
}

impl StatisticName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatisticName::IncomingRecordCount => "incomingRecordCount",
            StatisticName::RowsInserted => "rowsInserted",
            StatisticName::RowsUpdated => "rowsUpdated",
            StatisticName::RowsDeleted => "rowsDeleted",
            StatisticName::RowsTerminated => "rowsTerminated",
        }
    }
}

/// Queries run after deduplication; callers decide whether a non-zero result aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DedupErrorCheck {
    MaxDuplicates,
    DuplicateRows,
    MaxDataErrors,
    DataErrorRows,
}

impl DedupErrorCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupErrorCheck::MaxDuplicates => "MAX_DUPLICATES",
            DedupErrorCheck::DuplicateRows => "DUPLICATE_ROWS",
            DedupErrorCheck::MaxDataErrors => "MAX_DATA_ERRORS",
            DedupErrorCheck::DataErrorRows => "DATA_ERROR_ROWS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ValidationCategory {
    NullValues,
    DatatypeConversion,
}

impl ValidationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCategory::NullValues => "NULL_VALUES",
            ValidationCategory::DatatypeConversion => "DATATYPE_CONVERSION",
        }
    }
}

/// A dry-run validation query and the columns it checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationQuery {
    pub fields: Vec<String>,
    pub plan: LogicalPlan,
}

pub type ValidationPlans = BTreeMap<ValidationCategory, Vec<ValidationQuery>>;

/// Per-phase logical plan construction.
///
/// Implementors supply the ingest phase and whatever differs per mode; every other phase
/// has a shared default built from the [`PlanContext`].
pub trait Planner: Send + Sync {
    fn context(&self) -> &PlanContext;

    /// Core data movement for a batch.
    fn build_logical_plan_for_ingest(&self, resources: &Resources) -> Result<LogicalPlan>;

    fn build_logical_plan_for_pre_actions(&self) -> Result<LogicalPlan> {
        let ctx = self.context();
        let mut operations = vec![
            Operation::create(ctx.main.clone()),
            Operation::create(ctx.metadata.to_dataset()),
        ];
        if ctx.options.enable_concurrent_safety {
            operations.push(Operation::create(ctx.lock.to_dataset()));
        }
        if let Some(temp) = &ctx.temp_staging {
            operations.push(Operation::create(temp.clone()));
        }
        Ok(LogicalPlan::of(operations))
    }

    fn build_logical_plan_for_post_actions(&self) -> Result<LogicalPlan> {
        let ctx = self.context();
        if !ctx.options.cleanup_staging_data {
            return Ok(LogicalPlan::empty());
        }
        Ok(match &ctx.staging {
            StagingDataset::Table(table) => Operation::delete_all(table.reference.clone()).into(),
            StagingDataset::StagedFiles(_) => LogicalPlan::empty(),
        })
    }

    fn build_logical_plan_for_post_cleanup(&self) -> Result<LogicalPlan> {
        let ctx = self.context();
        Ok(match &ctx.temp_staging {
            Some(temp) => Operation::drop(temp.reference.clone()).into(),
            None => LogicalPlan::empty(),
        })
    }

    fn build_logical_plan_for_deduplication_and_versioning(&self) -> Result<LogicalPlan> {
        dedup::build_deduplication_and_versioning(self.context())
    }

    fn build_logical_plans_for_dedup_error_checks(
        &self,
    ) -> Result<BTreeMap<DedupErrorCheck, LogicalPlan>> {
        dedup::build_error_checks(self.context())
    }

    fn build_logical_plan_for_metadata_ingest(&self) -> Result<LogicalPlan> {
        Ok(metadata::build_metadata_insert(self.context()).into())
    }

    fn build_logical_plan_for_dry_run_pre_actions(&self) -> Result<LogicalPlan> {
        Ok(LogicalPlan::empty())
    }

    fn build_logical_plan_for_dry_run(&self) -> Result<LogicalPlan> {
        Ok(LogicalPlan::empty())
    }

    fn build_logical_plans_for_dry_run_validation(&self) -> Result<ValidationPlans> {
        Ok(BTreeMap::new())
    }

    fn build_logical_plan_for_dry_run_post_cleanup(&self) -> Result<LogicalPlan> {
        Ok(LogicalPlan::empty())
    }

    /// Statistics captured before ingest runs.
    fn build_logical_plans_for_pre_run_statistics(
        &self,
    ) -> Result<BTreeMap<StatisticName, LogicalPlan>> {
        Ok(BTreeMap::new())
    }

    /// Statistics captured after ingest, before metadata is written.
    fn build_logical_plans_for_post_run_statistics(
        &self,
    ) -> Result<BTreeMap<StatisticName, LogicalPlan>>;

    fn build_logical_plan_for_initialize_lock(&self) -> Result<LogicalPlan> {
        let ctx = self.context();
        if !ctx.options.enable_concurrent_safety {
            return Ok(LogicalPlan::empty());
        }
        Ok(metadata::build_lock_initialize(ctx).into())
    }

    fn build_logical_plan_for_acquire_lock(&self) -> Result<LogicalPlan> {
        let ctx = self.context();
        if !ctx.options.enable_concurrent_safety {
            return Ok(LogicalPlan::empty());
        }
        Ok(metadata::build_lock_acquire(ctx).into())
    }

    fn build_logical_plan_for_idempotency_check(&self) -> Result<LogicalPlan> {
        Ok(match metadata::build_idempotency_check(self.context()) {
            Some(selection) => selection.into(),
            None => LogicalPlan::empty(),
        })
    }
}

/// Build the planner for a mode, validating the dataset/mode combination.
pub fn planner_for(
    datasets: Datasets,
    mode: IngestMode,
    options: PlannerOptions,
    capabilities: Capabilities,
) -> Result<Box<dyn Planner>> {
    debug!(mode = mode.name(), "building planner");
    let ctx = PlanContext::new(datasets, mode, options, capabilities)?;
    let planner: Box<dyn Planner> = match &ctx.mode {
        IngestMode::NontemporalSnapshot(_) => Box::new(nontemporal::NontemporalSnapshotPlanner::new(ctx)),
        IngestMode::NontemporalDelta(_) => Box::new(nontemporal::NontemporalDeltaPlanner::new(ctx)),
        IngestMode::AppendOnly(_) => Box::new(append_only::AppendOnlyPlanner::new(ctx)),
        IngestMode::UnitemporalSnapshot(_) => {
            Box::new(unitemporal::UnitemporalSnapshotPlanner::new(ctx))
        }
        IngestMode::UnitemporalDelta(_) => Box::new(unitemporal::UnitemporalDeltaPlanner::new(ctx)),
        IngestMode::BitemporalSnapshot(_) | IngestMode::BitemporalDelta(_) => {
            Box::new(bitemporal::BitemporalPlanner::new(ctx)?)
        }
        IngestMode::BulkLoad(_) => Box::new(bulk_load::BulkLoadPlanner::new(ctx)?),
    };
    Ok(planner)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{
        DataType, Dataset, DatasetReference, Datasets, Field, Schema, StagingDataset,
    };

    pub const RUN_ID: &str = "075605e3-bada-47d7-9ae9-7138f392b7ab";

    pub fn fields() -> Vec<Field> {
        vec![
            Field::new("id", DataType::Integer).primary_key(),
            Field::new("name", DataType::Varchar).primary_key(),
            Field::new("amount", DataType::Double),
            Field::new("biz_date", DataType::Date),
            Field::new("digest", DataType::Varchar),
        ]
    }

    pub fn datasets_with(staging_fields: Vec<Field>) -> Datasets {
        let main = Dataset::new(
            DatasetReference::new("main").with_database("mydb"),
            Schema::empty(),
        );
        let staging = Dataset::new(
            DatasetReference::new("staging").with_database("mydb"),
            Schema::new(staging_fields).unwrap(),
        );
        Datasets::new(main, StagingDataset::Table(staging))
    }

    pub fn datasets() -> Datasets {
        datasets_with(fields())
    }

    pub fn options() -> super::PlannerOptions {
        super::PlannerOptions {
            ingest_run_id: RUN_ID.to_string(),
            ..Default::default()
        }
    }
}
