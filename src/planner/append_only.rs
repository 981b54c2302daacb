use std::collections::BTreeMap;

use super::context::PlanContext;
use super::nontemporal::{empty_batch_policy, upsert_columns};
use super::statistics;
use super::{Planner, Resources, StatisticName};
use crate::error::Result;
use crate::logical_plan::{Condition, LogicalPlan, Operation, Selection, Source, Value};
use crate::models::IngestMode;

/// Appends every staged row, optionally skipping rows main already holds.
pub struct AppendOnlyPlanner {
    ctx: PlanContext,
}

impl AppendOnlyPlanner {
    pub fn new(ctx: PlanContext) -> Self {
        Self { ctx }
    }

    fn filters_existing_records(&self) -> bool {
        matches!(&self.ctx.mode, IngestMode::AppendOnly(m) if m.filter_existing_records)
    }
}

impl Planner for AppendOnlyPlanner {
    fn context(&self) -> &PlanContext {
        &self.ctx
    }

    fn build_logical_plan_for_ingest(&self, resources: &Resources) -> Result<LogicalPlan> {
        let ctx = &self.ctx;
        if empty_batch_policy(ctx, resources)?.is_some() {
            return Ok(LogicalPlan::empty());
        }
        let staging = ctx.ingest_staging()?;
        let stage = staging.alias();
        let sink = ctx.main_alias();

        let mut conditions = Vec::new();
        if self.filters_existing_records() {
            let mut existing = Vec::new();
            if !ctx.primary_keys.is_empty() {
                existing.push(Condition::fields_match(&ctx.primary_keys, sink, stage));
            }
            existing.push(ctx.record_unchanged(sink, stage));
            conditions.push(Condition::not_exists(
                Selection::from(Source::Dataset(ctx.main.reference.clone()))
                    .filter(Condition::and(existing)),
            ));
        }
        conditions.extend(ctx.data_split_condition(stage));

        let (fields, values) = upsert_columns(ctx, stage);
        let mut source = Selection::from(Source::Dataset(staging.reference.clone())).fields(values);
        if !conditions.is_empty() {
            source = source.filter(Condition::and(conditions));
        }
        Ok(Operation::Insert {
            target: ctx.main.reference.clone().without_alias(),
            fields,
            source,
        }
        .into())
    }

    fn build_logical_plans_for_post_run_statistics(
        &self,
    ) -> Result<BTreeMap<StatisticName, LogicalPlan>> {
        let ctx = &self.ctx;
        let mut stats = BTreeMap::new();
        let incoming = statistics::incoming_record_count(ctx)?;
        stats.insert(StatisticName::IncomingRecordCount, incoming);

        if let Some(audit) = ctx.mode.auditing().and_then(|a| a.field()) {
            let condition = Condition::equals(
                Value::field(ctx.main_alias(), audit),
                Value::BatchStartTimestamp,
            );
            stats.insert(
                StatisticName::RowsInserted,
                statistics::main_row_count(ctx, StatisticName::RowsInserted, Some(condition)),
            );
        } else if !self.filters_existing_records() {
            // Every staged row is appended.
            let staging = ctx.ingest_staging()?;
            let selection = Selection::from(Source::Dataset(staging.reference.clone()))
                .fields(vec![Value::count_all().alias(StatisticName::RowsInserted.as_str())])
                .filter_opt(ctx.data_split_condition(staging.alias()));
            stats.insert(StatisticName::RowsInserted, selection.into());
        }
        Ok(stats)
    }
}
