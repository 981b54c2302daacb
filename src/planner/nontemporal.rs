// Nontemporal planners
//
// Snapshot replaces main with the batch; delta upserts by primary key. Neither keeps
// history.

use std::collections::BTreeMap;
use tracing::debug;

use super::context::PlanContext;
use super::statistics;
use super::{Planner, Resources, StatisticName};
use crate::error::{IngestError, Result};
use crate::logical_plan::{
    Condition, LogicalPlan, Merge, NotMatchedInsert, Operation, Selection, Source, Value,
};
use crate::models::{Capability, EmptyDatasetHandling};

/// Columns written into main and the staged values feeding them, plus the audit column.
pub(crate) fn upsert_columns(ctx: &PlanContext, stage: Option<&str>) -> (Vec<Value>, Vec<Value>) {
    let data_fields = ctx.staging_data_fields();
    let mut fields: Vec<Value> = data_fields.iter().map(|f| Value::unqualified(f.clone())).collect();
    let mut values: Vec<Value> = data_fields.iter().map(|f| Value::field(stage, f.clone())).collect();
    if let Some(audit) = ctx.mode.auditing().and_then(|a| a.field()) {
        fields.push(Value::unqualified(audit));
        values.push(Value::BatchStartTimestamp);
    }
    (fields, values)
}

/// Apply the mode's empty-batch policy; `None` means load normally.
pub(crate) fn empty_batch_policy(
    ctx: &PlanContext,
    resources: &Resources,
) -> Result<Option<EmptyDatasetHandling>> {
    if !resources.staging_empty {
        return Ok(None);
    }
    match ctx.mode.empty_dataset_handling() {
        Some(EmptyDatasetHandling::FailEmptyBatch) => Err(IngestError::plan_validation(format!(
            "Empty batch received for {} with empty dataset handling set to fail",
            ctx.main.name()
        ))),
        Some(handling) => Ok(Some(handling)),
        None => Ok(Some(EmptyDatasetHandling::NoOp)),
    }
}

pub struct NontemporalSnapshotPlanner {
    ctx: PlanContext,
}

impl NontemporalSnapshotPlanner {
    pub fn new(ctx: PlanContext) -> Self {
        Self { ctx }
    }
}

impl Planner for NontemporalSnapshotPlanner {
    fn context(&self) -> &PlanContext {
        &self.ctx
    }

    fn build_logical_plan_for_ingest(&self, resources: &Resources) -> Result<LogicalPlan> {
        let ctx = &self.ctx;
        let truncate = Operation::delete_all(ctx.main.reference.clone());
        match empty_batch_policy(ctx, resources)? {
            Some(EmptyDatasetHandling::DeleteTargetData) => return Ok(truncate.into()),
            Some(_) => return Ok(LogicalPlan::empty()),
            None => {}
        }

        let staging = ctx.ingest_staging()?;
        let (fields, values) = upsert_columns(ctx, staging.alias());
        let insert = Operation::Insert {
            target: ctx.main.reference.clone().without_alias(),
            fields,
            source: Selection::from(Source::Dataset(staging.reference.clone())).fields(values),
        };
        Ok(LogicalPlan::of(vec![truncate, insert]))
    }

    fn build_logical_plans_for_pre_run_statistics(
        &self,
    ) -> Result<BTreeMap<StatisticName, LogicalPlan>> {
        let mut stats = BTreeMap::new();
        stats.insert(
            StatisticName::RowsDeleted,
            statistics::main_row_count(&self.ctx, StatisticName::RowsDeleted, None),
        );
        Ok(stats)
    }

    fn build_logical_plans_for_post_run_statistics(
        &self,
    ) -> Result<BTreeMap<StatisticName, LogicalPlan>> {
        let mut stats = BTreeMap::new();
        stats.insert(
            StatisticName::IncomingRecordCount,
            statistics::incoming_record_count(&self.ctx)?,
        );
        stats.insert(
            StatisticName::RowsInserted,
            statistics::main_row_count(&self.ctx, StatisticName::RowsInserted, None),
        );
        Ok(stats)
    }
}

pub struct NontemporalDeltaPlanner {
    ctx: PlanContext,
}

impl NontemporalDeltaPlanner {
    pub fn new(ctx: PlanContext) -> Self {
        Self { ctx }
    }

    fn key_match(&self, sink: Option<&str>, stage: Option<&str>) -> Condition {
        Condition::fields_match(&self.ctx.primary_keys, sink, stage)
    }

    fn merge(&self) -> Result<LogicalPlan> {
        let ctx = &self.ctx;
        let staging = ctx.ingest_staging()?;
        let stage = staging.alias();
        let sink = ctx.main_alias();

        let source = match ctx.data_split_condition(stage) {
            Some(split) => Selection::from(Source::Dataset(staging.reference.clone()))
                .filter(split)
                .into_source(stage.unwrap_or_default()),
            None => Source::Dataset(staging.reference.clone()),
        };

        let (fields, values) = upsert_columns(ctx, stage);
        let assignments = fields
            .iter()
            .zip(values.iter())
            .map(|(f, v)| (f.requalify(sink), v.clone()))
            .collect();

        let deleted = ctx.delete_indicator_condition(stage);
        let merge = Merge {
            target: ctx.main.reference.clone(),
            source,
            on: self.key_match(sink, stage),
            matched_delete: deleted.clone(),
            matched_update: Some((ctx.record_changed(sink, stage), assignments)),
            not_matched_insert: Some(NotMatchedInsert {
                condition: deleted.map(Condition::not),
                fields,
                values,
            }),
        };
        Ok(Operation::Merge(merge).into())
    }

    fn update_then_insert(&self) -> Result<LogicalPlan> {
        let ctx = &self.ctx;
        let staging = ctx.ingest_staging()?;
        let stage = staging.alias();
        let sink = ctx.main_alias();
        let staging_source = Source::Dataset(staging.reference.clone());
        let split = ctx.data_split_condition(stage);
        let deleted = ctx.delete_indicator_condition(stage);

        let mut changed = vec![self.key_match(sink, stage), ctx.record_changed(sink, stage)];
        changed.extend(split.clone());
        let changed = Condition::and(changed);

        let (fields, values) = upsert_columns(ctx, stage);
        let assignments = fields
            .iter()
            .zip(values.into_iter())
            .map(|(f, v)| {
                let value = match v {
                    Value::Field { .. } => Value::subquery(
                        Selection::from(staging_source.clone())
                            .fields(vec![v])
                            .filter(changed.clone()),
                    ),
                    other => other,
                };
                (f.requalify(sink), value)
            })
            .collect();

        let mut update_filter = vec![changed.clone()];
        update_filter.extend(deleted.clone().map(Condition::not));
        let update = Operation::Update {
            target: ctx.main.reference.clone(),
            assignments,
            condition: Some(Condition::exists(
                Selection::from(staging_source.clone()).filter(Condition::and(update_filter)),
            )),
        };

        let (fields, values) = upsert_columns(ctx, stage);
        let mut insert_filter = vec![Condition::not_exists(
            Selection::from(Source::Dataset(ctx.main.reference.clone()))
                .filter(self.key_match(sink, stage)),
        )];
        insert_filter.extend(split.clone());
        insert_filter.extend(deleted.clone().map(Condition::not));
        let insert = Operation::Insert {
            target: ctx.main.reference.clone().without_alias(),
            fields,
            source: Selection::from(staging_source.clone())
                .fields(values)
                .filter(Condition::and(insert_filter)),
        };

        let mut operations = vec![update, insert];
        if let Some(deleted) = deleted {
            let mut delete_filter = vec![self.key_match(sink, stage), deleted];
            delete_filter.extend(split);
            operations.push(Operation::Delete {
                dataset: ctx.main.reference.clone(),
                condition: Some(Condition::exists(
                    Selection::from(staging_source).filter(Condition::and(delete_filter)),
                )),
            });
        }
        Ok(LogicalPlan::of(operations))
    }
}

impl Planner for NontemporalDeltaPlanner {
    fn context(&self) -> &PlanContext {
        &self.ctx
    }

    fn build_logical_plan_for_ingest(&self, resources: &Resources) -> Result<LogicalPlan> {
        if empty_batch_policy(&self.ctx, resources)?.is_some() {
            return Ok(LogicalPlan::empty());
        }
        if self.ctx.capabilities.contains(Capability::Merge) {
            debug!("planning nontemporal delta as MERGE");
            self.merge()
        } else {
            self.update_then_insert()
        }
    }

    fn build_logical_plans_for_post_run_statistics(
        &self,
    ) -> Result<BTreeMap<StatisticName, LogicalPlan>> {
        let ctx = &self.ctx;
        let mut stats = BTreeMap::new();
        stats.insert(
            StatisticName::IncomingRecordCount,
            statistics::incoming_record_count(ctx)?,
        );
        let staging = ctx.ingest_staging()?;
        if let Some(deleted) = ctx.delete_indicator_condition(staging.alias()) {
            let selection = Selection::from(Source::Dataset(staging.reference.clone()))
                .fields(vec![Value::count_all().alias(StatisticName::RowsDeleted.as_str())])
                .filter(deleted);
            stats.insert(StatisticName::RowsDeleted, selection.into());
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Auditing, Capabilities, DataType, DeleteIndicator, Field, NontemporalDelta,
        NontemporalSnapshot,
    };
    use crate::planner::test_support::{datasets, datasets_with, fields, options};
    use crate::planner::planner_for;

    #[test]
    fn test_snapshot_ingest_deletes_then_inserts() {
        let mode = NontemporalSnapshot::new()
            .with_auditing(Auditing::date_time("batch_update_time"))
            .build()
            .unwrap();
        let planner = planner_for(datasets(), mode, options(), Capabilities::none()).unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.operations()[0].kind(), "DELETE");
        match &plan.operations()[1] {
            Operation::Insert { fields, source, .. } => {
                assert_eq!(fields.last().and_then(|f| f.field_name()), Some("batch_update_time"));
                assert_eq!(source.fields.last(), Some(&Value::BatchStartTimestamp));
            }
            other => panic!("unexpected operation {:?}", other),
        }
        assert!(planner
            .build_logical_plans_for_pre_run_statistics()
            .unwrap()
            .contains_key(&StatisticName::RowsDeleted));
    }

    #[test]
    fn test_snapshot_empty_batch_policies() {
        let empty = Resources {
            staging_empty: true,
        };
        let delete = NontemporalSnapshot::new().build().unwrap();
        let planner = planner_for(datasets(), delete, options(), Capabilities::none()).unwrap();
        let plan = planner.build_logical_plan_for_ingest(&empty).unwrap();
        assert_eq!(plan.len(), 1);

        let noop = NontemporalSnapshot::new()
            .with_empty_dataset_handling(EmptyDatasetHandling::NoOp)
            .build()
            .unwrap();
        let planner = planner_for(datasets(), noop, options(), Capabilities::none()).unwrap();
        assert!(planner.build_logical_plan_for_ingest(&empty).unwrap().is_empty());

        let fail = NontemporalSnapshot::new()
            .with_empty_dataset_handling(EmptyDatasetHandling::FailEmptyBatch)
            .build()
            .unwrap();
        let planner = planner_for(datasets(), fail, options(), Capabilities::none()).unwrap();
        assert!(matches!(
            planner.build_logical_plan_for_ingest(&empty),
            Err(IngestError::PlanValidation(_))
        ));
    }

    #[test]
    fn test_delta_uses_merge_when_capable() {
        let mode = NontemporalDelta::new("digest").build().unwrap();
        let planner = planner_for(
            datasets(),
            mode.clone(),
            options(),
            Capabilities::of(&[Capability::Merge]),
        )
        .unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.operations()[0].kind(), "MERGE");

        let planner = planner_for(datasets(), mode, options(), Capabilities::none()).unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        let kinds: Vec<_> = plan.operations().iter().map(|o| o.kind()).collect();
        assert_eq!(kinds, vec!["UPDATE", "INSERT"]);
    }

    #[test]
    fn test_delta_delete_indicator_adds_delete() {
        let mut staging_fields = fields();
        staging_fields.push(Field::new("delete_indicator", DataType::Varchar));
        let mode = NontemporalDelta::new("digest")
            .with_delete_indicator(
                DeleteIndicator::new("delete_indicator", vec!["yes".to_string()]).unwrap(),
            )
            .build()
            .unwrap();
        let planner = planner_for(
            datasets_with(staging_fields),
            mode,
            options(),
            Capabilities::none(),
        )
        .unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.operations()[2].kind(), "DELETE");

        // The indicator column never reaches main.
        assert!(!planner.context().main().schema.contains("delete_indicator"));
    }
}
