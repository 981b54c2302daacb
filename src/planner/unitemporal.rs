// Unitemporal planners
//
// Transaction-time milestoning: a changed row is closed out by setting its out column to
// this batch and a new open row is inserted. Bitemporal planners reuse the same shapes
// with a validity column mapping.

use std::collections::BTreeMap;

use super::context::PlanContext;
use super::nontemporal::empty_batch_policy;
use super::statistics;
use super::{Planner, Resources, StatisticName};
use crate::error::Result;
use crate::logical_plan::{Condition, LogicalPlan, Operation, Selection, Source, Value};
use crate::models::{EmptyDatasetHandling, IngestMode, Partitioning};

/// Pairs of (main column, staging column).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnMapping {
    pub keys: Vec<(String, String)>,
    pub columns: Vec<(String, String)>,
}

impl ColumnMapping {
    /// Same names on both sides.
    pub fn identity(ctx: &PlanContext) -> Self {
        Self {
            keys: ctx
                .primary_keys
                .iter()
                .map(|k| (k.clone(), k.clone()))
                .collect(),
            columns: ctx
                .staging_data_fields()
                .into_iter()
                .map(|f| (f.clone(), f))
                .collect(),
        }
    }

    pub fn key_match(&self, sink: Option<&str>, stage: Option<&str>) -> Condition {
        Condition::and(
            self.keys
                .iter()
                .map(|(m, s)| Condition::equals(Value::field(sink, m.clone()), Value::field(stage, s.clone())))
                .collect(),
        )
    }

    pub fn main_keys(&self) -> Vec<String> {
        self.keys.iter().map(|(m, _)| m.clone()).collect()
    }

    /// Insert column list and staged values, followed by the open milestone columns.
    pub fn open_row_insert(&self, ctx: &PlanContext, stage: Option<&str>) -> Result<(Vec<Value>, Vec<Value>)> {
        let mut fields: Vec<Value> = self
            .columns
            .iter()
            .map(|(m, _)| Value::unqualified(m.clone()))
            .collect();
        let mut values: Vec<Value> = self
            .columns
            .iter()
            .map(|(_, s)| Value::field(stage, s.clone()))
            .collect();
        let (milestone_fields, milestone_values) = ctx.open_row_columns()?;
        fields.extend(milestone_fields);
        values.extend(milestone_values);
        Ok((fields, values))
    }
}

fn close_out(ctx: &PlanContext, conditions: Vec<Condition>) -> Result<Operation> {
    Ok(Operation::Update {
        target: ctx.main.reference.clone(),
        assignments: ctx.close_assignments(ctx.main_alias())?,
        condition: Some(Condition::and(conditions)),
    })
}

/// Partition filter on main: explicit value lists, or the partitions present in staging.
fn partition_scope(
    ctx: &PlanContext,
    partitioning: &Partitioning,
    staging: &Source,
    stage: Option<&str>,
    correlated: bool,
) -> Vec<Condition> {
    let sink = ctx.main_alias();
    let mut conditions = Vec::new();
    let mut staged_partitions = Vec::new();
    for field in &partitioning.fields {
        match partitioning.values.get(field) {
            Some(values) => conditions.push(Condition::in_values(
                Value::field(sink, field.clone()),
                values.iter().map(|v| Value::string(v.clone())).collect(),
            )),
            None => staged_partitions.push(Condition::equals(
                Value::field(sink, field.clone()),
                Value::field(stage, field.clone()),
            )),
        }
    }
    if !staged_partitions.is_empty() {
        if correlated {
            conditions.extend(staged_partitions);
        } else {
            conditions.push(Condition::exists(
                Selection::from(staging.clone()).filter(Condition::and(staged_partitions)),
            ));
        }
    }
    conditions
}

/// Close out rows missing from the batch and insert rows whose digest is not current.
pub(crate) fn snapshot_plan(
    ctx: &PlanContext,
    mapping: &ColumnMapping,
    partitioning: Option<&Partitioning>,
    resources: &Resources,
) -> Result<LogicalPlan> {
    let sink = ctx.main_alias();
    let open = ctx.open_condition(sink)?;

    match empty_batch_policy(ctx, resources)? {
        Some(EmptyDatasetHandling::DeleteTargetData) => {
            let mut conditions = vec![open];
            if let Some(partitioning) = partitioning {
                for (field, values) in &partitioning.values {
                    conditions.push(Condition::in_values(
                        Value::field(sink, field.clone()),
                        values.iter().map(|v| Value::string(v.clone())).collect(),
                    ));
                }
            }
            return Ok(close_out(ctx, conditions)?.into());
        }
        Some(_) => return Ok(LogicalPlan::empty()),
        None => {}
    }

    let staging = ctx.ingest_staging()?;
    let stage = staging.alias();
    let staging_source = Source::Dataset(staging.reference.clone());
    let digest = ctx.mode.digest_field().unwrap_or_default();

    let unchanged_in_batch = Condition::and(vec![
        mapping.key_match(sink, stage),
        Condition::equals(Value::field(sink, digest), Value::field(stage, digest)),
    ]);
    let mut close_conditions = vec![
        open.clone(),
        Condition::not_exists(Selection::from(staging_source.clone()).filter(unchanged_in_batch)),
    ];
    let mut current_conditions = vec![open];
    if let Some(partitioning) = partitioning {
        close_conditions.extend(partition_scope(ctx, partitioning, &staging_source, stage, false));
        current_conditions.extend(partition_scope(ctx, partitioning, &staging_source, stage, true));
    }

    let current_digests = Selection::from(Source::Dataset(ctx.main.reference.clone()))
        .fields(vec![Value::field(sink, digest)])
        .filter(Condition::and(current_conditions));
    let (fields, values) = mapping.open_row_insert(ctx, stage)?;
    let insert = Operation::Insert {
        target: ctx.main.reference.clone().without_alias(),
        fields,
        source: Selection::from(staging_source).fields(values).filter(Condition::not(
            Condition::in_subquery(Value::field(stage, digest), current_digests),
        )),
    };

    Ok(LogicalPlan::of(vec![close_out(ctx, close_conditions)?, insert]))
}

/// Close out current rows the batch changes or deletes, then insert the changed rows.
pub(crate) fn delta_plan(
    ctx: &PlanContext,
    mapping: &ColumnMapping,
    resources: &Resources,
) -> Result<LogicalPlan> {
    if empty_batch_policy(ctx, resources)?.is_some() {
        return Ok(LogicalPlan::empty());
    }
    let sink = ctx.main_alias();
    let staging = ctx.ingest_staging()?;
    let stage = staging.alias();
    let staging_source = Source::Dataset(staging.reference.clone());
    let split = ctx.data_split_condition(stage);
    let deleted = ctx.delete_indicator_condition(stage);

    let superseded = match &deleted {
        Some(deleted) => Condition::or(vec![ctx.record_changed(sink, stage), deleted.clone()]),
        None => ctx.record_changed(sink, stage),
    };
    let mut staged_match = vec![mapping.key_match(sink, stage), superseded];
    staged_match.extend(split.clone());
    let close = close_out(
        ctx,
        vec![
            ctx.open_condition(sink)?,
            Condition::exists(Selection::from(staging_source.clone()).filter(Condition::and(staged_match))),
        ],
    )?;

    let already_current = Condition::and(vec![
        ctx.open_condition(sink)?,
        ctx.record_unchanged(sink, stage),
        mapping.key_match(sink, stage),
    ]);
    let mut insert_filter = vec![Condition::not_exists(
        Selection::from(Source::Dataset(ctx.main.reference.clone())).filter(already_current),
    )];
    insert_filter.extend(split);
    insert_filter.extend(deleted.map(Condition::not));

    let (fields, values) = mapping.open_row_insert(ctx, stage)?;
    let insert = Operation::Insert {
        target: ctx.main.reference.clone().without_alias(),
        fields,
        source: Selection::from(staging_source)
            .fields(values)
            .filter(Condition::and(insert_filter)),
    };
    Ok(LogicalPlan::of(vec![close, insert]))
}

pub struct UnitemporalSnapshotPlanner {
    ctx: PlanContext,
    mapping: ColumnMapping,
}

impl UnitemporalSnapshotPlanner {
    pub fn new(ctx: PlanContext) -> Self {
        let mapping = ColumnMapping::identity(&ctx);
        Self { ctx, mapping }
    }

    fn partitioning(&self) -> Option<&Partitioning> {
        match &self.ctx.mode {
            IngestMode::UnitemporalSnapshot(m) => m.partitioning.as_ref(),
            _ => None,
        }
    }
}

impl Planner for UnitemporalSnapshotPlanner {
    fn context(&self) -> &PlanContext {
        &self.ctx
    }

    fn build_logical_plan_for_ingest(&self, resources: &Resources) -> Result<LogicalPlan> {
        snapshot_plan(&self.ctx, &self.mapping, self.partitioning(), resources)
    }

    fn build_logical_plans_for_post_run_statistics(
        &self,
    ) -> Result<BTreeMap<StatisticName, LogicalPlan>> {
        statistics::milestoned(&self.ctx, &self.mapping.main_keys())
    }
}

pub struct UnitemporalDeltaPlanner {
    ctx: PlanContext,
    mapping: ColumnMapping,
}

impl UnitemporalDeltaPlanner {
    pub fn new(ctx: PlanContext) -> Self {
        let mapping = ColumnMapping::identity(&ctx);
        Self { ctx, mapping }
    }
}

impl Planner for UnitemporalDeltaPlanner {
    fn context(&self) -> &PlanContext {
        &self.ctx
    }

    fn build_logical_plan_for_ingest(&self, resources: &Resources) -> Result<LogicalPlan> {
        delta_plan(&self.ctx, &self.mapping, resources)
    }

    fn build_logical_plans_for_post_run_statistics(
        &self,
    ) -> Result<BTreeMap<StatisticName, LogicalPlan>> {
        statistics::milestoned(&self.ctx, &self.mapping.main_keys())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Capabilities, DataType, DeleteIndicator, Field, TransactionMilestoning, UnitemporalDelta,
        UnitemporalSnapshot,
    };
    use crate::planner::planner_for;
    use crate::planner::test_support::{datasets, datasets_with, fields, options};

    fn snapshot(partitioning: Option<Partitioning>) -> IngestMode {
        let mut mode = UnitemporalSnapshot::new(
            "digest",
            TransactionMilestoning::date_time("batch_time_in", "batch_time_out"),
        );
        if let Some(p) = partitioning {
            mode = mode.with_partitioning(p);
        }
        mode.build().unwrap()
    }

    #[test]
    fn test_snapshot_update_precedes_insert() {
        let planner = planner_for(datasets(), snapshot(None), options(), Capabilities::none()).unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        let kinds: Vec<_> = plan.operations().iter().map(|o| o.kind()).collect();
        assert_eq!(kinds, vec!["UPDATE", "INSERT"]);
    }

    #[test]
    fn test_snapshot_empty_batch_closes_everything() {
        let planner = planner_for(datasets(), snapshot(None), options(), Capabilities::none()).unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources {
                staging_empty: true,
            })
            .unwrap();
        assert_eq!(plan.len(), 1);
        match &plan.operations()[0] {
            Operation::Update { condition, .. } => {
                assert!(matches!(condition, Some(Condition::Equals(_, _))));
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_partition_scope_added() {
        let partitioning = Partitioning::fields(vec!["biz_date".to_string()]);
        let planner = planner_for(
            datasets(),
            snapshot(Some(partitioning)),
            options(),
            Capabilities::none(),
        )
        .unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        match &plan.operations()[0] {
            Operation::Update {
                condition: Some(Condition::And(parts)),
                ..
            } => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[2], Condition::Exists(_)));
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_delta_with_delete_indicator() {
        let mut staging_fields = fields();
        staging_fields.push(Field::new("delete_indicator", DataType::Varchar));
        let mode = UnitemporalDelta::new(
            "digest",
            TransactionMilestoning::batch_id("batch_id_in", "batch_id_out"),
        )
        .with_delete_indicator(
            DeleteIndicator::new("delete_indicator", vec!["yes".to_string(), "1".to_string()])
                .unwrap(),
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
        match &plan.operations()[1] {
            Operation::Insert { fields, source, .. } => {
                assert_eq!(fields.len(), 7);
                assert!(matches!(source.condition, Some(Condition::And(ref c)) if c.len() == 2));
            }
            other => panic!("unexpected operation {:?}", other),
        }
        let stats = planner.build_logical_plans_for_post_run_statistics().unwrap();
        assert_eq!(stats.len(), 5);
    }
}
