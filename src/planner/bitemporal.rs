use std::collections::BTreeMap;

use super::context::PlanContext;
use super::statistics;
use super::unitemporal::{delta_plan, snapshot_plan, ColumnMapping};
use super::{Planner, Resources, StatisticName};
use crate::error::{IngestError, Result};
use crate::logical_plan::LogicalPlan;
use crate::models::{IngestMode, ValidityMilestoning};

/// Bitemporal snapshot and delta where staging supplies both validity bounds.
///
/// Staged `source_from`/`source_through` columns land in main's validity columns, and
/// the validity start joins the business key.
pub struct BitemporalPlanner {
    ctx: PlanContext,
    mapping: ColumnMapping,
}

impl BitemporalPlanner {
    pub fn new(ctx: PlanContext) -> Result<Self> {
        let validity = match &ctx.mode {
            IngestMode::BitemporalSnapshot(m) => m.validity.clone(),
            IngestMode::BitemporalDelta(m) => m.validity.clone(),
            other => {
                return Err(IngestError::configuration(format!(
                    "{} is not a bitemporal mode",
                    other.name()
                )))
            }
        };
        let mapping = validity_mapping(&ctx, &validity);
        Ok(Self { ctx, mapping })
    }
}

fn validity_mapping(ctx: &PlanContext, validity: &ValidityMilestoning) -> ColumnMapping {
    let rename = |field: &str| -> String {
        if field == validity.source_from_field {
            validity.from_field.clone()
        } else if field == validity.source_through_field {
            validity.through_field.clone()
        } else {
            field.to_string()
        }
    };

    let mut keys: Vec<(String, String)> = ctx
        .primary_keys
        .iter()
        .filter(|k| **k != validity.source_from_field && **k != validity.source_through_field)
        .map(|k| (k.clone(), k.clone()))
        .collect();
    keys.push((validity.from_field.clone(), validity.source_from_field.clone()));

    let columns = ctx
        .staging_data_fields()
        .into_iter()
        .map(|f| (rename(&f), f))
        .collect();
    ColumnMapping { keys, columns }
}

impl Planner for BitemporalPlanner {
    fn context(&self) -> &PlanContext {
        &self.ctx
    }

    fn build_logical_plan_for_ingest(&self, resources: &Resources) -> Result<LogicalPlan> {
        match &self.ctx.mode {
            IngestMode::BitemporalSnapshot(_) => snapshot_plan(&self.ctx, &self.mapping, None, resources),
            _ => delta_plan(&self.ctx, &self.mapping, resources),
        }
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
    use crate::logical_plan::Operation;
    use crate::models::{
        BitemporalDelta, BitemporalSnapshot, Capabilities, DataType, Field,
        TransactionMilestoning,
    };
    use crate::planner::planner_for;
    use crate::planner::test_support::{datasets_with, options};

    fn staging_fields() -> Vec<Field> {
        vec![
            Field::new("id", DataType::Integer).primary_key(),
            Field::new("name", DataType::Varchar).primary_key(),
            Field::new("amount", DataType::Double),
            Field::new("validity_from_reference", DataType::DateTime).primary_key(),
            Field::new("validity_through_reference", DataType::DateTime),
            Field::new("digest", DataType::Varchar),
        ]
    }

    fn validity() -> ValidityMilestoning {
        ValidityMilestoning::source_specifies_from_and_through(
            "validity_from_target",
            "validity_through_target",
            "validity_from_reference",
            "validity_through_reference",
        )
    }

    #[test]
    fn test_validity_columns_renamed() {
        let mode = BitemporalSnapshot::new(
            "digest",
            TransactionMilestoning::batch_id("batch_id_in", "batch_id_out"),
            validity(),
        )
        .build()
        .unwrap();
        let planner = planner_for(
            datasets_with(staging_fields()),
            mode,
            options(),
            Capabilities::none(),
        )
        .unwrap();

        let main = planner.context().main();
        assert!(main.schema.contains("validity_from_target"));
        assert!(!main.schema.contains("validity_from_reference"));
        assert_eq!(
            main.schema.primary_keys(),
            vec!["id", "name", "validity_from_target", "batch_id_in"]
        );

        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        match &plan.operations()[1] {
            Operation::Insert { fields, .. } => {
                let names: Vec<_> = fields.iter().filter_map(|f| f.field_name()).collect();
                assert!(names.contains(&"validity_through_target"));
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_delta_plans_close_and_insert() {
        let mode = BitemporalDelta::new(
            "digest",
            TransactionMilestoning::date_time("batch_time_in", "batch_time_out"),
            validity(),
        )
        .build()
        .unwrap();
        let planner = planner_for(
            datasets_with(staging_fields()),
            mode,
            options(),
            Capabilities::none(),
        )
        .unwrap();
        let plan = planner
            .build_logical_plan_for_ingest(&Resources::default())
            .unwrap();
        assert_eq!(plan.len(), 2);
        let stats = planner.build_logical_plans_for_post_run_statistics().unwrap();
        assert!(stats.contains_key(&StatisticName::RowsTerminated));
    }
}
