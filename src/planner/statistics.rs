// Run statistics
//
// COUNT based queries whose single scalar result is named after the statistic.

use std::collections::BTreeMap;

use super::context::{aliased, PlanContext};
use super::StatisticName;
use crate::error::Result;
use crate::logical_plan::{Condition, LogicalPlan, Selection, Source, Value};

const SELF_JOIN_ALIAS: &str = "sink2";

fn count(source: Source, condition: Option<Condition>) -> Selection {
    Selection::from(source)
        .fields(vec![Value::count_all()])
        .filter_opt(condition)
}

fn named(selection: Selection, name: StatisticName) -> LogicalPlan {
    let fields = selection
        .fields
        .into_iter()
        .map(|f| f.alias(name.as_str()))
        .collect();
    Selection { fields, ..selection }.into()
}

/// `SELECT COUNT(*) as "incomingRecordCount" FROM staging as stage`
pub fn incoming_record_count(ctx: &PlanContext) -> Result<LogicalPlan> {
    let staging = ctx.ingest_staging()?;
    let condition = ctx.data_split_condition(staging.alias());
    Ok(named(
        count(Source::Dataset(staging.reference.clone()), condition),
        StatisticName::IncomingRecordCount,
    ))
}

/// Row count of main, optionally filtered.
pub fn main_row_count(
    ctx: &PlanContext,
    name: StatisticName,
    condition: Option<Condition>,
) -> LogicalPlan {
    named(count(Source::Dataset(ctx.main.reference.clone()), condition), name)
}

/// `SELECT 0 as "<name>"`
pub fn zero(name: StatisticName) -> LogicalPlan {
    Selection::values(vec![Value::Number(0).alias(name.as_str())]).into()
}

/// Statistics for transaction-milestoned main tables.
///
/// A row updated in this batch is one closed by it that has a matching row opened by it;
/// inserted and terminated rows are the opened and closed rows less the updated ones.
pub fn milestoned(
    ctx: &PlanContext,
    key_fields: &[String],
) -> Result<BTreeMap<StatisticName, LogicalPlan>> {
    let alias = ctx.main_alias();
    let main = Source::Dataset(ctx.main.reference.clone());
    let sink2 = aliased(&ctx.main.reference, SELF_JOIN_ALIAS);

    let has_successor = Condition::exists(
        Selection::from(Source::Dataset(sink2)).filter(Condition::and(vec![
            Condition::fields_match(key_fields, Some(SELF_JOIN_ALIAS), alias),
            ctx.opened_in_batch(Some(SELF_JOIN_ALIAS))?,
        ])),
    );
    let updated = count(
        main.clone(),
        Some(Condition::and(vec![ctx.closed_in_batch(alias)?, has_successor])),
    );
    let opened = count(main.clone(), Some(ctx.opened_in_batch(alias)?));
    let closed = count(main, Some(ctx.closed_in_batch(alias)?));

    let difference = |total: Selection, name: StatisticName| -> LogicalPlan {
        Selection::values(vec![Value::subtract(
            Value::subquery(total),
            Value::subquery(updated.clone()),
        )
        .alias(name.as_str())])
        .into()
    };

    let mut stats = BTreeMap::new();
    stats.insert(StatisticName::IncomingRecordCount, incoming_record_count(ctx)?);
    stats.insert(StatisticName::RowsDeleted, zero(StatisticName::RowsDeleted));
    stats.insert(
        StatisticName::RowsInserted,
        difference(opened, StatisticName::RowsInserted),
    );
    stats.insert(
        StatisticName::RowsTerminated,
        difference(closed, StatisticName::RowsTerminated),
    );
    stats.insert(
        StatisticName::RowsUpdated,
        named(updated, StatisticName::RowsUpdated),
    );
    Ok(stats)
}
