// Deduplication and stage versioning
//
// Rewrites the staged batch into the temp staging table, one row per business key
// (or one ranked row per version), and builds the duplicate/data-error check queries.

use std::collections::BTreeMap;

use super::context::{staging_carried_fields, PlanContext, DEDUP_COUNT_FIELD, VERSION_RANK_FIELD};
use super::DedupErrorCheck;
use crate::error::Result;
use crate::logical_plan::{
    Condition, FunctionName, LogicalPlan, Operation, Order, Selection, Source, Value,
    WindowFunction,
};
use crate::models::{DeduplicationStrategy, VersioningStrategy};

const DISTINCT_ROWS_FIELD: &str = "distinct_rows";
const ERROR_COUNT_FIELD: &str = "error_count";

/// `DELETE` the temp staging table, then `INSERT` the deduplicated/versioned batch.
pub fn build_deduplication_and_versioning(ctx: &PlanContext) -> Result<LogicalPlan> {
    let temp = match &ctx.temp_staging {
        Some(temp) => temp,
        None => return Ok(LogicalPlan::empty()),
    };
    let staging = ctx.staging_table()?;
    let alias = staging.alias();
    let carried: Vec<String> = staging_carried_fields(staging, &ctx.mode)
        .into_iter()
        .map(|f| f.name)
        .collect();

    let qualified = |names: &[String]| -> Vec<Value> {
        names.iter().map(|n| Value::field(alias, n.clone())).collect()
    };

    let mut columns = carried;
    let mut source = Source::Dataset(staging.reference.clone());
    let mut selection = Selection::from(source.clone()).fields(qualified(&columns));

    if ctx.mode.deduplication().is_enabled() {
        let mut fields = qualified(&columns);
        fields.push(Value::count_all().alias(DEDUP_COUNT_FIELD));
        selection = Selection::from(source)
            .fields(fields)
            .group_by(qualified(&columns));
        columns.push(DEDUP_COUNT_FIELD.to_string());
        source = selection.clone().into_source(alias.unwrap_or_default());
    }

    match ctx.mode.versioning() {
        VersioningStrategy::MaxVersion {
            version_field,
            perform_stage_versioning: true,
            ..
        } => {
            let mut ranked_fields = qualified(&columns);
            ranked_fields.push(rank(ctx, alias, version_field, Order::Desc).alias(VERSION_RANK_FIELD));
            let ranked = Selection::from(source).fields(ranked_fields);
            selection = Selection::from(ranked.into_source(alias.unwrap_or_default()))
                .fields(qualified(&columns))
                .filter(Condition::equals(
                    Value::field(alias, VERSION_RANK_FIELD),
                    Value::Number(1),
                ));
        }
        VersioningStrategy::AllVersions {
            version_field,
            data_split_field,
            perform_stage_versioning: true,
            ..
        } => {
            let mut fields = qualified(&columns);
            fields.push(rank(ctx, alias, version_field, Order::Asc).alias(data_split_field.clone()));
            selection = Selection::from(source).fields(fields);
            columns.push(data_split_field.clone());
        }
        _ => {}
    }

    Ok(LogicalPlan::of(vec![
        Operation::delete_all(temp.reference.clone()),
        Operation::Insert {
            target: temp.reference.clone().without_alias(),
            fields: columns.into_iter().map(Value::unqualified).collect(),
            source: selection,
        },
    ]))
}

fn rank(ctx: &PlanContext, alias: Option<&str>, version_field: &str, order: Order) -> Value {
    Value::Window(Box::new(WindowFunction {
        function: FunctionName::DenseRank,
        partition_by: ctx
            .primary_keys
            .iter()
            .map(|k| Value::field(alias, k.clone()))
            .collect(),
        order_by: vec![(Value::field(alias, version_field), order)],
    }))
}

/// Duplicate checks for FailOnDuplicates, data-error checks whenever the stage is versioned.
pub fn build_error_checks(ctx: &PlanContext) -> Result<BTreeMap<DedupErrorCheck, LogicalPlan>> {
    let mut checks = BTreeMap::new();
    let temp = match &ctx.temp_staging {
        Some(temp) => temp,
        None => return Ok(checks),
    };
    let alias = temp.alias();
    let source = Source::Dataset(temp.reference.clone());
    let limit = ctx.options.sample_row_count;

    if ctx.mode.deduplication() == DeduplicationStrategy::FailOnDuplicates {
        let count = Value::field(alias, DEDUP_COUNT_FIELD);
        checks.insert(
            DedupErrorCheck::MaxDuplicates,
            Selection::from(source.clone())
                .fields(vec![Value::function(FunctionName::Max, vec![count.clone()])
                    .alias(DedupErrorCheck::MaxDuplicates.as_str())])
                .into(),
        );

        let key_fields = if ctx.primary_keys.is_empty() {
            ctx.staging_data_fields()
        } else {
            ctx.primary_keys.clone()
        };
        let mut fields: Vec<Value> = key_fields
            .iter()
            .map(|k| Value::field(alias, k.clone()))
            .collect();
        fields.push(count.clone().alias(ERROR_COUNT_FIELD));
        checks.insert(
            DedupErrorCheck::DuplicateRows,
            Selection::from(source.clone())
                .fields(fields)
                .filter(Condition::GreaterThan(count, Value::Number(1)))
                .limit(limit)
                .into(),
        );
    }

    let (version_field, digest_field) = match (ctx.mode.versioning(), ctx.mode.digest_field()) {
        (versioning, Some(digest)) if versioning.performs_stage_versioning() => {
            match versioning.version_field() {
                Some(version) => (version.to_string(), digest.to_string()),
                None => return Ok(checks),
            }
        }
        _ => return Ok(checks),
    };

    let mut group_by: Vec<Value> = ctx
        .primary_keys
        .iter()
        .map(|k| Value::field(alias, k.clone()))
        .collect();
    group_by.push(Value::field(alias, version_field));
    let distinct_digests = Value::function(
        FunctionName::Count,
        vec![Value::Distinct(Box::new(Value::field(alias, digest_field)))],
    );

    let per_version = Selection::from(source.clone())
        .fields(vec![distinct_digests.clone().alias(DISTINCT_ROWS_FIELD)])
        .group_by(group_by.clone());
    checks.insert(
        DedupErrorCheck::MaxDataErrors,
        Selection::from(per_version.into_source(alias.unwrap_or_default()))
            .fields(vec![Value::function(
                FunctionName::Max,
                vec![Value::field(alias, DISTINCT_ROWS_FIELD)],
            )
            .alias(DedupErrorCheck::MaxDataErrors.as_str())])
            .into(),
    );

    let mut fields = group_by.clone();
    fields.push(distinct_digests.clone().alias(ERROR_COUNT_FIELD));
    checks.insert(
        DedupErrorCheck::DataErrorRows,
        Selection::from(source)
            .fields(fields)
            .group_by(group_by)
            .having(Condition::GreaterThan(distinct_digests, Value::Number(1)))
            .limit(limit)
            .into(),
    );

    Ok(checks)
}
