// Batch bookkeeping
//
// Metadata row appended per run, plus the lock and idempotency statements the execution
// layer uses to coordinate concurrent writers.

use serde_json::{Map, Value as Json};

use super::context::PlanContext;
use crate::logical_plan::{Condition, FunctionName, Operation, Selection, Source, Value};
use crate::models::{IngestMode, StagingDataset};

pub const BULK_LOAD_BATCH_STATUS_PLACEHOLDER: &str = "{BULK_LOAD_BATCH_STATUS_PLACEHOLDER}";
pub const COMPLETED_REQUESTS_FIELD: &str = "completedRequests";

/// Append one row describing this batch to the metadata table.
pub fn build_metadata_insert(ctx: &PlanContext) -> Operation {
    let metadata = &ctx.metadata;
    let status = match ctx.mode {
        IngestMode::BulkLoad(_) => BULK_LOAD_BATCH_STATUS_PLACEHOLDER.to_string(),
        _ => ctx.options.batch_success_status.clone(),
    };

    let mut fields = vec![
        Value::unqualified(metadata.table_name_field.clone()),
        Value::unqualified(metadata.table_batch_id_field.clone()),
        Value::unqualified(metadata.batch_start_ts_field.clone()),
        Value::unqualified(metadata.batch_end_ts_field.clone()),
        Value::unqualified(metadata.batch_status_field.clone()),
    ];
    let mut values = vec![
        Value::string(ctx.main.name()),
        ctx.batch_id(),
        Value::BatchStartTimestamp,
        Value::BatchEndTimestamp,
        Value::string(status),
    ];

    if let Some(source_info) = batch_source_info(ctx) {
        fields.push(Value::unqualified(metadata.batch_source_info_field.clone()));
        values.push(parse_json(source_info));
    }

    if !ctx.options.additional_metadata.is_empty() {
        let blob: Map<String, Json> = ctx
            .options
            .additional_metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields.push(Value::unqualified(metadata.additional_metadata_field.clone()));
        values.push(parse_json(Json::Object(blob)));
    }

    if let Some(request_id) = &ctx.options.ingest_request_id {
        fields.push(Value::unqualified(metadata.ingest_request_id_field.clone()));
        values.push(Value::string(request_id.clone()));
    }

    Operation::Insert {
        target: metadata.reference().without_alias(),
        fields,
        source: Selection::values(values),
    }
}

fn parse_json(json: Json) -> Value {
    Value::function(FunctionName::ParseJson, vec![Value::string(json.to_string())])
}

/// Staged file paths/patterns and event id of a bulk load.
fn batch_source_info(ctx: &PlanContext) -> Option<Json> {
    let files = match (&ctx.mode, &ctx.staging) {
        (IngestMode::BulkLoad(_), StagingDataset::StagedFiles(files)) => files,
        _ => return None,
    };
    let mut info = Map::new();
    if let Some(event_id) = &ctx.options.bulk_load_event_id {
        info.insert("event_id".to_string(), Json::String(event_id.clone()));
    }
    let properties = &files.properties;
    if !properties.file_paths.is_empty() {
        info.insert("file_paths".to_string(), Json::from(properties.file_paths.clone()));
    }
    if !properties.file_patterns.is_empty() {
        info.insert(
            "file_patterns".to_string(),
            Json::from(properties.file_patterns.clone()),
        );
    }
    Some(Json::Object(info))
}

/// Insert the lock row unless one already exists for the table.
pub fn build_lock_initialize(ctx: &PlanContext) -> Operation {
    let lock = &ctx.lock;
    let reference = lock.reference();
    Operation::Insert {
        target: reference.clone().without_alias(),
        fields: vec![
            Value::unqualified(lock.insert_ts_field.clone()),
            Value::unqualified(lock.table_name_field.clone()),
        ],
        source: Selection::values(vec![Value::BatchStartTimestamp, Value::string(ctx.main.name())])
            .filter(Condition::not_exists(Selection::from(Source::Dataset(reference)))),
    }
}

/// Touch the lock row; the warehouse serialises concurrent updates on it.
pub fn build_lock_acquire(ctx: &PlanContext) -> Operation {
    let lock = &ctx.lock;
    let reference = lock.reference();
    Operation::Update {
        assignments: vec![(
            Value::field_of_ref(&reference, lock.last_used_ts_field.clone()),
            Value::BatchStartTimestamp,
        )],
        target: reference,
        condition: None,
    }
}

/// Count completed batches for the caller's request id.
pub fn build_idempotency_check(ctx: &PlanContext) -> Option<Selection> {
    let request_id = ctx.options.ingest_request_id.as_ref()?;
    let metadata = &ctx.metadata;
    let reference = metadata.reference();
    let alias = reference.alias.clone();
    let condition = Condition::and(vec![
        ctx.metadata_table_filter(),
        Condition::equals(
            Value::field(alias.as_deref(), metadata.ingest_request_id_field.clone()),
            Value::string(request_id.clone()),
        ),
        Condition::equals(
            Value::field(alias.as_deref(), metadata.batch_status_field.clone()),
            Value::string(ctx.options.batch_success_status.clone()),
        ),
    ]);
    Some(
        Selection::from(Source::Dataset(reference))
            .fields(vec![Value::count_all().alias(COMPLETED_REQUESTS_FIELD)])
            .filter(condition),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Capabilities, NontemporalSnapshot};
    use crate::planner::test_support::{datasets, options};

    fn context(options: crate::planner::PlannerOptions) -> PlanContext {
        PlanContext::new(
            datasets(),
            NontemporalSnapshot::new().build().unwrap(),
            options,
            Capabilities::none(),
        )
        .unwrap()
    }

    #[test]
    fn test_metadata_insert_columns() {
        let mut opts = options();
        opts.additional_metadata
            .insert("watermark".to_string(), Json::from("abc"));
        opts.ingest_request_id = Some("req-1".to_string());
        let ctx = context(opts);

        match build_metadata_insert(&ctx) {
            Operation::Insert { fields, source, .. } => {
                let names: Vec<_> = fields.iter().filter_map(|f| f.field_name()).collect();
                assert_eq!(
                    names,
                    vec![
                        "table_name",
                        "table_batch_id",
                        "batch_start_ts_utc",
                        "batch_end_ts_utc",
                        "batch_status",
                        "additional_metadata",
                        "ingest_request_id"
                    ]
                );
                assert!(source.source.is_none());
                assert_eq!(source.fields[4], Value::string("DONE"));
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_idempotency_requires_request_id() {
        assert!(build_idempotency_check(&context(options())).is_none());

        let mut opts = options();
        opts.ingest_request_id = Some("req-1".to_string());
        let selection = build_idempotency_check(&context(opts)).unwrap();
        assert!(matches!(selection.condition, Some(Condition::And(ref c)) if c.len() == 3));
    }
}
