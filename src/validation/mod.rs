// Dataset validation
//
// Structural checks of a table family against the ingest mode, run once when a planner
// is built.

use crate::error::{IngestError, Result};
use crate::models::{Datasets, IngestMode, Schema, StagingDataset, VersioningStrategy};

/// Check that the datasets can be ingested with `mode`.
///
/// # Arguments
/// * `datasets` - Main, staging and bookkeeping tables of the run
/// * `mode` - Already constructed ingest mode
///
/// # Returns
/// * `Ok(())` when planning can proceed, the first violation otherwise
pub fn validate_datasets(datasets: &Datasets, mode: &IngestMode) -> Result<()> {
    match (mode, &datasets.staging) {
        (IngestMode::BulkLoad(_), StagingDataset::StagedFiles(files)) => {
            reject_primary_keys(&files.schema, "staged files")?;
            reject_primary_keys(&datasets.main.schema, "main")?;
        }
        (IngestMode::BulkLoad(_), StagingDataset::Table(_)) => {
            return Err(IngestError::plan_validation(
                "BulkLoad requires a staged files dataset",
            ));
        }
        (_, StagingDataset::StagedFiles(_)) => {
            return Err(IngestError::plan_validation(format!(
                "{} requires a staging table, got staged files",
                mode.name()
            )));
        }
        (_, StagingDataset::Table(_)) => {}
    }

    let staging = datasets.staging.schema();
    if !matches!(mode, IngestMode::BulkLoad(_)) {
        validate_staging_fields(staging, mode)?;
        validate_versioning(staging, mode)?;
    }
    validate_main_fields(&datasets.main.schema, mode)
}

fn reject_primary_keys(schema: &Schema, role: &str) -> Result<()> {
    let keys = schema.primary_keys();
    if keys.is_empty() {
        return Ok(());
    }
    Err(IngestError::configuration(format!(
        "BulkLoad does not support primary keys, {} declares {}",
        role,
        keys.join(", ")
    )))
}

fn require(schema: &Schema, field: &str, what: &str) -> Result<()> {
    if schema.contains(field) {
        return Ok(());
    }
    Err(IngestError::plan_validation(format!(
        "{} field '{}' not found",
        what, field
    )))
}

fn validate_staging_fields(staging: &Schema, mode: &IngestMode) -> Result<()> {
    if let Some(digest) = mode.digest_field() {
        require(staging, digest, "Staging digest")?;
    }
    if let Some(indicator) = mode.delete_indicator() {
        require(staging, &indicator.field, "Staging delete indicator")?;
    }
    match mode {
        IngestMode::UnitemporalSnapshot(m) => {
            if let Some(partitioning) = &m.partitioning {
                for field in &partitioning.fields {
                    require(staging, field, "Staging partition")?;
                }
            }
        }
        IngestMode::BitemporalSnapshot(m) => {
            require(staging, &m.validity.source_from_field, "Staging validity from")?;
            require(staging, &m.validity.source_through_field, "Staging validity through")?;
        }
        IngestMode::BitemporalDelta(m) => {
            require(staging, &m.validity.source_from_field, "Staging validity from")?;
            require(staging, &m.validity.source_through_field, "Staging validity through")?;
        }
        _ => {}
    }
    Ok(())
}

fn validate_versioning(staging: &Schema, mode: &IngestMode) -> Result<()> {
    let versioning = mode.versioning();
    if matches!(versioning, VersioningStrategy::NoVersioning) {
        return Ok(());
    }
    if staging.primary_keys().is_empty() {
        return Err(IngestError::plan_validation(format!(
            "{} versioning requires primary keys on staging",
            versioning.name()
        )));
    }
    if let Some(version) = versioning.version_field() {
        require(staging, version, "Staging version")?;
    }
    if let Some(split) = versioning.data_split_field() {
        if !versioning.performs_stage_versioning() {
            require(staging, split, "Staging data split")?;
        }
    }
    Ok(())
}

/// An explicit main schema must already hold the bookkeeping columns the mode writes.
fn validate_main_fields(main: &Schema, mode: &IngestMode) -> Result<()> {
    if main.is_empty() {
        return Ok(());
    }
    if let Some(milestoning) = mode.milestoning() {
        for field in milestoning.fields() {
            require(main, field, "Main milestoning")?;
        }
    }
    if let Some(audit) = mode.auditing().and_then(|a| a.field()) {
        require(main, audit, "Main audit")?;
    }
    match mode {
        IngestMode::BulkLoad(m) => require(main, &m.batch_id_field, "Main batch id")?,
        IngestMode::BitemporalSnapshot(m) => {
            require(main, &m.validity.from_field, "Main validity from")?;
            require(main, &m.validity.through_field, "Main validity through")?;
        }
        IngestMode::BitemporalDelta(m) => {
            require(main, &m.validity.from_field, "Main validity from")?;
            require(main, &m.validity.through_field, "Main validity through")?;
        }
        _ => {}
    }
    Ok(())
}
