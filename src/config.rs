use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::env;
use std::path::Path;

use crate::error::{IngestError, Result};
use crate::planner::PlannerOptions;
use crate::services::generator::GeneratorOptions;
use crate::services::transform::{CaseConversion, DialectId};

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub dialect: String,
    pub case_conversion: String,
    pub planner: PlannerConfig,
    pub batch_id_pattern: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    pub cleanup_staging_data: bool,
    pub collect_statistics: bool,
    pub enable_concurrent_safety: bool,
    pub sample_row_count: u64,
    pub batch_success_status: String,
}

impl GeneratorConfig {
    /// Load from `INGEST_*` environment variables, reading `.env` first
    pub fn from_env() -> Result<Self> {
        // Variables already in the environment win over the file.
        dotenv::dotenv().ok();
        Self::load()
    }

    /// Same as `from_env`, with an explicit env file that must exist
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        dotenv::from_path(path).map_err(|e| {
            IngestError::configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::load()
    }

    fn load() -> Result<Self> {
        let defaults = PlannerOptions::default();
        let mut builder = config::Config::builder()
            .set_default("dialect", "ansi")?
            .set_default("case_conversion", "none")?
            .set_default("planner.cleanup_staging_data", defaults.cleanup_staging_data)?
            .set_default("planner.collect_statistics", defaults.collect_statistics)?
            .set_default("planner.enable_concurrent_safety", defaults.enable_concurrent_safety)?
            .set_default("planner.sample_row_count", defaults.sample_row_count)?
            .set_default("planner.batch_success_status", defaults.batch_success_status)?;

        // Load from environment variables
        if let Ok(dialect) = env::var("INGEST_DIALECT") {
            builder = builder.set_override("dialect", dialect)?;
        }

        if let Ok(case_conversion) = env::var("INGEST_CASE_CONVERSION") {
            builder = builder.set_override("case_conversion", case_conversion)?;
        }

        if let Ok(cleanup) = env::var("INGEST_CLEANUP_STAGING_DATA") {
            builder = builder.set_override("planner.cleanup_staging_data", parse_flag(&cleanup))?;
        }

        if let Ok(collect) = env::var("INGEST_COLLECT_STATISTICS") {
            builder = builder.set_override("planner.collect_statistics", parse_flag(&collect))?;
        }

        if let Ok(safety) = env::var("INGEST_ENABLE_CONCURRENT_SAFETY") {
            builder = builder.set_override("planner.enable_concurrent_safety", parse_flag(&safety))?;
        }

        if let Ok(count) = env::var("INGEST_SAMPLE_ROW_COUNT") {
            builder = builder.set_override("planner.sample_row_count", parse_row_count(&count)?)?;
        }

        if let Ok(pattern) = env::var("INGEST_BATCH_ID_PATTERN") {
            builder = builder.set_override("batch_id_pattern", Some(pattern))?;
        }

        if let Ok(status) = env::var("INGEST_BATCH_SUCCESS_STATUS") {
            builder = builder.set_override("planner.batch_success_status", status)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Resolve into generator options for one run
    ///
    /// # Arguments
    /// * `execution_time` - Clock of the run
    /// * `ingest_run_id` - Run id; a fresh UUID is used when absent
    ///
    /// # Errors
    /// Returns an error when the dialect or case conversion is not recognised
    pub fn generator_options(
        &self,
        execution_time: DateTime<Utc>,
        ingest_run_id: Option<String>,
    ) -> Result<GeneratorOptions> {
        let mut planner = PlannerOptions {
            cleanup_staging_data: self.planner.cleanup_staging_data,
            collect_statistics: self.planner.collect_statistics,
            enable_concurrent_safety: self.planner.enable_concurrent_safety,
            sample_row_count: self.planner.sample_row_count,
            batch_success_status: self.planner.batch_success_status.clone(),
            ..PlannerOptions::default()
        };
        if let Some(run_id) = ingest_run_id {
            planner.ingest_run_id = run_id;
        }
        let mut options = GeneratorOptions::new(DialectId::from_str(&self.dialect)?)
            .with_case_conversion(CaseConversion::from_str(&self.case_conversion)?)
            .with_execution_time(execution_time)
            .with_planner_options(planner);
        if let Some(pattern) = &self.batch_id_pattern {
            options = options.with_batch_id_pattern(pattern.clone());
        }
        Ok(options)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_row_count(value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        IngestError::configuration(format!(
            "INGEST_SAMPLE_ROW_COUNT must be a non-negative integer, got '{}'",
            value
        ))
    })
}
