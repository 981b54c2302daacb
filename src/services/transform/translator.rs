// Dialect Transformer
//
// Looks up a registered dialect and lowers logical plans into ordered SQL strings.
// The registry is built once and never mutated.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::ansi::AnsiDialect;
use super::bigquery::BigQueryDialect;
use super::dialect::{Renderer, SqlDialect};
use super::h2::H2Dialect;
use super::snowflake::SnowflakeDialect;
use crate::error::{IngestError, Result};
use crate::logical_plan::{LogicalPlan, Operation};
use crate::models::Capabilities;

/// SQL dialects with a registered renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DialectId {
    Ansi,
    Snowflake,
    BigQuery,
    H2,
}

impl DialectId {
    /// Parse a dialect identifier, accepting the common spellings
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ansi" | "generic" => Ok(DialectId::Ansi),
            "snowflake" | "sf" => Ok(DialectId::Snowflake),
            "bigquery" | "bq" => Ok(DialectId::BigQuery),
            "h2" => Ok(DialectId::H2),
            _ => Err(IngestError::UnknownDialect(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialectId::Ansi => "ANSI",
            DialectId::Snowflake => "Snowflake",
            DialectId::BigQuery => "BigQuery",
            DialectId::H2 => "H2",
        }
    }
}

/// Identifier case applied while rendering. String literals are never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CaseConversion {
    #[default]
    None,
    ToUpper,
    ToLower,
}

impl CaseConversion {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(CaseConversion::None),
            "upper" | "to_upper" | "toupper" => Ok(CaseConversion::ToUpper),
            "lower" | "to_lower" | "tolower" => Ok(CaseConversion::ToLower),
            other => Err(IngestError::configuration(format!(
                "Unknown case conversion '{}'",
                other
            ))),
        }
    }

    pub fn apply(&self, s: &str) -> String {
        match self {
            CaseConversion::None => s.to_string(),
            CaseConversion::ToUpper => s.to_uppercase(),
            CaseConversion::ToLower => s.to_lowercase(),
        }
    }
}

/// Values fixed for one run and substituted while rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOptions {
    /// Injected clock: the batch start timestamp of the run.
    pub execution_time: DateTime<Utc>,
    pub case_conversion: CaseConversion,
    /// Rendered in place of the batch start timestamp when set.
    pub batch_start_timestamp_pattern: Option<String>,
    /// Rendered verbatim in place of the batch id subquery when set.
    pub batch_id_pattern: Option<String>,
}

impl TransformOptions {
    pub fn new(execution_time: DateTime<Utc>) -> Self {
        Self {
            execution_time,
            case_conversion: CaseConversion::None,
            batch_start_timestamp_pattern: None,
            batch_id_pattern: None,
        }
    }

    pub fn with_case_conversion(mut self, case_conversion: CaseConversion) -> Self {
        self.case_conversion = case_conversion;
        self
    }

    pub fn with_batch_start_timestamp_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.batch_start_timestamp_pattern = Some(pattern.into());
        self
    }

    pub fn with_batch_id_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.batch_id_pattern = Some(pattern.into());
        self
    }

    /// `YYYY-MM-DD HH:MM:SS.ffffff`, or the caller's pattern.
    pub fn batch_start_literal(&self) -> String {
        match &self.batch_start_timestamp_pattern {
            Some(pattern) => pattern.clone(),
            None => self
                .execution_time
                .format("%Y-%m-%d %H:%M:%S%.6f")
                .to_string(),
        }
    }
}

/// Rendered statements of one phase, one per logical operation, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SqlPlan {
    statements: Vec<String>,
}

impl SqlPlan {
    pub fn new(statements: Vec<String>) -> Self {
        Self { statements }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

static REGISTRY: Lazy<HashMap<DialectId, Arc<dyn SqlDialect>>> = Lazy::new(|| {
    let mut dialects: HashMap<DialectId, Arc<dyn SqlDialect>> = HashMap::new();
    dialects.insert(DialectId::Ansi, Arc::new(AnsiDialect));
    dialects.insert(DialectId::Snowflake, Arc::new(SnowflakeDialect));
    dialects.insert(DialectId::BigQuery, Arc::new(BigQueryDialect));
    dialects.insert(DialectId::H2, Arc::new(H2Dialect));
    dialects
});

/// Registered dialect for an identifier
pub fn dialect_for(id: DialectId) -> Result<Arc<dyn SqlDialect>> {
    REGISTRY
        .get(&id)
        .cloned()
        .ok_or_else(|| IngestError::UnknownDialect(id.as_str().to_string()))
}

/// Lowers logical plans with one dialect and one set of run values.
///
/// Holds no mutable state: the same plan always renders to the same text.
#[derive(Clone)]
pub struct Transformer {
    dialect: Arc<dyn SqlDialect>,
    options: TransformOptions,
}

impl Transformer {
    /// Create a transformer for a registered dialect
    ///
    /// # Arguments
    /// * `id` - Dialect to render with
    /// * `options` - Clock, case conversion and placeholder patterns
    pub fn new(id: DialectId, options: TransformOptions) -> Result<Self> {
        Ok(Self::with_dialect(dialect_for(id)?, options))
    }

    /// Create a transformer for a caller-supplied dialect
    pub fn with_dialect(dialect: Arc<dyn SqlDialect>, options: TransformOptions) -> Self {
        Self { dialect, options }
    }

    pub fn dialect(&self) -> DialectId {
        self.dialect.id()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.dialect.capabilities()
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Render every operation of a plan, preserving count and order
    ///
    /// # Errors
    /// Returns a transform error when the dialect cannot render one of the operations
    pub fn generate_physical_plan(&self, plan: &LogicalPlan) -> Result<SqlPlan> {
        let statements = plan
            .operations()
            .iter()
            .map(|operation| self.render(operation))
            .collect::<Result<Vec<_>>>()?;
        Ok(SqlPlan::new(statements))
    }

    /// Render a single operation
    pub fn render(&self, operation: &Operation) -> Result<String> {
        let renderer = Renderer::new(self.dialect.as_ref(), &self.options);
        let sql = renderer.operation(operation)?;
        debug!(dialect = self.dialect.id().as_str(), kind = operation.kind(), sql = %sql, "rendered statement");
        Ok(sql)
    }
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("dialect", &self.dialect.id())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Capability;
    use chrono::TimeZone;

    #[test]
    fn test_dialect_id_parsing() {
        assert_eq!(DialectId::from_str("Snowflake").unwrap(), DialectId::Snowflake);
        assert_eq!(DialectId::from_str("bq").unwrap(), DialectId::BigQuery);
        assert!(matches!(
            DialectId::from_str("oracle"),
            Err(IngestError::UnknownDialect(_))
        ));
    }

    #[test]
    fn test_registry_capabilities() {
        assert!(dialect_for(DialectId::Ansi).unwrap().capabilities().iter().next().is_none());
        let snowflake = dialect_for(DialectId::Snowflake).unwrap().capabilities();
        assert!(snowflake.contains(Capability::TransformWhileCopy));
        assert!(snowflake.contains(Capability::DryRun));
        let bigquery = dialect_for(DialectId::BigQuery).unwrap().capabilities();
        assert!(!bigquery.contains(Capability::TransformWhileCopy));
        assert!(bigquery.contains(Capability::SafeCast));
    }

    #[test]
    fn test_batch_start_literal() {
        let time = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let options = TransformOptions::new(time);
        assert_eq!(options.batch_start_literal(), "2000-01-01 00:00:00.000000");
        let options = options.with_batch_start_timestamp_pattern("{BATCH_START_TS_PATTERN}");
        assert_eq!(options.batch_start_literal(), "{BATCH_START_TS_PATTERN}");
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(CaseConversion::ToUpper.apply("main"), "MAIN");
        assert_eq!(CaseConversion::from_str("lower").unwrap(), CaseConversion::ToLower);
        assert!(CaseConversion::from_str("camel").is_err());
    }
}
