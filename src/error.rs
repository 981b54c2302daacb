use thiserror::Error;

/// Errors raised while building or lowering ingestion plans.
///
/// Every variant is surfaced synchronously and is never retried by the generator itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Invalid mode or strategy composition, detected when the value is constructed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A structural precondition failed while a plan was being built.
    #[error("Plan validation error: {0}")]
    PlanValidation(String),

    /// A logical node cannot be lowered by the selected dialect.
    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),
}

impl IngestError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        IngestError::Configuration(msg.into())
    }

    pub fn plan_validation(msg: impl Into<String>) -> Self {
        IngestError::PlanValidation(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        IngestError::Transform(msg.into())
    }

    /// Short machine-readable code, mirrored in logs.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Configuration(_) => "CONFIGURATION_ERROR",
            IngestError::PlanValidation(_) => "PLAN_VALIDATION_ERROR",
            IngestError::Transform(_) => "TRANSFORM_ERROR",
            IngestError::UnknownDialect(_) => "UNKNOWN_DIALECT",
        }
    }
}

impl From<config::ConfigError> for IngestError {
    fn from(err: config::ConfigError) -> Self {
        IngestError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
