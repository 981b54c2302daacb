// Deduplication and versioning strategies
//
// Decide which staged rows survive per business key within one batch.

use serde::Serialize;

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DeduplicationStrategy {
    #[default]
    AllowDuplicates,
    /// Collapse identical rows, keeping a count of how many were seen.
    FilterDuplicates,
    /// Collapse identical rows and emit checks a caller uses to abort on duplicates.
    FailOnDuplicates,
}

impl DeduplicationStrategy {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, DeduplicationStrategy::AllowDuplicates)
    }
}

/// How two versions of the same key are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VersionResolver {
    /// A changed digest replaces the current row.
    DigestBased,
    /// A strictly greater version column replaces the current row.
    VersionColumnBased,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum VersioningStrategy {
    #[default]
    NoVersioning,
    MaxVersion {
        version_field: String,
        resolver: VersionResolver,
        perform_stage_versioning: bool,
    },
    AllVersions {
        version_field: String,
        resolver: VersionResolver,
        data_split_field: String,
        perform_stage_versioning: bool,
    },
}

pub const DEFAULT_DATA_SPLIT_FIELD: &str = "data_split";

impl VersioningStrategy {
    /// Keep only the highest version per key.
    ///
    /// # Errors
    /// Returns a configuration error when no resolver is given or the version field is blank.
    pub fn max_version(
        version_field: impl Into<String>,
        resolver: Option<VersionResolver>,
        perform_stage_versioning: bool,
    ) -> Result<Self> {
        let version_field = non_blank(version_field.into(), "MaxVersion version field")?;
        let resolver = resolver.ok_or_else(|| {
            IngestError::configuration("MaxVersion requires a version resolver")
        })?;
        Ok(VersioningStrategy::MaxVersion {
            version_field,
            resolver,
            perform_stage_versioning,
        })
    }

    /// Keep every version, ranked into data splits applied one at a time.
    pub fn all_versions(
        version_field: impl Into<String>,
        resolver: Option<VersionResolver>,
        perform_stage_versioning: bool,
    ) -> Result<Self> {
        let version_field = non_blank(version_field.into(), "AllVersions version field")?;
        let resolver = resolver.ok_or_else(|| {
            IngestError::configuration("AllVersions requires a version resolver")
        })?;
        Ok(VersioningStrategy::AllVersions {
            version_field,
            resolver,
            data_split_field: DEFAULT_DATA_SPLIT_FIELD.to_string(),
            perform_stage_versioning,
        })
    }

    pub fn with_data_split_field(self, field: impl Into<String>) -> Self {
        match self {
            VersioningStrategy::AllVersions {
                version_field,
                resolver,
                perform_stage_versioning,
                ..
            } => VersioningStrategy::AllVersions {
                version_field,
                resolver,
                data_split_field: field.into(),
                perform_stage_versioning,
            },
            other => other,
        }
    }

    pub fn version_field(&self) -> Option<&str> {
        match self {
            VersioningStrategy::NoVersioning => None,
            VersioningStrategy::MaxVersion { version_field, .. }
            | VersioningStrategy::AllVersions { version_field, .. } => Some(version_field),
        }
    }

    pub fn resolver(&self) -> Option<VersionResolver> {
        match self {
            VersioningStrategy::NoVersioning => None,
            VersioningStrategy::MaxVersion { resolver, .. }
            | VersioningStrategy::AllVersions { resolver, .. } => Some(*resolver),
        }
    }

    pub fn data_split_field(&self) -> Option<&str> {
        match self {
            VersioningStrategy::AllVersions {
                data_split_field, ..
            } => Some(data_split_field),
            _ => None,
        }
    }

    /// Whether the staged batch is rewritten before ingest.
    pub fn performs_stage_versioning(&self) -> bool {
        match self {
            VersioningStrategy::NoVersioning => false,
            VersioningStrategy::MaxVersion {
                perform_stage_versioning,
                ..
            }
            | VersioningStrategy::AllVersions {
                perform_stage_versioning,
                ..
            } => *perform_stage_versioning,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VersioningStrategy::NoVersioning => "NoVersioning",
            VersioningStrategy::MaxVersion { .. } => "MaxVersion",
            VersioningStrategy::AllVersions { .. } => "AllVersions",
        }
    }
}

fn non_blank(value: String, what: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(IngestError::configuration(format!("{} cannot be blank", what)));
    }
    Ok(value)
}
