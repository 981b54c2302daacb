// Ingest mode model
//
// Tagged ingestion strategies. Every variant is validated when it is built, so a planner
// never sees an invalid composition.

use serde::Serialize;
use std::collections::BTreeMap;

use super::versioning::{DeduplicationStrategy, VersionResolver, VersioningStrategy};
use crate::error::{IngestError, Result};

pub const DEFAULT_DIGEST_FIELD: &str = "digest";
pub const DEFAULT_BATCH_ID_FIELD: &str = "batch_id";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum Auditing {
    #[default]
    NoAuditing,
    /// Stamp every written row with the batch start time.
    DateTime { field: String },
}

impl Auditing {
    pub fn date_time(field: impl Into<String>) -> Self {
        Auditing::DateTime {
            field: field.into(),
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Auditing::NoAuditing => None,
            Auditing::DateTime { field } => Some(field),
        }
    }
}

/// Policy applied when the incoming batch holds no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EmptyDatasetHandling {
    NoOp,
    #[default]
    DeleteTargetData,
    FailEmptyBatch,
}

/// Columns recording when a row entered and left the current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionMilestoning {
    BatchId {
        batch_id_in: String,
        batch_id_out: String,
    },
    DateTime {
        date_time_in: String,
        date_time_out: String,
    },
    BatchIdAndDateTime {
        batch_id_in: String,
        batch_id_out: String,
        date_time_in: String,
        date_time_out: String,
    },
}

impl TransactionMilestoning {
    pub fn batch_id(in_field: impl Into<String>, out_field: impl Into<String>) -> Self {
        TransactionMilestoning::BatchId {
            batch_id_in: in_field.into(),
            batch_id_out: out_field.into(),
        }
    }

    pub fn date_time(in_field: impl Into<String>, out_field: impl Into<String>) -> Self {
        TransactionMilestoning::DateTime {
            date_time_in: in_field.into(),
            date_time_out: out_field.into(),
        }
    }

    pub fn batch_id_and_date_time(
        batch_id_in: impl Into<String>,
        batch_id_out: impl Into<String>,
        date_time_in: impl Into<String>,
        date_time_out: impl Into<String>,
    ) -> Self {
        TransactionMilestoning::BatchIdAndDateTime {
            batch_id_in: batch_id_in.into(),
            batch_id_out: batch_id_out.into(),
            date_time_in: date_time_in.into(),
            date_time_out: date_time_out.into(),
        }
    }

    pub fn batch_id_fields(&self) -> Option<(&str, &str)> {
        match self {
            TransactionMilestoning::BatchId {
                batch_id_in,
                batch_id_out,
            }
            | TransactionMilestoning::BatchIdAndDateTime {
                batch_id_in,
                batch_id_out,
                ..
            } => Some((batch_id_in, batch_id_out)),
            TransactionMilestoning::DateTime { .. } => None,
        }
    }

    pub fn date_time_fields(&self) -> Option<(&str, &str)> {
        match self {
            TransactionMilestoning::DateTime {
                date_time_in,
                date_time_out,
            }
            | TransactionMilestoning::BatchIdAndDateTime {
                date_time_in,
                date_time_out,
                ..
            } => Some((date_time_in, date_time_out)),
            TransactionMilestoning::BatchId { .. } => None,
        }
    }

    /// All milestoning columns in (in, out) order, batch id first.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        if let Some((i, o)) = self.batch_id_fields() {
            fields.push(i);
            fields.push(o);
        }
        if let Some((i, o)) = self.date_time_fields() {
            fields.push(i);
            fields.push(o);
        }
        fields
    }

    fn validate(&self) -> Result<()> {
        let fields = self.fields();
        for (i, field) in fields.iter().enumerate() {
            if field.trim().is_empty() {
                return Err(IngestError::configuration(
                    "Transaction milestoning field names cannot be blank",
                ));
            }
            if fields[..i].contains(field) {
                return Err(IngestError::configuration(format!(
                    "Transaction milestoning field '{}' is used twice",
                    field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Partitioning {
    pub fields: Vec<String>,
    /// Explicit values per partition field; when present only these partitions are touched.
    pub values: BTreeMap<String, Vec<String>>,
}

impl Partitioning {
    pub fn fields(fields: Vec<String>) -> Self {
        Self {
            fields,
            values: BTreeMap::new(),
        }
    }

    pub fn with_values(mut self, field: impl Into<String>, values: Vec<String>) -> Self {
        let field = field.into();
        if !self.fields.contains(&field) {
            self.fields.push(field.clone());
        }
        self.values.insert(field, values);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(IngestError::configuration(
                "Partitioning requires at least one partition field",
            ));
        }
        for (field, values) in &self.values {
            if !self.fields.contains(field) {
                return Err(IngestError::configuration(format!(
                    "Partition values given for '{}' which is not a partition field",
                    field
                )));
            }
            if values.is_empty() {
                return Err(IngestError::configuration(format!(
                    "Partition values for '{}' cannot be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Staging column whose listed values mark a row as deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteIndicator {
    pub field: String,
    pub values: Vec<String>,
}

impl DeleteIndicator {
    pub fn new(field: impl Into<String>, values: Vec<String>) -> Result<Self> {
        let field = field.into();
        if field.trim().is_empty() || values.is_empty() {
            return Err(IngestError::configuration(
                "Delete indicator requires a field and at least one value",
            ));
        }
        Ok(Self { field, values })
    }
}

/// Business validity interval: staging supplies both ends, main stores them under its own names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidityMilestoning {
    pub from_field: String,
    pub through_field: String,
    pub source_from_field: String,
    pub source_through_field: String,
}

impl ValidityMilestoning {
    pub fn source_specifies_from_and_through(
        from_field: impl Into<String>,
        through_field: impl Into<String>,
        source_from_field: impl Into<String>,
        source_through_field: impl Into<String>,
    ) -> Self {
        Self {
            from_field: from_field.into(),
            through_field: through_field.into(),
            source_from_field: source_from_field.into(),
            source_through_field: source_through_field.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum DigestGeneration {
    #[default]
    NoDigest,
    /// Digest computed by a warehouse function over every declared column.
    Udf {
        udf_name: String,
        digest_field: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NontemporalSnapshot {
    pub(crate) auditing: Auditing,
    pub(crate) deduplication: DeduplicationStrategy,
    pub(crate) versioning: VersioningStrategy,
    pub(crate) empty_dataset_handling: EmptyDatasetHandling,
}

impl NontemporalSnapshot {
    pub fn new() -> Self {
        Self {
            auditing: Auditing::NoAuditing,
            deduplication: DeduplicationStrategy::AllowDuplicates,
            versioning: VersioningStrategy::NoVersioning,
            empty_dataset_handling: EmptyDatasetHandling::DeleteTargetData,
        }
    }

    pub fn with_auditing(mut self, auditing: Auditing) -> Self {
        self.auditing = auditing;
        self
    }

    pub fn with_deduplication(mut self, deduplication: DeduplicationStrategy) -> Self {
        self.deduplication = deduplication;
        self
    }

    pub fn with_versioning(mut self, versioning: VersioningStrategy) -> Self {
        self.versioning = versioning;
        self
    }

    pub fn with_empty_dataset_handling(mut self, handling: EmptyDatasetHandling) -> Self {
        self.empty_dataset_handling = handling;
        self
    }

    pub fn build(self) -> Result<IngestMode> {
        reject_all_versions(&self.versioning, "NontemporalSnapshot")?;
        Ok(IngestMode::NontemporalSnapshot(self))
    }
}

impl Default for NontemporalSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NontemporalDelta {
    pub(crate) digest_field: String,
    pub(crate) auditing: Auditing,
    pub(crate) delete_indicator: Option<DeleteIndicator>,
    pub(crate) deduplication: DeduplicationStrategy,
    pub(crate) versioning: VersioningStrategy,
}

impl NontemporalDelta {
    pub fn new(digest_field: impl Into<String>) -> Self {
        Self {
            digest_field: digest_field.into(),
            auditing: Auditing::NoAuditing,
            delete_indicator: None,
            deduplication: DeduplicationStrategy::AllowDuplicates,
            versioning: VersioningStrategy::NoVersioning,
        }
    }

    pub fn with_auditing(mut self, auditing: Auditing) -> Self {
        self.auditing = auditing;
        self
    }

    pub fn with_delete_indicator(mut self, indicator: DeleteIndicator) -> Self {
        self.delete_indicator = Some(indicator);
        self
    }

    pub fn with_deduplication(mut self, deduplication: DeduplicationStrategy) -> Self {
        self.deduplication = deduplication;
        self
    }

    pub fn with_versioning(mut self, versioning: VersioningStrategy) -> Self {
        self.versioning = versioning;
        self
    }

    pub fn build(self) -> Result<IngestMode> {
        require_field(&self.digest_field, "NontemporalDelta digest field")?;
        Ok(IngestMode::NontemporalDelta(self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOnly {
    pub(crate) digest_field: Option<String>,
    pub(crate) auditing: Auditing,
    pub(crate) filter_existing_records: bool,
    pub(crate) deduplication: DeduplicationStrategy,
    pub(crate) versioning: VersioningStrategy,
}

impl AppendOnly {
    pub fn new() -> Self {
        Self {
            digest_field: None,
            auditing: Auditing::NoAuditing,
            filter_existing_records: false,
            deduplication: DeduplicationStrategy::AllowDuplicates,
            versioning: VersioningStrategy::NoVersioning,
        }
    }

    pub fn with_digest_field(mut self, field: impl Into<String>) -> Self {
        self.digest_field = Some(field.into());
        self
    }

    pub fn with_auditing(mut self, auditing: Auditing) -> Self {
        self.auditing = auditing;
        self
    }

    /// Skip staged rows whose key and digest already exist in main.
    pub fn filter_existing_records(mut self, filter: bool) -> Self {
        self.filter_existing_records = filter;
        self
    }

    pub fn with_deduplication(mut self, deduplication: DeduplicationStrategy) -> Self {
        self.deduplication = deduplication;
        self
    }

    pub fn with_versioning(mut self, versioning: VersioningStrategy) -> Self {
        self.versioning = versioning;
        self
    }

    pub fn build(self) -> Result<IngestMode> {
        if self.filter_existing_records && self.digest_field.is_none() {
            return Err(IngestError::configuration(
                "AppendOnly can only filter existing records when a digest field is given",
            ));
        }
        if let Some(field) = &self.digest_field {
            require_field(field, "AppendOnly digest field")?;
        }
        Ok(IngestMode::AppendOnly(self))
    }
}

impl Default for AppendOnly {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitemporalSnapshot {
    pub(crate) digest_field: String,
    pub(crate) milestoning: TransactionMilestoning,
    pub(crate) partitioning: Option<Partitioning>,
    pub(crate) deduplication: DeduplicationStrategy,
    pub(crate) versioning: VersioningStrategy,
    pub(crate) empty_dataset_handling: EmptyDatasetHandling,
}

impl UnitemporalSnapshot {
    pub fn new(digest_field: impl Into<String>, milestoning: TransactionMilestoning) -> Self {
        Self {
            digest_field: digest_field.into(),
            milestoning,
            partitioning: None,
            deduplication: DeduplicationStrategy::AllowDuplicates,
            versioning: VersioningStrategy::NoVersioning,
            empty_dataset_handling: EmptyDatasetHandling::DeleteTargetData,
        }
    }

    pub fn with_partitioning(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = Some(partitioning);
        self
    }

    pub fn with_deduplication(mut self, deduplication: DeduplicationStrategy) -> Self {
        self.deduplication = deduplication;
        self
    }

    pub fn with_versioning(mut self, versioning: VersioningStrategy) -> Self {
        self.versioning = versioning;
        self
    }

    pub fn with_empty_dataset_handling(mut self, handling: EmptyDatasetHandling) -> Self {
        self.empty_dataset_handling = handling;
        self
    }

    pub fn build(self) -> Result<IngestMode> {
        require_field(&self.digest_field, "UnitemporalSnapshot digest field")?;
        self.milestoning.validate()?;
        reject_all_versions(&self.versioning, "UnitemporalSnapshot")?;
        require_digest_resolver(&self.versioning, "UnitemporalSnapshot")?;
        if let Some(partitioning) = &self.partitioning {
            partitioning.validate()?;
        }
        Ok(IngestMode::UnitemporalSnapshot(self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitemporalDelta {
    pub(crate) digest_field: String,
    pub(crate) milestoning: TransactionMilestoning,
    pub(crate) delete_indicator: Option<DeleteIndicator>,
    pub(crate) deduplication: DeduplicationStrategy,
    pub(crate) versioning: VersioningStrategy,
}

impl UnitemporalDelta {
    pub fn new(digest_field: impl Into<String>, milestoning: TransactionMilestoning) -> Self {
        Self {
            digest_field: digest_field.into(),
            milestoning,
            delete_indicator: None,
            deduplication: DeduplicationStrategy::AllowDuplicates,
            versioning: VersioningStrategy::NoVersioning,
        }
    }

    pub fn with_delete_indicator(mut self, indicator: DeleteIndicator) -> Self {
        self.delete_indicator = Some(indicator);
        self
    }

    pub fn with_deduplication(mut self, deduplication: DeduplicationStrategy) -> Self {
        self.deduplication = deduplication;
        self
    }

    pub fn with_versioning(mut self, versioning: VersioningStrategy) -> Self {
        self.versioning = versioning;
        self
    }

    pub fn build(self) -> Result<IngestMode> {
        require_field(&self.digest_field, "UnitemporalDelta digest field")?;
        self.milestoning.validate()?;
        Ok(IngestMode::UnitemporalDelta(self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitemporalSnapshot {
    pub(crate) digest_field: String,
    pub(crate) milestoning: TransactionMilestoning,
    pub(crate) validity: ValidityMilestoning,
    pub(crate) deduplication: DeduplicationStrategy,
    pub(crate) versioning: VersioningStrategy,
    pub(crate) empty_dataset_handling: EmptyDatasetHandling,
}

impl BitemporalSnapshot {
    pub fn new(
        digest_field: impl Into<String>,
        milestoning: TransactionMilestoning,
        validity: ValidityMilestoning,
    ) -> Self {
        Self {
            digest_field: digest_field.into(),
            milestoning,
            validity,
            deduplication: DeduplicationStrategy::AllowDuplicates,
            versioning: VersioningStrategy::NoVersioning,
            empty_dataset_handling: EmptyDatasetHandling::DeleteTargetData,
        }
    }

    pub fn with_deduplication(mut self, deduplication: DeduplicationStrategy) -> Self {
        self.deduplication = deduplication;
        self
    }

    pub fn with_versioning(mut self, versioning: VersioningStrategy) -> Self {
        self.versioning = versioning;
        self
    }

    pub fn with_empty_dataset_handling(mut self, handling: EmptyDatasetHandling) -> Self {
        self.empty_dataset_handling = handling;
        self
    }

    pub fn build(self) -> Result<IngestMode> {
        require_field(&self.digest_field, "BitemporalSnapshot digest field")?;
        self.milestoning.validate()?;
        validate_validity(&self.validity)?;
        reject_all_versions(&self.versioning, "BitemporalSnapshot")?;
        require_digest_resolver(&self.versioning, "BitemporalSnapshot")?;
        Ok(IngestMode::BitemporalSnapshot(self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitemporalDelta {
    pub(crate) digest_field: String,
    pub(crate) milestoning: TransactionMilestoning,
    pub(crate) validity: ValidityMilestoning,
    pub(crate) delete_indicator: Option<DeleteIndicator>,
    pub(crate) deduplication: DeduplicationStrategy,
    pub(crate) versioning: VersioningStrategy,
}

impl BitemporalDelta {
    pub fn new(
        digest_field: impl Into<String>,
        milestoning: TransactionMilestoning,
        validity: ValidityMilestoning,
    ) -> Self {
        Self {
            digest_field: digest_field.into(),
            milestoning,
            validity,
            delete_indicator: None,
            deduplication: DeduplicationStrategy::AllowDuplicates,
            versioning: VersioningStrategy::NoVersioning,
        }
    }

    pub fn with_delete_indicator(mut self, indicator: DeleteIndicator) -> Self {
        self.delete_indicator = Some(indicator);
        self
    }

    pub fn with_deduplication(mut self, deduplication: DeduplicationStrategy) -> Self {
        self.deduplication = deduplication;
        self
    }

    pub fn with_versioning(mut self, versioning: VersioningStrategy) -> Self {
        self.versioning = versioning;
        self
    }

    pub fn build(self) -> Result<IngestMode> {
        require_field(&self.digest_field, "BitemporalDelta digest field")?;
        self.milestoning.validate()?;
        validate_validity(&self.validity)?;
        reject_all_versions(&self.versioning, "BitemporalDelta")?;
        require_digest_resolver(&self.versioning, "BitemporalDelta")?;
        Ok(IngestMode::BitemporalDelta(self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkLoad {
    pub(crate) batch_id_field: String,
    pub(crate) digest_generation: DigestGeneration,
    pub(crate) auditing: Auditing,
}

impl BulkLoad {
    pub fn new(batch_id_field: impl Into<String>) -> Self {
        Self {
            batch_id_field: batch_id_field.into(),
            digest_generation: DigestGeneration::NoDigest,
            auditing: Auditing::NoAuditing,
        }
    }

    pub fn with_digest_generation(mut self, digest_generation: DigestGeneration) -> Self {
        self.digest_generation = digest_generation;
        self
    }

    pub fn with_auditing(mut self, auditing: Auditing) -> Self {
        self.auditing = auditing;
        self
    }

    pub fn build(self) -> Result<IngestMode> {
        require_field(&self.batch_id_field, "BulkLoad batch id field")?;
        if let DigestGeneration::Udf {
            udf_name,
            digest_field,
        } = &self.digest_generation
        {
            require_field(udf_name, "BulkLoad digest udf name")?;
            require_field(digest_field, "BulkLoad digest field")?;
        }
        Ok(IngestMode::BulkLoad(self))
    }
}

/// Ingestion strategy for one main table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IngestMode {
    NontemporalSnapshot(NontemporalSnapshot),
    NontemporalDelta(NontemporalDelta),
    AppendOnly(AppendOnly),
    UnitemporalSnapshot(UnitemporalSnapshot),
    UnitemporalDelta(UnitemporalDelta),
    BitemporalSnapshot(BitemporalSnapshot),
    BitemporalDelta(BitemporalDelta),
    BulkLoad(BulkLoad),
}

impl IngestMode {
    pub fn name(&self) -> &'static str {
        match self {
            IngestMode::NontemporalSnapshot(_) => "NontemporalSnapshot",
            IngestMode::NontemporalDelta(_) => "NontemporalDelta",
            IngestMode::AppendOnly(_) => "AppendOnly",
            IngestMode::UnitemporalSnapshot(_) => "UnitemporalSnapshot",
            IngestMode::UnitemporalDelta(_) => "UnitemporalDelta",
            IngestMode::BitemporalSnapshot(_) => "BitemporalSnapshot",
            IngestMode::BitemporalDelta(_) => "BitemporalDelta",
            IngestMode::BulkLoad(_) => "BulkLoad",
        }
    }

    pub fn digest_field(&self) -> Option<&str> {
        match self {
            IngestMode::NontemporalSnapshot(_) => None,
            IngestMode::NontemporalDelta(m) => Some(&m.digest_field),
            IngestMode::AppendOnly(m) => m.digest_field.as_deref(),
            IngestMode::UnitemporalSnapshot(m) => Some(&m.digest_field),
            IngestMode::UnitemporalDelta(m) => Some(&m.digest_field),
            IngestMode::BitemporalSnapshot(m) => Some(&m.digest_field),
            IngestMode::BitemporalDelta(m) => Some(&m.digest_field),
            IngestMode::BulkLoad(m) => match &m.digest_generation {
                DigestGeneration::NoDigest => None,
                DigestGeneration::Udf { digest_field, .. } => Some(digest_field),
            },
        }
    }

    pub fn deduplication(&self) -> DeduplicationStrategy {
        match self {
            IngestMode::NontemporalSnapshot(m) => m.deduplication,
            IngestMode::NontemporalDelta(m) => m.deduplication,
            IngestMode::AppendOnly(m) => m.deduplication,
            IngestMode::UnitemporalSnapshot(m) => m.deduplication,
            IngestMode::UnitemporalDelta(m) => m.deduplication,
            IngestMode::BitemporalSnapshot(m) => m.deduplication,
            IngestMode::BitemporalDelta(m) => m.deduplication,
            IngestMode::BulkLoad(_) => DeduplicationStrategy::AllowDuplicates,
        }
    }

    pub fn versioning(&self) -> &VersioningStrategy {
        const NONE: &VersioningStrategy = &VersioningStrategy::NoVersioning;
        match self {
            IngestMode::NontemporalSnapshot(m) => &m.versioning,
            IngestMode::NontemporalDelta(m) => &m.versioning,
            IngestMode::AppendOnly(m) => &m.versioning,
            IngestMode::UnitemporalSnapshot(m) => &m.versioning,
            IngestMode::UnitemporalDelta(m) => &m.versioning,
            IngestMode::BitemporalSnapshot(m) => &m.versioning,
            IngestMode::BitemporalDelta(m) => &m.versioning,
            IngestMode::BulkLoad(_) => NONE,
        }
    }

    pub fn milestoning(&self) -> Option<&TransactionMilestoning> {
        match self {
            IngestMode::UnitemporalSnapshot(m) => Some(&m.milestoning),
            IngestMode::UnitemporalDelta(m) => Some(&m.milestoning),
            IngestMode::BitemporalSnapshot(m) => Some(&m.milestoning),
            IngestMode::BitemporalDelta(m) => Some(&m.milestoning),
            _ => None,
        }
    }

    pub fn auditing(&self) -> Option<&Auditing> {
        match self {
            IngestMode::NontemporalSnapshot(m) => Some(&m.auditing),
            IngestMode::NontemporalDelta(m) => Some(&m.auditing),
            IngestMode::AppendOnly(m) => Some(&m.auditing),
            IngestMode::BulkLoad(m) => Some(&m.auditing),
            _ => None,
        }
    }

    pub fn delete_indicator(&self) -> Option<&DeleteIndicator> {
        match self {
            IngestMode::NontemporalDelta(m) => m.delete_indicator.as_ref(),
            IngestMode::UnitemporalDelta(m) => m.delete_indicator.as_ref(),
            IngestMode::BitemporalDelta(m) => m.delete_indicator.as_ref(),
            _ => None,
        }
    }

    pub fn empty_dataset_handling(&self) -> Option<EmptyDatasetHandling> {
        match self {
            IngestMode::NontemporalSnapshot(m) => Some(m.empty_dataset_handling),
            IngestMode::UnitemporalSnapshot(m) => Some(m.empty_dataset_handling),
            IngestMode::BitemporalSnapshot(m) => Some(m.empty_dataset_handling),
            _ => None,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.empty_dataset_handling().is_some()
    }
}

fn require_field(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(IngestError::configuration(format!("{} cannot be blank", what)));
    }
    Ok(())
}

fn reject_all_versions(versioning: &VersioningStrategy, mode: &str) -> Result<()> {
    if matches!(versioning, VersioningStrategy::AllVersions { .. }) {
        return Err(IngestError::configuration(format!(
            "AllVersions versioning is not supported for {}",
            mode
        )));
    }
    Ok(())
}

fn require_digest_resolver(versioning: &VersioningStrategy, mode: &str) -> Result<()> {
    match versioning.resolver() {
        None | Some(VersionResolver::DigestBased) => Ok(()),
        Some(other) => Err(IngestError::configuration(format!(
            "{} only supports a digest based version resolver, got {:?}",
            mode, other
        ))),
    }
}

fn validate_validity(validity: &ValidityMilestoning) -> Result<()> {
    for field in [
        &validity.from_field,
        &validity.through_field,
        &validity.source_from_field,
        &validity.source_through_field,
    ] {
        require_field(field, "Validity milestoning field")?;
    }
    if validity.from_field == validity.through_field {
        return Err(IngestError::configuration(
            "Validity from and through fields must differ",
        ));
    }
    Ok(())
}
