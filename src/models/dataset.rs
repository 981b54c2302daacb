// Dataset model
//
// Table references, the main/staging/metadata table family and the staged-file
// sources used by bulk loads.

use serde::Serialize;
use std::collections::BTreeMap;

use super::schema::{DataType, Field, FieldType, Schema};
use crate::error::{IngestError, Result};

pub const MAIN_ALIAS: &str = "sink";
pub const STAGING_ALIAS: &str = "stage";
pub const STAGED_FILES_ALIAS: &str = "staged_files";

/// Location of a table: `database.group.name`, plus the alias used in generated SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetReference {
    pub database: Option<String>,
    pub group: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl DatasetReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            database: None,
            group: None,
            name: name.into(),
            alias: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn without_alias(mut self) -> Self {
        self.alias = None;
        self
    }

    /// Sibling table in the same database/group.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self {
            database: self.database.clone(),
            group: self.group.clone(),
            name: name.into(),
            alias: None,
        }
    }
}

/// How the dataset is materialised when it is created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DatasetKind {
    Table,
    /// Table backed by staged files, queried in place.
    External(StagedFilesProperties),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub reference: DatasetReference,
    pub schema: Schema,
    pub kind: DatasetKind,
}

impl Dataset {
    pub fn new(reference: DatasetReference, schema: Schema) -> Self {
        Self {
            reference,
            schema,
            kind: DatasetKind::Table,
        }
    }

    pub fn external(
        reference: DatasetReference,
        schema: Schema,
        properties: StagedFilesProperties,
    ) -> Self {
        Self {
            reference,
            schema,
            kind: DatasetKind::External(properties),
        }
    }

    pub fn alias(&self) -> Option<&str> {
        self.reference.alias.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.reference.alias = Some(alias.into());
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FileFormat {
    Csv {
        field_delimiter: Option<String>,
        skip_header: u32,
    },
    Json,
    Avro,
    Parquet,
    /// A format object already defined in the warehouse.
    Named(String),
}

impl FileFormat {
    pub fn csv() -> Self {
        FileFormat::Csv {
            field_delimiter: None,
            skip_header: 0,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            FileFormat::Csv { .. } => "CSV",
            FileFormat::Json => "JSON",
            FileFormat::Avro => "AVRO",
            FileFormat::Parquet => "PARQUET",
            FileFormat::Named(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LoadOption {
    Text(String),
    Number(i64),
    Bool(bool),
}

/// Where the files of one bulk load live and how to read them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedFilesProperties {
    pub location: Option<String>,
    pub file_paths: Vec<String>,
    pub file_patterns: Vec<String>,
    pub format: FileFormat,
    pub load_options: BTreeMap<String, LoadOption>,
    /// The warehouse can validate files without loading them.
    pub validation_mode_supported: bool,
}

impl StagedFilesProperties {
    pub fn files(file_paths: Vec<String>) -> Self {
        Self {
            location: None,
            file_paths,
            file_patterns: Vec::new(),
            format: FileFormat::csv(),
            load_options: BTreeMap::new(),
            validation_mode_supported: false,
        }
    }

    pub fn patterns(file_patterns: Vec<String>) -> Self {
        Self {
            file_patterns,
            ..Self::files(Vec::new())
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_load_option(mut self, key: impl Into<String>, value: LoadOption) -> Self {
        self.load_options.insert(key.into(), value);
        self
    }

    pub fn with_validation_mode(mut self) -> Self {
        self.validation_mode_supported = true;
        self
    }
}

/// Staged files exposed as a dataset: columns map positionally onto file columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedFilesDataset {
    pub reference: DatasetReference,
    pub schema: Schema,
    pub properties: StagedFilesProperties,
}

impl StagedFilesDataset {
    pub fn new(
        reference: DatasetReference,
        schema: Schema,
        properties: StagedFilesProperties,
    ) -> Result<Self> {
        if properties.file_paths.is_empty() && properties.file_patterns.is_empty() {
            return Err(IngestError::configuration(
                "Staged files dataset requires file paths or file patterns",
            ));
        }
        if !properties.file_paths.is_empty() && !properties.file_patterns.is_empty() {
            return Err(IngestError::configuration(
                "Staged files dataset accepts either file paths or file patterns, not both",
            ));
        }
        Ok(Self {
            reference,
            schema,
            properties,
        })
    }
}

/// The incoming batch: a transient table or a set of staged files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StagingDataset {
    Table(Dataset),
    StagedFiles(StagedFilesDataset),
}

impl StagingDataset {
    pub fn reference(&self) -> &DatasetReference {
        match self {
            StagingDataset::Table(d) => &d.reference,
            StagingDataset::StagedFiles(d) => &d.reference,
        }
    }

    pub fn schema(&self) -> &Schema {
        match self {
            StagingDataset::Table(d) => &d.schema,
            StagingDataset::StagedFiles(d) => &d.schema,
        }
    }

    pub fn as_table(&self) -> Option<&Dataset> {
        match self {
            StagingDataset::Table(d) => Some(d),
            StagingDataset::StagedFiles(_) => None,
        }
    }

    pub fn as_staged_files(&self) -> Option<&StagedFilesDataset> {
        match self {
            StagingDataset::StagedFiles(d) => Some(d),
            StagingDataset::Table(_) => None,
        }
    }
}

/// Append-only log of ingestion runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataDataset {
    pub database: Option<String>,
    pub group: Option<String>,
    pub name: String,
    pub table_name_field: String,
    pub table_batch_id_field: String,
    pub batch_start_ts_field: String,
    pub batch_end_ts_field: String,
    pub batch_status_field: String,
    pub batch_source_info_field: String,
    pub additional_metadata_field: String,
    pub ingest_request_id_field: String,
}

impl Default for MetadataDataset {
    fn default() -> Self {
        Self {
            database: None,
            group: None,
            name: "batch_metadata".to_string(),
            table_name_field: "table_name".to_string(),
            table_batch_id_field: "table_batch_id".to_string(),
            batch_start_ts_field: "batch_start_ts_utc".to_string(),
            batch_end_ts_field: "batch_end_ts_utc".to_string(),
            batch_status_field: "batch_status".to_string(),
            batch_source_info_field: "batch_source_info".to_string(),
            additional_metadata_field: "additional_metadata".to_string(),
            ingest_request_id_field: "ingest_request_id".to_string(),
        }
    }
}

impl MetadataDataset {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn reference(&self) -> DatasetReference {
        DatasetReference {
            database: self.database.clone(),
            group: self.group.clone(),
            name: self.name.clone(),
            alias: Some(self.name.clone()),
        }
    }

    pub fn to_dataset(&self) -> Dataset {
        let fields = vec![
            Field::new(&self.table_name_field, DataType::Varchar).with_length(255),
            Field::new(&self.batch_start_ts_field, DataType::DateTime),
            Field::new(&self.batch_end_ts_field, DataType::DateTime),
            Field::new(&self.batch_status_field, DataType::Varchar).with_length(32),
            Field::new(&self.table_batch_id_field, DataType::Integer),
            Field::new(&self.batch_source_info_field, DataType::Json),
            Field::new(&self.additional_metadata_field, DataType::Json),
            Field::new(&self.ingest_request_id_field, DataType::Varchar).with_length(64),
        ];
        Dataset::new(self.reference(), Schema::derived(fields))
    }
}

/// Single-row table used for cross-process mutual exclusion on one main table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockInfoDataset {
    pub database: Option<String>,
    pub group: Option<String>,
    pub name: String,
    pub insert_ts_field: String,
    pub last_used_ts_field: String,
    pub table_name_field: String,
}

impl LockInfoDataset {
    /// Lock table named after the main table it guards.
    pub fn for_main(main: &DatasetReference) -> Self {
        Self {
            database: main.database.clone(),
            group: main.group.clone(),
            name: format!("{}_ingest_lock", main.name),
            insert_ts_field: "insert_ts_utc".to_string(),
            last_used_ts_field: "last_used_ts_utc".to_string(),
            table_name_field: "table_name".to_string(),
        }
    }

    pub fn reference(&self) -> DatasetReference {
        DatasetReference {
            database: self.database.clone(),
            group: self.group.clone(),
            name: self.name.clone(),
            alias: Some("lock".to_string()),
        }
    }

    pub fn to_dataset(&self) -> Dataset {
        let fields = vec![
            Field::new(&self.insert_ts_field, DataType::DateTime),
            Field::new(&self.last_used_ts_field, DataType::DateTime),
            Field::new(&self.table_name_field, DataType::Varchar)
                .with_type(FieldType::of(DataType::Varchar).with_length(255)),
        ];
        Dataset::new(self.reference(), Schema::derived(fields))
    }
}

/// The table family handled by one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datasets {
    pub main: Dataset,
    pub staging: StagingDataset,
    pub metadata: MetadataDataset,
    pub lock: Option<LockInfoDataset>,
}

impl Datasets {
    /// Pair a main table with its incoming batch, applying the default aliases.
    pub fn new(main: Dataset, staging: StagingDataset) -> Self {
        let main = if main.alias().is_none() {
            main.with_alias(MAIN_ALIAS)
        } else {
            main
        };
        let staging = match staging {
            StagingDataset::Table(d) if d.alias().is_none() => {
                StagingDataset::Table(d.with_alias(STAGING_ALIAS))
            }
            StagingDataset::StagedFiles(mut d) if d.reference.alias.is_none() => {
                d.reference.alias = Some(STAGED_FILES_ALIAS.to_string());
                StagingDataset::StagedFiles(d)
            }
            other => other,
        };
        Self {
            main,
            staging,
            metadata: MetadataDataset::default(),
            lock: None,
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataDataset) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_lock(mut self, lock: LockInfoDataset) -> Self {
        self.lock = Some(lock);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Integer).primary_key(),
            Field::new("name", DataType::Varchar),
        ])
        .unwrap()
    }

    #[test]
    fn test_default_aliases_applied() {
        let main = Dataset::new(DatasetReference::new("main").with_database("mydb"), schema());
        let staging = Dataset::new(DatasetReference::new("staging").with_database("mydb"), schema());
        let datasets = Datasets::new(main, StagingDataset::Table(staging));

        assert_eq!(datasets.main.alias(), Some(MAIN_ALIAS));
        assert_eq!(datasets.staging.reference().alias.as_deref(), Some(STAGING_ALIAS));
        assert_eq!(datasets.metadata.name, "batch_metadata");
    }

    #[test]
    fn test_explicit_alias_kept() {
        let main = Dataset::new(DatasetReference::new("main").with_alias("m"), schema());
        let staging = Dataset::new(DatasetReference::new("staging"), schema());
        let datasets = Datasets::new(main, StagingDataset::Table(staging));
        assert_eq!(datasets.main.alias(), Some("m"));
    }

    #[test]
    fn test_staged_files_require_sources() {
        let result = StagedFilesDataset::new(
            DatasetReference::new("files"),
            schema(),
            StagedFilesProperties::files(vec![]),
        );
        assert!(matches!(result, Err(IngestError::Configuration(_))));

        let ok = StagedFilesDataset::new(
            DatasetReference::new("files"),
            schema(),
            StagedFilesProperties::files(vec!["/data/a.csv".to_string()]),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_metadata_dataset_shape() {
        let dataset = MetadataDataset::default().to_dataset();
        assert_eq!(dataset.schema.fields().len(), 8);
        assert!(dataset.schema.contains("table_batch_id"));
        assert_eq!(dataset.alias(), Some("batch_metadata"));
    }

    #[test]
    fn test_lock_dataset_named_after_main() {
        let lock = LockInfoDataset::for_main(&DatasetReference::new("main").with_database("mydb"));
        assert_eq!(lock.name, "main_ingest_lock");
        assert_eq!(lock.database.as_deref(), Some("mydb"));
    }
}
