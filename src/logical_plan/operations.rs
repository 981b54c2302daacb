// Logical plan operations
//
// Dialect-agnostic statements. Each operation becomes exactly one SQL string.

use serde::Serialize;

use super::conditions::Condition;
use super::values::Value;
use crate::models::{Dataset, DatasetReference, StagedFilesDataset, StagedFilesProperties};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Source {
    Dataset(DatasetReference),
    /// Derived table, always aliased.
    Subquery(Box<Selection>, String),
    StagedFiles(StagedFilesDataset),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub source: Option<Source>,
    pub fields: Vec<Value>,
    pub condition: Option<Condition>,
    pub group_by: Vec<Value>,
    pub having: Option<Condition>,
    pub limit: Option<u64>,
}

impl Selection {
    pub fn from(source: Source) -> Self {
        Self {
            source: Some(source),
            fields: vec![Value::all()],
            condition: None,
            group_by: Vec::new(),
            having: None,
            limit: None,
        }
    }

    pub fn from_dataset(reference: &DatasetReference) -> Self {
        Self::from(Source::Dataset(reference.clone()))
    }

    /// SELECT without a FROM clause.
    pub fn values(fields: Vec<Value>) -> Self {
        Self {
            source: None,
            fields,
            condition: None,
            group_by: Vec::new(),
            having: None,
            limit: None,
        }
    }

    pub fn fields(mut self, fields: Vec<Value>) -> Self {
        self.fields = fields;
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn filter_opt(mut self, condition: Option<Condition>) -> Self {
        self.condition = condition;
        self
    }

    pub fn group_by(mut self, group_by: Vec<Value>) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn having(mut self, having: Condition) -> Self {
        self.having = Some(having);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn into_source(self, alias: impl Into<String>) -> Source {
        Source::Subquery(Box::new(self), alias.into())
    }
}

/// `MERGE INTO target USING source ON ...` with optional matched/unmatched branches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Merge {
    pub target: DatasetReference,
    pub source: Source,
    pub on: Condition,
    pub matched_delete: Option<Condition>,
    pub matched_update: Option<(Condition, Vec<(Value, Value)>)>,
    pub not_matched_insert: Option<NotMatchedInsert>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotMatchedInsert {
    pub condition: Option<Condition>,
    pub fields: Vec<Value>,
    pub values: Vec<Value>,
}

/// Load staged files into a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Copy {
    pub target: DatasetReference,
    pub fields: Vec<Value>,
    pub source: Selection,
    pub properties: StagedFilesProperties,
    /// Only validate the files; nothing is written.
    pub validation_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operation {
    Create {
        dataset: Dataset,
        if_not_exists: bool,
    },
    Drop {
        dataset: DatasetReference,
        if_exists: bool,
    },
    Delete {
        dataset: DatasetReference,
        condition: Option<Condition>,
    },
    Insert {
        target: DatasetReference,
        fields: Vec<Value>,
        source: Selection,
    },
    Update {
        target: DatasetReference,
        assignments: Vec<(Value, Value)>,
        condition: Option<Condition>,
    },
    Merge(Merge),
    Copy(Copy),
    Select(Selection),
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "CREATE",
            Operation::Drop { .. } => "DROP",
            Operation::Delete { .. } => "DELETE",
            Operation::Insert { .. } => "INSERT",
            Operation::Update { .. } => "UPDATE",
            Operation::Merge(_) => "MERGE",
            Operation::Copy(_) => "COPY",
            Operation::Select(_) => "SELECT",
        }
    }

    pub fn create(dataset: Dataset) -> Self {
        Operation::Create {
            dataset,
            if_not_exists: true,
        }
    }

    pub fn drop(dataset: DatasetReference) -> Self {
        Operation::Drop {
            dataset,
            if_exists: true,
        }
    }

    pub fn delete_all(dataset: DatasetReference) -> Self {
        Operation::Delete {
            dataset,
            condition: None,
        }
    }
}
