// Logical plan values
//
// The expression language shared by every operation: field references, literals, run
// placeholders, functions, casts and subqueries.

use serde::Serialize;

use super::operations::Selection;
use crate::models::{Dataset, DatasetReference, FieldType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FunctionName {
    Count,
    Max,
    Min,
    Sum,
    Coalesce,
    Upper,
    CurrentTimestamp,
    ParseJson,
    ToVariant,
    DenseRank,
    RowNumber,
}

impl FunctionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionName::Count => "COUNT",
            FunctionName::Max => "MAX",
            FunctionName::Min => "MIN",
            FunctionName::Sum => "SUM",
            FunctionName::Coalesce => "COALESCE",
            FunctionName::Upper => "UPPER",
            FunctionName::CurrentTimestamp => "CURRENT_TIMESTAMP",
            FunctionName::ParseJson => "PARSE_JSON",
            FunctionName::ToVariant => "TO_VARIANT",
            FunctionName::DenseRank => "DENSE_RANK",
            FunctionName::RowNumber => "ROW_NUMBER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowFunction {
    pub function: FunctionName,
    pub partition_by: Vec<Value>,
    pub order_by: Vec<(Value, Order)>,
}

/// One column fed to a digest function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestColumn {
    pub name: String,
    pub value: Value,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Field {
        dataset: Option<String>,
        name: String,
    },
    /// `*`, optionally qualified.
    All {
        dataset: Option<String>,
    },
    String(String),
    Number(i64),
    Null,
    /// The run's injected clock, or the caller's timestamp pattern.
    BatchStartTimestamp,
    BatchEndTimestamp,
    /// Next batch id for a main table. The selection computes it from metadata unless the
    /// caller supplied a batch id pattern.
    BatchId(Box<Selection>),
    Function {
        name: FunctionName,
        args: Vec<Value>,
    },
    Distinct(Box<Value>),
    Cast {
        value: Box<Value>,
        field_type: FieldType,
        safe: bool,
    },
    Subquery(Box<Selection>),
    Window(Box<WindowFunction>),
    /// Positional column of a staged file.
    StagedFilesField {
        dataset: Option<String>,
        index: usize,
        name: String,
        field_type: FieldType,
    },
    MetadataFileName {
        dataset: Option<String>,
    },
    MetadataRowNumber {
        dataset: Option<String>,
    },
    DigestUdf {
        udf_name: String,
        columns: Vec<DigestColumn>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Value>,
        right: Box<Value>,
    },
    Aliased {
        value: Box<Value>,
        alias: String,
    },
}

impl Value {
    pub fn field(dataset: Option<&str>, name: impl Into<String>) -> Self {
        Value::Field {
            dataset: dataset.map(str::to_string),
            name: name.into(),
        }
    }

    /// Field qualified by the dataset's alias.
    pub fn field_of(dataset: &Dataset, name: impl Into<String>) -> Self {
        Value::field(dataset.alias(), name)
    }

    pub fn field_of_ref(reference: &DatasetReference, name: impl Into<String>) -> Self {
        Value::field(reference.alias.as_deref(), name)
    }

    pub fn unqualified(name: impl Into<String>) -> Self {
        Value::field(None, name)
    }

    pub fn all() -> Self {
        Value::All { dataset: None }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn function(name: FunctionName, args: Vec<Value>) -> Self {
        Value::Function { name, args }
    }

    pub fn count_all() -> Self {
        Value::function(FunctionName::Count, vec![Value::all()])
    }

    pub fn subquery(selection: Selection) -> Self {
        Value::Subquery(Box::new(selection))
    }

    pub fn add(left: Value, right: Value) -> Self {
        Value::Binary {
            op: BinaryOperator::Add,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn subtract(left: Value, right: Value) -> Self {
        Value::Binary {
            op: BinaryOperator::Subtract,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn cast(value: Value, field_type: FieldType, safe: bool) -> Self {
        Value::Cast {
            value: Box::new(value),
            field_type,
            safe,
        }
    }

    pub fn alias(self, alias: impl Into<String>) -> Self {
        Value::Aliased {
            value: Box::new(self),
            alias: alias.into(),
        }
    }

    /// Field name this value writes to, when it is a plain or aliased field.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Value::Field { name, .. } => Some(name),
            Value::StagedFilesField { name, .. } => Some(name),
            Value::Aliased { alias, .. } => Some(alias),
            _ => None,
        }
    }

    /// Same field, requalified against another dataset alias.
    pub fn requalify(&self, dataset: Option<&str>) -> Self {
        match self {
            Value::Field { name, .. } => Value::field(dataset, name.clone()),
            other => other.clone(),
        }
    }
}
