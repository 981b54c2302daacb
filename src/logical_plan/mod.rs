// Logical plan IR
//
// Ordered, dialect-agnostic operation sequences produced by planners and lowered to SQL
// by the transform service.

pub mod conditions;
pub mod operations;
pub mod values;

pub use conditions::*;
pub use operations::*;
pub use values::*;

use serde::Serialize;

/// Immutable ordered sequence of operations for one ingestion phase.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LogicalPlan {
    operations: Vec<Operation>,
}

impl LogicalPlan {
    pub fn of(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl From<Operation> for LogicalPlan {
    fn from(operation: Operation) -> Self {
        Self::of(vec![operation])
    }
}

impl From<Selection> for LogicalPlan {
    fn from(selection: Selection) -> Self {
        Self::of(vec![Operation::Select(selection)])
    }
}
