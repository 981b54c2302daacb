use serde::Serialize;

use super::operations::Selection;
use super::values::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InSource {
    Values(Vec<Value>),
    Subquery(Box<Selection>),
}

/// Boolean predicates used in WHERE, HAVING and MERGE clauses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Equals(Value, Value),
    NotEquals(Value, Value),
    GreaterThan(Value, Value),
    GreaterThanEqualTo(Value, Value),
    LessThan(Value, Value),
    LessThanEqualTo(Value, Value),
    IsNull(Value),
    Exists(Box<Selection>),
    In(Value, InSource),
}

impl Condition {
    /// Conjunction that collapses to its only member.
    pub fn and(mut conditions: Vec<Condition>) -> Condition {
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Condition::And(conditions)
        }
    }

    pub fn or(mut conditions: Vec<Condition>) -> Condition {
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Condition::Or(conditions)
        }
    }

    pub fn not(condition: Condition) -> Condition {
        Condition::Not(Box::new(condition))
    }

    pub fn equals(left: Value, right: Value) -> Condition {
        Condition::Equals(left, right)
    }

    pub fn exists(selection: Selection) -> Condition {
        Condition::Exists(Box::new(selection))
    }

    pub fn not_exists(selection: Selection) -> Condition {
        Condition::not(Condition::exists(selection))
    }

    pub fn in_values(value: Value, values: Vec<Value>) -> Condition {
        Condition::In(value, InSource::Values(values))
    }

    pub fn in_subquery(value: Value, selection: Selection) -> Condition {
        Condition::In(value, InSource::Subquery(Box::new(selection)))
    }

    pub fn is_not_null(value: Value) -> Condition {
        Condition::not(Condition::IsNull(value))
    }

    /// Pairwise equality of the same fields across two dataset aliases.
    pub fn fields_match(fields: &[String], left: Option<&str>, right: Option<&str>) -> Condition {
        Condition::and(
            fields
                .iter()
                .map(|f| Condition::Equals(Value::field(left, f.clone()), Value::field(right, f.clone())))
                .collect(),
        )
    }
}
