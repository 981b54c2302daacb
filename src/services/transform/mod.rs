// SQL transformation
//
// Dialect registry and renderers that lower logical plans into SQL text.

pub mod ansi;
pub mod bigquery;
pub mod dialect;
pub mod h2;
pub mod snowflake;
pub mod translator;

pub use dialect::{Renderer, SqlDialect};
pub use translator::{dialect_for, CaseConversion, DialectId, SqlPlan, TransformOptions, Transformer};
