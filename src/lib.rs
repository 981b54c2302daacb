pub mod config;
pub mod error;
pub mod logical_plan;
pub mod models;
pub mod planner;
pub mod services;
pub mod validation;

pub use error::{IngestError, Result};
pub use models::*;
pub use planner::{planner_for, Planner, PlannerOptions, Resources, StatisticName};
pub use services::*;
