// Multi-dataset planning
//
// Plans several independent table families of one run concurrently. Generation is pure and
// CPU-bound, so each family runs on the blocking pool. Executing the SQL stays with the
// caller, which must run each family's phases in order.

use anyhow::{anyhow, Context};
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::generator::{Generator, GeneratorOptions, GeneratorResult};
use crate::models::{Datasets, IngestMode};
use crate::planner::Resources;

/// One table family: main, staging and bookkeeping datasets plus the mode loading them.
#[derive(Debug, Clone)]
pub struct DatasetFamily {
    pub name: String,
    pub datasets: Datasets,
    pub mode: IngestMode,
    pub resources: Resources,
}

impl DatasetFamily {
    pub fn new(name: impl Into<String>, datasets: Datasets, mode: IngestMode) -> Self {
        Self {
            name: name.into(),
            datasets,
            mode,
            resources: Resources::default(),
        }
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }
}

/// Outcome for one family. A failure here never affects the other families.
#[derive(Debug)]
pub struct FamilyPlan {
    pub name: String,
    pub result: anyhow::Result<GeneratorResult>,
}

fn plan_family(family: DatasetFamily, options: GeneratorOptions) -> anyhow::Result<GeneratorResult> {
    let name = family.name;
    let generator = Generator::new(family.datasets, family.mode, options)
        .with_context(|| format!("Failed to build generator for '{}'", name))?;
    generator
        .generate_operations(&family.resources)
        .with_context(|| format!("Failed to generate SQL for '{}'", name))
}

/// Plan every family concurrently
///
/// # Arguments
/// * `families` - Independent table families
/// * `options` - Shared dialect, clock and planner options
///
/// # Returns
/// One FamilyPlan per family, in input order
pub async fn plan_families(families: Vec<DatasetFamily>, options: GeneratorOptions) -> Vec<FamilyPlan> {
    info!(families = families.len(), dialect = options.dialect.as_str(), "planning table families");
    let names: Vec<String> = families.iter().map(|f| f.name.clone()).collect();

    let mut tasks = JoinSet::new();
    for (index, family) in families.into_iter().enumerate() {
        let options = options.clone();
        tasks.spawn_blocking(move || (index, plan_family(family, options)));
    }

    let mut results: Vec<Option<anyhow::Result<GeneratorResult>>> =
        names.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                debug!(family = %names[index], ok = result.is_ok(), "family planned");
                results[index] = Some(result);
            }
            // A panicking task leaves its slot empty; it is reported below.
            Err(e) => debug!(error = %e, "planning task failed"),
        }
    }

    names
        .into_iter()
        .zip(results)
        .map(|(name, result)| {
            let result = result.unwrap_or_else(|| Err(anyhow!("Planning task for '{}' did not complete", name)));
            FamilyPlan { name, result }
        })
        .collect()
}
