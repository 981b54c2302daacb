use serde::Serialize;
use std::collections::BTreeSet;

/// Dialect feature flags that gate planner branch choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Capability {
    /// Staged files can be validated without loading into main.
    DryRun,
    /// A copy can project and derive columns while reading files.
    TransformWhileCopy,
    /// TRY_CAST style casts that yield NULL instead of failing.
    SafeCast,
    /// COPY can check staged files and return errors without loading them.
    ValidationMode,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn of(capabilities: &[Capability]) -> Self {
        Self(capabilities.iter().copied().collect())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }
}
