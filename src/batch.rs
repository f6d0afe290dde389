//! Flag-combination matrices and parallel batch resolution.
//!
//! Every resolution builds its own state, so a batch only shares the
//! read-only template, base macros and settings across worker threads.
//! Results come back in input order regardless of scheduling.

use crate::engine::{Engine, Resolution, ResolutionFailure};
use crate::error::Result;
use crate::flags::{ExclusiveGroup, FlagSet, FlagValue};
use crate::macros::MacroTable;
use crate::template::Template;
use crate::validator::InputDeclarations;
use rayon::prelude::*;
use tracing::{debug, warn};

/// The cartesian product of group variants and boolean toggles.
#[derive(Debug, Clone, Default)]
pub struct FlagMatrix {
    groups: Vec<ExclusiveGroup>,
    toggles: Vec<String>,
    fixed: Vec<(String, FlagValue)>,
}

impl FlagMatrix {
    /// A matrix varying every member of every group.
    pub fn new(groups: Vec<ExclusiveGroup>) -> Self {
        Self {
            groups,
            ..Self::default()
        }
    }

    /// Vary a boolean flag over off and on.
    pub fn toggle(mut self, name: impl Into<String>) -> Self {
        self.toggles.push(name.into());
        self
    }

    /// Pin a flag or group to one value in every combination.
    pub fn fix(mut self, name: impl Into<String>, value: FlagValue) -> Self {
        self.fixed.push((name.into(), value));
        self
    }

    fn is_fixed(&self, name: &str) -> bool {
        self.fixed.iter().any(|(n, _)| n == name)
    }

    /// Assignments per varying dimension.
    fn dimensions(&self) -> Vec<Vec<(String, FlagValue)>> {
        let groups = self
            .groups
            .iter()
            .filter(|g| !self.is_fixed(&g.name))
            .map(|g| {
                g.members
                    .iter()
                    .map(|m| (g.name.clone(), FlagValue::Variant(m.clone())))
                    .collect()
            });
        let toggles = self
            .toggles
            .iter()
            .filter(|t| !self.is_fixed(t))
            .map(|t| vec![(t.clone(), FlagValue::Off), (t.clone(), FlagValue::On)]);
        groups.chain(toggles).collect()
    }

    /// Number of combinations.
    pub fn len(&self) -> usize {
        self.dimensions().iter().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination, last dimension varying fastest.
    pub fn combinations(&self) -> Result<Vec<FlagSet>> {
        let dims = self.dimensions();
        let total: usize = dims.iter().map(Vec::len).product();
        let mut sets = Vec::with_capacity(total);

        for mut index in 0..total {
            let mut builder = FlagSet::builder().groups(self.groups.iter().cloned());
            for (name, value) in &self.fixed {
                builder = builder.set(name.clone(), value.clone());
            }

            let mut picks = Vec::with_capacity(dims.len());
            for dim in dims.iter().rev() {
                picks.push(&dim[index % dim.len()]);
                index /= dim.len();
            }
            for (name, value) in picks.into_iter().rev() {
                builder = builder.set(name.clone(), value.clone());
            }
            sets.push(builder.build()?);
        }

        debug!(combinations = sets.len(), "Expanded flag matrix");
        Ok(sets)
    }
}

/// Worker count used when none is given.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve each flag set on at most `jobs` threads.
pub fn resolve_batch(
    engine: &Engine,
    template: &Template,
    macros: &MacroTable,
    flag_sets: &[FlagSet],
    inputs: Option<&InputDeclarations>,
    jobs: usize,
) -> Vec<std::result::Result<Resolution, ResolutionFailure>> {
    let resolve_one = |flags: &FlagSet| engine.resolve(template, flags, macros, inputs);

    let jobs = jobs.clamp(1, flag_sets.len().max(1));
    if jobs == 1 {
        return flag_sets.iter().map(resolve_one).collect();
    }

    match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool.install(|| flag_sets.par_iter().map(resolve_one).collect()),
        Err(e) => {
            warn!(error = %e, "Could not start worker pool, resolving sequentially");
            flag_sets.iter().map(resolve_one).collect()
        }
    }
}
