// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The nested `expectation -> builder -> step -> stats` structure results are folded into.

use crate::{errors::MergeCollisionError, expectations::Expectation};
use std::collections::{BTreeMap, btree_map};
use unexpected_passes_metadata::BuildStats;

/// Per-step statistics for a single builder.
pub type StepBuildStatsMap = BTreeMap<String, BuildStats>;

/// Per-builder statistics for a single expectation. Builder names are prefixed with their type,
/// e.g. `ci:linux-rel`.
pub type BuilderStepMap = BTreeMap<String, StepBuildStatsMap>;

/// Statistics for a set of expectations.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestExpectationMap {
    inner: BTreeMap<Expectation, BuilderStepMap>,
}

impl TestExpectationMap {
    /// Creates a new, empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map containing the given expectations, with no statistics.
    pub fn from_expectations(expectations: impl IntoIterator<Item = Expectation>) -> Self {
        Self {
            inner: expectations
                .into_iter()
                .map(|expectation| (expectation, BuilderStepMap::new()))
                .collect(),
        }
    }

    /// Adds an expectation with no statistics. Existing statistics for it are kept.
    pub fn insert_expectation(&mut self, expectation: Expectation) {
        self.inner.entry(expectation).or_default();
    }

    /// Returns a map with the same expectations as this one, but no statistics.
    pub fn empty_copy(&self) -> Self {
        Self::from_expectations(self.inner.keys().cloned())
    }

    /// Returns the number of expectations in this map.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if this map has no expectations.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over the expectations in this map.
    pub fn expectations(&self) -> impl Iterator<Item = &Expectation> + '_ {
        self.inner.keys()
    }

    /// Iterates over expectations and their per-builder statistics.
    pub fn iter(&self) -> btree_map::Iter<'_, Expectation, BuilderStepMap> {
        self.inner.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> btree_map::IterMut<'_, Expectation, BuilderStepMap> {
        self.inner.iter_mut()
    }

    /// Returns the per-builder statistics for an expectation.
    pub fn get(&self, expectation: &Expectation) -> Option<&BuilderStepMap> {
        self.inner.get(expectation)
    }

    /// Returns the statistics for a single (expectation, builder, step) cell.
    pub fn stats(&self, expectation: &Expectation, builder: &str, step: &str) -> Option<&BuildStats> {
        self.inner.get(expectation)?.get(builder)?.get(step)
    }

    /// Merges the statistics in `partial` into this map.
    ///
    /// `original` is the map as it was before any partial maps were merged in. Every cell in
    /// `partial` must either be absent from `self`, or unchanged from `original`: a cell that was
    /// already updated by an earlier merge means two partial maps both claimed it, and a
    /// [`MergeCollisionError`] is returned. Mergeable cells are combined with
    /// [`BuildStats::merge`].
    ///
    /// On error, cells merged before the collision was detected remain merged.
    pub fn merge_from(
        &mut self,
        partial: &TestExpectationMap,
        original: &TestExpectationMap,
    ) -> Result<(), MergeCollisionError> {
        for (expectation, builder_map) in &partial.inner {
            let base_builder_map = self.inner.entry(expectation.clone()).or_default();
            for (builder, step_map) in builder_map {
                let base_step_map = base_builder_map.entry(builder.clone()).or_default();
                for (step, stats) in step_map {
                    match base_step_map.entry(step.clone()) {
                        btree_map::Entry::Vacant(entry) => {
                            entry.insert(stats.clone());
                        }
                        btree_map::Entry::Occupied(mut entry) => {
                            if original.stats(expectation, builder, step) != Some(entry.get()) {
                                return Err(MergeCollisionError::new(
                                    expectation.to_string(),
                                    builder,
                                    step,
                                ));
                            }
                            entry.get_mut().merge(stats);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Removes every expectation that no result applied to, and returns them.
    pub fn filter_out_unused(&mut self) -> Vec<Expectation> {
        let mut unused = Vec::new();
        self.inner.retain(|expectation, builder_map| {
            if builder_map.is_empty() {
                unused.push(expectation.clone());
                false
            } else {
                true
            }
        });
        unused
    }

    /// Splits this map's expectations by whether they are still needed.
    ///
    /// Each step's statistics are classified as fully passing (no failures), never passing (no
    /// passes), or partially passing. Then, for each expectation:
    ///
    /// * If every step fully passed, the expectation is *stale*.
    /// * If no step fully passed, the expectation is *active*. Only never- and partially-passing
    ///   steps are kept.
    /// * Otherwise, the expectation is *semi-stale*, and all steps are kept.
    pub fn split_by_staleness(&self) -> StalenessSplit {
        let mut split = StalenessSplit::default();

        for (expectation, builder_map) in &self.inner {
            let mut by_kind: BTreeMap<PassKind, BuilderStepMap> = BTreeMap::new();
            for (builder, step_map) in builder_map {
                for (step, stats) in step_map {
                    by_kind
                        .entry(PassKind::of(stats))
                        .or_default()
                        .entry(builder.clone())
                        .or_default()
                        .insert(step.clone(), stats.clone());
                }
            }

            let has_kind = |kind: PassKind| by_kind.contains_key(&kind);
            let (target, kinds): (_, &[PassKind]) =
                if !has_kind(PassKind::Never) && !has_kind(PassKind::Partial) {
                    (&mut split.stale, &[PassKind::Full])
                } else if !has_kind(PassKind::Full) {
                    (&mut split.active, &[PassKind::Never, PassKind::Partial])
                } else {
                    (
                        &mut split.semi_stale,
                        &[PassKind::Full, PassKind::Never, PassKind::Partial],
                    )
                };

            let target_builder_map = target.inner.entry(expectation.clone()).or_default();
            for kind in kinds {
                for (builder, step_map) in by_kind.remove(kind).unwrap_or_default() {
                    target_builder_map
                        .entry(builder)
                        .or_default()
                        .extend(step_map);
                }
            }
        }

        split
    }
}

impl FromIterator<(Expectation, BuilderStepMap)> for TestExpectationMap {
    fn from_iter<T: IntoIterator<Item = (Expectation, BuilderStepMap)>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TestExpectationMap {
    type Item = (&'a Expectation, &'a BuilderStepMap);
    type IntoIter = btree_map::Iter<'a, Expectation, BuilderStepMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum PassKind {
    Full,
    Never,
    Partial,
}

impl PassKind {
    fn of(stats: &BuildStats) -> Self {
        if stats.did_fully_pass() {
            Self::Full
        } else if stats.did_never_pass() {
            Self::Never
        } else {
            Self::Partial
        }
    }
}

/// The result of [`TestExpectationMap::split_by_staleness`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StalenessSplit {
    /// Expectations whose tests fully passed everywhere.
    pub stale: TestExpectationMap,

    /// Expectations whose tests fully passed on some steps but not others.
    pub semi_stale: TestExpectationMap,

    /// Expectations whose tests never fully passed.
    pub active: TestExpectationMap,
}
