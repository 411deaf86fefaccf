// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Aggregated pass/fail data for one (expectation, builder, step) combination.
///
/// A build ID is recorded as failed at most once, and counts only ever grow.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildStats {
    pass_count: usize,
    failed_build_ids: BTreeSet<String>,
}

impl BuildStats {
    /// Creates a new, empty `BuildStats`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a passing build.
    pub fn add_passed_build(&mut self) {
        self.pass_count += 1;
    }

    /// Records a failing build.
    ///
    /// Returns false if this build was already recorded as failing.
    pub fn add_failed_build(&mut self, build_id: impl Into<String>) -> bool {
        self.failed_build_ids.insert(build_id.into())
    }

    /// Folds the data from `other` into `self`: pass counts add, failed builds union.
    pub fn merge(&mut self, other: &BuildStats) {
        self.pass_count += other.pass_count;
        self.failed_build_ids
            .extend(other.failed_build_ids.iter().cloned());
    }

    /// The number of passing builds.
    #[inline]
    pub fn pass_count(&self) -> usize {
        self.pass_count
    }

    /// The number of distinct failing builds.
    #[inline]
    pub fn fail_count(&self) -> usize {
        self.failed_build_ids.len()
    }

    /// The IDs of the failing builds, in sorted order.
    pub fn failed_build_ids(&self) -> &BTreeSet<String> {
        &self.failed_build_ids
    }

    /// The total number of builds recorded.
    #[inline]
    pub fn total_builds(&self) -> usize {
        self.pass_count + self.fail_count()
    }

    /// Returns true if no failure was ever recorded.
    #[inline]
    pub fn did_fully_pass(&self) -> bool {
        self.failed_build_ids.is_empty()
    }

    /// Returns true if failures were recorded but no passes.
    #[inline]
    pub fn did_never_pass(&self) -> bool {
        self.pass_count == 0 && !self.failed_build_ids.is_empty()
    }
}
