// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Folding test results into a [`TestExpectationMap`].

use crate::expectation_map::TestExpectationMap;
use std::collections::BTreeSet;
use tracing::debug;
use unexpected_passes_metadata::{ResultStatus, TestResult};

/// Adds a list of results for a single builder to `map`.
///
/// Identical results are counted once. A passing result is dropped if a failing result for the
/// same test, tags, step and build exists, since that pass is a retry of the failure.
///
/// Every remaining result updates the `[builder][step]` statistics of each expectation that
/// applies to it. Results no expectation applies to are returned.
pub fn add_result_list(
    map: &mut TestExpectationMap,
    builder: &str,
    results: impl IntoIterator<Item = TestResult>,
) -> Vec<TestResult> {
    let (mut pass_set, fail_set): (BTreeSet<_>, BTreeSet<_>) = results
        .into_iter()
        .partition(|result| result.actual_status.is_pass());

    for failure in &fail_set {
        if pass_set.remove(&failure.with_status(ResultStatus::Pass)) {
            debug!(
                "ignoring retried pass for {} in build {}",
                failure.test_name, failure.build_id,
            );
        }
    }

    let mut unmatched = Vec::new();
    for result in pass_set.into_iter().chain(fail_set) {
        if !add_result(map, builder, &result) {
            unmatched.push(result);
        }
    }
    unmatched
}

/// Adds a single result to every expectation that applies to it. Returns false if none did.
fn add_result(map: &mut TestExpectationMap, builder: &str, result: &TestResult) -> bool {
    let mut found = false;
    for (expectation, builder_map) in map.iter_mut() {
        if !expectation.applies_to_result(result) {
            continue;
        }
        found = true;

        let stats = builder_map
            .entry(builder.to_owned())
            .or_default()
            .entry(result.step.clone())
            .or_default();
        if result.actual_status.is_pass() {
            stats.add_passed_build();
        } else {
            stats.add_failed_build(result.build_id.clone());
        }
    }
    found
}
