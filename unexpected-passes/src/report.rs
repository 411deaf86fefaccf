// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Serialize;
use unexpected_passes_runner::{
    expectation_map::{BuilderStepMap, StalenessSplit, TestExpectationMap},
    expectations::{Expectation, ExpectationSpec},
    orchestrator::UnmatchedResults,
};

/// The JSON report printed by `unexpected-passes find`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FinderReport {
    /// Expectations whose tests passed everywhere they ran.
    pub stale: Vec<ExpectationReport>,

    /// Expectations whose tests passed on some builder steps but not others.
    pub semi_stale: Vec<ExpectationReport>,

    /// Expectations that are still needed.
    pub active: Vec<ExpectationReport>,

    /// Expectations that no result applied to.
    pub unused: Vec<ExpectationSpec>,

    /// Results that no expectation applied to, keyed by prefixed builder name.
    pub unmatched: UnmatchedResults,
}

impl FinderReport {
    /// Assembles a report.
    pub fn new(
        split: &StalenessSplit,
        unused: &[Expectation],
        unmatched: UnmatchedResults,
    ) -> Self {
        Self {
            stale: ExpectationReport::from_map(&split.stale),
            semi_stale: ExpectationReport::from_map(&split.semi_stale),
            active: ExpectationReport::from_map(&split.active),
            unused: unused.iter().map(ExpectationSpec::from).collect(),
            unmatched,
        }
    }
}

/// An expectation along with the statistics gathered for it.
#[derive(Clone, Debug, Serialize)]
pub struct ExpectationReport {
    /// The expectation.
    #[serde(flatten)]
    pub expectation: ExpectationSpec,

    /// Statistics keyed by prefixed builder name, then by step.
    pub stats: BuilderStepMap,
}

impl ExpectationReport {
    fn from_map(map: &TestExpectationMap) -> Vec<Self> {
        map.iter()
            .map(|(expectation, stats)| Self {
                expectation: expectation.into(),
                stats: stats.clone(),
            })
            .collect()
    }
}
