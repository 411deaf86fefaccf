// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;
use unexpected_passes_metadata::BuildStats;
use unexpected_passes_runner::{
    expectations::{Expectation, ExpectedResult},
    querier::QuerySettings,
};

pub(crate) const STEP: &str = "pixel_skia_gold_tests";

pub(crate) fn test_id(name: &str) -> String {
    format!(
        "ninja://chrome/test:telemetry_gpu_integration_test/gpu_tests.pixel_integration_test.\
         PixelIntegrationTest.{name}"
    )
}

pub(crate) fn row(name: &str, status: &str, build: &str, tags: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "id": format!("build-{build}"),
        "test_id": test_id(name),
        "status": status,
        "step_name": STEP,
        "typ_tags": tags,
        "typ_expectations": ["RetryOnFailure"],
    })
}

pub(crate) fn settings() -> QuerySettings {
    let mut settings = QuerySettings::new("test-project");
    settings.set_query_delay(Duration::ZERO).set_io_threads(2);
    settings
}

pub(crate) fn retry_expectation(test: &str, tags: &[&str]) -> Expectation {
    Expectation::new(test, tags.iter().copied(), [ExpectedResult::RetryOnFailure])
        .expect("valid glob")
}

pub(crate) fn stats(passes: usize, failed: &[&str]) -> BuildStats {
    let mut stats = BuildStats::new();
    for _ in 0..passes {
        stats.add_passed_build();
    }
    for id in failed {
        stats.add_failed_build(*id);
    }
    stats
}
