// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for unexpected-passes-runner.

use std::sync::OnceLock;
use tracing::warn;

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "result" if `count` is 1, otherwise "results".
    pub fn results_str(count: usize) -> &'static str {
        if count == 1 { "result" } else { "results" }
    }

    /// Returns "query" if `count` is 1, otherwise "queries".
    pub fn queries_str(count: usize) -> &'static str {
        if count == 1 { "query" } else { "queries" }
    }

    /// Returns "builder" if `count` is 1, otherwise "builders".
    pub fn builders_str(count: usize) -> &'static str {
        if count == 1 { "builder" } else { "builders" }
    }

    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }
}

/// Gets the number of available CPUs and caches the value.
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: OnceLock<usize> = OnceLock::new();

    *NUM_CPUS.get_or_init(|| match std::thread::available_parallelism() {
        Ok(count) => count.into(),
        Err(err) => {
            warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
            1
        }
    })
}
