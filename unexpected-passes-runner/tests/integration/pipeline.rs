// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end runs through the public API with an in-memory warehouse.

use crate::fixtures::*;
use color_eyre::eyre::Result;
use maplit::btreemap;
use pretty_assertions::assert_eq;
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use unexpected_passes_metadata::{BuilderType, ResultStatus, TestResult};
use unexpected_passes_runner::{
    errors::QueryError,
    expectation_map::TestExpectationMap,
    orchestrator::BuilderRunner,
    querier::ResultQuerier,
    queries::BUILDER_NAME_PARAM,
    query_client::{QueryClient, QueryOutput, QueryParameters},
    suite::SuiteSpec,
};

/// Serves rows per (table, builder). Queries against a table without rows fail.
#[derive(Default)]
struct Warehouse {
    rows: HashMap<(BuilderType, String), Vec<serde_json::Value>>,
    too_large_budget: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
}

impl Warehouse {
    fn with_rows(
        mut self,
        builder_type: BuilderType,
        builder: &str,
        rows: Vec<serde_json::Value>,
    ) -> Self {
        self.rows.insert((builder_type, builder.to_owned()), rows);
        self
    }

    /// Answers the first `count` results queries for `builder` with a memory error.
    fn too_large_first(self, builder: &str, count: usize) -> Self {
        self.too_large_budget
            .lock()
            .unwrap()
            .insert(builder.to_owned(), count);
        self
    }

    fn answer(&self, query: &str, parameters: &QueryParameters) -> QueryOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let builder = parameters
            .iter()
            .find(|(_, name, _)| *name == BUILDER_NAME_PARAM)
            .map(|(_, _, value)| value.to_owned())
            .unwrap_or_default();

        if let Some(budget) = self.too_large_budget.lock().unwrap().get_mut(&builder)
            && *budget > 0
        {
            *budget -= 1;
            return QueryOutput::Failure {
                command: "bq query".to_owned(),
                exit_code: Some(1),
                output: "Resources exceeded during query execution: \
                         The query could not be executed in the allotted memory."
                    .to_owned(),
            };
        }

        let builder_type = if query.contains("gpu_try_test_results") {
            BuilderType::Try
        } else {
            BuilderType::Ci
        };
        match self.rows.get(&(builder_type, builder.clone())) {
            Some(rows) => QueryOutput::Success {
                stdout: serde_json::Value::Array(rows.clone()).to_string(),
            },
            None => QueryOutput::Failure {
                command: "bq query".to_owned(),
                exit_code: Some(2),
                output: format!("Not found: builder {builder}"),
            },
        }
    }
}

impl QueryClient for Warehouse {
    fn run_query(
        &self,
        query: &str,
        parameters: &QueryParameters,
    ) -> impl Future<Output = Result<QueryOutput, QueryError>> + Send {
        std::future::ready(Ok(self.answer(query, parameters)))
    }
}

fn runner(warehouse: Warehouse) -> Result<BuilderRunner<Warehouse>> {
    let querier = ResultQuerier::new(SuiteSpec::new("pixel"), settings(), warehouse);
    Ok(BuilderRunner::new(querier)?)
}

#[test]
fn ci_and_try_builders_classify_expectations() -> Result<()> {
    let warehouse = Warehouse::default()
        .with_rows(
            BuilderType::Ci,
            "linux-rel",
            vec![
                row("Pixel_Stale", "PASS", "1", &["linux"]),
                row("Pixel_Stale", "PASS", "2", &["linux"]),
                row("Pixel_Flaky", "FAIL", "1", &["linux"]),
                row("Pixel_Flaky", "PASS", "2", &["linux"]),
                row("Pixel_Untracked", "FAIL", "1", &["linux"]),
            ],
        )
        .with_rows(
            BuilderType::Ci,
            "mac-rel",
            vec![
                row("Pixel_Stale", "PASS", "3", &["mac"]),
                row("Pixel_Flaky", "PASS", "3", &["mac"]),
            ],
        )
        .with_rows(
            BuilderType::Try,
            "linux-rel",
            vec![row("Pixel_Stale", "PASS", "4", &["linux"])],
        );

    let stale = retry_expectation("Pixel_Stale", &[]);
    let flaky = retry_expectation("Pixel_Flaky", &[]);
    let unused = retry_expectation("Pixel_Removed", &[]);
    let mut map =
        TestExpectationMap::from_expectations([stale.clone(), flaky.clone(), unused.clone()]);

    let runner = runner(warehouse)?;
    let ci_unmatched = runner.fill_expectation_map_for_builders(
        &mut map,
        &["linux-rel".to_owned(), "mac-rel".to_owned()],
        BuilderType::Ci,
    )?;
    let try_unmatched = runner.fill_expectation_map_for_builders(
        &mut map,
        &["linux-rel".to_owned()],
        BuilderType::Try,
    )?;

    assert_eq!(
        ci_unmatched,
        btreemap! {
            "ci:linux-rel".to_owned() => vec![TestResult::new(
                "Pixel_Untracked",
                ["linux"],
                ResultStatus::Failure,
                STEP,
                "1",
            )],
        }
    );
    assert!(try_unmatched.is_empty());

    assert_eq!(map.filter_out_unused(), vec![unused]);

    let split = map.split_by_staleness();
    assert_eq!(
        split.stale.expectations().collect::<Vec<_>>(),
        vec![&stale]
    );
    assert_eq!(
        split.stale.get(&stale),
        Some(&btreemap! {
            "ci:linux-rel".to_owned() => btreemap! { STEP.to_owned() => stats(2, &[]) },
            "ci:mac-rel".to_owned() => btreemap! { STEP.to_owned() => stats(1, &[]) },
            "try:linux-rel".to_owned() => btreemap! { STEP.to_owned() => stats(1, &[]) },
        })
    );
    assert_eq!(
        split.semi_stale.get(&flaky),
        Some(&btreemap! {
            "ci:linux-rel".to_owned() => btreemap! { STEP.to_owned() => stats(1, &["1"]) },
            "ci:mac-rel".to_owned() => btreemap! { STEP.to_owned() => stats(1, &[]) },
        })
    );
    assert!(split.active.is_empty());
    Ok(())
}

#[test]
fn too_large_queries_are_split_per_builder() -> Result<()> {
    let mut settings = settings();
    settings
        .set_large_query_mode(true)
        .set_num_samples(1)
        .set_target_results_per_query(2);

    let discovery: Vec<_> = ["Pixel_A", "Pixel_B", "Pixel_C"]
        .into_iter()
        .map(|name| serde_json::json!({ "test_id": test_id(name) }))
        .collect();
    let results = vec![
        row("Pixel_A", "PASS", "1", &[]),
        row("Pixel_B", "PASS", "1", &[]),
        row("Pixel_C", "FAIL", "1", &[]),
    ];

    let warehouse = DiscoveryWarehouse {
        discovery: serde_json::Value::Array(discovery).to_string(),
        results,
        too_large_calls: AtomicUsize::new(0),
        single_test_queries: Mutex::new(Vec::new()),
    };
    let querier = ResultQuerier::new(SuiteSpec::new("pixel"), settings, warehouse);
    let runner = BuilderRunner::new(querier)?;

    let expectation = retry_expectation("Pixel_*", &[]);
    let mut map = TestExpectationMap::from_expectations([expectation.clone()]);
    runner.fill_expectation_map_for_builders(
        &mut map,
        &["linux-rel".to_owned()],
        BuilderType::Ci,
    )?;

    assert_eq!(
        map.stats(&expectation, "ci:linux-rel", STEP),
        Some(&stats(2, &["1"]))
    );

    // Chunks of two: the [A, B] chunk is rejected once, then every test is queried on its own.
    let client = runner.querier().client();
    assert_eq!(client.too_large_calls.load(Ordering::SeqCst), 1);
    let mut single = client.single_test_queries.lock().unwrap().clone();
    single.sort();
    single.dedup();
    assert_eq!(single, vec![test_id("Pixel_A"), test_id("Pixel_B"), test_id("Pixel_C")]);
    Ok(())
}

/// Answers discovery queries with a fixed test list, and rejects results queries that cover more
/// than one test.
struct DiscoveryWarehouse {
    discovery: String,
    results: Vec<serde_json::Value>,
    too_large_calls: AtomicUsize,
    single_test_queries: Mutex<Vec<String>>,
}

impl DiscoveryWarehouse {
    fn answer(&self, query: &str) -> QueryOutput {
        if query.contains("SELECT DISTINCT") {
            return QueryOutput::Success {
                stdout: self.discovery.clone(),
            };
        }

        let queried: Vec<_> = self
            .results
            .iter()
            .filter(|row| query.contains(row["test_id"].as_str().unwrap_or_default()))
            .cloned()
            .collect();
        if queried.len() > 1 {
            self.too_large_calls.fetch_add(1, Ordering::SeqCst);
            return QueryOutput::Failure {
                command: "bq query".to_owned(),
                exit_code: Some(1),
                output: "Resources exceeded during query execution".to_owned(),
            };
        }

        let mut single = self.single_test_queries.lock().unwrap();
        single.extend(
            queried
                .iter()
                .filter_map(|row| row["test_id"].as_str().map(str::to_owned)),
        );
        QueryOutput::Success {
            stdout: serde_json::Value::Array(queried).to_string(),
        }
    }
}

impl QueryClient for DiscoveryWarehouse {
    fn run_query(
        &self,
        query: &str,
        _parameters: &QueryParameters,
    ) -> impl Future<Output = Result<QueryOutput, QueryError>> + Send {
        std::future::ready(Ok(self.answer(query)))
    }
}

#[test]
fn failing_builder_reports_prefixed_name() -> Result<()> {
    let warehouse = Warehouse::default().with_rows(
        BuilderType::Ci,
        "linux-rel",
        vec![row("Pixel_A", "PASS", "1", &[])],
    );
    let mut map = TestExpectationMap::from_expectations([retry_expectation("Pixel_A", &[])]);
    let before = map.clone();

    let error = runner(warehouse)?
        .fill_expectation_map_for_builders(
            &mut map,
            &["linux-rel".to_owned(), "win-rel".to_owned()],
            BuilderType::Ci,
        )
        .expect_err("win-rel has no data");

    assert_eq!(
        error.to_string(),
        "failed to fetch results for builder `ci:win-rel`"
    );
    assert_eq!(map, before);
    Ok(())
}

#[test]
fn memory_errors_without_large_query_mode_fail() -> Result<()> {
    let warehouse = Warehouse::default()
        .with_rows(
            BuilderType::Ci,
            "linux-rel",
            vec![row("Pixel_A", "PASS", "1", &[])],
        )
        .too_large_first("linux-rel", 1);
    let mut map = TestExpectationMap::from_expectations([retry_expectation("Pixel_A", &[])]);

    let runner = runner(warehouse)?;
    let error = runner
        .fill_expectation_map_for_builders(&mut map, &["linux-rel".to_owned()], BuilderType::Ci)
        .expect_err("a fixed filter can't be split");

    match error {
        unexpected_passes_runner::errors::FillExpectationMapError::Query(error) => {
            assert!(matches!(error.error(), QueryError::Split(_)), "{error:?}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(runner.querier().client().calls.load(Ordering::SeqCst), 1);
    Ok(())
}
