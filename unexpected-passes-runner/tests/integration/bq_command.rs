// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests that run a fake `bq` script through the real command client.

use crate::fixtures::*;
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, WrapErr};
use indoc::formatdoc;
use pretty_assertions::assert_eq;
use std::os::unix::fs::PermissionsExt;
use unexpected_passes_metadata::BuilderType;
use unexpected_passes_runner::{
    errors::{FillExpectationMapError, QueryError},
    expectation_map::TestExpectationMap,
    orchestrator::BuilderRunner,
    querier::ResultQuerier,
    query_client::BqCommandClient,
    suite::SuiteSpec,
};

/// Writes a fake `bq` that records its arguments and stdin, fails with `failure_output` for the
/// first `failures` calls, and then prints `rows`.
fn fake_bq(dir: &Utf8Path, failures: usize, failure_output: &str, rows: &str) -> Result<String> {
    let path = dir.join("bq");
    let script = formatdoc! {r#"
        #!/bin/sh
        dir="{dir}"
        cat > "$dir/query.sql"
        printf '%s\n' "$@" > "$dir/args.txt"
        count=$(cat "$dir/count" 2>/dev/null || echo 0)
        count=$((count + 1))
        echo "$count" > "$dir/count"
        if [ "$count" -le {failures} ]; then
            cat <<'END_FAILURE'
        {failure_output}
        END_FAILURE
            exit 1
        fi
        cat <<'END_ROWS'
        {rows}
        END_ROWS
    "#};
    std::fs::write(&path, script).wrap_err("failed to write fake bq")?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .wrap_err("failed to make fake bq executable")?;
    Ok(path.into_string())
}

fn runner(bq: String) -> Result<BuilderRunner<BqCommandClient>> {
    let mut settings = settings();
    settings.set_bq_binary(bq).set_max_rows(500);
    let querier = ResultQuerier::with_bq(SuiteSpec::new("pixel"), settings);
    Ok(BuilderRunner::new(querier)?)
}

fn call_count(dir: &Utf8Path) -> Result<usize> {
    let count = std::fs::read_to_string(dir.join("count")).wrap_err("failed to read count")?;
    Ok(count.trim().parse()?)
}

#[test]
fn query_runs_through_bq() -> Result<()> {
    let dir = Utf8TempDir::new()?;
    let rows = serde_json::Value::Array(vec![
        row("Pixel_A", "PASS", "1", &["linux"]),
        row("Pixel_A", "FAIL", "2", &["linux"]),
        row("Pixel_A", "PASS", "2", &["linux"]),
    ])
    .to_string();
    let bq = fake_bq(dir.path(), 0, "", &rows)?;

    let expectation = retry_expectation("Pixel_*", &["linux"]);
    let mut map = TestExpectationMap::from_expectations([expectation.clone()]);
    let unmatched = runner(bq)?.fill_expectation_map_for_builders(
        &mut map,
        &["Linux Release (NVIDIA)".to_owned()],
        BuilderType::Ci,
    )?;

    assert!(unmatched.is_empty());
    assert_eq!(
        map.stats(&expectation, "ci:Linux Release (NVIDIA)", STEP),
        Some(&stats(1, &["2"]))
    );

    let args = std::fs::read_to_string(dir.path().join("args.txt"))?;
    assert_eq!(
        args.lines().collect::<Vec<_>>(),
        vec![
            "query",
            "--max_rows=500",
            "--format=json",
            "--project_id=test-project",
            "--use_legacy_sql=false",
            "--parameter=builder_name::Linux Release (NVIDIA)",
            "--parameter=num_builds:INT64:100",
        ]
    );

    let query = std::fs::read_to_string(dir.path().join("query.sql"))?;
    assert!(query.contains("gpu_ci_test_results"), "{query}");
    assert!(
        query.contains(r#"REGEXP_CONTAINS(test_id, r"gpu_tests\.pixel_integration_test\.")"#),
        "{query}"
    );
    Ok(())
}

#[test]
fn rate_limits_are_retried() -> Result<()> {
    let dir = Utf8TempDir::new()?;
    let rows = serde_json::Value::Array(vec![row("Pixel_A", "PASS", "1", &["linux"])]).to_string();
    let bq = fake_bq(
        dir.path(),
        2,
        "BigQuery error in query operation: Exceeded rate limits: too many api requests",
        &rows,
    )?;

    let expectation = retry_expectation("Pixel_A", &[]);
    let mut map = TestExpectationMap::from_expectations([expectation.clone()]);
    runner(bq)?.fill_expectation_map_for_builders(
        &mut map,
        &["linux-rel".to_owned()],
        BuilderType::Try,
    )?;

    assert_eq!(call_count(dir.path())?, 3);
    assert_eq!(
        map.stats(&expectation, "try:linux-rel", STEP),
        Some(&stats(1, &[]))
    );
    Ok(())
}

#[test]
fn rate_limits_exhausted() -> Result<()> {
    let dir = Utf8TempDir::new()?;
    let bq = fake_bq(dir.path(), 3, "Exceeded rate limits", "[]")?;

    let mut map = TestExpectationMap::from_expectations([retry_expectation("Pixel_A", &[])]);
    let before = map.clone();
    let error = runner(bq)?
        .fill_expectation_map_for_builders(&mut map, &["linux-rel".to_owned()], BuilderType::Ci)
        .expect_err("every attempt is rate limited");

    match error {
        FillExpectationMapError::Query(error) => {
            assert_eq!(error.builder(), "ci:linux-rel");
            assert!(
                matches!(error.error(), QueryError::RateLimitExhausted { attempts: 3 }),
                "{error:?}"
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(call_count(dir.path())?, 3);
    assert_eq!(map, before);
    Ok(())
}

#[test]
fn command_failure_carries_output() -> Result<()> {
    let dir = Utf8TempDir::new()?;
    let bq = fake_bq(dir.path(), 1, "Access Denied: Project test-project", "[]")?;

    let mut map = TestExpectationMap::from_expectations([retry_expectation("Pixel_A", &[])]);
    let error = runner(bq)?
        .fill_expectation_map_for_builders(&mut map, &["linux-rel".to_owned()], BuilderType::Ci)
        .expect_err("command fails");

    match error {
        FillExpectationMapError::Query(error) => match error.error() {
            QueryError::CommandFail {
                command,
                exit_code,
                output,
            } => {
                assert!(command.contains("query"), "{command}");
                assert_eq!(*exit_code, Some(1));
                assert!(output.contains("Access Denied"), "{output}");
            }
            other => panic!("unexpected error: {other:?}"),
        },
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn missing_binary() -> Result<()> {
    let dir = Utf8TempDir::new()?;
    let bq = dir.path().join("does-not-exist").into_string();

    let mut map = TestExpectationMap::new();
    let error = runner(bq)?
        .fill_expectation_map_for_builders(&mut map, &["linux-rel".to_owned()], BuilderType::Ci)
        .expect_err("binary doesn't exist");

    match error {
        FillExpectationMapError::Query(error) => {
            assert!(
                matches!(error.error(), QueryError::CommandSpawn { .. }),
                "{error:?}"
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}
