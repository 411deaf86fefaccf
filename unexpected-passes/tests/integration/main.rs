// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg(unix)]

use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use clap::Parser;
use indoc::formatdoc;
use pretty_assertions::assert_eq;
use std::os::unix::fs::PermissionsExt;
use unexpected_passes::UnexpectedPassesApp;
use unexpected_passes_metadata::FinderExitCode;

const TEST_ID_PREFIX: &str = "ninja://chrome/test:telemetry_gpu_integration_test/gpu_tests.\
                              pixel_integration_test.PixelIntegrationTest";

/// Sets up a fake `bq` and a config that points at it.
///
/// The fake answers `ci` queries with `ci_rows` and fails everything else.
fn setup(dir: &Utf8Path, ci_rows: &serde_json::Value) -> camino::Utf8PathBuf {
    let bq = dir.join("bq");
    let script = formatdoc! {r#"
        #!/bin/sh
        query=$(cat)
        case "$query" in
            *gpu_ci_test_results*)
                cat <<'END_ROWS'
        {ci_rows}
        END_ROWS
                ;;
            *)
                echo "Access Denied: Table gpu_try_test_results"
                exit 1
                ;;
        esac
    "#};
    std::fs::write(&bq, script).expect("fake bq written");
    std::fs::set_permissions(&bq, std::fs::Permissions::from_mode(0o755))
        .expect("fake bq made executable");

    let config = dir.join("config.toml");
    std::fs::write(
        &config,
        formatdoc! {r#"
            [query]
            bq-binary = "{bq}"
            project = "test-project"
            query-delay = "0s"
        "#},
    )
    .expect("config written");
    config
}

fn row(name: &str, status: &str, build: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("build-{build}"),
        "test_id": format!("{TEST_ID_PREFIX}.{name}"),
        "status": status,
        "step_name": "pixel_skia_gold_tests",
        "typ_tags": ["linux"],
        "typ_expectations": ["RetryOnFailure"],
    })
}

#[test]
fn find_prints_report() {
    let dir = Utf8TempDir::new().expect("temp dir created");
    let rows = serde_json::json!([
        row("Pixel_Stale", "PASS", "1"),
        row("Pixel_Flaky", "FAIL", "1"),
        row("Pixel_Flaky", "FAIL", "2"),
        row("Pixel_Other", "CRASH", "2"),
    ]);
    let config = setup(dir.path(), &rows);

    let app = UnexpectedPassesApp::try_parse_from([
        "unexpected-passes",
        "--color=never",
        "find",
        "--suite",
        "pixel",
        "--ci-builder",
        "linux-rel",
        "--test",
        "Pixel_Stale",
        "--test",
        "Pixel_Flaky",
        "--test",
        "Pixel_Gone",
        "--config-file",
        config.as_str(),
    ])
    .expect("valid args");
    let output = app.init_output();

    let mut stdout = Vec::new();
    let code = app.exec(output, &mut stdout).expect("find succeeds");
    assert_eq!(code, FinderExitCode::OK);

    let report: serde_json::Value = serde_json::from_slice(&stdout).expect("report is JSON");
    let tests = |key: &str| -> Vec<String> {
        report[key]
            .as_array()
            .expect("list of expectations")
            .iter()
            .map(|entry| entry["test"].as_str().unwrap_or_default().to_owned())
            .collect()
    };
    assert_eq!(tests("stale"), vec!["Pixel_Stale"]);
    assert_eq!(tests("active"), vec!["Pixel_Flaky"]);
    assert_eq!(tests("semi-stale"), Vec::<String>::new());
    assert_eq!(tests("unused"), vec!["Pixel_Gone"]);
    assert_eq!(
        report["active"][0]["stats"]["ci:linux-rel"]["pixel_skia_gold_tests"],
        serde_json::json!({ "pass-count": 0, "failed-build-ids": ["1", "2"] })
    );
    assert_eq!(
        report["unmatched"]["ci:linux-rel"][0]["test-name"],
        serde_json::json!("Pixel_Other")
    );
}

#[test]
fn query_failure_exit_code() {
    let dir = Utf8TempDir::new().expect("temp dir created");
    let config = setup(dir.path(), &serde_json::json!([]));

    let app = UnexpectedPassesApp::try_parse_from([
        "unexpected-passes",
        "--color=never",
        "find",
        "--suite",
        "pixel",
        "--try-builder",
        "linux-rel",
        "--test",
        "Pixel_A",
        "--config-file",
        config.as_str(),
    ])
    .expect("valid args");
    let output = app.init_output();

    let mut stdout = Vec::new();
    let error = app
        .exec(output, &mut stdout)
        .expect_err("try queries fail");
    assert_eq!(error.process_exit_code(), FinderExitCode::QUERY_FAILED);
    assert!(stdout.is_empty());
}
