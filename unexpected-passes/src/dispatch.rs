// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, clap_styles},
    report::FinderReport,
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{ArgGroup, Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use std::io::Write;
use tracing::{debug, info};
use unexpected_passes_metadata::{BuilderType, FinderExitCode};
use unexpected_passes_runner::{
    config::FinderConfig,
    expectation_map::TestExpectationMap,
    expectations::{Expectation, ExpectationSpec, ExpectedResult},
    orchestrator::{BuilderRunner, UnmatchedResults},
    querier::{QuerySettings, ResultQuerier},
    suite::SuiteSpec,
};

/// Finds test expectations that are no longer needed.
#[derive(Debug, Parser)]
#[command(version, name = "unexpected-passes", styles = clap_styles::style())]
pub struct UnexpectedPassesApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl UnexpectedPassesApp {
    /// Initializes logging and colors.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, writing the report to `writer`.
    ///
    /// Returns the exit code on success.
    pub fn exec(self, output: OutputContext, writer: &mut dyn Write) -> Result<i32> {
        match self.command {
            Command::Find(opts) => opts.exec(output, writer)?,
        }
        Ok(FinderExitCode::OK)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Query recent results and report which expectations are still needed
    ///
    /// The report is printed to stdout as JSON.
    Find(FindOpts),
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("expectation-source")
        .required(true)
        .args(["tests", "expectations"]),
))]
struct FindOpts {
    /// Test suite to look at (e.g. pixel, webgl2_conformance)
    #[arg(long, value_name = "SUITE")]
    suite: String,

    /// CI builder to query results for (may be specified multiple times)
    #[arg(long = "ci-builder", value_name = "BUILDER")]
    ci_builders: Vec<String>,

    /// Try builder to query results for (may be specified multiple times)
    #[arg(long = "try-builder", value_name = "BUILDER")]
    try_builders: Vec<String>,

    /// Test name glob to check as a retry-on-failure expectation (may be specified multiple times)
    #[arg(long = "test", value_name = "GLOB")]
    tests: Vec<String>,

    /// JSON file containing a list of expectations to check
    #[arg(long, value_name = "PATH")]
    expectations: Option<Utf8PathBuf>,

    #[clap(flatten)]
    config_opts: ConfigOpts,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: .config/unexpected-passes.toml in the current directory]
    #[arg(long, value_name = "PATH", env = "UNEXPECTED_PASSES_CONFIG")]
    config_file: Option<Utf8PathBuf>,

    /// Billing project to run queries under
    #[arg(long, value_name = "PROJECT", env = "UNEXPECTED_PASSES_PROJECT")]
    project: Option<String>,

    /// Number of recent builds to look at per builder
    #[arg(
        long,
        value_name = "N",
        value_parser = parse_positive,
        env = "UNEXPECTED_PASSES_NUM_SAMPLES",
    )]
    num_samples: Option<usize>,

    /// Discover tests first and query their results in chunks
    #[arg(long, env = "UNEXPECTED_PASSES_LARGE_QUERY_MODE")]
    large_query_mode: bool,
}

impl ConfigOpts {
    fn make_settings(&self, cwd: &Utf8Path) -> Result<QuerySettings> {
        let config = FinderConfig::from_sources(cwd, self.config_file.as_deref())?;
        if let Some(config_file) = config.config_file() {
            debug!("read config from {config_file}");
        }

        let mut settings = config.query().to_settings();
        if let Some(project) = &self.project {
            settings.set_project(project);
        }
        if let Some(num_samples) = self.num_samples {
            settings.set_num_samples(num_samples);
        }
        if self.large_query_mode {
            settings.set_large_query_mode(true);
        }
        Ok(settings)
    }
}

fn parse_positive(input: &str) -> Result<usize, String> {
    match input.parse::<usize>() {
        Ok(0) => Err("must be greater than 0".to_owned()),
        Ok(value) => Ok(value),
        Err(error) => Err(error.to_string()),
    }
}

impl FindOpts {
    fn exec(self, output: OutputContext, writer: &mut dyn Write) -> Result<()> {
        let cwd = current_dir()?;
        let settings = self.config_opts.make_settings(&cwd)?;
        let expectations = self.load_expectations()?;

        let mut map = TestExpectationMap::from_expectations(expectations);
        let querier = ResultQuerier::with_bq(SuiteSpec::new(&self.suite), settings);
        let runner = BuilderRunner::new(querier)?;

        let mut unmatched = UnmatchedResults::new();
        for (builder_type, builders) in [
            (BuilderType::Ci, &self.ci_builders),
            (BuilderType::Try, &self.try_builders),
        ] {
            if builders.is_empty() {
                continue;
            }
            info!(
                "querying {} {builder_type} {} for suite {}",
                builders.len().style(output.stderr_styles().count),
                plural_builders(builders.len()),
                self.suite,
            );
            let builder_unmatched = runner
                .fill_expectation_map_for_builders(&mut map, builders, builder_type)
                .map_err(|err| ExpectedError::FillExpectationMapError { builder_type, err })?;
            unmatched.extend(builder_unmatched);
        }

        let unused = map.filter_out_unused();
        let split = map.split_by_staleness();
        let report = FinderReport::new(&split, &unused, unmatched);

        let styles = output.stderr_styles();
        info!(
            "{} stale, {} semi-stale, {} active, {} unused",
            report.stale.len().style(styles.count),
            report.semi_stale.len().style(styles.count),
            report.active.len().style(styles.count),
            report.unused.len().style(styles.count),
        );
        if output.verbose {
            for (builder, results) in &report.unmatched {
                debug!("{builder}: {} results had no matching expectation", results.len());
            }
        }

        serde_json::to_writer_pretty(&mut *writer, &report)
            .map_err(|err| ExpectedError::WriteReportError { err: err.into() })?;
        writeln!(writer)
            .and_then(|()| writer.flush())
            .map_err(|err| ExpectedError::WriteReportError { err })?;
        Ok(())
    }

    fn load_expectations(&self) -> Result<Vec<Expectation>> {
        if let Some(path) = &self.expectations {
            let contents = std::fs::read_to_string(path).map_err(|err| {
                ExpectedError::ExpectationsReadError {
                    path: path.clone(),
                    err,
                }
            })?;
            let specs: Vec<ExpectationSpec> = serde_json::from_str(&contents).map_err(|err| {
                ExpectedError::ExpectationsParseError {
                    path: path.clone(),
                    err,
                }
            })?;
            return specs
                .into_iter()
                .map(|spec| spec.into_expectation().map_err(ExpectedError::from))
                .collect();
        }

        self.tests
            .iter()
            .map(|test| {
                Expectation::new(
                    test.as_str(),
                    Vec::<String>::new(),
                    [ExpectedResult::RetryOnFailure],
                )
                .map_err(ExpectedError::from)
            })
            .collect()
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::try_from(cwd).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })
}

fn plural_builders(count: usize) -> &'static str {
    if count == 1 { "builder" } else { "builders" }
}
