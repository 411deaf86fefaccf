// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fetching the results for a single builder.

use crate::{
    errors::{
        BuilderQueryError, QueryError, QuerySplitError, QuerySplitErrorKind, RowConversionError,
    },
    helpers::{get_num_cpus, plural},
    queries::{self, BUILDER_NAME_PARAM, NUM_BUILDS_PARAM},
    query_client::{BqCommandClient, QueryClient, QueryParameters},
    query_engine::{BatchError, QueryEngine},
    query_filter::QueryTestFilter,
    suite::SuiteSpec,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use unexpected_passes_metadata::{BuilderType, ResultStatus, TestResult};

/// The default number of builds to look at per builder.
pub const DEFAULT_NUM_SAMPLES: usize = 100;

/// The default maximum number of rows a single query may return.
pub const DEFAULT_MAX_ROWS: usize = (1 << 31) - 1;

/// The default number of results each query in large query mode aims for.
pub const DEFAULT_TARGET_RESULTS_PER_QUERY: usize = 20_000;

/// The default number of attempts made while rate-limited.
pub const DEFAULT_MAX_QUERY_TRIES: usize = 3;

/// The default delay between starting successive queries of a batch.
pub const DEFAULT_QUERY_DELAY: Duration = Duration::from_secs(5);

/// The default number of concurrent queries per CPU.
pub const DEFAULT_IO_THREADS_PER_CPU: usize = 4;

/// Settings controlling how results are queried.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QuerySettings {
    bq_binary: String,
    project: String,
    num_samples: usize,
    large_query_mode: bool,
    max_rows: usize,
    target_results_per_query: usize,
    max_query_tries: usize,
    query_delay: Duration,
    io_threads: usize,
}

impl QuerySettings {
    /// Creates settings with defaults for everything but the billing project.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            bq_binary: "bq".to_owned(),
            project: project.into(),
            num_samples: DEFAULT_NUM_SAMPLES,
            large_query_mode: false,
            max_rows: DEFAULT_MAX_ROWS,
            target_results_per_query: DEFAULT_TARGET_RESULTS_PER_QUERY,
            max_query_tries: DEFAULT_MAX_QUERY_TRIES,
            query_delay: DEFAULT_QUERY_DELAY,
            io_threads: get_num_cpus().saturating_mul(DEFAULT_IO_THREADS_PER_CPU),
        }
    }

    /// Sets the `bq` binary to run.
    pub fn set_bq_binary(&mut self, bq_binary: impl Into<String>) -> &mut Self {
        self.bq_binary = bq_binary.into();
        self
    }

    /// Sets the project queries are billed to.
    pub fn set_project(&mut self, project: impl Into<String>) -> &mut Self {
        self.project = project.into();
        self
    }

    /// Sets the number of recent builds to look at per builder.
    pub fn set_num_samples(&mut self, num_samples: usize) -> &mut Self {
        self.num_samples = num_samples;
        self
    }

    /// Sets whether tests are first discovered and then queried in chunks.
    pub fn set_large_query_mode(&mut self, large_query_mode: bool) -> &mut Self {
        self.large_query_mode = large_query_mode;
        self
    }

    /// Sets the maximum number of rows a single query may return.
    pub fn set_max_rows(&mut self, max_rows: usize) -> &mut Self {
        self.max_rows = max_rows;
        self
    }

    /// Sets the number of results each query in large query mode aims for.
    pub fn set_target_results_per_query(&mut self, target: usize) -> &mut Self {
        self.target_results_per_query = target;
        self
    }

    /// Sets the total number of attempts made while rate-limited.
    pub fn set_max_query_tries(&mut self, max_query_tries: usize) -> &mut Self {
        self.max_query_tries = max_query_tries;
        self
    }

    /// Sets the delay between starting successive queries of a batch.
    pub fn set_query_delay(&mut self, query_delay: Duration) -> &mut Self {
        self.query_delay = query_delay;
        self
    }

    /// Sets the maximum number of queries that run at the same time.
    pub fn set_io_threads(&mut self, io_threads: usize) -> &mut Self {
        self.io_threads = io_threads;
        self
    }

    /// The `bq` binary to run.
    pub fn bq_binary(&self) -> &str {
        &self.bq_binary
    }

    /// The project queries are billed to.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The number of recent builds to look at per builder.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Whether large query mode is enabled.
    pub fn large_query_mode(&self) -> bool {
        self.large_query_mode
    }

    /// The maximum number of rows a single query may return.
    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// The number of results each query in large query mode aims for.
    pub fn target_results_per_query(&self) -> usize {
        self.target_results_per_query
    }

    /// The total number of attempts made while rate-limited.
    pub fn max_query_tries(&self) -> usize {
        self.max_query_tries
    }

    /// The delay between starting successive queries of a batch.
    pub fn query_delay(&self) -> Duration {
        self.query_delay
    }

    /// The maximum number of queries that run at the same time.
    pub fn io_threads(&self) -> usize {
        self.io_threads
    }

    /// Creates a client that runs `bq` with these settings.
    pub fn bq_client(&self) -> BqCommandClient {
        BqCommandClient::new(&self.bq_binary, &self.project, self.max_rows)
    }
}

/// A row returned by the results query.
#[derive(Clone, Debug, Deserialize)]
pub struct ResultRow {
    /// The build ID, of the form `build-<id>`.
    pub id: String,

    /// The full test ID.
    pub test_id: String,

    /// The status, in the warehouse vocabulary.
    pub status: String,

    /// The step the test ran in, if recorded.
    #[serde(default)]
    pub step_name: Option<String>,

    /// The tags the test ran with.
    #[serde(default)]
    pub typ_tags: Vec<String>,

    /// The raw expectations the test ran with.
    #[serde(default)]
    pub typ_expectations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryRow {
    test_id: String,
}

/// Fetches results for builders of a single suite.
#[derive(Debug)]
pub struct ResultQuerier<C> {
    suite: SuiteSpec,
    settings: QuerySettings,
    engine: QueryEngine<C>,
}

impl ResultQuerier<BqCommandClient> {
    /// Creates a querier that runs `bq` as configured in `settings`.
    pub fn with_bq(suite: SuiteSpec, settings: QuerySettings) -> Self {
        let client = settings.bq_client();
        Self::new(suite, settings, client)
    }
}

impl<C: QueryClient> ResultQuerier<C> {
    /// Creates a querier that runs queries through `client`.
    pub fn new(suite: SuiteSpec, settings: QuerySettings, client: C) -> Self {
        let engine = QueryEngine::new(
            client,
            settings.max_query_tries,
            settings.query_delay,
            settings.io_threads,
        );
        Self {
            suite,
            settings,
            engine,
        }
    }

    /// The suite results are fetched for.
    pub fn suite(&self) -> &SuiteSpec {
        &self.suite
    }

    /// The settings in use.
    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Returns the query client.
    pub fn client(&self) -> &C {
        self.engine.client()
    }

    /// Fetches all relevant results for `builder`.
    ///
    /// Queries that are too large are retried with a finer-grained test filter until they
    /// succeed or the filter can't be split further.
    pub async fn query_builder(
        &self,
        builder: &str,
        builder_type: BuilderType,
    ) -> Result<Vec<TestResult>, BuilderQueryError> {
        let prefixed = builder_type.prefixed_name(builder);
        self.query_builder_inner(builder, builder_type)
            .await
            .map_err(|error| BuilderQueryError::new(prefixed, error))
    }

    async fn query_builder_inner(
        &self,
        builder: &str,
        builder_type: BuilderType,
    ) -> Result<Vec<TestResult>, QueryError> {
        let parameters = self.parameters(builder);

        let Some(mut filter) = self.test_filter(builder, builder_type, &parameters).await? else {
            debug!(
                "no tests with relevant expectations on {}, skipping",
                builder_type.prefixed_name(builder),
            );
            return Ok(Vec::new());
        };

        let rows: Vec<ResultRow> = loop {
            let queries: Vec<_> = filter
                .clauses()
                .iter()
                .map(|clause| queries::results_query(builder_type, clause))
                .collect();
            match self.engine.run_queries(&queries, &parameters).await {
                Ok(rows) => break rows,
                Err(BatchError::TooLarge) => {
                    filter.split()?;
                    let query_count = filter.query_count();
                    info!(
                        "query for {} was too large, split into {query_count} {}",
                        builder_type.prefixed_name(builder),
                        plural::queries_str(query_count),
                    );
                }
                Err(BatchError::Fatal(error)) => return Err(error),
            }
        };

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let result = convert_row(row)?;
            if let Some(tag) = self.suite.variant_tag()
                && !result.tags.contains(tag)
            {
                continue;
            }
            results.push(result);
        }

        debug!(
            "got {} {} for {}",
            results.len(),
            plural::results_str(results.len()),
            builder_type.prefixed_name(builder),
        );
        Ok(results)
    }

    /// Returns the filter to use for the results query, or `None` if there's nothing to query.
    async fn test_filter(
        &self,
        builder: &str,
        builder_type: BuilderType,
        parameters: &QueryParameters,
    ) -> Result<Option<QueryTestFilter>, QueryError> {
        let suite_clause = queries::suite_filter_clause(self.suite.resultdb_name());
        if !self.settings.large_query_mode {
            return Ok(Some(QueryTestFilter::fixed(suite_clause)));
        }

        let query = queries::test_discovery_query(builder_type, &suite_clause);
        let rows: Vec<DiscoveryRow> =
            match self.engine.run_queries(&[query], parameters).await {
                Ok(rows) => rows,
                // The discovery query has a fixed filter, so it can't be split.
                Err(BatchError::TooLarge) => {
                    return Err(QuerySplitError::new(QuerySplitErrorKind::Fixed).into());
                }
                Err(BatchError::Fatal(error)) => return Err(error),
            };

        if rows.is_empty() {
            return Ok(None);
        }

        let chunk_size = QueryTestFilter::chunk_size_for(
            self.settings.target_results_per_query,
            self.settings.num_samples,
        );
        debug!(
            "found {} {} for {}, querying in chunks of {chunk_size}",
            rows.len(),
            plural::tests_str(rows.len()),
            builder_type.prefixed_name(builder),
        );
        Ok(Some(QueryTestFilter::splittable(
            rows.into_iter().map(|row| row.test_id),
            chunk_size,
        )))
    }

    fn parameters(&self, builder: &str) -> QueryParameters {
        let mut parameters = QueryParameters::new();
        parameters
            .add("", BUILDER_NAME_PARAM, builder)
            .add("INT64", NUM_BUILDS_PARAM, self.settings.num_samples);
        parameters
    }
}

/// Converts a row returned by the results query into a [`TestResult`].
pub fn convert_row(row: ResultRow) -> Result<TestResult, RowConversionError> {
    let build_id = match row.id.split('-').collect::<Vec<_>>().as_slice() {
        [_, id] => (*id).to_owned(),
        _ => return Err(RowConversionError::InvalidBuildId { build_id: row.id }),
    };

    // Test IDs are of the form `<prefix>/gpu_tests.<suite>.<class>.<test>`, where the test name
    // may itself contain dots.
    let test_name = match row.test_id.splitn(4, '.').nth(3) {
        Some(test_name) => test_name.to_owned(),
        None => {
            return Err(RowConversionError::InvalidTestId {
                test_id: row.test_id,
            });
        }
    };

    let actual_status = ResultStatus::from_warehouse_status(&row.status).map_err(|error| {
        RowConversionError::InvalidStatus {
            test_id: row.test_id.clone(),
            error,
        }
    })?;

    Ok(TestResult::new(
        test_name,
        row.typ_tags,
        actual_status,
        row.step_name.unwrap_or_default(),
        build_id,
    ))
}
