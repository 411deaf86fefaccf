// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a batch of queries concurrently, with rate-limit retries.

use crate::{
    errors::QueryError,
    helpers::plural,
    query_client::{QueryClient, QueryOutput, QueryParameters},
};
use futures::prelude::*;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A recognized kind of query failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// The warehouse is rate-limiting queries. The batch should be retried.
    RateLimited,

    /// The query needed more memory than the warehouse allows. The query should be split.
    TooLarge,
}

/// Substrings of failed query output, and the kind of failure each indicates.
///
/// Rules are checked in order and the first match wins.
pub static OUTPUT_RULES: &[(&str, FailureKind)] = &[
    ("Exceeded rate limits", FailureKind::RateLimited),
    ("memoryLimitExceeded", FailureKind::TooLarge),
    (
        "Resources exceeded during query execution",
        FailureKind::TooLarge,
    ),
];

/// Classifies the output of a failed query. Returns `None` if no rule matches.
pub fn classify_failure(output: &str) -> Option<FailureKind> {
    OUTPUT_RULES
        .iter()
        .find(|(marker, _)| output.contains(marker))
        .map(|&(_, kind)| kind)
}

/// The classified outcome of a single query invocation.
#[derive(Debug)]
pub enum QueryOutcome {
    /// The query succeeded with this output.
    Ok(String),

    /// The warehouse rate-limited the query.
    RateLimited,

    /// The query was too large for the warehouse.
    TooLarge,

    /// The query failed in a way that can't be recovered from.
    Fatal(QueryError),
}

impl QueryOutcome {
    /// Classifies the result of running a query client.
    pub fn classify(result: Result<QueryOutput, QueryError>) -> Self {
        match result {
            Ok(QueryOutput::Success { stdout }) => Self::Ok(stdout),
            Ok(QueryOutput::Failure {
                command,
                exit_code,
                output,
            }) => match classify_failure(&output) {
                Some(FailureKind::RateLimited) => Self::RateLimited,
                Some(FailureKind::TooLarge) => Self::TooLarge,
                None => Self::Fatal(QueryError::CommandFail {
                    command,
                    exit_code,
                    output,
                }),
            },
            Err(error) => Self::Fatal(error),
        }
    }
}

/// A batch of queries failed.
#[derive(Debug)]
pub enum BatchError {
    /// At least one query was too large. The caller should split its filter and try again.
    TooLarge,

    /// The batch failed and shouldn't be retried.
    Fatal(QueryError),
}

/// Runs batches of queries through a [`QueryClient`].
#[derive(Debug)]
pub struct QueryEngine<C> {
    client: C,
    max_query_tries: usize,
    query_delay: Duration,
    io_threads: usize,
}

impl<C: QueryClient> QueryEngine<C> {
    /// Creates a new engine.
    ///
    /// * `max_query_tries` is the total number of attempts made while rate-limited.
    /// * Query `i` of a batch is started `i * query_delay` after the batch.
    /// * At most `io_threads` queries run at the same time.
    pub fn new(
        client: C,
        max_query_tries: usize,
        query_delay: Duration,
        io_threads: usize,
    ) -> Self {
        Self {
            client,
            max_query_tries: max_query_tries.max(1),
            query_delay,
            io_threads: io_threads.max(1),
        }
    }

    /// Returns the client used by this engine.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Runs every query with the same parameters, and returns all of their rows.
    ///
    /// If any query is rate-limited, every other query in the batch is cancelled and the batch is
    /// retried, up to `max_query_tries` attempts in total.
    pub async fn run_queries<R: DeserializeOwned>(
        &self,
        queries: &[String],
        parameters: &QueryParameters,
    ) -> Result<Vec<R>, BatchError> {
        for attempt in 1..=self.max_query_tries {
            match self.run_attempt(queries, parameters).await {
                AttemptOutcome::Done(outputs) => {
                    return parse_rows(&outputs).map_err(BatchError::Fatal);
                }
                AttemptOutcome::RateLimited => {
                    warn!(
                        "rate limited on attempt {attempt}/{} for {} {}",
                        self.max_query_tries,
                        queries.len(),
                        plural::queries_str(queries.len()),
                    );
                }
                AttemptOutcome::TooLarge => return Err(BatchError::TooLarge),
                AttemptOutcome::Fatal(error) => return Err(BatchError::Fatal(error)),
            }
        }

        Err(BatchError::Fatal(QueryError::RateLimitExhausted {
            attempts: self.max_query_tries,
        }))
    }

    async fn run_attempt(
        &self,
        queries: &[String],
        parameters: &QueryParameters,
    ) -> AttemptOutcome {
        let start = Instant::now();
        let pending: Vec<_> = queries
            .iter()
            .enumerate()
            .map(|(i, query)| self.run_one(start, i, queries.len(), query, parameters))
            .collect();
        let mut outcomes = stream::iter(pending).buffer_unordered(self.io_threads);

        let mut outputs = Vec::with_capacity(queries.len());
        while let Some(outcome) = outcomes.next().await {
            // Returning early drops the stream, which cancels the remaining queries.
            match outcome {
                QueryOutcome::Ok(stdout) => outputs.push(stdout),
                QueryOutcome::RateLimited => return AttemptOutcome::RateLimited,
                QueryOutcome::TooLarge => return AttemptOutcome::TooLarge,
                QueryOutcome::Fatal(error) => return AttemptOutcome::Fatal(error),
            }
        }
        AttemptOutcome::Done(outputs)
    }

    async fn run_one(
        &self,
        start: Instant,
        i: usize,
        total: usize,
        query: &str,
        parameters: &QueryParameters,
    ) -> QueryOutcome {
        let delay = self
            .query_delay
            .saturating_mul(u32::try_from(i).unwrap_or(u32::MAX));
        if !delay.is_zero() {
            tokio::time::sleep_until(start + delay).await;
        }
        debug!("starting query {}/{total}", i + 1);
        QueryOutcome::classify(self.client.run_query(query, parameters).await)
    }
}

enum AttemptOutcome {
    Done(Vec<String>),
    RateLimited,
    TooLarge,
    Fatal(QueryError),
}

/// Parses each output as a JSON array of rows, and concatenates them.
///
/// Empty output is treated as no rows.
fn parse_rows<R: DeserializeOwned>(outputs: &[String]) -> Result<Vec<R>, QueryError> {
    let mut rows = Vec::new();
    for output in outputs {
        if output.trim().is_empty() {
            continue;
        }
        let parsed: Vec<R> =
            serde_json::from_str(output).map_err(|error| QueryError::JsonParse { error })?;
        rows.extend(parsed);
    }
    Ok(rows)
}
