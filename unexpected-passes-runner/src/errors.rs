// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the unexpected-pass finder.

use crate::expectations::ExpectedResult;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::string::FromUtf8Error;
use thiserror::Error;
use unexpected_passes_metadata::ResultStatusParseError;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A value was syntactically valid but not allowed.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// The key whose value is invalid.
        key: &'static str,

        /// Why the value is invalid.
        reason: &'static str,
    },
}

/// An error that occurred while constructing an
/// [`Expectation`](crate::expectations::Expectation).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExpectationParseError {
    /// A glob pattern could not be compiled.
    #[error("invalid glob `{glob}`")]
    InvalidGlob {
        /// The glob that failed to compile.
        glob: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// The regex generated from a glob could not be compiled.
    #[error("glob `{glob}` produced an invalid regex")]
    InvalidRegex {
        /// The glob that failed to compile.
        glob: String,

        /// The underlying error.
        #[source]
        error: regex::Error,
    },

    /// An expected result was not recognized.
    #[error(
        "unrecognized expected result: {input}\n(known values: {})",
        ExpectedResult::VARIANTS.join(", "),
    )]
    UnknownExpectedResult {
        /// The input that failed to parse.
        input: String,
    },
}

/// A query test filter could not be split any further.
///
/// This is returned when the warehouse rejects a query as too large but the query is already as
/// small as it can be made. The only remedy is to query fewer samples.
#[derive(Clone, Debug, Error)]
#[error("{}; try reducing the number of samples", .kind)]
pub struct QuerySplitError {
    kind: QuerySplitErrorKind,
}

impl QuerySplitError {
    pub(crate) fn new(kind: QuerySplitErrorKind) -> Self {
        Self { kind }
    }

    /// Returns the reason the filter could not be split.
    pub fn kind(&self) -> QuerySplitErrorKind {
        self.kind
    }
}

/// The reason a query test filter could not be split.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum QuerySplitErrorKind {
    /// The filter is a single fixed clause, which cannot be split.
    #[error("fixed query filter cannot be split")]
    Fixed,

    /// Every chunk of the filter contains at most one test.
    #[error("every one of the {chunk_count} query filter chunks has at most one test")]
    SingleTestChunks {
        /// The number of chunks in the filter.
        chunk_count: usize,
    },
}

/// An error that occurred while converting a warehouse row into a
/// [`TestResult`](unexpected_passes_metadata::TestResult).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RowConversionError {
    /// The build ID was not of the form `build-<id>`.
    #[error("build ID `{build_id}` is not of the form `build-<id>`")]
    InvalidBuildId {
        /// The build ID that was returned.
        build_id: String,
    },

    /// The test ID was not of the form `<prefix>.<suite>.<class>.<test>`.
    #[error("test ID `{test_id}` is not of the form `<prefix>.<suite>.<class>.<test>`")]
    InvalidTestId {
        /// The test ID that was returned.
        test_id: String,
    },

    /// The status was not recognized.
    #[error("invalid status for test `{test_id}`")]
    InvalidStatus {
        /// The test ID the status was returned for.
        test_id: String,

        /// The underlying error.
        #[source]
        error: ResultStatusParseError,
    },
}

/// An error that occurred while running queries for a builder.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// The warehouse kept rate-limiting the queries.
    #[error("query was rate-limited {attempts} times in a row, giving up")]
    RateLimitExhausted {
        /// The number of attempts made.
        attempts: usize,
    },

    /// The query client could not be spawned.
    #[error("failed to execute `{command}`")]
    CommandSpawn {
        /// The command that was run.
        command: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The query client exited with a failure that isn't retryable.
    #[error(
        "command `{command}` failed with {}, output:\n{output}",
        .exit_code.map_or_else(|| "no exit code".to_owned(), |code| format!("exit code {code}")),
    )]
    CommandFail {
        /// The command that was run.
        command: String,

        /// The exit code, if any.
        exit_code: Option<i32>,

        /// The captured output of the command.
        output: String,
    },

    /// The query client produced output that wasn't valid UTF-8.
    #[error("command `{command}` produced non-UTF-8 output")]
    CommandNonUtf8 {
        /// The command that was run.
        command: String,

        /// The underlying error.
        #[source]
        error: FromUtf8Error,
    },

    /// The query client's output could not be parsed as JSON rows.
    #[error("failed to parse query output as JSON rows")]
    JsonParse {
        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// A returned row could not be converted into a result.
    #[error("failed to convert query row")]
    RowConversion(#[from] RowConversionError),

    /// The query was too large and could not be split further.
    #[error("query exceeded the warehouse memory limit")]
    Split(#[from] QuerySplitError),
}

/// An error that occurred while fetching results for a single builder.
#[derive(Debug, Error)]
#[error("failed to fetch results for builder `{builder}`")]
pub struct BuilderQueryError {
    builder: String,
    #[source]
    error: QueryError,
}

impl BuilderQueryError {
    pub(crate) fn new(builder: impl Into<String>, error: QueryError) -> Self {
        Self {
            builder: builder.into(),
            error,
        }
    }

    /// The builder, prefixed with its type (e.g. `ci:linux-rel`).
    pub fn builder(&self) -> &str {
        &self.builder
    }

    /// The underlying query error.
    pub fn error(&self) -> &QueryError {
        &self.error
    }
}

/// Two partial statistics maps both contained data for the same (expectation, builder, step)
/// cell.
///
/// Each cell is owned by exactly one builder, so this indicates that the same builder was
/// processed twice.
#[derive(Clone, Debug, Error)]
#[error("statistics for expectation `{expectation}`, builder `{builder}`, step `{step}` were updated more than once")]
pub struct MergeCollisionError {
    expectation: String,
    builder: String,
    step: String,
}

impl MergeCollisionError {
    pub(crate) fn new(
        expectation: impl Into<String>,
        builder: impl Into<String>,
        step: impl Into<String>,
    ) -> Self {
        Self {
            expectation: expectation.into(),
            builder: builder.into(),
            step: step.into(),
        }
    }

    /// The builder the collision occurred for.
    pub fn builder(&self) -> &str {
        &self.builder
    }

    /// The step the collision occurred for.
    pub fn step(&self) -> &str {
        &self.step
    }
}

/// An error that occurred while filling an expectation map for a set of builders.
///
/// No statistics are reported if this is returned: the caller's map is left untouched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FillExpectationMapError {
    /// Fetching results for a builder failed.
    #[error(transparent)]
    Query(#[from] BuilderQueryError),

    /// Merging a builder's statistics failed.
    #[error(transparent)]
    MergeCollision(#[from] MergeCollisionError),

    /// The task for a builder panicked.
    #[error("task for builder `{builder}` panicked")]
    TaskPanicked {
        /// The builder the task was running for.
        builder: String,

        /// The underlying error.
        #[source]
        error: tokio::task::JoinError,
    },
}

/// An error that occurred while building a
/// [`BuilderRunner`](crate::orchestrator::BuilderRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuilderRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),
}
