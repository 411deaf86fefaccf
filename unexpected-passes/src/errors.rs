// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;
use unexpected_passes_metadata::{BuilderType, FinderExitCode};
use unexpected_passes_runner::errors::{
    BuilderRunnerBuildError, ConfigParseError, ExpectationParseError, FillExpectationMapError,
};

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are meant to be printed with display_to_stderr,
// which colorizes them.

/// An error that is expected to happen in normal use, and is reported without a backtrace.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: camino::FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("failed to read expectations file")]
    ExpectationsReadError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to parse expectations file")]
    ExpectationsParseError {
        path: Utf8PathBuf,
        #[source]
        err: serde_json::Error,
    },
    #[error("invalid expectation")]
    ExpectationParseError {
        #[from]
        err: ExpectationParseError,
    },
    #[error("failed to build builder runner")]
    BuilderRunnerBuildError {
        #[from]
        err: BuilderRunnerBuildError,
    },
    #[error("failed to gather results")]
    FillExpectationMapError {
        builder_type: BuilderType,
        #[source]
        err: FillExpectationMapError,
    },
    #[error("failed to write report")]
    WriteReportError {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ExpectationsReadError { .. }
            | Self::ExpectationsParseError { .. }
            | Self::ExpectationParseError { .. }
            | Self::BuilderRunnerBuildError { .. } => FinderExitCode::SETUP_ERROR,
            Self::FillExpectationMapError { err, .. } => match err {
                FillExpectationMapError::MergeCollision(_) => FinderExitCode::MERGE_FAILED,
                _ => FinderExitCode::QUERY_FAILED,
            },
            Self::WriteReportError { .. } => FinderExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!("current directory is not valid UTF-8");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::ExpectationsReadError { path, err } => {
                error!(
                    "failed to read expectations from `{}`",
                    path.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::ExpectationsParseError { path, err } => {
                error!(
                    "failed to parse expectations from `{}`",
                    path.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::ExpectationParseError { err } => {
                error!("{err}");
                err.source()
            }
            Self::BuilderRunnerBuildError { err } => {
                error!("failed to start the query runtime");
                Some(err as &dyn Error)
            }
            Self::FillExpectationMapError { builder_type, err } => {
                match err {
                    FillExpectationMapError::Query(err) => {
                        error!(
                            "failed to fetch results for builder `{}`",
                            err.builder().style(styles.bold)
                        );
                        Some(err.error() as &dyn Error)
                    }
                    _ => {
                        error!(
                            "failed to gather results for {} builders",
                            builder_type.style(styles.bold)
                        );
                        Some(err as &dyn Error)
                    }
                }
            }
            Self::WriteReportError { err } => {
                error!("failed to write report to stdout");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
