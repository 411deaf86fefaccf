// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a single query against the results warehouse.
//!
//! The [`QueryClient`] trait is the seam between the query engine and the outside world. The
//! production implementation, [`BqCommandClient`], shells out to the `bq` command-line tool.

use crate::errors::QueryError;
use std::{collections::BTreeMap, future::Future, process::Stdio};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

/// Parameters bound into a query, shaped as `type -> name -> value`.
///
/// An empty type means `STRING`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct QueryParameters {
    inner: BTreeMap<String, BTreeMap<String, String>>,
}

impl QueryParameters {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter. An existing parameter with the same type and name is replaced.
    pub fn add(
        &mut self,
        param_type: impl Into<String>,
        name: impl Into<String>,
        value: impl ToString,
    ) -> &mut Self {
        self.inner
            .entry(param_type.into())
            .or_default()
            .insert(name.into(), value.to_string());
        self
    }

    /// Iterates over `(type, name, value)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> + '_ {
        self.inner.iter().flat_map(|(param_type, params)| {
            params
                .iter()
                .map(move |(name, value)| (param_type.as_str(), name.as_str(), value.as_str()))
        })
    }

    /// Renders these parameters as `--parameter=name:type:value` arguments.
    pub fn to_args(&self) -> Vec<String> {
        self.iter()
            .map(|(param_type, name, value)| format!("--parameter={name}:{param_type}:{value}"))
            .collect()
    }
}

/// The output of a query client invocation that ran to completion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryOutput {
    /// The invocation succeeded.
    Success {
        /// The JSON rows printed by the client.
        stdout: String,
    },

    /// The invocation exited with a failure.
    Failure {
        /// The command that was run, for diagnostics.
        command: String,

        /// The exit code, or `None` if the process was terminated by a signal.
        exit_code: Option<i32>,

        /// Everything the client printed.
        output: String,
    },
}

/// Runs queries against the results warehouse.
pub trait QueryClient: Send + Sync + 'static {
    /// Runs `query` with the given parameters.
    ///
    /// Returns `Err` only if the client could not be run at all, or produced unusable output.
    /// A client that ran and reported a failure returns [`QueryOutput::Failure`].
    fn run_query(
        &self,
        query: &str,
        parameters: &QueryParameters,
    ) -> impl Future<Output = Result<QueryOutput, QueryError>> + Send;
}

/// A [`QueryClient`] that runs the `bq` command-line tool.
///
/// The query text is passed in on standard input to avoid command-line length limits.
#[derive(Clone, Debug)]
pub struct BqCommandClient {
    bq_binary: String,
    project: String,
    max_rows: usize,
}

impl BqCommandClient {
    /// Creates a new client.
    pub fn new(bq_binary: impl Into<String>, project: impl Into<String>, max_rows: usize) -> Self {
        Self {
            bq_binary: bq_binary.into(),
            project: project.into(),
            max_rows,
        }
    }

    /// Returns the arguments passed to `bq` for the given parameters.
    pub fn args(&self, parameters: &QueryParameters) -> Vec<String> {
        let mut args = vec![
            "query".to_owned(),
            format!("--max_rows={}", self.max_rows),
            "--format=json".to_owned(),
            format!("--project_id={}", self.project),
            "--use_legacy_sql=false".to_owned(),
        ];
        args.extend(parameters.to_args());
        args
    }

    fn display_command(&self, args: &[String]) -> String {
        shell_words::join(
            std::iter::once(self.bq_binary.as_str()).chain(args.iter().map(String::as_str)),
        )
    }
}

impl QueryClient for BqCommandClient {
    async fn run_query(
        &self,
        query: &str,
        parameters: &QueryParameters,
    ) -> Result<QueryOutput, QueryError> {
        let args = self.args(parameters);
        let command = self.display_command(&args);
        debug!("running `{command}`");

        let mut child = Command::new(&self.bq_binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Rate limiting tears down sibling queries by dropping them.
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| QueryError::CommandSpawn {
                command: command.clone(),
                error,
            })?;

        let stdin = child.stdin.take();
        let write_query = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(query.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (write_res, output) = tokio::join!(write_query, child.wait_with_output());

        let output = output.map_err(|error| QueryError::CommandSpawn {
            command: command.clone(),
            error,
        })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Ok(QueryOutput::Failure {
                command,
                exit_code: output.status.code(),
                output: combined,
            });
        }

        // A client that exits before reading all of stdin closes the pipe early.
        if let Err(error) = write_res
            && error.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(QueryError::CommandSpawn { command, error });
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|error| QueryError::CommandNonUtf8 { command, error })?;
        Ok(QueryOutput::Success { stdout })
    }
}
