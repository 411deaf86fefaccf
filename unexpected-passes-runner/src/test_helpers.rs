// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::QueryError,
    query_client::{QueryClient, QueryOutput, QueryParameters},
};
use std::{
    collections::VecDeque,
    future::Future,
    sync::{Arc, Mutex},
};

type Handler = dyn Fn(&str, &QueryParameters) -> Result<QueryOutput, QueryError> + Send + Sync;

/// A query client that answers queries from a script instead of the warehouse.
pub(crate) struct FakeQueryClient {
    handler: Box<Handler>,
    queries: Mutex<Vec<(String, QueryParameters)>>,
}

impl FakeQueryClient {
    /// Answers calls with `responses`, in order. Panics if more calls are made.
    pub(crate) fn new(responses: impl IntoIterator<Item = Result<QueryOutput, QueryError>>) -> Self {
        let responses = Arc::new(Mutex::new(responses.into_iter().collect::<VecDeque<_>>()));
        Self::with_handler(move |query, _| {
            responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected query: {query}"))
        })
    }

    /// Answers calls with `handler`.
    pub(crate) fn with_handler(
        handler: impl Fn(&str, &QueryParameters) -> Result<QueryOutput, QueryError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub(crate) fn queries(&self) -> Vec<(String, QueryParameters)> {
        self.queries.lock().unwrap().clone()
    }
}

impl QueryClient for FakeQueryClient {
    fn run_query(
        &self,
        query: &str,
        parameters: &QueryParameters,
    ) -> impl Future<Output = Result<QueryOutput, QueryError>> + Send {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_owned(), parameters.clone()));
        std::future::ready((self.handler)(query, parameters))
    }
}

pub(crate) fn success(stdout: &str) -> QueryOutput {
    QueryOutput::Success {
        stdout: stdout.to_owned(),
    }
}

pub(crate) fn failure(output: &str) -> QueryOutput {
    QueryOutput::Failure {
        command: "bq query".to_owned(),
        exit_code: Some(1),
        output: output.to_owned(),
    }
}

pub(crate) fn rate_limited() -> QueryOutput {
    failure("Error in query string: Exceeded rate limits: too many concurrent queries")
}

pub(crate) fn too_large() -> QueryOutput {
    failure("Resources exceeded during query execution: memoryLimitExceeded")
}
