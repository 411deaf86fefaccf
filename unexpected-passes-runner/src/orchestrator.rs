// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fetching and reconciling results for many builders in parallel.
//!
//! Each builder is handled by its own task, which reconciles results into a private copy of the
//! expectation map. Partial maps are merged by the coordinating task as builders finish, so no
//! map is ever shared between tasks.

use crate::{
    errors::{BuilderQueryError, BuilderRunnerBuildError, FillExpectationMapError},
    expectation_map::TestExpectationMap,
    helpers::plural,
    querier::ResultQuerier,
    query_client::QueryClient,
    reconcile::add_result_list,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tokio::{runtime::Runtime, task::JoinSet};
use tracing::{debug, info};
use unexpected_passes_metadata::{BuilderType, TestResult};

/// Results no expectation applied to, keyed by prefixed builder name.
pub type UnmatchedResults = BTreeMap<String, Vec<TestResult>>;

/// Fetches results for every builder and folds them into `map`.
///
/// Returns the results that no expectation applied to, for builders that had any.
///
/// On success, `map` is replaced with the merged statistics. On failure, `map` is left untouched
/// and the remaining builders are cancelled.
pub async fn fill_expectation_map_for_builders<C: QueryClient>(
    querier: &Arc<ResultQuerier<C>>,
    map: &mut TestExpectationMap,
    builders: &[String],
    builder_type: BuilderType,
) -> Result<UnmatchedResults, FillExpectationMapError> {
    info!(
        "fetching results for {} {} {}",
        builders.len(),
        builder_type,
        plural::builders_str(builders.len()),
    );

    let template = map.empty_copy();
    let mut tasks = JoinSet::new();
    let mut task_builders = HashMap::new();

    for builder in builders {
        let querier = Arc::clone(querier);
        let mut partial = template.clone();
        let builder = builder.clone();
        let prefixed = builder_type.prefixed_name(&builder);
        let task_name = prefixed.clone();

        let handle = tasks.spawn(async move {
            let results = querier.query_builder(&builder, builder_type).await?;
            let unmatched = add_result_list(&mut partial, &prefixed, results);
            Ok::<_, BuilderQueryError>((prefixed, partial, unmatched))
        });
        task_builders.insert(handle.id(), task_name);
    }

    let original = &*map;
    let mut merged = original.clone();
    let mut unmatched_by_builder = UnmatchedResults::new();

    // Returning early drops the join set, which aborts any tasks still running.
    while let Some(joined) = tasks.join_next().await {
        let (prefixed, partial, unmatched) = match joined {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => return Err(error.into()),
            Err(error) => {
                let builder = task_builders
                    .remove(&error.id())
                    .unwrap_or_else(|| "<unknown>".to_owned());
                return Err(FillExpectationMapError::TaskPanicked { builder, error });
            }
        };

        merged.merge_from(&partial, original)?;
        debug!(
            "merged results for {prefixed} ({} unmatched)",
            unmatched.len()
        );
        if !unmatched.is_empty() {
            unmatched_by_builder.insert(prefixed, unmatched);
        }
    }

    *map = merged;
    Ok(unmatched_by_builder)
}

/// Runs [`fill_expectation_map_for_builders`] on a dedicated multi-threaded runtime.
#[derive(Debug)]
pub struct BuilderRunner<C> {
    querier: Arc<ResultQuerier<C>>,
    runtime: Runtime,
}

impl<C: QueryClient> BuilderRunner<C> {
    /// Creates a new runner.
    pub fn new(querier: ResultQuerier<C>) -> Result<Self, BuilderRunnerBuildError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("unexpected-passes-worker")
            .build()
            .map_err(BuilderRunnerBuildError::TokioRuntimeCreate)?;
        Ok(Self {
            querier: Arc::new(querier),
            runtime,
        })
    }

    /// Returns the querier used by this runner.
    pub fn querier(&self) -> &ResultQuerier<C> {
        &self.querier
    }

    /// Fetches results for every builder and folds them into `map`, blocking until done.
    ///
    /// See [`fill_expectation_map_for_builders`].
    pub fn fill_expectation_map_for_builders(
        &self,
        map: &mut TestExpectationMap,
        builders: &[String],
        builder_type: BuilderType,
    ) -> Result<UnmatchedResults, FillExpectationMapError> {
        self.runtime.block_on(fill_expectation_map_for_builders(
            &self.querier,
            map,
            builders,
            builder_type,
        ))
    }
}
