// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for the unexpected-pass finder.
//!
//! The flow of operations is:
//!
//! 1. A [`TestExpectationMap`](expectation_map::TestExpectationMap) is built from the declared
//!    expectations.
//! 2. [`orchestrator::fill_expectation_map_for_builders`] runs one task per builder. Each task
//!    fetches results through a [`ResultQuerier`](querier::ResultQuerier) and folds them into a
//!    private copy of the map with [`reconcile::add_result_list`].
//! 3. The partial maps are merged, and the merged map is split into stale, semi-stale and active
//!    expectations.

pub mod config;
pub mod errors;
pub mod expectation_map;
pub mod expectations;
mod helpers;
pub mod orchestrator;
pub mod querier;
pub mod queries;
pub mod query_client;
pub mod query_engine;
pub mod query_filter;
pub mod reconcile;
pub mod suite;
#[cfg(test)]
mod test_helpers;
