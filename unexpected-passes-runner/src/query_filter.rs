// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test filters that restrict which results a query returns.
//!
//! A filter renders into one or more SQL clauses. Each clause produces its own query, so a filter
//! with more clauses means more, smaller, queries.

use crate::errors::{QuerySplitError, QuerySplitErrorKind};
use itertools::Itertools;

/// Restricts the tests a query returns results for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryTestFilter {
    /// A single clause that cannot be split.
    Fixed(String),

    /// Explicit lists of test IDs, each rendered as its own `IN (...)` clause.
    ///
    /// Empty chunks can appear after splitting a chunk with a single test. They are not rendered.
    Splittable(Vec<Vec<String>>),
}

impl QueryTestFilter {
    /// Creates a filter from a fixed clause.
    pub fn fixed(clause: impl Into<String>) -> Self {
        Self::Fixed(clause.into())
    }

    /// Creates a splittable filter by bucketing `test_ids` into chunks of `chunk_size`.
    ///
    /// The last chunk may be smaller. A `chunk_size` of 0 is treated as 1.
    pub fn splittable(test_ids: impl IntoIterator<Item = String>, chunk_size: usize) -> Self {
        let test_ids: Vec<_> = test_ids.into_iter().collect();
        Self::Splittable(
            test_ids
                .chunks(chunk_size.max(1))
                .map(<[String]>::to_vec)
                .collect(),
        )
    }

    /// Returns the chunk size that keeps each query around `target_results_per_query` results,
    /// given that each test produces up to `num_samples` results.
    pub fn chunk_size_for(target_results_per_query: usize, num_samples: usize) -> usize {
        (target_results_per_query / num_samples.max(1)).max(1)
    }

    /// Returns the number of chunks in this filter. A fixed filter has one chunk.
    pub fn chunk_count(&self) -> usize {
        match self {
            Self::Fixed(_) => 1,
            Self::Splittable(chunks) => chunks.len(),
        }
    }

    /// Returns the number of queries this filter renders into.
    ///
    /// Empty chunks are skipped, so this can be less than [`Self::chunk_count`].
    pub fn query_count(&self) -> usize {
        match self {
            Self::Fixed(_) => 1,
            Self::Splittable(chunks) => chunks.iter().filter(|chunk| !chunk.is_empty()).count(),
        }
    }

    /// Renders this filter into SQL clauses, one per query.
    pub fn clauses(&self) -> Vec<String> {
        match self {
            Self::Fixed(clause) => vec![clause.clone()],
            Self::Splittable(chunks) => chunks
                .iter()
                .filter(|chunk| !chunk.is_empty())
                .map(|chunk| in_clause(chunk))
                .collect(),
        }
    }

    /// Splits this filter into twice as many chunks.
    ///
    /// Every chunk is bisected, with the first half receiving the extra test if the chunk has an
    /// odd length. Fails if the filter is fixed, or if every chunk already has at most one test.
    /// On failure, the filter is left unchanged.
    pub fn split(&mut self) -> Result<(), QuerySplitError> {
        let chunks = match self {
            Self::Fixed(_) => return Err(QuerySplitError::new(QuerySplitErrorKind::Fixed)),
            Self::Splittable(chunks) => chunks,
        };

        if chunks.iter().all(|chunk| chunk.len() <= 1) {
            return Err(QuerySplitError::new(
                QuerySplitErrorKind::SingleTestChunks {
                    chunk_count: chunks.len(),
                },
            ));
        }

        *chunks = std::mem::take(chunks)
            .into_iter()
            .flat_map(|mut first| {
                let second = first.split_off(first.len().div_ceil(2));
                [first, second]
            })
            .collect();
        Ok(())
    }
}

fn in_clause(test_ids: &[String]) -> String {
    format!(
        "AND test_id IN ({})",
        test_ids
            .iter()
            .map(|test_id| format!("\"{}\"", escape_string_literal(test_id)))
            .join(", ")
    )
}

fn escape_string_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
