// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQL templates for the results warehouse.
//!
//! Templates contain two placeholders: `{builder_type}` selects the table (`ci` or `try`), and
//! `{test_filter_clause}` is replaced with a clause from a
//! [`QueryTestFilter`](crate::query_filter::QueryTestFilter). Builder names and build counts are
//! bound as query parameters, not substituted.

use unexpected_passes_metadata::BuilderType;

/// Name of the parameter holding the builder name.
pub const BUILDER_NAME_PARAM: &str = "builder_name";

/// Name of the parameter holding the number of builds to look at.
pub const NUM_BUILDS_PARAM: &str = "num_builds";

// The most recent @num_builds builds for the builder.
const BUILDS_SUBQUERY: &str = r#"
  builds AS (
    SELECT
      DISTINCT exported.id build_inv_id,
      partition_time
    FROM `chrome-luci-data.chromium.gpu_{builder_type}_test_results` tr
    WHERE
      exported.realm = "chromium:{builder_type}"
      AND STRUCT("builder", @builder_name) IN UNNEST(variant)
    ORDER BY partition_time DESC
    LIMIT @num_builds
  )"#;

const RESULTS_QUERY_TEMPLATE: &str = r#"
WITH
{builds_subquery},
  results AS (
    SELECT
      exported.id,
      test_id,
      status,
      (
        SELECT value
        FROM tr.tags
        WHERE key = "step_name") as step_name,
      ARRAY(
        SELECT value
        FROM tr.tags
        WHERE key = "typ_tag") as typ_tags,
      ARRAY(
        SELECT value
        FROM tr.tags
        WHERE key = "raw_typ_expectation") as typ_expectations
    FROM
      `chrome-luci-data.chromium.gpu_{builder_type}_test_results` tr,
      builds b
    WHERE
      exported.id = build_inv_id
      AND status != "SKIP"
      {test_filter_clause}
  )
SELECT *
FROM results
WHERE
  "Failure" IN UNNEST(typ_expectations)
  OR "RetryOnFailure" IN UNNEST(typ_expectations)
"#;

const TEST_DISCOVERY_QUERY_TEMPLATE: &str = r#"
WITH
{builds_subquery}
SELECT DISTINCT tr.test_id
FROM
  `chrome-luci-data.chromium.gpu_{builder_type}_test_results` tr,
  builds b
WHERE
  exported.id = build_inv_id
  AND status != "SKIP"
  {test_filter_clause}
  AND EXISTS (
    SELECT value
    FROM tr.tags
    WHERE
      key = "raw_typ_expectation"
      AND value IN ("Failure", "RetryOnFailure"))
"#;

/// Renders the query returning one row per result.
pub fn results_query(builder_type: BuilderType, test_filter_clause: &str) -> String {
    render(RESULTS_QUERY_TEMPLATE, builder_type, test_filter_clause)
}

/// Renders the query returning the distinct test IDs that have results with relevant
/// expectations.
pub fn test_discovery_query(builder_type: BuilderType, test_filter_clause: &str) -> String {
    render(TEST_DISCOVERY_QUERY_TEMPLATE, builder_type, test_filter_clause)
}

/// The fixed clause restricting results to a single suite.
pub fn suite_filter_clause(resultdb_name: &str) -> String {
    format!(r#"AND REGEXP_CONTAINS(test_id, r"gpu_tests\.{resultdb_name}\.")"#)
}

fn render(template: &str, builder_type: BuilderType, test_filter_clause: &str) -> String {
    template
        .replace("{builds_subquery}", BUILDS_SUBQUERY)
        .replace("{builder_type}", builder_type.as_str())
        .replace("{test_filter_clause}", test_filter_clause)
}
