// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping suite names to the names the test harness reports them under.

/// A suite to fetch results for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SuiteSpec {
    name: String,
    resultdb_name: String,
    variant_tag: Option<&'static str>,
}

impl SuiteSpec {
    /// Creates a spec for the suite with the given user-facing name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (resultdb_name, variant_tag) = match name.as_str() {
            "info_collection" => ("info_collection_test".to_owned(), None),
            "power" => ("power_measurement_integration_test".to_owned(), None),
            "trace_test" => ("trace_integration_test".to_owned(), None),
            "webgl1_conformance" => (
                "webgl_conformance_integration_test".to_owned(),
                Some("webgl-version-1"),
            ),
            "webgl2_conformance" => (
                "webgl_conformance_integration_test".to_owned(),
                Some("webgl-version-2"),
            ),
            other => (format!("{other}_integration_test"), None),
        };

        Self {
            name,
            resultdb_name,
            variant_tag,
        }
    }

    /// The user-facing suite name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name results for this suite are recorded under.
    pub fn resultdb_name(&self) -> &str {
        &self.resultdb_name
    }

    /// The tag distinguishing this suite from others recorded under the same name, if any.
    pub fn variant_tag(&self) -> Option<&'static str> {
        self.variant_tag
    }
}
