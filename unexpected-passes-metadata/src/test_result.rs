// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{BuilderTypeParseError, ResultStatusParseError};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};

/// The status a test actually finished with, in expectation-file vocabulary.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum ResultStatus {
    /// The test passed.
    Pass,

    /// The test failed.
    Failure,

    /// The test crashed.
    Crash,

    /// The test was aborted, typically through a timeout or a device loss.
    Abort,

    /// The test was skipped.
    Skip,
}

impl ResultStatus {
    /// The string forms accepted by [`FromStr`].
    pub const VARIANTS: &'static [&'static str] = &["Pass", "Failure", "Crash", "Abort", "Skip"];

    /// The string forms accepted by [`Self::from_warehouse_status`].
    pub const WAREHOUSE_VARIANTS: &'static [&'static str] =
        &["PASS", "FAIL", "CRASH", "ABORT", "SKIP"];

    /// Converts a status as reported to the results warehouse (e.g. `FAIL`) into a
    /// `ResultStatus` (e.g. [`Self::Failure`]).
    pub fn from_warehouse_status(status: &str) -> Result<Self, ResultStatusParseError> {
        match status {
            "PASS" => Ok(Self::Pass),
            "FAIL" => Ok(Self::Failure),
            "CRASH" => Ok(Self::Crash),
            "ABORT" => Ok(Self::Abort),
            "SKIP" => Ok(Self::Skip),
            other => Err(ResultStatusParseError::new(other, true)),
        }
    }

    /// Returns the expectation-file form of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Failure => "Failure",
            Self::Crash => "Crash",
            Self::Abort => "Abort",
            Self::Skip => "Skip",
        }
    }

    /// Returns true if this status counts as a pass.
    #[inline]
    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }
}

impl FromStr for ResultStatus {
    type Err = ResultStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "Pass" => Self::Pass,
            "Failure" => Self::Failure,
            "Crash" => Self::Crash,
            "Abort" => Self::Abort,
            "Skip" => Self::Skip,
            other => return Err(ResultStatusParseError::new(other, false)),
        };
        Ok(status)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of builder results are fetched for.
///
/// CI and try builders report into different tables, and may share names, so statistics are
/// keyed by [`Self::prefixed_name`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuilderType {
    /// A continuous integration builder.
    Ci,

    /// A try (pre-submit) builder.
    Try,
}

impl BuilderType {
    /// The string forms accepted by [`FromStr`].
    pub const VARIANTS: &'static [&'static str] = &["ci", "try"];

    /// Returns the string form of this builder type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ci => "ci",
            Self::Try => "try",
        }
    }

    /// Returns `<type>:<builder>`, the key used for this builder in statistics maps.
    pub fn prefixed_name(self, builder: &str) -> String {
        format!("{}:{builder}", self.as_str())
    }
}

impl FromStr for BuilderType {
    type Err = BuilderTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ci" => Ok(Self::Ci),
            "try" => Ok(Self::Try),
            other => Err(BuilderTypeParseError::new(other)),
        }
    }
}

impl fmt::Display for BuilderType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single historical test execution.
///
/// Two results with identical fields describe the same observation: equality, hashing and
/// ordering are by value. Flaky retries are de-duplicated on exactly that basis.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestResult {
    /// The test name, as known to the test harness.
    pub test_name: String,

    /// The tags the test ran with.
    pub tags: BTreeSet<String>,

    /// The status the test finished with.
    pub actual_status: ResultStatus,

    /// The name of the step the test ran in.
    pub step: String,

    /// The ID of the build the test ran in.
    pub build_id: String,
}

impl TestResult {
    /// Creates a new `TestResult`.
    pub fn new(
        test_name: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
        actual_status: ResultStatus,
        step: impl Into<String>,
        build_id: impl Into<String>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            tags: tags.into_iter().map(Into::into).collect(),
            actual_status,
            step: step.into(),
            build_id: build_id.into(),
        }
    }

    /// Returns a copy of this result with the status replaced.
    pub fn with_status(&self, actual_status: ResultStatus) -> Self {
        Self {
            actual_status,
            ..self.clone()
        }
    }
}
