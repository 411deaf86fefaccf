// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declared test expectations, and matching them against results.
//!
//! Parsing expectation files is out of scope for this crate: expectations are constructed
//! directly, or deserialized from an already-parsed form with [`ExpectationSpec`].

use crate::errors::ExpectationParseError;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeSet, fmt, hash, str::FromStr};
use unexpected_passes_metadata::TestResult;

/// A result an expectation declares for a test.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ExpectedResult {
    /// The test is expected to pass.
    Pass,

    /// The test is expected to fail.
    Failure,

    /// The test is expected to crash.
    Crash,

    /// The test is expected to time out.
    Timeout,

    /// The test is skipped.
    Skip,

    /// The test is flaky and should be retried on failure.
    RetryOnFailure,

    /// The test is expected to be slow.
    Slow,
}

impl ExpectedResult {
    /// The string forms accepted by [`FromStr`].
    pub const VARIANTS: &'static [&'static str] = &[
        "Pass",
        "Failure",
        "Crash",
        "Timeout",
        "Skip",
        "RetryOnFailure",
        "Slow",
    ];

    /// Returns the string form of this expected result.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Failure => "Failure",
            Self::Crash => "Crash",
            Self::Timeout => "Timeout",
            Self::Skip => "Skip",
            Self::RetryOnFailure => "RetryOnFailure",
            Self::Slow => "Slow",
        }
    }
}

impl FromStr for ExpectedResult {
    type Err = ExpectationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "Pass" => Self::Pass,
            "Failure" => Self::Failure,
            "Crash" => Self::Crash,
            "Timeout" => Self::Timeout,
            "Skip" => Self::Skip,
            "RetryOnFailure" => Self::RetryOnFailure,
            "Slow" => Self::Slow,
            other => {
                return Err(ExpectationParseError::UnknownExpectedResult {
                    input: other.to_owned(),
                });
            }
        };
        Ok(result)
    }
}

impl TryFrom<String> for ExpectedResult {
    type Error = ExpectationParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ExpectedResult> for &'static str {
    fn from(result: ExpectedResult) -> Self {
        result.as_str()
    }
}

impl fmt::Display for ExpectedResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An fnmatch-style glob: `*` matches any sequence of characters including `/`, `?` matches a
/// single character and `[...]` matches a character class.
#[derive(Clone, Debug)]
struct NameGlob {
    regex: regex::bytes::Regex,
}

impl NameGlob {
    fn new(glob_str: &str) -> Result<Self, ExpectationParseError> {
        let glob = globset::GlobBuilder::new(glob_str)
            // Only allow escapes via [].
            .backslash_escape(false)
            .literal_separator(false)
            .build()
            .map_err(|error| ExpectationParseError::InvalidGlob {
                glob: glob_str.to_owned(),
                error,
            })?;

        let regex = regex::bytes::Regex::new(glob.regex()).map_err(|error| {
            ExpectationParseError::InvalidRegex {
                glob: glob_str.to_owned(),
                error,
            }
        })?;

        Ok(Self { regex })
    }

    fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s.as_bytes())
    }
}

/// A declared expectation for tests matching a pattern.
///
/// Equality, ordering and hashing are based on the declared fields only.
#[derive(Clone, Debug)]
pub struct Expectation {
    test: String,
    tags: BTreeSet<String>,
    expected_results: BTreeSet<ExpectedResult>,
    step: Option<String>,
    bug: Option<String>,
    test_glob: NameGlob,
    step_glob: Option<NameGlob>,
}

impl Expectation {
    /// Creates a new expectation.
    ///
    /// `test` is a glob matched against test names.
    pub fn new(
        test: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
        expected_results: impl IntoIterator<Item = ExpectedResult>,
    ) -> Result<Self, ExpectationParseError> {
        let test = test.into();
        let test_glob = NameGlob::new(&test)?;
        Ok(Self {
            test,
            tags: tags.into_iter().map(Into::into).collect(),
            expected_results: expected_results.into_iter().collect(),
            step: None,
            bug: None,
            test_glob,
            step_glob: None,
        })
    }

    /// Restricts this expectation to steps matching the given glob.
    pub fn with_step(mut self, step: impl Into<String>) -> Result<Self, ExpectationParseError> {
        let step = step.into();
        self.step_glob = Some(NameGlob::new(&step)?);
        self.step = Some(step);
        Ok(self)
    }

    /// Associates a bug with this expectation.
    pub fn with_bug(mut self, bug: impl Into<String>) -> Self {
        self.bug = Some(bug.into());
        self
    }

    /// The test glob.
    pub fn test(&self) -> &str {
        &self.test
    }

    /// The tags a result must carry for this expectation to apply.
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// The declared results.
    pub fn expected_results(&self) -> &BTreeSet<ExpectedResult> {
        &self.expected_results
    }

    /// The step glob, if any.
    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    /// The associated bug, if any.
    pub fn bug(&self) -> Option<&str> {
        self.bug.as_deref()
    }

    /// Returns true if this expectation applies to the given result.
    ///
    /// The test glob must match the result's test name, every tag of this expectation must be
    /// present on the result, and if a step glob is set it must match the result's step.
    pub fn applies_to_result(&self, result: &TestResult) -> bool {
        self.test_glob.is_match(&result.test_name)
            && self.tags.is_subset(&result.tags)
            && self
                .step_glob
                .as_ref()
                .is_none_or(|step_glob| step_glob.is_match(&result.step))
    }

    fn key(
        &self,
    ) -> (
        &str,
        &BTreeSet<String>,
        &BTreeSet<ExpectedResult>,
        Option<&str>,
        Option<&str>,
    ) {
        (
            &self.test,
            &self.tags,
            &self.expected_results,
            self.step.as_deref(),
            self.bug.as_deref(),
        )
    }
}

impl PartialEq for Expectation {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Expectation {}

impl PartialOrd for Expectation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expectation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl hash::Hash for Expectation {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(bug) = &self.bug {
            write!(f, "{bug} ")?;
        }
        if !self.tags.is_empty() {
            write!(f, "[ ")?;
            for tag in &self.tags {
                write!(f, "{tag} ")?;
            }
            write!(f, "] ")?;
        }
        write!(f, "{} [ ", self.test)?;
        for result in &self.expected_results {
            write!(f, "{result} ")?;
        }
        write!(f, "]")?;
        if let Some(step) = &self.step {
            write!(f, " (step: {step})")?;
        }
        Ok(())
    }
}

/// The serialized form of an [`Expectation`].
///
/// This is the shape of entries in an already-parsed expectations list, e.g.:
///
/// ```json
/// { "test": "foo/*", "tags": ["win"], "expected-results": ["Failure"], "bug": "crbug.com/1" }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExpectationSpec {
    /// The test glob.
    pub test: String,

    /// Tags a result must carry.
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// The declared results.
    pub expected_results: BTreeSet<ExpectedResult>,

    /// An optional step glob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// An optional bug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug: Option<String>,
}

impl ExpectationSpec {
    /// Compiles this spec into an [`Expectation`].
    pub fn into_expectation(self) -> Result<Expectation, ExpectationParseError> {
        let Self {
            test,
            tags,
            expected_results,
            step,
            bug,
        } = self;
        let mut expectation = Expectation::new(test, tags, expected_results)?;
        if let Some(step) = step {
            expectation = expectation.with_step(step)?;
        }
        if let Some(bug) = bug {
            expectation = expectation.with_bug(bug);
        }
        Ok(expectation)
    }
}

impl From<&Expectation> for ExpectationSpec {
    fn from(expectation: &Expectation) -> Self {
        Self {
            test: expectation.test.clone(),
            tags: expectation.tags.clone(),
            expected_results: expectation.expected_results.clone(),
            step: expectation.step.clone(),
            bug: expectation.bug.clone(),
        }
    }
}
