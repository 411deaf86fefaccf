// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{BuilderType, ResultStatus};
use std::{error, fmt};

/// An error that occurs while parsing a [`ResultStatus`] from a string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResultStatusParseError {
    input: String,
    warehouse: bool,
}

impl ResultStatusParseError {
    pub(crate) fn new(input: impl Into<String>, warehouse: bool) -> Self {
        Self {
            input: input.into(),
            warehouse,
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for ResultStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let known = if self.warehouse {
            ResultStatus::WAREHOUSE_VARIANTS
        } else {
            ResultStatus::VARIANTS
        };
        write!(
            f,
            "unrecognized result status: {}\n(known values: {})",
            self.input,
            known.join(", "),
        )
    }
}

impl error::Error for ResultStatusParseError {}

/// An error that occurs while parsing a [`BuilderType`] from a string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuilderTypeParseError {
    input: String,
}

impl BuilderTypeParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

impl fmt::Display for BuilderTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unrecognized builder type: {}\n(known values: {})",
            self.input,
            BuilderType::VARIANTS.join(", "),
        )
    }
}

impl error::Error for BuilderTypeParseError {}
