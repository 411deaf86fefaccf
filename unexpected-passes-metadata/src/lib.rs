// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured data produced and consumed by the unexpected-pass finder.
//!
//! The finder mines historical test results for a set of builders and folds them into per-step
//! [`BuildStats`]. The types in this crate are the plain, serializable pieces of that pipeline:
//!
//! * [`TestResult`]: a single historical test execution.
//! * [`BuildStats`]: aggregated pass/fail data for one (expectation, builder, step) combination.
//! * [`BuilderType`]: whether a builder is a CI or a try builder.
//! * [`FinderExitCode`]: documented exit codes for the `unexpected-passes` binary.

mod build_stats;
mod errors;
mod exit_codes;
mod test_result;

pub use build_stats::*;
pub use errors::*;
pub use exit_codes::*;
pub use test_result::*;
