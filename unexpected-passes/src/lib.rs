// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finds test expectations that are no longer needed.
//!
//! `unexpected-passes find` looks at recent results of the GPU integration tests on a set of CI
//! and try builders, and reports which declared expectations never saw their test fail
//! (*stale*), which are only needed on some configurations (*semi-stale*), and which are still
//! needed (*active*).

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;
mod report;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, StderrStyles};
#[doc(hidden)]
pub use report::*;
