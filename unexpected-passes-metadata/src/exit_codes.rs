// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `unexpected-passes` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum FinderExitCode {}

impl FinderExitCode {
    /// No errors occurred and the finder exited normally.
    pub const OK: i32 = 0;

    /// A user issue happened while setting up an invocation: bad arguments, an unreadable
    /// expectations file or an invalid configuration.
    pub const SETUP_ERROR: i32 = 96;

    /// Querying results for one of the builders failed.
    pub const QUERY_FAILED: i32 = 101;

    /// Merging per-builder statistics failed.
    pub const MERGE_FAILED: i32 = 102;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
