// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#[cfg(unix)]
mod bq_command;
mod fixtures;
mod pipeline;
