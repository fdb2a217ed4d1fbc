// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `runwatch` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum RunwatchExitCode {}

impl RunwatchExitCode {
    /// No errors occurred and runwatch exited normally.
    pub const OK: i32 = 0;

    /// One or more requested views ended with no runs to show.
    ///
    /// Only produced when `--fail-on-empty` is passed.
    pub const EMPTY_VIEW: i32 = 4;

    /// A snapshot could not be loaded for one of the requested scopes.
    pub const SNAPSHOT_LOAD_FAILED: i32 = 104;

    /// The event log could not be read or contained an invalid event.
    pub const EVENT_LOG_INVALID: i32 = 105;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a runwatch invocation.
    pub const SETUP_ERROR: i32 = 96;
}
