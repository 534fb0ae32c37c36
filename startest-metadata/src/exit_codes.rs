// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for startest runs.
///
/// Front ends map the outcome of a run onto one of these. Anything that isn't a test failure,
/// for example a missing file or a malformed config, is a setup error.
pub enum StartestExitCode {}

impl StartestExitCode {
    /// No errors occurred and every selected test passed.
    pub const OK: i32 = 0;

    /// One or more tests failed, or a file's setup or teardown hook failed.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// The run could not be set up: no files were found, the config was invalid, or a file could
    /// not be loaded.
    pub const SETUP_ERROR: i32 = 2;
}
