// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A machine-readable summary of a completed run, as written by the JSON reporter.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummary {
    /// The number of tests that passed, including expected failures.
    pub passed: usize,

    /// The number of tests that failed, including unexpected passes.
    pub failed: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,

    /// `passed + failed`. Skipped tests are not included.
    pub total: usize,

    /// The number of files that were run.
    pub files: usize,

    /// Wall-clock duration of the whole run, in milliseconds.
    pub duration_ms: u64,

    /// Per-file results, in the order the files were given.
    pub results: Vec<FileSummary>,
}

impl RunSummary {
    /// Parses a summary from the JSON reporter's output.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }

    /// Returns true if any test failed or any file-level hook failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
            || self
                .results
                .iter()
                .any(|file| file.setup_error.is_some() || file.teardown_error.is_some())
    }
}

/// The summary of one file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileSummary {
    /// The path to the file.
    pub file: Utf8PathBuf,

    /// How long the file took to run, in milliseconds.
    pub duration_ms: u64,

    /// The error produced by the file's `setup_file` hook, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,

    /// The error produced by the file's `teardown_file` hook, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,

    /// Tests in the order they ran.
    pub tests: Vec<TestSummary>,
}

/// The summary of one test, or one case of a parametrized test.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestSummary {
    /// The test name. Parametrized cases are named `test[case]`.
    pub name: String,

    /// The final status of the test.
    pub status: TestStatusSummary,

    /// True if the test counts towards the passed total.
    pub passed: bool,

    /// How long the test took, in milliseconds.
    pub duration_ms: u64,

    /// The skip or xfail reason, if one was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// The error message for failed tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The final status of a test.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatusSummary {
    /// The test passed.
    Pass,

    /// The test failed.
    Fail,

    /// The test was skipped.
    Skip,

    /// The test was expected to fail, and it did.
    Xfail,

    /// The test was expected to fail, but it passed.
    Xpass,
}

impl TestStatusSummary {
    /// Returns the status as an uppercase label, as printed by the text reporter.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::Xfail => "XFAIL",
            Self::Xpass => "XPASS",
        }
    }
}
