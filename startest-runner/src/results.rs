// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Results of running tests, files and whole runs.

use crate::errors::{DisplayErrorChain, EngineError, TestFailure};
use camino::Utf8PathBuf;
use chrono::{DateTime, Local};
use startest_metadata::{
    FileSummary, RunSummary, StartestExitCode, TestStatusSummary, TestSummary,
};
use std::time::Duration;

/// The outcome of a single test.
#[derive(Clone, Debug)]
pub enum TestOutcome {
    /// The test passed.
    Passed,

    /// The test failed.
    Failed(TestFailure),

    /// The test was skipped without running.
    Skipped {
        /// The reason given in `__test_meta__`, if any.
        reason: Option<String>,
    },

    /// The test was expected to fail, and it did. Counts as passed.
    XFailed {
        /// The reason given in `__test_meta__`, if any.
        reason: Option<String>,
    },

    /// The test was expected to fail, but it passed. Counts as failed.
    XPassed {
        /// The reason given in `__test_meta__`, if any.
        reason: Option<String>,
    },
}

impl TestOutcome {
    /// Applies `xfail` inversion: a failure becomes [`XFailed`](Self::XFailed), a pass becomes
    /// [`XPassed`](Self::XPassed). Skips are left alone.
    pub fn expect_failure(self, reason: Option<String>) -> Self {
        match self {
            TestOutcome::Passed => TestOutcome::XPassed { reason },
            TestOutcome::Failed(_) => TestOutcome::XFailed { reason },
            other => other,
        }
    }
}

/// The result of one test, or one case of a parametrized test.
#[derive(Clone, Debug)]
pub struct TestResult {
    /// The test's name. Parametrized cases are named `test[case]`.
    pub name: String,

    /// The file the test is defined in.
    pub file: Utf8PathBuf,

    /// What happened.
    pub outcome: TestOutcome,

    /// When the test started.
    pub start_time: DateTime<Local>,

    /// How long setup, the body and teardown took together.
    pub duration: Duration,

    /// Everything the test printed.
    pub output: String,
}

impl TestResult {
    /// Returns true if the test counts towards the passed total.
    pub fn is_passed(&self) -> bool {
        matches!(
            self.outcome,
            TestOutcome::Passed | TestOutcome::XFailed { .. }
        )
    }

    /// Returns true if the test counts towards the failed total.
    pub fn is_failed(&self) -> bool {
        matches!(
            self.outcome,
            TestOutcome::Failed(_) | TestOutcome::XPassed { .. }
        )
    }

    /// Returns true if the test was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, TestOutcome::Skipped { .. })
    }

    /// Returns true if the test was marked `xfail`, whatever happened when it ran.
    pub fn is_xfail(&self) -> bool {
        matches!(
            self.outcome,
            TestOutcome::XFailed { .. } | TestOutcome::XPassed { .. }
        )
    }

    /// Returns true if an `xfail` test unexpectedly passed.
    pub fn is_xpass(&self) -> bool {
        matches!(self.outcome, TestOutcome::XPassed { .. })
    }

    /// The failure, for tests that failed outright.
    pub fn failure(&self) -> Option<&TestFailure> {
        match &self.outcome {
            TestOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// The skip or xfail reason.
    pub fn reason(&self) -> Option<&str> {
        match &self.outcome {
            TestOutcome::Skipped { reason }
            | TestOutcome::XFailed { reason }
            | TestOutcome::XPassed { reason } => reason.as_deref(),
            TestOutcome::Passed | TestOutcome::Failed(_) => None,
        }
    }

    /// A printable error message for failed tests, including nested causes.
    pub fn error_message(&self) -> Option<String> {
        match &self.outcome {
            TestOutcome::Failed(failure) => Some(DisplayErrorChain::new(failure).to_string()),
            TestOutcome::XPassed { .. } => {
                Some("test was expected to fail, but it passed".to_owned())
            }
            _ => None,
        }
    }

    /// The status as it appears in machine-readable output.
    pub fn status(&self) -> TestStatusSummary {
        match self.outcome {
            TestOutcome::Passed => TestStatusSummary::Pass,
            TestOutcome::Failed(_) => TestStatusSummary::Fail,
            TestOutcome::Skipped { .. } => TestStatusSummary::Skip,
            TestOutcome::XFailed { .. } => TestStatusSummary::Xfail,
            TestOutcome::XPassed { .. } => TestStatusSummary::Xpass,
        }
    }

    fn to_summary(&self) -> TestSummary {
        TestSummary {
            name: self.name.clone(),
            status: self.status(),
            passed: self.is_passed(),
            duration_ms: millis(self.duration),
            reason: self.reason().map(str::to_owned),
            error: self.error_message(),
        }
    }
}

/// Test counts for a file or a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunCounts {
    /// Passed tests, including expected failures.
    pub passed: usize,

    /// Failed tests, including unexpected passes.
    pub failed: usize,

    /// Skipped tests. These count as neither passed nor failed.
    pub skipped: usize,

    /// Files that were run.
    pub files: usize,
}

impl RunCounts {
    /// `passed + failed`.
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }
}

/// The results of one file.
#[derive(Clone, Debug)]
pub struct FileResult {
    /// The file.
    pub file: Utf8PathBuf,

    /// Results in the order the tests ran.
    pub tests: Vec<TestResult>,

    /// The error from the file's `setup_file` hook. When set, no tests ran.
    pub setup_error: Option<EngineError>,

    /// The error from the file's `teardown_file` hook.
    pub teardown_error: Option<EngineError>,

    /// When the file started running.
    pub start_time: DateTime<Local>,

    /// How long the whole file took.
    pub duration: Duration,
}

impl FileResult {
    /// Counts this file's tests.
    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts {
            files: 1,
            ..RunCounts::default()
        };
        for test in &self.tests {
            if test.is_skipped() {
                counts.skipped += 1;
            } else if test.is_passed() {
                counts.passed += 1;
            } else {
                counts.failed += 1;
            }
        }
        counts
    }

    /// The number of skipped tests.
    pub fn skipped_count(&self) -> usize {
        self.tests.iter().filter(|test| test.is_skipped()).count()
    }

    /// Returns true if any test failed, or a file-level hook failed.
    pub fn has_failures(&self) -> bool {
        self.setup_error.is_some()
            || self.teardown_error.is_some()
            || self.tests.iter().any(TestResult::is_failed)
    }

    fn to_summary(&self) -> FileSummary {
        FileSummary {
            file: self.file.clone(),
            duration_ms: millis(self.duration),
            setup_error: self.setup_error.as_ref().map(ToString::to_string),
            teardown_error: self.teardown_error.as_ref().map(ToString::to_string),
            tests: self.tests.iter().map(TestResult::to_summary).collect(),
        }
    }
}

/// The results of a whole run, in file order.
#[derive(Clone, Debug)]
pub struct RunResult {
    /// Per-file results.
    pub files: Vec<FileResult>,

    /// When the run started.
    pub start_time: DateTime<Local>,

    /// How long the run took.
    pub duration: Duration,
}

impl RunResult {
    /// Totals across every file.
    pub fn summary(&self) -> RunCounts {
        self.files
            .iter()
            .map(FileResult::counts)
            .fold(RunCounts::default(), |acc, counts| RunCounts {
                passed: acc.passed + counts.passed,
                failed: acc.failed + counts.failed,
                skipped: acc.skipped + counts.skipped,
                files: acc.files + counts.files,
            })
    }

    /// The number of skipped tests across every file.
    pub fn skipped_count(&self) -> usize {
        self.files.iter().map(FileResult::skipped_count).sum()
    }

    /// Returns true if any test or file-level hook failed.
    pub fn has_failures(&self) -> bool {
        self.files.iter().any(FileResult::has_failures)
    }

    /// The process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            StartestExitCode::TEST_RUN_FAILED
        } else {
            StartestExitCode::OK
        }
    }

    /// Converts the results into their machine-readable form.
    pub fn to_summary(&self) -> RunSummary {
        let counts = self.summary();
        RunSummary {
            passed: counts.passed,
            failed: counts.failed,
            skipped: counts.skipped,
            total: counts.total(),
            files: counts.files,
            duration_ms: millis(self.duration),
            results: self.files.iter().map(FileResult::to_summary).collect(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
