// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{EngineError, FixtureError, SourceLocation, TestFailure},
    results::{FileResult, RunResult, TestOutcome, TestResult},
};
use chrono::Local;
use std::time::Duration;

pub(super) fn test(name: &str, outcome: TestOutcome) -> TestResult {
    TestResult {
        name: name.to_owned(),
        file: "math_test.star".into(),
        outcome,
        start_time: Local::now(),
        duration: Duration::from_millis(12),
        output: String::new(),
    }
}

pub(super) fn file(name: &str, tests: Vec<TestResult>) -> FileResult {
    FileResult {
        file: name.into(),
        tests,
        setup_error: None,
        teardown_error: None,
        start_time: Local::now(),
        duration: Duration::from_millis(40),
    }
}

/// One file with one test of every outcome, and one file whose setup failed.
pub(super) fn sample_run() -> RunResult {
    let mut passing = test("test_add", TestOutcome::Passed);
    passing.output = "adding\ndone".to_owned();

    let failing = test(
        "test_div",
        TestOutcome::Failed(TestFailure::Execution(
            EngineError::assertion("expected 2, got 3").with_location(SourceLocation {
                file: "math_test.star".into(),
                line: 14,
                column: Some(5),
            }),
        )),
    );
    let fixture_failure = test(
        "test_db",
        TestOutcome::Failed(TestFailure::Fixture(FixtureError::NotFound {
            name: "db".to_owned(),
        })),
    );
    let skipped = test(
        "test_slow",
        TestOutcome::Skipped {
            reason: Some("takes minutes".to_owned()),
        },
    );
    let xfailed = test(
        "test_bug",
        TestOutcome::XFailed {
            reason: Some("issue 12".to_owned()),
        },
    );
    let xpassed = test("test_fixed", TestOutcome::XPassed { reason: None });

    let mut setup_failed = file("broken_test.star", Vec::new());
    setup_failed.setup_error = Some(EngineError::runtime("database unavailable"));

    RunResult {
        files: vec![
            file(
                "math_test.star",
                vec![passing, failing, fixture_failure, skipped, xfailed, xpassed],
            ),
            setup_failed,
        ],
        start_time: Local::now(),
        duration: Duration::from_millis(1_250),
    }
}
