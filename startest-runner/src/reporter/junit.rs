// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Reporter;
use crate::{
    errors::{EngineError, WriteReportError},
    results::{FileResult, RunResult, TestOutcome, TestResult},
};
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::io;

const ASSERTION_ERROR: &str = "AssertionError";

/// JUnit XML, one `testsuite` per file.
#[derive(Clone, Debug)]
pub struct JunitReporter {
    report_name: String,
}

impl JunitReporter {
    /// Creates a reporter whose top-level `testsuites` element has the given name.
    pub fn new(report_name: impl Into<String>) -> Self {
        Self {
            report_name: report_name.into(),
        }
    }
}

impl Default for JunitReporter {
    fn default() -> Self {
        Self::new("startest")
    }
}

impl Reporter for JunitReporter {
    fn report_file(
        &self,
        _writer: &mut dyn io::Write,
        _result: &FileResult,
    ) -> Result<(), WriteReportError> {
        Ok(())
    }

    fn report_summary(
        &self,
        writer: &mut dyn io::Write,
        result: &RunResult,
    ) -> Result<(), WriteReportError> {
        let mut report = Report::new(self.report_name.as_str());
        report
            .set_timestamp(result.start_time)
            .set_time(result.duration)
            .add_test_suites(result.files.iter().map(test_suite));

        report.serialize(&mut *writer).map_err(WriteReportError::Junit)?;
        writeln!(writer)?;
        Ok(())
    }
}

fn test_suite(file: &FileResult) -> TestSuite {
    let classname = file.file.as_str();
    let mut suite = TestSuite::new(classname);
    suite
        .set_timestamp(file.start_time)
        .set_time(file.duration);

    for test in &file.tests {
        suite.add_test_case(test_case(classname, test));
    }
    if let Some(error) = &file.setup_error {
        suite.add_test_case(hook_error(classname, "setup", "SetupError", error));
    }
    if let Some(error) = &file.teardown_error {
        suite.add_test_case(hook_error(classname, "teardown", "TeardownError", error));
    }
    suite
}

fn test_case(classname: &str, test: &TestResult) -> TestCase {
    let status = match &test.outcome {
        TestOutcome::Passed | TestOutcome::XFailed { .. } => TestCaseStatus::success(),
        TestOutcome::Skipped { reason } => {
            let mut status = TestCaseStatus::skipped();
            if let Some(reason) = reason {
                status.set_message(reason.as_str());
            }
            status
        }
        TestOutcome::Failed(_) | TestOutcome::XPassed { .. } => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
            status.set_type(ASSERTION_ERROR);
            if let Some(message) = test.error_message() {
                // The message attribute gets the first line; the full chain goes in the body.
                status
                    .set_message(message.lines().next().unwrap_or_default())
                    .set_description(message.as_str());
            }
            status
        }
    };

    let mut testcase = TestCase::new(test.name.as_str(), status);
    testcase
        .set_classname(classname)
        .set_timestamp(test.start_time)
        .set_time(test.duration);
    if !test.output.is_empty() {
        testcase.set_system_out(test.output.as_str());
    }
    testcase
}

fn hook_error(classname: &str, name: &str, ty: &str, error: &EngineError) -> TestCase {
    let message = error.to_string();
    let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
    status
        .set_type(ty)
        .set_message(message.as_str())
        .set_description(message.as_str());

    let mut testcase = TestCase::new(name, status);
    testcase.set_classname(classname);
    testcase
}
