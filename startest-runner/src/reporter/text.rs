// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    Reporter,
    helpers::{DisplayMillis, Styles},
};
use crate::{
    errors::WriteReportError,
    indenter::indent_lines,
    results::{FileResult, RunResult, TestResult},
};
use owo_colors::OwoColorize;
use startest_metadata::TestStatusSummary;
use std::io;

const DETAIL_INDENT: &str = "      ";
const OUTPUT_INDENT: &str = "        ";

/// Human-readable output, one line per test.
#[derive(Clone, Debug, Default)]
pub struct TextReporter {
    verbose: bool,
    show_duration: bool,
    styles: Styles,
}

impl TextReporter {
    /// Creates an uncolored reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows captured output for every test.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Shows per-test and total durations.
    pub fn set_show_duration(&mut self, show_duration: bool) -> &mut Self {
        self.show_duration = show_duration;
        self
    }

    /// Colorizes status labels and counts.
    pub fn colorize(&mut self) -> &mut Self {
        self.styles.colorize();
        self
    }

    fn write_test(&self, writer: &mut dyn io::Write, test: &TestResult) -> io::Result<()> {
        let status = test.status();
        let label = status.label();
        let label = label.style(self.styles.for_status(status));
        if self.show_duration {
            writeln!(
                writer,
                "{label}  {}  ({})",
                test.name,
                DisplayMillis(test.duration)
            )?;
        } else {
            writeln!(writer, "{label}  {}", test.name)?;
        }

        if let Some(reason) = test.reason() {
            writeln!(writer, "{DETAIL_INDENT}{reason}")?;
        }
        if status == TestStatusSummary::Fail
            && let Some(message) = test.error_message()
        {
            writeln!(writer, "{}", indent_lines(&message, DETAIL_INDENT))?;
        }
        if self.verbose && !test.output.is_empty() {
            writeln!(writer, "{DETAIL_INDENT}Output:")?;
            writeln!(writer, "{}", indent_lines(&test.output, OUTPUT_INDENT))?;
        }
        Ok(())
    }
}

impl Reporter for TextReporter {
    fn report_file(
        &self,
        writer: &mut dyn io::Write,
        result: &FileResult,
    ) -> Result<(), WriteReportError> {
        if let Some(error) = &result.setup_error {
            writeln!(
                writer,
                "{}: {}\n  {error}",
                "SETUP FAILED".style(self.styles.fail),
                result.file.style(self.styles.file),
            )?;
            return Ok(());
        }

        for test in &result.tests {
            self.write_test(writer, test)?;
        }

        if let Some(error) = &result.teardown_error {
            writeln!(
                writer,
                "{}: {}\n  {error}",
                "TEARDOWN FAILED".style(self.styles.fail),
                result.file.style(self.styles.file),
            )?;
        }
        Ok(())
    }

    fn report_summary(
        &self,
        writer: &mut dyn io::Write,
        result: &RunResult,
    ) -> Result<(), WriteReportError> {
        let counts = result.summary();
        writeln!(writer)?;
        writeln!(
            writer,
            "Results: {} passed, {} failed, {} total in {} file(s)",
            counts.passed.style(self.styles.pass),
            counts.failed.style(if counts.failed > 0 {
                self.styles.fail
            } else {
                self.styles.count
            }),
            counts.total().style(self.styles.count),
            counts.files.style(self.styles.count),
        )?;
        if self.show_duration {
            writeln!(writer, "Duration: {}", DisplayMillis(result.duration))?;
        }
        Ok(())
    }

    fn supports_incremental_output(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::test_helpers::sample_run;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn render(reporter: &TextReporter) -> String {
        let run = sample_run();
        let mut out = Vec::new();
        for file in &run.files {
            reporter.report_file(&mut out, file).unwrap();
        }
        reporter.report_summary(&mut out, &run).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn plain_output() {
        assert_eq!(
            render(&TextReporter::new()),
            indoc! {"
                PASS  test_add
                FAIL  test_div
                      math_test.star:14:5: expected 2, got 3
                FAIL  test_db
                      fixture `db` not found
                SKIP  test_slow
                      takes minutes
                XFAIL  test_bug
                      issue 12
                XPASS  test_fixed
                SETUP FAILED: broken_test.star
                  database unavailable

                Results: 2 passed, 3 failed, 5 total in 2 file(s)
            "}
        );
    }

    #[test]
    fn verbose_with_durations() {
        let mut reporter = TextReporter::new();
        reporter.set_verbose(true).set_show_duration(true);
        let output = render(&reporter);

        assert!(
            output.starts_with(indoc! {"
                PASS  test_add  (12ms)
                      Output:
                        adding
                        done
            "}),
            "{output}"
        );
        assert!(output.ends_with("Duration: 1s 250ms\n"), "{output}");
    }

    #[test]
    fn teardown_failure_line() {
        let mut file = crate::reporter::test_helpers::file("a_test.star", Vec::new());
        file.teardown_error = Some(crate::errors::EngineError::runtime("cleanup failed"));
        let mut out = Vec::new();
        TextReporter::new().report_file(&mut out, &file).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "TEARDOWN FAILED: a_test.star\n  cleanup failed\n"
        );
    }

    #[test]
    fn colorized_output_has_escapes() {
        let mut reporter = TextReporter::new();
        reporter.colorize();
        assert!(render(&reporter).contains("\u{1b}["));
    }
}
