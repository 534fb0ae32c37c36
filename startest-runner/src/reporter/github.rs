// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Reporter;
use crate::{
    errors::WriteReportError,
    results::{FileResult, RunResult, TestResult},
};
use std::{borrow::Cow, io};

/// GitHub Actions workflow commands: an `::error` annotation per failure and a `::notice` per
/// skipped test.
#[derive(Clone, Copy, Debug, Default)]
pub struct GithubReporter;

impl Reporter for GithubReporter {
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
        for file in &result.files {
            let file_prop = escape_property(file.file.as_str());
            if let Some(error) = &file.setup_error {
                let message = format!("setup_file failed: {error}");
                writeln!(writer, "::error file={file_prop}::{}", escape_data(&message))?;
            }

            for test in &file.tests {
                if test.is_failed() {
                    write_failure(writer, &file_prop, test)?;
                } else if test.is_skipped() {
                    writeln!(
                        writer,
                        "::notice file={file_prop}::{} skipped",
                        escape_data(&test.name)
                    )?;
                }
            }

            if let Some(error) = &file.teardown_error {
                let message = format!("teardown_file failed: {error}");
                writeln!(writer, "::error file={file_prop}::{}", escape_data(&message))?;
            }
        }

        let counts = result.summary();
        writeln!(
            writer,
            "::notice::Results: {} passed, {} failed, {} skipped, {} total in {} file(s)",
            counts.passed,
            counts.failed,
            counts.skipped,
            counts.total(),
            counts.files,
        )?;
        Ok(())
    }
}

fn write_failure(
    writer: &mut dyn io::Write,
    file_prop: &str,
    test: &TestResult,
) -> io::Result<()> {
    let line = test
        .failure()
        .and_then(|failure| failure.engine_error())
        .and_then(|error| error.location())
        .map(|location| location.line);
    let message = test.error_message().unwrap_or_default();
    let message = escape_data(&format!("{}: {message}", test.name)).into_owned();

    match line {
        Some(line) => writeln!(writer, "::error file={file_prop},line={line}::{message}"),
        None => writeln!(writer, "::error file={file_prop}::{message}"),
    }
}

/// Escapes a workflow command message.
pub(super) fn escape_data(s: &str) -> Cow<'_, str> {
    if !s.contains(['%', '\r', '\n']) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.replace('%', "%25")
            .replace('\r', "%0D")
            .replace('\n', "%0A"),
    )
}

/// Escapes a workflow command property value, which additionally can't contain `:` or `,`.
fn escape_property(s: &str) -> String {
    escape_data(s).replace(':', "%3A").replace(',', "%2C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::test_helpers::sample_run;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("plain", "plain"; "plain")]
    #[test_case("100%", "100%25"; "percent")]
    #[test_case("a\r\nb", "a%0D%0Ab"; "crlf")]
    #[test_case("%0A\n", "%250A%0A"; "already escaped")]
    fn escapes_data(input: &str, expected: &str) {
        assert_eq!(escape_data(input), expected);
    }

    fn unescape(s: &str) -> String {
        s.replace("%0A", "\n")
            .replace("%0D", "\r")
            .replace("%25", "%")
    }

    #[test]
    fn escaping_round_trips() {
        for input in ["x", "50% of\r\nlines", "%0D literal", "\n\n%%"] {
            assert_eq!(unescape(&escape_data(input)), input);
        }
    }

    #[test]
    fn property_escaping() {
        assert_eq!(escape_property("C:\\a,b.star"), "C%3A\\a%2Cb.star");
    }

    #[test]
    fn annotations() {
        let mut out = Vec::new();
        GithubReporter
            .report_summary(&mut out, &sample_run())
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            indoc! {"
                ::error file=math_test.star,line=14::test_div: math_test.star:14:5: expected 2, got 3
                ::error file=math_test.star::test_db: fixture `db` not found
                ::notice file=math_test.star::test_slow skipped
                ::error file=math_test.star::test_fixed: test was expected to fail, but it passed
                ::error file=broken_test.star::setup_file failed: database unavailable
                ::notice::Results: 2 passed, 3 failed, 1 skipped, 5 total in 2 file(s)
            "}
        );
    }
}
