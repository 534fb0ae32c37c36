// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Reporter, helpers::DisplayMillis};
use crate::{
    errors::WriteReportError,
    results::{FileResult, RunResult},
};
use std::io;

/// GitHub-flavored Markdown, suitable for `$GITHUB_STEP_SUMMARY`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkdownReporter;

impl Reporter for MarkdownReporter {
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
        let counts = result.summary();

        writeln!(writer, "## \u{1F9EA} Test Results\n")?;
        writeln!(
            writer,
            "**{} tests** in {} files completed in **{}**\n",
            counts.total(),
            counts.files,
            DisplayMillis(result.duration),
        )?;

        writeln!(writer, "| Status | Count |")?;
        writeln!(writer, "|--------|-------|")?;
        writeln!(writer, "| \u{2705} Passed | {} |", counts.passed)?;
        writeln!(writer, "| \u{274C} Failed | {} |", counts.failed)?;
        writeln!(writer, "| \u{23ED}\u{FE0F} Skipped | {} |\n", counts.skipped)?;

        if counts.failed > 0 {
            writeln!(writer, "### \u{274C} Failed Tests\n")?;
            for file in &result.files {
                for test in file.tests.iter().filter(|test| test.is_failed()) {
                    writeln!(writer, "<details>")?;
                    writeln!(
                        writer,
                        "<summary><code>{}::{}</code></summary>\n",
                        file.file, test.name
                    )?;
                    writeln!(writer, "```")?;
                    if let Some(message) = test.error_message() {
                        writeln!(writer, "{message}")?;
                    }
                    writeln!(writer, "```\n")?;
                    writeln!(writer, "</details>\n")?;
                }
            }
        }

        if counts.skipped > 0 {
            writeln!(writer, "### \u{23ED}\u{FE0F} Skipped Tests\n")?;
            for file in &result.files {
                for test in file.tests.iter().filter(|test| test.is_skipped()) {
                    match test.reason() {
                        Some(reason) => {
                            writeln!(writer, "- `{}::{}` - {reason}", file.file, test.name)?
                        }
                        None => writeln!(writer, "- `{}::{}`", file.file, test.name)?,
                    }
                }
            }
            writeln!(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::test_helpers::{file, sample_run, test};
    use crate::results::TestOutcome;
    use chrono::Local;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn full_summary() {
        let mut out = Vec::new();
        MarkdownReporter
            .report_summary(&mut out, &sample_run())
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            indoc! {"
                ## 🧪 Test Results

                **5 tests** in 2 files completed in **1s 250ms**

                | Status | Count |
                |--------|-------|
                | ✅ Passed | 2 |
                | ❌ Failed | 3 |
                | ⏭️ Skipped | 1 |

                ### ❌ Failed Tests

                <details>
                <summary><code>math_test.star::test_div</code></summary>

                ```
                math_test.star:14:5: expected 2, got 3
                ```

                </details>

                <details>
                <summary><code>math_test.star::test_db</code></summary>

                ```
                fixture `db` not found
                ```

                </details>

                <details>
                <summary><code>math_test.star::test_fixed</code></summary>

                ```
                test was expected to fail, but it passed
                ```

                </details>

                ### ⏭️ Skipped Tests

                - `math_test.star::test_slow` - takes minutes

            "}
        );
    }

    #[test]
    fn all_passing_has_no_sections() {
        let run = RunResult {
            files: vec![file("a_test.star", vec![test("test_a", TestOutcome::Passed)])],
            start_time: Local::now(),
            duration: Duration::from_millis(3),
        };
        let mut out = Vec::new();
        MarkdownReporter.report_summary(&mut out, &run).unwrap();
        let output = String::from_utf8(out).unwrap();

        assert!(output.contains("**1 tests** in 1 files completed in **3ms**"));
        assert!(!output.contains("###"), "{output}");
    }
}
