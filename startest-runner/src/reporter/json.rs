// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Reporter;
use crate::{
    errors::WriteReportError,
    results::{FileResult, RunResult},
};
use std::io;

/// Writes a [`RunSummary`](startest_metadata::RunSummary) as pretty-printed JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonReporter;

impl Reporter for JsonReporter {
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
        serde_json::to_writer_pretty(&mut *writer, &result.to_summary())
            .map_err(WriteReportError::Json)?;
        writeln!(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::test_helpers::sample_run;
    use pretty_assertions::assert_eq;
    use startest_metadata::{RunSummary, TestStatusSummary};

    #[test]
    fn summary_parses_back() {
        let mut out = Vec::new();
        JsonReporter.report_summary(&mut out, &sample_run()).unwrap();

        let summary: RunSummary = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            (summary.passed, summary.failed, summary.skipped, summary.total, summary.files),
            (2, 3, 1, 5, 2)
        );
        assert_eq!(summary.duration_ms, 1_250);

        let math = &summary.results[0];
        assert_eq!(math.tests.len(), 6);
        assert_eq!(math.tests[1].status, TestStatusSummary::Fail);
        assert_eq!(
            math.tests[1].error.as_deref(),
            Some("math_test.star:14:5: expected 2, got 3")
        );
        assert_eq!(math.tests[3].reason.as_deref(), Some("takes minutes"));
        assert_eq!(
            summary.results[1].setup_error.as_deref(),
            Some("database unavailable")
        );
    }

    #[test]
    fn report_file_writes_nothing() {
        let run = sample_run();
        let mut out = Vec::new();
        JsonReporter.report_file(&mut out, &run.files[0]).unwrap();
        assert!(out.is_empty());
    }
}
