// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering test results.
//!
//! Every output format implements [`Reporter`]. Reporters that can print each file's results
//! as soon as the file finishes advertise it through
//! [`Reporter::supports_incremental_output`]; the others only write a summary at the end.

mod github;
mod helpers;
mod json;
mod junit;
mod markdown;
#[cfg(test)]
mod test_helpers;
mod text;

pub use github::GithubReporter;
pub use json::JsonReporter;
pub use junit::JunitReporter;
pub use markdown::MarkdownReporter;
pub use text::TextReporter;

use crate::{
    errors::{ReportFormatParseError, WriteReportError},
    results::{FileResult, RunResult},
};
use std::{fmt, io, str::FromStr};

/// Formats test results.
///
/// Reporters are shared between executor workers, which format each file into a private
/// buffer, so they must be `Sync` and take `&self`.
pub trait Reporter: Send + Sync {
    /// Writes the results of one file. Reporters without incremental output ignore this.
    fn report_file(&self, writer: &mut dyn io::Write, result: &FileResult)
    -> Result<(), WriteReportError>;

    /// Writes the summary of a completed run.
    fn report_summary(
        &self,
        writer: &mut dyn io::Write,
        result: &RunResult,
    ) -> Result<(), WriteReportError>;

    /// Whether [`Self::report_file`] produces output.
    fn supports_incremental_output(&self) -> bool {
        false
    }
}

/// An output format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReportFormat {
    /// Human-readable text.
    #[default]
    Text,

    /// A JSON summary.
    Json,

    /// JUnit XML.
    Junit,

    /// GitHub-flavored Markdown, for job summaries.
    Markdown,

    /// GitHub Actions workflow annotations.
    Github,
}

impl ReportFormat {
    /// Every format name accepted by [`FromStr`].
    pub const NAMES: &'static [&'static str] = &["text", "json", "junit", "markdown", "github"];

    /// The format's name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Junit => "junit",
            Self::Markdown => "markdown",
            Self::Github => "github",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ReportFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "junit" | "xml" => Ok(Self::Junit),
            "markdown" | "md" => Ok(Self::Markdown),
            "github" => Ok(Self::Github),
            other => Err(ReportFormatParseError::new(other, Self::NAMES)),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a [`Reporter`] for a format.
#[derive(Debug, Default)]
pub struct ReporterBuilder {
    format: ReportFormat,
    verbose: bool,
    show_duration: bool,
    should_colorize: bool,
}

impl ReporterBuilder {
    /// Sets the output format.
    pub fn set_format(&mut self, format: ReportFormat) -> &mut Self {
        self.format = format;
        self
    }

    /// Shows captured output for every test, not only failing ones. Text only.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Shows per-test and total durations. Text only.
    pub fn set_show_duration(&mut self, show_duration: bool) -> &mut Self {
        self.show_duration = show_duration;
        self
    }

    /// Set to true if the reporter should colorize output. Text only.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Creates the reporter.
    pub fn build(&self) -> Box<dyn Reporter> {
        match self.format {
            ReportFormat::Text => {
                let mut reporter = TextReporter::new();
                reporter
                    .set_verbose(self.verbose)
                    .set_show_duration(self.show_duration);
                if self.should_colorize {
                    reporter.colorize();
                }
                Box::new(reporter)
            }
            ReportFormat::Json => Box::new(JsonReporter),
            ReportFormat::Junit => Box::new(JunitReporter::default()),
            ReportFormat::Markdown => Box::new(MarkdownReporter),
            ReportFormat::Github => Box::new(GithubReporter),
        }
    }
}
