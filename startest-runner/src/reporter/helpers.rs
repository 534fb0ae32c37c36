// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use owo_colors::Style;
use startest_metadata::TestStatusSummary;
use std::{fmt, time::Duration};

#[derive(Debug, Default, Clone)]
pub(super) struct Styles {
    pub(super) is_colorized: bool,
    pub(super) count: Style,
    pub(super) pass: Style,
    pub(super) fail: Style,
    pub(super) skip: Style,
    pub(super) xfail: Style,
    pub(super) file: Style,
}

impl Styles {
    pub(super) fn colorize(&mut self) {
        self.is_colorized = true;
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.xfail = Style::new().magenta().bold();
        self.file = Style::new().blue().bold();
    }

    pub(super) fn for_status(&self, status: TestStatusSummary) -> Style {
        match status {
            TestStatusSummary::Pass => self.pass,
            TestStatusSummary::Fail | TestStatusSummary::Xpass => self.fail,
            TestStatusSummary::Skip => self.skip,
            TestStatusSummary::Xfail => self.xfail,
        }
    }
}

/// Displays a duration rounded to the millisecond, such as `1s 250ms`.
pub(super) struct DisplayMillis(pub(super) Duration);

impl fmt::Display for DisplayMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = Duration::from_millis(
            u64::try_from((self.0.as_micros() + 500) / 1000).unwrap_or(u64::MAX),
        );
        if rounded.is_zero() {
            return f.write_str("0ms");
        }
        write!(f, "{}", humantime::format_duration(rounded))
    }
}
