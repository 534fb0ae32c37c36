// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line coverage collection.
//!
//! The engine reports executed lines through the [`CoverageHook`] on each test's
//! [`ExecContext`](crate::engine::ExecContext). Rendering reports (LCOV, Cobertura and so on)
//! is left to front ends; this module only aggregates hits.

use crate::engine::CoverageHook;
use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Collects line hits across a run. Shared by every file and test.
#[derive(Debug, Default)]
pub struct CoverageCollector {
    files: RwLock<BTreeMap<Utf8PathBuf, BTreeMap<u32, u64>>>,
}

impl CoverageCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers executable lines of a file, so that lines that never run count as uncovered.
    pub fn add_lines(&self, file: &Utf8Path, lines: impl IntoIterator<Item = u32>) {
        let mut files = self.files.write();
        let entry = files.entry(file.to_owned()).or_default();
        for line in lines {
            entry.entry(line).or_insert(0);
        }
    }

    /// Returns how many times a line was executed.
    pub fn hits(&self, file: &Utf8Path, line: u32) -> u64 {
        self.files
            .read()
            .get(file)
            .and_then(|lines| lines.get(&line))
            .copied()
            .unwrap_or(0)
    }

    /// Summarizes everything collected so far.
    pub fn report(&self) -> CoverageReport {
        let files: Vec<_> = self
            .files
            .read()
            .iter()
            .map(|(path, lines)| FileCoverage {
                path: path.clone(),
                total_lines: lines.len(),
                covered_lines: lines.values().filter(|hits| **hits > 0).count(),
                lines: lines.clone(),
            })
            .collect();

        CoverageReport {
            total_lines: files.iter().map(|f| f.total_lines).sum(),
            covered_lines: files.iter().map(|f| f.covered_lines).sum(),
            files,
        }
    }
}

impl CoverageHook for CoverageCollector {
    fn record(&self, file: &Utf8Path, line: u32) {
        let mut files = self.files.write();
        *files
            .entry(file.to_owned())
            .or_default()
            .entry(line)
            .or_insert(0) += 1;
    }
}

/// Coverage totals for a run.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageReport {
    /// Per-file coverage, sorted by path.
    pub files: Vec<FileCoverage>,

    /// Tracked lines across all files.
    pub total_lines: usize,

    /// Lines executed at least once.
    pub covered_lines: usize,
}

impl CoverageReport {
    /// The percentage of tracked lines that were executed. 100 when nothing is tracked.
    pub fn percentage(&self) -> f64 {
        percentage(self.covered_lines, self.total_lines)
    }
}

/// Coverage for one file.
#[derive(Clone, Debug, PartialEq)]
pub struct FileCoverage {
    /// The file.
    pub path: Utf8PathBuf,

    /// Tracked lines.
    pub total_lines: usize,

    /// Lines executed at least once.
    pub covered_lines: usize,

    /// Hit counts by line number.
    pub lines: BTreeMap<u32, u64>,
}

impl FileCoverage {
    /// The percentage of this file's tracked lines that were executed.
    pub fn percentage(&self) -> f64 {
        percentage(self.covered_lines, self.total_lines)
    }
}

fn percentage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        covered as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use std::{sync::Arc, thread};

    #[test]
    fn empty_report_is_fully_covered() {
        let report = CoverageCollector::new().report();
        assert_eq!(report.total_lines, 0);
        assert_eq!(report.percentage(), 100.0);
    }

    #[test]
    fn counts_hits() {
        let collector = CoverageCollector::new();
        let lib = Utf8Path::new("lib.star");
        collector.add_lines(lib, [1, 2, 3, 4]);
        collector.record(lib, 1);
        collector.record(lib, 1);
        collector.record(lib, 3);

        let report = collector.report();
        assert_eq!(report.total_lines, 4);
        assert_eq!(report.covered_lines, 2);
        assert_eq!(report.percentage(), 50.0);
        assert_eq!(
            report.files[0].lines,
            btreemap! { 1 => 2, 2 => 0, 3 => 1, 4 => 0 }
        );
    }

    #[test]
    fn concurrent_records() {
        let collector = Arc::new(CoverageCollector::new());
        let file = Utf8PathBuf::from("a.star");

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        collector.record(&file, 7);
                    }
                });
            }
        });

        assert_eq!(collector.hits(&file, 7), 400);
    }
}
