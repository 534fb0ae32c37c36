// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Selecting which tests in a file to run.
//!
//! Three filters apply, in this order:
//!
//! 1. the marker filter (`slow`, or `not slow`), matched case-insensitively against a test's
//!    `markers`;
//! 2. the explicit allow-list of test names, from `file::test` selectors;
//! 3. the substring filter (`-k parse`, or `-k "not parse"`), case-insensitive.
//!
//! When an allow-list is present the substring filter is ignored.

use std::{collections::BTreeSet, fmt};

/// A test's filtering decision.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterMatch {
    /// The test should run.
    Matches,

    /// The test should be left out, without a result.
    Mismatch {
        /// Why it was left out.
        reason: MismatchReason,
    },
}

impl FilterMatch {
    /// Returns true if the test should run.
    pub fn is_match(&self) -> bool {
        matches!(self, FilterMatch::Matches)
    }
}

/// Why a test was filtered out.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MismatchReason {
    /// The marker filter excluded it.
    Marker,

    /// It isn't in the explicit list of test names.
    TestName,

    /// The substring filter excluded it.
    Substring,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchReason::Marker => write!(f, "does not match the marker filter"),
            MismatchReason::TestName => write!(f, "is not in the selected test names"),
            MismatchReason::Substring => write!(f, "does not match the name filter"),
        }
    }
}

/// A pattern with an optional `not ` prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Pattern {
    negated: bool,
    // Lowercased.
    needle: String,
}

impl Pattern {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        let (negated, needle) = match input.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("not ") => (true, input[4..].trim()),
            _ => (false, input),
        };
        Some(Self {
            negated,
            needle: needle.to_lowercase(),
        })
    }

    fn apply(&self, matched: bool) -> bool {
        matched != self.negated
    }
}

/// Filters tests by name and marker.
#[derive(Clone, Debug, Default)]
pub struct TestFilter {
    name: Option<Pattern>,
    marker: Option<Pattern>,
    test_names: BTreeSet<String>,
}

impl TestFilter {
    /// A filter that matches every test.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a filter. Empty patterns are ignored.
    pub fn new(name: Option<&str>, marker: Option<&str>, test_names: &[String]) -> Self {
        Self {
            name: name.and_then(Pattern::parse),
            marker: marker.and_then(Pattern::parse),
            test_names: test_names.iter().cloned().collect(),
        }
    }

    /// Returns a copy of this filter with a different allow-list.
    pub fn with_test_names(&self, test_names: &[String]) -> Self {
        Self {
            test_names: test_names.iter().cloned().collect(),
            ..self.clone()
        }
    }

    /// Decides whether a test runs.
    ///
    /// `name` is the test function's name. `case_name` is the `test[case]` name of a
    /// parametrized case, which the allow-list also accepts.
    pub fn filter_match(
        &self,
        name: &str,
        case_name: Option<&str>,
        markers: &BTreeSet<String>,
    ) -> FilterMatch {
        if let Some(marker) = &self.marker {
            let has_marker = markers.iter().any(|m| m.to_lowercase() == marker.needle);
            if !marker.apply(has_marker) {
                return FilterMatch::Mismatch {
                    reason: MismatchReason::Marker,
                };
            }
        }

        if !self.test_names.is_empty() {
            let listed = self.test_names.contains(name)
                || case_name.is_some_and(|case| self.test_names.contains(case));
            return if listed {
                FilterMatch::Matches
            } else {
                FilterMatch::Mismatch {
                    reason: MismatchReason::TestName,
                }
            };
        }

        if let Some(pattern) = &self.name {
            let contains = name.to_lowercase().contains(&pattern.needle);
            if !pattern.apply(contains) {
                return FilterMatch::Mismatch {
                    reason: MismatchReason::Substring,
                };
            }
        }

        FilterMatch::Matches
    }
}
