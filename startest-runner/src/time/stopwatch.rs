// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for timing tests, files and runs.
//!
//! Results carry a wall-clock start time for reports and a duration measured on the monotonic
//! clock, so the two are captured together when the stopwatch starts.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<Local>,
    pub(crate) duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_monotonic() {
        let start = stopwatch();
        let first = start.snapshot();
        std::thread::sleep(Duration::from_millis(20));
        let second = start.snapshot();

        assert_eq!(first.start_time, second.start_time);
        assert!(
            second.duration >= first.duration + Duration::from_millis(20),
            "second snapshot ({:?}) is at least 20ms after the first ({:?})",
            second.duration,
            first.duration,
        );
    }
}
