// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::engine::CancellationToken;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::{
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, warn};

/// Cancels a test's token once its timeout elapses. Dropping the timer stops it.
#[derive(Debug)]
pub(super) struct TestTimer {
    // Dropping the sender disconnects the channel, which wakes the thread up early.
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestTimer {
    pub(super) fn start(test: &str, timeout: Duration, token: CancellationToken) -> Self {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);
        let test_name = test.to_owned();

        let spawned = thread::Builder::new()
            .name(format!("startest-timer-{test}"))
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(timeout) {
                    debug!(test = %test_name, ?timeout, "test timed out, cancelling");
                    token.cancel(format!(
                        "test timed out after {}",
                        humantime::format_duration(timeout)
                    ));
                }
            });

        match spawned {
            Ok(handle) => Self {
                stop: Some(stop),
                handle: Some(handle),
            },
            Err(error) => {
                warn!(test, %error, "failed to spawn timer thread, running without a timeout");
                Self {
                    stop: None,
                    handle: None,
                }
            }
        }
    }
}

impl Drop for TestTimer {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            // The thread only waits on the channel, so it can't panic in practice.
            _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn fires_after_timeout() {
        let token = CancellationToken::new();
        let timer = TestTimer::start("test_slow", Duration::from_millis(20), token.clone());
        thread::sleep(Duration::from_millis(200));
        drop(timer);

        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("test timed out after 20ms"));
    }

    #[test]
    fn drop_stops_early() {
        let token = CancellationToken::new();
        let start = Instant::now();
        drop(TestTimer::start(
            "test_fast",
            Duration::from_secs(60),
            token.clone(),
        ));

        assert!(!token.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(30));
    }
}
