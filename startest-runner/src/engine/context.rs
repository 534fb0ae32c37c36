// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::EngineError, snapshot::SnapshotContext};
use camino::Utf8Path;
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// A cooperative cancellation flag shared between a running execution and whoever may cancel it.
///
/// Cloning the token produces another handle to the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CancellationToken {
    /// Creates a new, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token. Only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.inner.reason.lock();
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// The reason passed to the first [`cancel`](Self::cancel) call.
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().clone()
    }

    /// Returns a cancellation error if the token has been cancelled.
    ///
    /// Engines call this at safe points, for example before each statement or call.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::cancelled(
                self.reason().unwrap_or_else(|| "cancelled".to_owned()),
            ))
        } else {
            Ok(())
        }
    }
}

/// Receives line-execution events from the engine when coverage is enabled.
pub trait CoverageHook: Send + Sync + fmt::Debug {
    /// Records that `line` of `file` was executed.
    fn record(&self, file: &Utf8Path, line: u32);
}

/// Per-execution state handed to the engine and to every builtin it calls.
///
/// Each test gets a fresh context, so nothing a test prints or cancels leaks into the next one.
#[derive(Debug)]
pub struct ExecContext {
    name: String,
    cancellation: CancellationToken,
    output: Mutex<String>,
    snapshot: Option<SnapshotContext>,
    coverage: Option<Arc<dyn CoverageHook>>,
}

impl ExecContext {
    /// Creates a context. `name` identifies the execution in logs, typically the test name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cancellation: CancellationToken::new(),
            output: Mutex::new(String::new()),
            snapshot: None,
            coverage: None,
        }
    }

    /// Uses the given cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attaches a snapshot context, enabling `assert.snapshot`.
    pub fn with_snapshot(mut self, snapshot: SnapshotContext) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Attaches a coverage hook.
    pub fn with_coverage(mut self, hook: Option<Arc<dyn CoverageHook>>) -> Self {
        self.coverage = hook;
        self
    }

    /// The name this context was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cancellation token for this execution.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The snapshot context, if snapshots are available in this execution.
    pub fn snapshot(&self) -> Option<&SnapshotContext> {
        self.snapshot.as_ref()
    }

    /// The coverage hook, if coverage is enabled.
    pub fn coverage(&self) -> Option<&dyn CoverageHook> {
        self.coverage.as_deref()
    }

    /// Appends a line of output, as written by Starlark's `print`.
    pub fn print(&self, msg: &str) {
        let mut output = self.output.lock();
        output.push_str(msg);
        output.push('\n');
    }

    /// Takes everything printed so far.
    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineErrorKind;

    #[test]
    fn cancellation_keeps_first_reason() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());

        let other = token.clone();
        other.cancel("timeout");
        token.cancel("later");

        assert!(token.is_cancelled());
        let err = token.check().unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Cancelled);
        assert_eq!(err.message(), "timeout");
    }

    #[test]
    fn output_is_taken() {
        let cx = ExecContext::new("test_print");
        cx.print("hello");
        cx.print("world");
        assert_eq!(cx.take_output(), "hello\nworld\n");
        assert_eq!(cx.take_output(), "");
    }
}
