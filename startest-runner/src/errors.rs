// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by startest.

use crate::indenter::indented;
use camino::Utf8PathBuf;
use config::ConfigError;
use itertools::Itertools;
use std::{error, fmt, fmt::Write as _, path::PathBuf, time::Duration};
use thiserror::Error;

/// Displays an error along with its chain of sources, one per line.
///
/// Reporters use this so that nested errors (for example a fixture failing because its own
/// dependency failed) stay readable.
#[derive(Clone, Copy, Debug)]
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain` for the given error.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        while let Some(error) = source {
            write!(f, "\n  caused by: ")?;
            write!(indented(f).with_str("    ").skip_initial(), "{error}")?;
            source = error.source();
        }

        Ok(())
    }
}

/// The category of an [`EngineError`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EngineErrorKind {
    /// The source could not be parsed.
    Syntax,

    /// A runtime error, such as calling an undefined function.
    Runtime,

    /// An assertion failed.
    Assertion,

    /// Execution was cancelled through the context's cancellation token.
    Cancelled,
}

/// A position in a Starlark source file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceLocation {
    /// The file the position is in.
    pub file: Utf8PathBuf,

    /// The 1-based line number.
    pub line: u32,

    /// The 1-based column, if known.
    pub column: Option<u32>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}:{}", self.file, self.line, column),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// An error reported by a Starlark engine, or by a builtin called from Starlark code.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineError {
    kind: EngineErrorKind,
    message: String,
    location: Option<SourceLocation>,
}

impl EngineError {
    /// Creates a new error of the given kind.
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// Creates a syntax error.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Syntax, message)
    }

    /// Creates a runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Runtime, message)
    }

    /// Creates an assertion failure.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Assertion, message)
    }

    /// Creates a cancellation error carrying the cancellation reason.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Cancelled, reason)
    }

    /// Attaches a source location to this error.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }

    /// Returns the message, without the location.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the source location, if the engine provided one.
    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl error::Error for EngineError {}

/// An error that occurred while discovering test files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// No test files matched the given paths.
    #[error("no test files found in {}", paths.iter().join(", "))]
    NoFilesFound {
        /// The paths that were searched.
        paths: Vec<String>,
    },

    /// A glob pattern failed to compile.
    #[error("invalid glob pattern `{pattern}`")]
    InvalidGlob {
        /// The pattern.
        pattern: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// An error occurred while walking a directory.
    #[error("error walking directory `{path}`")]
    Walk {
        /// The directory being walked.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A path could not be accessed.
    #[error("error accessing `{path}`")]
    Io {
        /// The path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A path was not valid UTF-8.
    #[error("path is not valid UTF-8: {}", path.display())]
    NonUtf8Path {
        /// The path.
        path: PathBuf,
    },
}

/// An error that occurred while resolving a fixture.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum FixtureError {
    /// No fixture or builtin has this name.
    #[error("fixture `{name}` not found")]
    NotFound {
        /// The requested name.
        name: String,
    },

    /// A fixture depends on itself, directly or through other fixtures.
    #[error("fixture dependency cycle: {}", chain.iter().join(" -> "))]
    Cycle {
        /// The resolution chain, starting and ending with the same fixture.
        chain: Vec<String>,
    },

    /// The fixture's producer failed.
    #[error("fixture `{name}` failed")]
    Resolution {
        /// The fixture's name.
        name: String,

        /// The error returned by the producer.
        #[source]
        error: EngineError,
    },

    /// A dependency of the fixture failed to resolve.
    #[error("fixture `{name}` could not resolve its dependency")]
    Dependency {
        /// The fixture whose dependency failed.
        name: String,

        /// The dependency's error.
        #[source]
        error: Box<FixtureError>,
    },
}

/// A configuration error from the mock framework.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum MockError {
    /// `mock.wrap` was called with a value that isn't callable.
    #[error("mock.wrap: expected a callable, got {type_name}")]
    NotCallable {
        /// The type of the argument.
        type_name: &'static str,
    },

    /// A mock query was called with a value that isn't a mock.
    #[error("{operation}: expected a mock, got {type_name}")]
    NotAMock {
        /// The operation being performed.
        operation: &'static str,

        /// The type of the argument.
        type_name: &'static str,
    },
}

impl From<MockError> for EngineError {
    fn from(error: MockError) -> Self {
        EngineError::runtime(error.to_string())
    }
}

/// A snapshot did not match its stored reference.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("snapshot \"{name}\" does not match:\n{diff}")]
pub struct SnapshotMismatch {
    /// The snapshot's name.
    pub name: String,

    /// The stored serialization.
    pub expected: String,

    /// The new serialization.
    pub actual: String,

    /// A unified diff between the two.
    pub diff: String,
}

/// An error that occurred while comparing a snapshot.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SnapshotError {
    /// The stored snapshot could not be read.
    #[error("failed to read snapshot \"{name}\" at `{path}`")]
    Read {
        /// The snapshot's name.
        name: String,

        /// The snapshot file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The snapshot could not be written.
    #[error("failed to write snapshot \"{name}\" to `{path}`")]
    Write {
        /// The snapshot's name.
        name: String,

        /// The snapshot file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The value did not match the stored snapshot.
    #[error(transparent)]
    Mismatch(SnapshotMismatch),
}

impl From<SnapshotError> for EngineError {
    fn from(error: SnapshotError) -> Self {
        match error {
            SnapshotError::Mismatch(mismatch) => EngineError::assertion(mismatch.to_string()),
            other => EngineError::runtime(DisplayErrorChain::new(other).to_string()),
        }
    }
}

/// An error that prevented a file from being run at all.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunFileError {
    /// A prelude, conftest or test file could not be read.
    #[error("failed to read `{path}`")]
    Read {
        /// The file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A prelude failed to execute.
    #[error("failed to load prelude `{path}`")]
    Prelude {
        /// The prelude.
        path: Utf8PathBuf,

        /// The engine error.
        #[source]
        error: EngineError,
    },

    /// A conftest file failed to execute.
    #[error("failed to load conftest `{path}`")]
    Conftest {
        /// The conftest file.
        path: Utf8PathBuf,

        /// The engine error.
        #[source]
        error: EngineError,
    },

    /// The test file itself failed to parse or execute.
    #[error("failed to execute `{path}`")]
    Exec {
        /// The test file.
        path: Utf8PathBuf,

        /// The engine error.
        #[source]
        error: EngineError,
    },
}

/// Why a single test failed.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum TestFailure {
    /// The file's `setup` function failed before the test body ran.
    #[error("setup failed: {0}")]
    Setup(EngineError),

    /// A fixture requested by the test could not be resolved.
    #[error(transparent)]
    Fixture(FixtureError),

    /// The test body failed.
    #[error(transparent)]
    Execution(EngineError),

    /// The test body was cancelled after running past its timeout.
    #[error("test timed out after {}", humantime::format_duration(*timeout))]
    Timeout {
        /// The configured timeout.
        timeout: Duration,

        /// The error the engine reported on cancellation.
        #[source]
        error: EngineError,
    },

    /// The file's `teardown` function failed after an otherwise passing test.
    #[error("teardown failed: {0}")]
    Teardown(EngineError),
}

impl TestFailure {
    /// Returns the engine error underlying this failure, if there is one.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Setup(error)
            | Self::Execution(error)
            | Self::Teardown(error)
            | Self::Timeout { error, .. } => Some(error),
            Self::Fixture(FixtureError::Resolution { error, .. }) => Some(error),
            Self::Fixture(_) => None,
        }
    }
}

/// An error that aborted a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// A test file could not be read.
    #[error("failed to read test file `{path}`")]
    ReadFile {
        /// The file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A file could not be run.
    #[error(transparent)]
    RunFile(#[from] RunFileError),

    /// Writing reporter output failed.
    #[error("error writing reporter output")]
    Report(#[from] WriteReportError),

    /// A worker thread panicked.
    #[error("worker thread panicked while running `{path}`")]
    WorkerPanicked {
        /// The file the worker was running.
        path: Utf8PathBuf,
    },
}

/// An error that occurs while writing reporter output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteReportError {
    /// Writing to the output failed.
    #[error("error writing to output")]
    Io(#[from] std::io::Error),

    /// Serializing the JSON summary failed.
    #[error("error serializing JSON summary")]
    Json(#[source] serde_json::Error),

    /// Producing JUnit XML failed.
    #[error("error serializing JUnit report")]
    Junit(#[source] quick_junit::SerializeError),
}

/// An error produced by the file watcher.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatchError {
    /// The filesystem notification backend reported an error.
    #[error("file watcher error")]
    Notify(#[from] notify::Error),

    /// A watched file could not be read.
    #[error("failed to read watched file `{path}`")]
    Read {
        /// The file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A path could not be made absolute.
    #[error("failed to resolve `{path}`")]
    Resolve {
        /// The path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The backend reported a path that isn't valid UTF-8.
    #[error("watched path is not valid UTF-8: {}", path.display())]
    NonUtf8Path {
        /// The path.
        path: PathBuf,
    },

    /// The thread that dispatches change events could not be started.
    #[error("failed to spawn watcher thread")]
    Spawn(#[source] std::io::Error),
}

/// An error that occurred while reading startest configuration.
#[derive(Debug, Error)]
#[error("failed to parse startest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ConfigParseError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// The layered config could not be assembled, for example because the file is not valid TOML.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// A key had the wrong type or an invalid value.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurs while parsing a test-threads value.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unrecognized value for test-threads: {input}")]
pub struct TestThreadsParseError {
    /// The input that failed to parse.
    pub input: String,
}

impl TestThreadsParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while parsing a report format name.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unrecognized report format `{input}` (expected one of: {})", expected.join(", "))]
pub struct ReportFormatParseError {
    /// The input that failed to parse.
    pub input: String,

    /// The accepted names.
    pub expected: &'static [&'static str],
}

impl ReportFormatParseError {
    pub(crate) fn new(input: impl Into<String>, expected: &'static [&'static str]) -> Self {
        Self {
            input: input.into(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_error_chain() {
        let error = FixtureError::Dependency {
            name: "db".to_owned(),
            error: Box::new(FixtureError::Resolution {
                name: "conn".to_owned(),
                error: EngineError::runtime("connection refused\nretry later"),
            }),
        };

        assert_eq!(
            DisplayErrorChain::new(&error).to_string(),
            "fixture `db` could not resolve its dependency\n  \
             caused by: fixture `conn` failed\n  \
             caused by: connection refused\n    retry later",
        );
    }

    #[test]
    fn engine_error_location() {
        let error = EngineError::assertion("assertion failed: 1 != 2").with_location(
            SourceLocation {
                file: "math_test.star".into(),
                line: 4,
                column: Some(5),
            },
        );
        assert_eq!(
            error.to_string(),
            "math_test.star:4:5: assertion failed: 1 != 2"
        );
        assert_eq!(error.message(), "assertion failed: 1 != 2");
    }

    #[test]
    fn timeout_display() {
        let failure = TestFailure::Timeout {
            timeout: Duration::from_millis(1500),
            error: EngineError::cancelled("timeout"),
        };
        assert_eq!(failure.to_string(), "test timed out after 1s 500ms");
        assert_eq!(
            failure.engine_error().map(EngineError::kind),
            Some(EngineErrorKind::Cancelled)
        );
    }
}
