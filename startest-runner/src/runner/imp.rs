// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    meta::{ParamCase, TestFunction, TestMeta, hook, test_functions},
    timer::TestTimer,
};
use crate::{
    assertions::{ASSERT_MODULE, assert_module},
    coverage::{CoverageCollector, CoverageReport},
    engine::{
        Callable, CancellationToken, CoverageHook, Engine, ExecContext, Namespace, Value,
    },
    errors::{EngineError, RunFileError, TestFailure},
    fixtures::{FixtureRegistry, find_conftest_files, fixtures_from_namespace},
    mock::{MOCK_FIXTURE, MockManager},
    results::{FileResult, TestOutcome, TestResult},
    snapshot::SnapshotManager,
    test_filter::TestFilter,
    time::stopwatch,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{fs, sync::Arc, time::Duration};
use tracing::{debug, trace};

/// The default prefix of test function names.
pub const DEFAULT_TEST_PREFIX: &str = "test_";

const SETUP: &str = "setup";
const TEARDOWN: &str = "teardown";
const SETUP_FILE: &str = "setup_file";
const TEARDOWN_FILE: &str = "teardown_file";

/// Options controlling how tests are selected and run.
#[derive(Clone, Debug)]
pub struct RunnerOptions {
    /// Functions whose names start with this prefix are tests.
    pub test_prefix: String,

    /// A case-insensitive substring to select tests by, or `not <substring>`.
    pub filter: Option<String>,

    /// A marker to select tests by, or `not <marker>`.
    pub marker_filter: Option<String>,

    /// If non-empty, only these tests run. Takes precedence over `filter`.
    pub test_names: Vec<String>,

    /// Files executed before each test file. Their public bindings become predeclared names.
    pub preludes: Vec<Utf8PathBuf>,

    /// Per-test timeout. `None` or zero disables it.
    pub timeout: Option<Duration>,

    /// Stop running a file's tests after the first failure.
    pub fail_fast: bool,

    /// Overwrite mismatching snapshots instead of failing.
    pub update_snapshots: bool,

    /// Collect line coverage.
    pub coverage: bool,

    /// Extra names available to every file.
    pub predeclared: Namespace,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            test_prefix: DEFAULT_TEST_PREFIX.to_owned(),
            filter: None,
            marker_filter: None,
            test_names: Vec::new(),
            preludes: Vec::new(),
            timeout: None,
            fail_fast: false,
            update_snapshots: false,
            coverage: false,
            predeclared: Namespace::new(),
        }
    }
}

/// Builds a [`TestRunner`].
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    options: RunnerOptions,
    snapshots: Option<Arc<SnapshotManager>>,
}

impl TestRunnerBuilder {
    /// Creates a builder starting from the given options.
    pub fn from_options(options: RunnerOptions) -> Self {
        Self {
            options,
            snapshots: None,
        }
    }

    /// Sets the test function prefix.
    pub fn set_test_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.options.test_prefix = prefix.into();
        self
    }

    /// Sets the substring filter.
    pub fn set_filter(&mut self, filter: impl Into<String>) -> &mut Self {
        self.options.filter = Some(filter.into());
        self
    }

    /// Sets the marker filter.
    pub fn set_marker_filter(&mut self, marker: impl Into<String>) -> &mut Self {
        self.options.marker_filter = Some(marker.into());
        self
    }

    /// Restricts the run to these test names.
    pub fn set_test_names(&mut self, names: impl IntoIterator<Item = String>) -> &mut Self {
        self.options.test_names = names.into_iter().collect();
        self
    }

    /// Sets the prelude files.
    pub fn set_preludes(&mut self, preludes: impl IntoIterator<Item = Utf8PathBuf>) -> &mut Self {
        self.options.preludes = preludes.into_iter().collect();
        self
    }

    /// Sets the per-test timeout. A zero duration disables it.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets fail-fast mode.
    pub fn set_fail_fast(&mut self, fail_fast: bool) -> &mut Self {
        self.options.fail_fast = fail_fast;
        self
    }

    /// Sets snapshot update mode.
    pub fn set_update_snapshots(&mut self, update: bool) -> &mut Self {
        self.options.update_snapshots = update;
        self
    }

    /// Enables coverage collection.
    pub fn set_coverage(&mut self, coverage: bool) -> &mut Self {
        self.options.coverage = coverage;
        self
    }

    /// Adds a predeclared value.
    pub fn add_predeclared(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.options.predeclared.insert(name.into(), value);
        self
    }

    /// Shares a snapshot manager with other runners instead of creating one.
    pub fn set_snapshot_manager(&mut self, snapshots: Arc<SnapshotManager>) -> &mut Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Creates the runner.
    pub fn build(self, engine: Arc<dyn Engine>) -> TestRunner {
        let options = self.options;
        let filter = TestFilter::new(
            options.filter.as_deref(),
            options.marker_filter.as_deref(),
            &options.test_names,
        );
        let snapshots = self
            .snapshots
            .unwrap_or_else(|| Arc::new(SnapshotManager::new(options.update_snapshots)));
        let coverage = options
            .coverage
            .then(|| Arc::new(CoverageCollector::new()));

        TestRunner {
            engine,
            options,
            filter,
            snapshots,
            coverage,
        }
    }
}

/// Runs the tests in a file.
///
/// A runner is shared by every worker in a run: per-file state (fixtures) is created fresh for
/// each call to [`run_file`](Self::run_file), and per-test state (test fixtures, mocks) for each
/// test.
pub struct TestRunner {
    engine: Arc<dyn Engine>,
    options: RunnerOptions,
    filter: TestFilter,
    snapshots: Arc<SnapshotManager>,
    coverage: Option<Arc<CoverageCollector>>,
}

impl TestRunner {
    /// The options this runner was built with.
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// The filter built from the options.
    pub fn filter(&self) -> &TestFilter {
        &self.filter
    }

    /// The snapshot manager shared by every file.
    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.snapshots
    }

    /// Coverage collected so far, if coverage is enabled.
    pub fn coverage_report(&self) -> Option<CoverageReport> {
        self.coverage.as_ref().map(|coverage| coverage.report())
    }

    /// Reads a file from disk and runs it.
    pub fn run_path(&self, path: &Utf8Path) -> Result<FileResult, RunFileError> {
        let source = read(path)?;
        self.run_file(path, &source)
    }

    /// Runs every selected test in a file.
    pub fn run_file(&self, path: &Utf8Path, source: &str) -> Result<FileResult, RunFileError> {
        self.run_file_with_filter(path, source, &self.filter)
    }

    /// Like [`run_file`](Self::run_file), with a different filter.
    pub fn run_file_with_filter(
        &self,
        path: &Utf8Path,
        source: &str,
        filter: &TestFilter,
    ) -> Result<FileResult, RunFileError> {
        let stopwatch = stopwatch();
        debug!(%path, "running file");

        let predeclared = self.predeclared()?;

        let mock = MockManager::new();
        let mut registry = FixtureRegistry::new();
        registry.add_builtin(MOCK_FIXTURE, mock.module());
        for conftest in find_conftest_files(path) {
            debug!(%conftest, file = %path, "loading conftest");
            let source = read(&conftest)?;
            let namespace = self
                .exec(&conftest, &source, &predeclared)
                .map_err(|error| RunFileError::Conftest {
                    path: conftest.clone(),
                    error,
                })?;
            registry.register_all(fixtures_from_namespace(&namespace));
        }

        let namespace =
            self.exec(path, source, &predeclared)
                .map_err(|error| RunFileError::Exec {
                    path: path.to_owned(),
                    error,
                })?;
        registry.register_all(fixtures_from_namespace(&namespace));

        let file = FileRun {
            runner: self,
            path,
            registry,
            mock,
            setup: hook(&namespace, SETUP),
            teardown: hook(&namespace, TEARDOWN),
        };

        let mut result = FileResult {
            file: path.to_owned(),
            tests: Vec::new(),
            setup_error: None,
            teardown_error: None,
            start_time: stopwatch.snapshot().start_time,
            duration: Duration::ZERO,
        };

        if let Some(setup_file) = hook(&namespace, SETUP_FILE)
            && let Err(error) = self.call_hook(path, SETUP_FILE, &setup_file)
        {
            debug!(%path, %error, "setup_file failed");
            result.setup_error = Some(error);
            result.duration = stopwatch.snapshot().duration;
            return Ok(result);
        }

        'tests: for test in test_functions(&namespace, &self.options.test_prefix) {
            for (name, case) in test_instances(&test) {
                let case_name = case.is_some().then_some(name.as_str());
                let filter_match = filter.filter_match(&test.name, case_name, &test.meta.markers);
                if !filter_match.is_match() {
                    trace!(test = %name, ?filter_match, "filtered out");
                    continue;
                }

                let result_for_test = file.run_test(&name, &test, case);
                let failed = result_for_test.is_failed();
                result.tests.push(result_for_test);

                if failed && self.options.fail_fast {
                    debug!(%path, test = %name, "fail-fast: skipping the rest of the file");
                    break 'tests;
                }
            }
        }

        if let Some(teardown_file) = hook(&namespace, TEARDOWN_FILE)
            && let Err(error) = self.call_hook(path, TEARDOWN_FILE, &teardown_file)
        {
            debug!(%path, %error, "teardown_file failed");
            result.teardown_error = Some(error);
        }

        file.registry.clear_file_cache();
        result.duration = stopwatch.snapshot().duration;
        Ok(result)
    }

    /// The `assert` module, then caller-supplied names, then each prelude's public bindings.
    fn predeclared(&self) -> Result<Namespace, RunFileError> {
        let mut predeclared = Namespace::new();
        predeclared.insert(ASSERT_MODULE.to_owned(), assert_module());
        predeclared.extend(
            self.options
                .predeclared
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        for prelude in &self.options.preludes {
            let source = read(prelude)?;
            let namespace = self.exec(prelude, &source, &predeclared).map_err(|error| {
                RunFileError::Prelude {
                    path: prelude.clone(),
                    error,
                }
            })?;
            predeclared.extend(
                namespace
                    .into_iter()
                    .filter(|(name, _)| !name.starts_with('_')),
            );
        }

        Ok(predeclared)
    }

    fn exec(
        &self,
        path: &Utf8Path,
        source: &str,
        predeclared: &Namespace,
    ) -> Result<Namespace, EngineError> {
        let cx = ExecContext::new(path.as_str()).with_coverage(self.coverage_hook());
        let namespace = self.engine.exec_file(path, source, predeclared, &cx)?;
        let output = cx.take_output();
        if !output.is_empty() {
            trace!(%path, %output, "module-level output");
        }
        Ok(namespace)
    }

    fn call_hook(
        &self,
        path: &Utf8Path,
        name: &str,
        hook: &Arc<dyn Callable>,
    ) -> Result<(), EngineError> {
        let cx = ExecContext::new(format!("{path}::{name}")).with_coverage(self.coverage_hook());
        hook.call(&cx, &[], &[]).map(|_| ())
    }

    fn coverage_hook(&self) -> Option<Arc<dyn CoverageHook>> {
        self.coverage
            .clone()
            .map(|coverage| coverage as Arc<dyn CoverageHook>)
    }
}

/// The tests a function expands into: itself, or one per parametrized case.
fn test_instances(test: &TestFunction) -> Vec<(String, Option<&ParamCase>)> {
    if test.cases.is_empty() {
        vec![(test.name.clone(), None)]
    } else {
        test.cases
            .iter()
            .map(|case| (case.virtual_name(&test.name), Some(case)))
            .collect()
    }
}

fn read(path: &Utf8Path) -> Result<String, RunFileError> {
    fs::read_to_string(path).map_err(|error| RunFileError::Read {
        path: path.to_owned(),
        error,
    })
}

/// State shared by the tests of one file.
struct FileRun<'a> {
    runner: &'a TestRunner,
    path: &'a Utf8Path,
    registry: FixtureRegistry,
    mock: MockManager,
    setup: Option<Arc<dyn Callable>>,
    teardown: Option<Arc<dyn Callable>>,
}

impl FileRun<'_> {
    fn run_test(&self, name: &str, test: &TestFunction, case: Option<&ParamCase>) -> TestResult {
        let stopwatch = stopwatch();
        let meta = &test.meta;

        if meta.skip {
            debug!(test = name, "skipped");
            return TestResult {
                name: name.to_owned(),
                file: self.path.to_owned(),
                outcome: TestOutcome::Skipped {
                    reason: meta.skip_reason.clone(),
                },
                start_time: stopwatch.snapshot().start_time,
                duration: Duration::ZERO,
                output: String::new(),
            };
        }

        let token = CancellationToken::new();
        let cx = ExecContext::new(name)
            .with_cancellation(token.clone())
            .with_snapshot(self.runner.snapshots.for_test(self.path, name))
            .with_coverage(self.runner.coverage_hook());
        let timeout = self.runner.options.timeout.filter(|t| !t.is_zero());
        let timer = timeout.map(|timeout| TestTimer::start(name, timeout, token));

        let outcome = self.execute(&cx, test, case, timeout);
        drop(timer);

        let outcome = apply_xfail(outcome, meta);
        self.registry.clear_test_cache();
        // Mocks and their call logs belong to a single test.
        self.mock.reset();

        let snapshot = stopwatch.snapshot();
        debug!(test = name, duration = ?snapshot.duration, ?outcome, "finished test");
        TestResult {
            name: name.to_owned(),
            file: self.path.to_owned(),
            outcome,
            start_time: snapshot.start_time,
            duration: snapshot.duration,
            output: cx.take_output(),
        }
    }

    fn execute(
        &self,
        cx: &ExecContext,
        test: &TestFunction,
        case: Option<&ParamCase>,
        timeout: Option<Duration>,
    ) -> TestOutcome {
        if let Some(setup) = &self.setup
            && let Err(error) = setup.call(cx, &[], &[])
        {
            return TestOutcome::Failed(TestFailure::Setup(error));
        }

        let mut outcome = match self.arguments(cx, test, case) {
            Err(failure) => TestOutcome::Failed(failure),
            Ok(args) => match test.function.call(cx, &args, &[]) {
                Ok(_) => TestOutcome::Passed,
                Err(error) => match timeout {
                    Some(timeout) if cx.cancellation().is_cancelled() => {
                        TestOutcome::Failed(TestFailure::Timeout { timeout, error })
                    }
                    _ => TestOutcome::Failed(TestFailure::Execution(error)),
                },
            },
        };

        // Teardown runs even after a failure, since setup succeeded.
        if let Some(teardown) = &self.teardown
            && let Err(error) = teardown.call(cx, &[], &[])
        {
            if matches!(outcome, TestOutcome::Passed) {
                outcome = TestOutcome::Failed(TestFailure::Teardown(error));
            } else {
                debug!(test = cx.name(), %error, "teardown also failed");
            }
        }

        outcome
    }

    /// For a parametrized case, the case dict followed by fixtures for the remaining
    /// parameters. Otherwise a fixture for every parameter.
    fn arguments(
        &self,
        cx: &ExecContext,
        test: &TestFunction,
        case: Option<&ParamCase>,
    ) -> Result<Vec<Value>, TestFailure> {
        let params = test.function.param_names();
        match case {
            Some(case) => {
                let mut args = vec![case.case.clone()];
                let fixtures = params.get(1..).unwrap_or_default();
                args.extend(
                    self.registry
                        .resolve_args(cx, fixtures)
                        .map_err(TestFailure::Fixture)?,
                );
                Ok(args)
            }
            None => self
                .registry
                .resolve_args(cx, &params)
                .map_err(TestFailure::Fixture),
        }
    }
}

fn apply_xfail(outcome: TestOutcome, meta: &TestMeta) -> TestOutcome {
    if meta.xfail {
        outcome.expect_failure(meta.xfail_reason.clone())
    } else {
        outcome
    }
}
