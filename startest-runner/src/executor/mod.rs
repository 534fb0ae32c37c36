// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running many test files, one after another or on a pool of worker threads.
//!
//! [`Executor`] takes a list of [`FileJob`]s and runs each through a
//! [`TestRunner`](crate::runner::TestRunner). With more than one worker, files are handed out
//! through a bounded queue and each worker formats its file's output into a private buffer. The
//! buffers and results are put back in input order once every worker has finished, so a parallel
//! run reports exactly what a sequential one would.
//!
//! [`WatchLoop`] re-runs files whenever a [`Watcher`](crate::watcher::Watcher) reports a change.

mod watch;

pub use watch::*;

use crate::{
    discovery::DiscoveredFiles,
    errors::ExecutorError,
    reporter::Reporter,
    results::{FileResult, RunResult},
    runner::TestRunner,
    time::stopwatch,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    collections::BTreeMap,
    io,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};
use tracing::debug;

/// A file to run, optionally restricted to some of its tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileJob {
    /// The test file.
    pub path: Utf8PathBuf,

    /// Tests selected with `file::test` arguments. Empty means every test.
    pub test_names: Vec<String>,
}

impl FileJob {
    /// Runs every test in `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            test_names: Vec::new(),
        }
    }

    /// One job per discovered file, carrying that file's selected tests.
    pub fn from_discovered(discovered: &DiscoveredFiles) -> Vec<Self> {
        discovered
            .files()
            .iter()
            .map(|path| Self {
                path: path.clone(),
                test_names: discovered.test_names(path).to_vec(),
            })
            .collect()
    }
}

/// Runs files through a runner and a reporter.
#[derive(Clone, Copy)]
pub struct Executor<'a> {
    runner: &'a TestRunner,
    reporter: &'a dyn Reporter,
    workers: usize,
}

impl<'a> Executor<'a> {
    /// Creates a sequential executor.
    pub fn new(runner: &'a TestRunner, reporter: &'a dyn Reporter) -> Self {
        Self {
            runner,
            reporter,
            workers: 1,
        }
    }

    /// Sets the number of worker threads. 0 and 1 both mean sequential.
    pub fn set_workers(&mut self, workers: usize) -> &mut Self {
        self.workers = workers;
        self
    }

    /// The number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `jobs`, writing each file's output (for incremental reporters) and then the run
    /// summary to `out`.
    ///
    /// The first error, in input order, aborts the run. With fail-fast, the run stops after the
    /// first file with a failure and later files are not reported.
    pub fn run(
        &self,
        jobs: &[FileJob],
        out: &mut dyn io::Write,
    ) -> Result<RunResult, ExecutorError> {
        let stopwatch = stopwatch();
        debug!(files = jobs.len(), workers = self.workers, "starting run");

        let files = if self.workers <= 1 || jobs.len() <= 1 {
            self.run_sequential(jobs, out)?
        } else {
            self.run_parallel(jobs, out)?
        };

        let snapshot = stopwatch.snapshot();
        let run = RunResult {
            files,
            start_time: snapshot.start_time,
            duration: snapshot.duration,
        };
        self.reporter.report_summary(out, &run)?;
        Ok(run)
    }

    fn fail_fast(&self) -> bool {
        self.runner.options().fail_fast
    }

    fn run_sequential(
        &self,
        jobs: &[FileJob],
        out: &mut dyn io::Write,
    ) -> Result<Vec<FileResult>, ExecutorError> {
        let mut files = Vec::with_capacity(jobs.len());
        for job in jobs {
            let result = self.run_job(job)?;
            if self.reporter.supports_incremental_output() {
                self.reporter.report_file(out, &result)?;
            }

            let failed = result.has_failures();
            files.push(result);
            if failed && self.fail_fast() {
                debug!(path = %job.path, "fail-fast: stopping after failing file");
                break;
            }
        }
        Ok(files)
    }

    fn run_parallel(
        &self,
        jobs: &[FileJob],
        out: &mut dyn io::Write,
    ) -> Result<Vec<FileResult>, ExecutorError> {
        let (job_sender, job_receiver) =
            crossbeam_channel::bounded::<(usize, &FileJob)>(self.workers);
        let (done_sender, done_receiver) = crossbeam_channel::unbounded::<Completed>();

        // The lowest index of a file that errored or (with fail-fast) failed. Files after it are
        // drained without being run; files before it always run, so reassembly has no gaps.
        let stop_at = AtomicUsize::new(usize::MAX);
        let stop_at = &stop_at;

        thread::scope(|scope| {
            for worker in 0..self.workers {
                let job_receiver = job_receiver.clone();
                let done_sender = done_sender.clone();
                scope.spawn(move || {
                    for (index, job) in job_receiver {
                        if index > stop_at.load(Ordering::Acquire) {
                            continue;
                        }

                        let mut output = Vec::new();
                        let result = self.run_job_buffered(job, &mut output);
                        let should_stop = match &result {
                            Ok(result) => result.has_failures() && self.fail_fast(),
                            Err(_) => true,
                        };
                        if should_stop {
                            let previous = stop_at.fetch_min(index, Ordering::AcqRel);
                            if previous == usize::MAX {
                                debug!(worker, path = %job.path, "stop flag set");
                            }
                        }

                        // Failure to send means the receiver was dropped.
                        let _ = done_sender.send(Completed {
                            index,
                            result,
                            output,
                        });
                    }
                });
            }
            drop(done_sender);
            drop(job_receiver);

            for (index, job) in jobs.iter().enumerate() {
                if stop_at.load(Ordering::Acquire) != usize::MAX {
                    break;
                }
                // Failure to send means every worker exited.
                if job_sender.send((index, job)).is_err() {
                    break;
                }
            }
            drop(job_sender);
        });

        // Every worker has joined, so the channel holds all completed files.
        let completed: BTreeMap<usize, Completed> = done_receiver
            .into_iter()
            .map(|completed| (completed.index, completed))
            .collect();

        let mut files = Vec::with_capacity(completed.len());
        for completed in completed.into_values() {
            out.write_all(&completed.output)
                .map_err(|error| ExecutorError::Report(error.into()))?;
            let result = completed.result?;
            let failed = result.has_failures();
            files.push(result);
            if failed && self.fail_fast() {
                break;
            }
        }
        Ok(files)
    }

    fn run_job_buffered(
        &self,
        job: &FileJob,
        output: &mut Vec<u8>,
    ) -> Result<FileResult, ExecutorError> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_job(job)))
            .unwrap_or_else(|_| {
                Err(ExecutorError::WorkerPanicked {
                    path: job.path.clone(),
                })
            })?;
        if self.reporter.supports_incremental_output() {
            self.reporter.report_file(output, &result)?;
        }
        Ok(result)
    }

    fn run_job(&self, job: &FileJob) -> Result<FileResult, ExecutorError> {
        let source = read_source(&job.path)?;
        let result = if job.test_names.is_empty() {
            self.runner.run_file(&job.path, &source)?
        } else {
            let filter = self.runner.filter().with_test_names(&job.test_names);
            self.runner
                .run_file_with_filter(&job.path, &source, &filter)?
        };
        Ok(result)
    }
}

impl std::fmt::Debug for Executor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

struct Completed {
    index: usize,
    result: Result<FileResult, ExecutorError>,
    output: Vec<u8>,
}

fn read_source(path: &Utf8Path) -> Result<String, ExecutorError> {
    std::fs::read_to_string(path).map_err(|error| ExecutorError::ReadFile {
        path: path.to_owned(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::EngineError,
        reporter::TextReporter,
        runner::TestRunnerBuilder,
        test_helpers::{FakeEngine, FakeModule, init_test_logging},
    };
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use std::{sync::Arc, time::Duration};
    use test_case::test_case;

    struct Workspace {
        dir: Utf8TempDir,
    }

    impl Workspace {
        fn new(names: &[&str]) -> Self {
            let dir = Utf8TempDir::new().unwrap();
            for name in names {
                std::fs::write(dir.path().join(name), "").unwrap();
            }
            Self { dir }
        }

        fn jobs(&self, names: &[&str]) -> Vec<FileJob> {
            names
                .iter()
                .map(|name| FileJob::new(self.dir.path().join(name)))
                .collect()
        }
    }

    fn passing(name: &str) -> FakeModule {
        FakeModule::new().test(name, |_, _| Ok(()))
    }

    fn failing(name: &str) -> FakeModule {
        FakeModule::new().test(name, |_, _| Err(EngineError::assertion("boom")))
    }

    /// Passing files that sleep for decreasing durations, so they finish out of order.
    fn engine(count: usize) -> (FakeEngine, Vec<String>) {
        let mut engine = FakeEngine::new();
        let mut names = Vec::new();
        for i in 0..count {
            let name = format!("f{i}_test.star");
            let delay = Duration::from_millis(5 * (count - i) as u64);
            engine = engine.with_module(
                &name,
                FakeModule::new().test("test_sleep", move |_, _| {
                    std::thread::sleep(delay);
                    Ok(())
                }),
            );
            names.push(name);
        }
        (engine, names)
    }

    fn run(
        engine: FakeEngine,
        workspace: &Workspace,
        names: &[&str],
        workers: usize,
        fail_fast: bool,
    ) -> (Result<RunResult, ExecutorError>, String, Arc<FakeEngine>) {
        init_test_logging();
        let engine = Arc::new(engine);
        let mut builder = TestRunnerBuilder::default();
        builder.set_fail_fast(fail_fast);
        let runner = builder.build(engine.clone());
        let reporter = TextReporter::new();

        let mut out = Vec::new();
        let result = Executor::new(&runner, &reporter)
            .set_workers(workers)
            .run(&workspace.jobs(names), &mut out);
        (result, String::from_utf8(out).unwrap(), engine)
    }

    fn file_names(run: &RunResult) -> Vec<&str> {
        run.files
            .iter()
            .map(|file| file.file.file_name().unwrap())
            .collect()
    }

    #[test_case(1; "sequential")]
    #[test_case(4; "parallel")]
    fn preserves_input_order(workers: usize) {
        let (engine, names) = engine(6);
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let workspace = Workspace::new(&names);

        let (result, output, _) = run(engine, &workspace, &names, workers, false);
        let result = result.unwrap();
        assert_eq!(file_names(&result), names);
        assert_eq!(result.summary().passed, 6);
        assert_eq!(output.matches("PASS  test_sleep").count(), 6);
        assert!(output.ends_with("Results: 6 passed, 0 failed, 6 total in 6 file(s)\n"));
    }

    #[test]
    fn parallel_matches_sequential() {
        let names = ["a_test.star", "b_test.star", "c_test.star"];
        let make = || {
            FakeEngine::new()
                .with_module("a_test.star", passing("test_a"))
                .with_module("b_test.star", failing("test_b"))
                .with_module("c_test.star", passing("test_c"))
        };
        let workspace = Workspace::new(&names);

        let (sequential, sequential_out, _) = run(make(), &workspace, &names, 1, false);
        let (parallel, parallel_out, _) = run(make(), &workspace, &names, 3, false);
        let (sequential, parallel) = (sequential.unwrap(), parallel.unwrap());

        assert_eq!(file_names(&sequential), file_names(&parallel));
        let statuses = |run: &RunResult| -> Vec<_> {
            run.files
                .iter()
                .flat_map(|file| file.tests.iter().map(|test| (test.name.clone(), test.status())))
                .collect()
        };
        assert_eq!(statuses(&sequential), statuses(&parallel));
        assert_eq!(sequential_out, parallel_out);
    }

    #[test]
    fn sequential_fail_fast_skips_later_files() {
        let names = ["f1_test.star", "f2_test.star"];
        let workspace = Workspace::new(&names);
        let engine = FakeEngine::new()
            .with_module("f1_test.star", failing("test_one"))
            .with_module("f2_test.star", passing("test_two"));

        let (result, _, engine) = run(engine, &workspace, &names, 1, true);
        let result = result.unwrap();
        assert_eq!(file_names(&result), vec!["f1_test.star"]);
        assert_eq!(engine.exec_count("f2_test.star"), 0);
        assert!(result.has_failures());
    }

    #[test]
    fn parallel_fail_fast_stops_at_failing_file() {
        let names = ["f1_test.star", "f2_test.star", "f3_test.star"];
        let workspace = Workspace::new(&names);
        let engine = FakeEngine::new()
            .with_module("f1_test.star", failing("test_one"))
            .with_module("f2_test.star", passing("test_two"))
            .with_module("f3_test.star", passing("test_three"));

        let (result, output, _) = run(engine, &workspace, &names, 2, true);
        let result = result.unwrap();
        assert_eq!(file_names(&result), vec!["f1_test.star"]);
        assert!(!output.contains("test_two"), "{output}");
    }

    #[test_case(1; "sequential")]
    #[test_case(3; "parallel")]
    fn first_error_aborts(workers: usize) {
        let names = ["a_test.star", "b_test.star", "c_test.star"];
        let workspace = Workspace::new(&names);
        let engine = FakeEngine::new()
            .with_module("a_test.star", passing("test_a"))
            .with_error("b_test.star", EngineError::syntax("unexpected indent"))
            .with_module("c_test.star", passing("test_c"));

        let (result, output, _) = run(engine, &workspace, &names, workers, false);
        let error = result.unwrap_err();
        assert!(
            matches!(&error, ExecutorError::RunFile(_)),
            "unexpected error: {error:?}"
        );
        assert!(error.to_string().contains("b_test.star"), "{error}");
        // Output for files before the error is still flushed.
        assert!(output.contains("PASS  test_a"), "{output}");
        assert!(!output.contains("Results:"), "{output}");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let workspace = Workspace::new(&[]);
        let (result, _, _) = run(FakeEngine::new(), &workspace, &["gone_test.star"], 1, false);
        assert!(matches!(
            result.unwrap_err(),
            ExecutorError::ReadFile { .. }
        ));
    }

    #[test]
    fn selected_tests_only() {
        let workspace = Workspace::new(&["a_test.star"]);
        let engine = Arc::new(FakeEngine::new().with_module(
            "a_test.star",
            passing("test_one").test("test_two", |_, _| Ok(())),
        ));
        let runner = TestRunnerBuilder::default().build(engine);
        let reporter = TextReporter::new();

        let mut job = FileJob::new(workspace.dir.path().join("a_test.star"));
        job.test_names = vec!["test_two".to_owned()];
        let result = Executor::new(&runner, &reporter)
            .run(&[job], &mut io::sink())
            .unwrap();
        let names: Vec<_> = result.files[0]
            .tests
            .iter()
            .map(|test| test.name.as_str())
            .collect();
        assert_eq!(names, vec!["test_two"]);
    }
}
