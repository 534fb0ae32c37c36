// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Executor, FileJob};
use crate::{
    errors::DisplayErrorChain,
    watcher::{WatchEvent, Watcher},
};
use camino::Utf8PathBuf;
use crossbeam_channel::Receiver;
use std::{collections::BTreeSet, io};
use tracing::{debug, warn};

/// Re-runs test files when they, or files they load, change.
#[derive(Debug)]
pub struct WatchLoop<'a> {
    executor: Executor<'a>,
    jobs: Vec<FileJob>,
    // Canonical paths of `jobs`, for matching against watch events.
    canonical: Vec<Option<Utf8PathBuf>>,
    affected_only: bool,
}

impl<'a> WatchLoop<'a> {
    /// Creates a loop that runs `jobs`.
    pub fn new(executor: Executor<'a>, jobs: Vec<FileJob>) -> Self {
        let canonical = jobs
            .iter()
            .map(|job| job.path.canonicalize_utf8().ok())
            .collect();
        Self {
            executor,
            jobs,
            canonical,
            affected_only: true,
        }
    }

    /// If true (the default), a change re-runs only the affected test files. Otherwise every
    /// file runs again.
    pub fn set_affected_only(&mut self, affected_only: bool) -> &mut Self {
        self.affected_only = affected_only;
        self
    }

    /// Watches every job's file, does a full run, then re-runs on each change until `quit`
    /// receives a message or disconnects, or the watcher shuts down.
    ///
    /// Run and watch errors are written to `out` and don't stop the loop. Returns the number of
    /// runs performed, including the initial one.
    pub fn run(
        &self,
        watcher: &Watcher,
        quit: &Receiver<()>,
        out: &mut dyn io::Write,
    ) -> io::Result<usize> {
        for job in &self.jobs {
            if let Err(error) = watcher.add(&job.path) {
                warn!(path = %job.path, %error, "failed to watch test file");
                writeln!(out, "watch error: {}", DisplayErrorChain::new(&error))?;
            }
        }

        self.run_jobs(&self.jobs, out)?;
        let mut runs = 1;

        loop {
            crossbeam_channel::select! {
                recv(quit) -> _ => {
                    debug!("watch loop quitting");
                    break;
                }
                recv(watcher.events()) -> event => {
                    let Ok(event) = event else {
                        debug!("watcher closed, leaving watch loop");
                        break;
                    };
                    self.handle_event(watcher, &event, out)?;
                    runs += 1;
                }
                recv(watcher.errors()) -> error => {
                    // A disconnected error channel means the watcher closed, which the events
                    // arm notices.
                    if let Ok(error) = error {
                        warn!(%error, "file watcher error");
                        writeln!(out, "watch error: {}", DisplayErrorChain::new(&error))?;
                    }
                }
            }
        }

        Ok(runs)
    }

    fn handle_event(
        &self,
        watcher: &Watcher,
        event: &WatchEvent,
        out: &mut dyn io::Write,
    ) -> io::Result<()> {
        debug!(file = %event.file, affected = ?event.affected_tests, "change detected");
        for test_file in &event.affected_tests {
            if let Err(error) = watcher.refresh_dependencies(test_file) {
                warn!(%test_file, %error, "failed to refresh dependencies");
            }
        }

        let jobs: Vec<FileJob> = if self.affected_only {
            let affected: BTreeSet<_> = event.affected_tests.iter().collect();
            self.jobs
                .iter()
                .zip(&self.canonical)
                .filter(|(_, canonical)| {
                    canonical
                        .as_ref()
                        .is_some_and(|path| affected.contains(path))
                })
                .map(|(job, _)| job.clone())
                .collect()
        } else {
            self.jobs.clone()
        };

        writeln!(
            out,
            "\nchange detected in {}, running {} file(s)\n",
            event.file,
            jobs.len()
        )?;
        self.run_jobs(&jobs, out)
    }

    fn run_jobs(&self, jobs: &[FileJob], out: &mut dyn io::Write) -> io::Result<()> {
        if let Err(error) = self.executor.run(jobs, out) {
            warn!(%error, "run failed");
            writeln!(out, "error: {}", DisplayErrorChain::new(&error))?;
        }
        Ok(())
    }
}
