// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Watching test files and the files they load.
//!
//! A [`Watcher`] tracks a set of test files together with every file they transitively `load`.
//! When any tracked file is created or written to, it emits a [`WatchEvent`] naming the test
//! files that need to run again. Notifications come from a [`WatchBackend`]: [`NotifyBackend`]
//! by default, or any other implementation fed through a [`ChangeSender`].

mod backend;
mod graph;
mod loads;

pub use backend::*;

use crate::errors::WatchError;
use backend::RawEvent;
use camino::{Utf8Path, Utf8PathBuf};
use crossbeam_channel::{Receiver, Sender};
use graph::DependencyGraph;
use parking_lot::Mutex;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{debug, warn};

/// A change to a tracked file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchEvent {
    /// The file that changed.
    pub file: Utf8PathBuf,

    /// The test files to re-run, sorted. Never empty.
    pub affected_tests: Vec<Utf8PathBuf>,
}

struct Inner {
    graph: DependencyGraph,
    backend: Box<dyn WatchBackend>,
}

/// Tracks test files and their transitive loads, and reports which tests a change affects.
pub struct Watcher {
    inner: Arc<Mutex<Inner>>,
    stop: Sender<RawEvent>,
    events: Receiver<WatchEvent>,
    errors: Receiver<WatchError>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Creates a watcher backed by the platform's native notifications.
    pub fn new() -> Result<Self, WatchError> {
        Self::with_backend(NotifyBackend::new)
    }

    /// Creates a watcher with a custom backend. `make_backend` receives the sender the backend
    /// should report changes through.
    pub fn with_backend<B, F>(make_backend: F) -> Result<Self, WatchError>
    where
        B: WatchBackend + 'static,
        F: FnOnce(ChangeSender) -> Result<B, WatchError>,
    {
        let (raw_tx, raw_rx) = crossbeam_channel::unbounded();
        let backend = make_backend(ChangeSender::new(raw_tx.clone()))?;
        let inner = Arc::new(Mutex::new(Inner {
            graph: DependencyGraph::default(),
            backend: Box::new(backend),
        }));

        let (event_tx, events) = crossbeam_channel::unbounded();
        let (error_tx, errors) = crossbeam_channel::unbounded();
        let dispatcher = {
            let inner = inner.clone();
            thread::Builder::new()
                .name("startest-watcher".to_owned())
                .spawn(move || dispatch(&inner, &raw_rx, &event_tx, &error_tx))
                .map_err(WatchError::Spawn)?
        };

        Ok(Self {
            inner,
            stop: raw_tx,
            events,
            errors,
            dispatcher: Some(dispatcher),
        })
    }

    /// Starts tracking a test file and everything it loads. Adding a tracked file again does
    /// nothing.
    pub fn add(&self, test_file: &Utf8Path) -> Result<(), WatchError> {
        let test_file = canonicalize(test_file)?;
        let mut inner = self.inner.lock();
        if inner.graph.contains(&test_file) {
            return Ok(());
        }
        let to_watch = inner.graph.add_test_file(&test_file)?;
        debug!(%test_file, deps = to_watch.len() - 1, "watching test file");
        inner.watch_all(&to_watch)
    }

    /// Stops tracking a test file.
    pub fn remove(&self, test_file: &Utf8Path) -> Result<(), WatchError> {
        let test_file = canonicalize(test_file).unwrap_or_else(|_| test_file.to_owned());
        let mut inner = self.inner.lock();
        if inner.graph.remove_test_file(&test_file) {
            inner.backend.unwatch(&test_file)?;
        }
        Ok(())
    }

    /// Re-reads a tracked test file's loads after it changed. Untracked files are ignored.
    pub fn refresh_dependencies(&self, test_file: &Utf8Path) -> Result<(), WatchError> {
        let test_file = canonicalize(test_file)?;
        let mut inner = self.inner.lock();
        let to_watch = inner.graph.refresh(&test_file)?;
        inner.watch_all(&to_watch)
    }

    /// The tracked test files, sorted.
    pub fn watched_files(&self) -> Vec<Utf8PathBuf> {
        self.inner.lock().graph.test_files().cloned().collect()
    }

    /// The test files to re-run if `path` changes, sorted.
    pub fn affected_test_files(&self, path: &Utf8Path) -> Vec<Utf8PathBuf> {
        let path = canonicalize(path).unwrap_or_else(|_| path.to_owned());
        self.inner.lock().graph.affected(&path)
    }

    /// Changes to tracked files.
    pub fn events(&self) -> &Receiver<WatchEvent> {
        &self.events
    }

    /// Errors from the backend.
    pub fn errors(&self) -> &Receiver<WatchError> {
        &self.errors
    }

    /// Stops the watcher. After this, [`Self::events`] and [`Self::errors`] disconnect once
    /// drained. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            _ = self.stop.send(RawEvent::Stop);
            if dispatcher.join().is_err() {
                warn!("watcher thread panicked");
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("watched_files", &self.watched_files())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn watch_all(&mut self, paths: &[Utf8PathBuf]) -> Result<(), WatchError> {
        let Some((test_file, deps)) = paths.split_first() else {
            return Ok(());
        };
        self.backend.watch(test_file)?;
        for dep in deps {
            if let Err(error) = self.backend.watch(dep) {
                warn!(%dep, %error, "failed to watch dependency");
            }
        }
        Ok(())
    }
}

fn dispatch(
    inner: &Mutex<Inner>,
    raw: &Receiver<RawEvent>,
    events: &Sender<WatchEvent>,
    errors: &Sender<WatchError>,
) {
    for event in raw {
        match event {
            RawEvent::Changed(path) => {
                let file = canonicalize(&path).unwrap_or(path);
                let affected_tests = inner.lock().graph.affected(&file);
                if affected_tests.is_empty() {
                    continue;
                }
                debug!(%file, affected = affected_tests.len(), "tracked file changed");
                if events.send(WatchEvent { file, affected_tests }).is_err() {
                    break;
                }
            }
            RawEvent::Error(error) => {
                if errors.send(error).is_err() {
                    break;
                }
            }
            RawEvent::Stop => break,
        }
    }
}

fn canonicalize(path: &Utf8Path) -> Result<Utf8PathBuf, WatchError> {
    path.canonicalize_utf8().map_err(|error| WatchError::Resolve {
        path: path.to_owned(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use std::{collections::BTreeSet, time::Duration};

    #[derive(Clone, Default)]
    struct RecordingBackend {
        watched: Arc<Mutex<BTreeSet<Utf8PathBuf>>>,
    }

    impl WatchBackend for RecordingBackend {
        fn watch(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
            self.watched.lock().insert(path.to_owned());
            Ok(())
        }

        fn unwatch(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
            self.watched.lock().remove(path);
            Ok(())
        }
    }

    struct Fixture {
        dir: Utf8TempDir,
        watcher: Watcher,
        sender: ChangeSender,
        backend: RecordingBackend,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = Utf8TempDir::new().unwrap();
            for (name, contents) in files {
                std::fs::write(dir.path().join(name), contents).unwrap();
            }
            let backend = RecordingBackend::default();
            let mut sender = None;
            let watcher = Watcher::with_backend(|tx| {
                sender = Some(tx);
                Ok(backend.clone())
            })
            .unwrap();
            Self {
                dir,
                watcher,
                sender: sender.unwrap(),
                backend,
            }
        }

        fn path(&self, name: &str) -> Utf8PathBuf {
            self.dir.path().join(name).canonicalize_utf8().unwrap()
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn change_to_dependency_emits_affected_tests() {
        let fixture = Fixture::new(&[
            ("a_test.star", "load(\"lib.star\", \"x\")\n"),
            ("b_test.star", "load(\"lib.star\", \"x\")\n"),
            ("lib.star", ""),
        ]);
        fixture.watcher.add(&fixture.path("a_test.star")).unwrap();
        fixture.watcher.add(&fixture.path("b_test.star")).unwrap();
        // Adding twice is a no-op.
        fixture.watcher.add(&fixture.path("a_test.star")).unwrap();

        assert_eq!(
            fixture.watcher.watched_files(),
            vec![fixture.path("a_test.star"), fixture.path("b_test.star")]
        );
        assert_eq!(fixture.backend.watched.lock().len(), 3);

        // Unrelated files produce no event.
        std::fs::write(fixture.dir.path().join("other.star"), "").unwrap();
        fixture.sender.changed(fixture.path("other.star"));
        fixture.sender.changed(fixture.path("lib.star"));

        let event = fixture.watcher.events().recv_timeout(TIMEOUT).unwrap();
        assert_eq!(
            event,
            WatchEvent {
                file: fixture.path("lib.star"),
                affected_tests: vec![fixture.path("a_test.star"), fixture.path("b_test.star")],
            }
        );
        assert!(fixture.watcher.events().is_empty());
    }

    #[test]
    fn remove_and_refresh() {
        let fixture = Fixture::new(&[
            ("a_test.star", "load(\"old.star\", \"x\")\n"),
            ("old.star", ""),
            ("new.star", ""),
        ]);
        let test_file = fixture.path("a_test.star");
        fixture.watcher.add(&test_file).unwrap();

        std::fs::write(&test_file, "load(\"new.star\", \"x\")\n").unwrap();
        fixture.watcher.refresh_dependencies(&test_file).unwrap();
        assert!(
            fixture
                .watcher
                .affected_test_files(&fixture.path("old.star"))
                .is_empty()
        );
        assert_eq!(
            fixture
                .watcher
                .affected_test_files(&fixture.path("new.star")),
            vec![test_file.clone()]
        );
        assert!(fixture.backend.watched.lock().contains(&fixture.path("new.star")));

        fixture.watcher.remove(&test_file).unwrap();
        assert!(fixture.watcher.watched_files().is_empty());
        assert!(!fixture.backend.watched.lock().contains(&test_file));
        assert!(fixture.watcher.affected_test_files(&test_file).is_empty());
    }

    #[test]
    fn errors_are_forwarded_and_close_disconnects() {
        let mut fixture = Fixture::new(&[]);
        fixture.sender.error(WatchError::NonUtf8Path {
            path: "bad".into(),
        });
        let error = fixture.watcher.errors().recv_timeout(TIMEOUT).unwrap();
        assert!(matches!(error, WatchError::NonUtf8Path { .. }), "{error:?}");

        fixture.watcher.close();
        fixture.watcher.close();
        assert!(fixture.watcher.events().recv_timeout(TIMEOUT).is_err());
    }

    #[test]
    fn add_missing_file_fails() {
        let fixture = Fixture::new(&[]);
        let error = fixture
            .watcher
            .add(&fixture.dir.path().join("missing_test.star"))
            .unwrap_err();
        assert!(matches!(error, WatchError::Resolve { .. }), "{error:?}");
    }
}
