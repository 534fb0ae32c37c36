// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::WatchError;
use camino::{Utf8Path, Utf8PathBuf};
use crossbeam_channel::Sender;
use notify::{
    EventKind, RecommendedWatcher, RecursiveMode, Watcher as _,
    event::ModifyKind,
};
use tracing::trace;

/// A source of filesystem change notifications for individual files.
///
/// Implementations report changes through the [`ChangeSender`] they were created with.
pub trait WatchBackend: Send {
    /// Starts watching a file.
    fn watch(&mut self, path: &Utf8Path) -> Result<(), WatchError>;

    /// Stops watching a file.
    fn unwatch(&mut self, path: &Utf8Path) -> Result<(), WatchError>;
}

#[derive(Debug)]
pub(super) enum RawEvent {
    Changed(Utf8PathBuf),
    Error(WatchError),
    Stop,
}

/// Reports changes to a [`Watcher`](super::Watcher).
#[derive(Clone, Debug)]
pub struct ChangeSender {
    tx: Sender<RawEvent>,
}

impl ChangeSender {
    pub(super) fn new(tx: Sender<RawEvent>) -> Self {
        Self { tx }
    }

    /// Reports that `path` was created or written to.
    pub fn changed(&self, path: impl Into<Utf8PathBuf>) {
        // The watcher has shut down if this fails.
        _ = self.tx.send(RawEvent::Changed(path.into()));
    }

    /// Reports a backend error.
    pub fn error(&self, error: WatchError) {
        _ = self.tx.send(RawEvent::Error(error));
    }
}

/// The platform's native backend, via `notify`.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl NotifyBackend {
    /// Creates a backend that forwards create and write events to `sender`.
    pub fn new(sender: ChangeSender) -> Result<Self, WatchError> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(error) => return sender.error(error.into()),
            };
            if !is_change(&event.kind) {
                trace!(?event, "ignoring event");
                return;
            }
            for path in event.paths {
                match Utf8PathBuf::from_path_buf(path) {
                    Ok(path) => sender.changed(path),
                    Err(path) => sender.error(WatchError::NonUtf8Path { path }),
                }
            }
        })?;
        Ok(Self { watcher })
    }
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend").finish_non_exhaustive()
    }
}

fn is_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(modify) => !matches!(modify, ModifyKind::Metadata(_)),
        _ => false,
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
        self.watcher
            .watch(path.as_std_path(), RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn unwatch(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
        self.watcher.unwatch(path.as_std_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use test_case::test_case;

    #[test_case(EventKind::Create(CreateKind::File), true; "create")]
    #[test_case(EventKind::Modify(ModifyKind::Data(DataChange::Content)), true; "write")]
    #[test_case(EventKind::Modify(ModifyKind::Any), true; "modify any")]
    #[test_case(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), false; "chmod")]
    #[test_case(EventKind::Remove(RemoveKind::File), false; "remove")]
    #[test_case(EventKind::Access(AccessKind::Any), false; "access")]
    fn change_kinds(kind: EventKind, expected: bool) {
        assert_eq!(is_change(&kind), expected);
    }
}
