// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::loads::{extract_loads, resolve_load};
use crate::errors::WatchError;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Which test files depend, directly or transitively, on which loaded files.
///
/// All paths are canonical.
#[derive(Debug, Default)]
pub(super) struct DependencyGraph {
    test_files: BTreeSet<Utf8PathBuf>,
    // File -> the files it loads directly.
    loads: HashMap<Utf8PathBuf, Vec<Utf8PathBuf>>,
    // Loaded file -> the test files that depend on it.
    dependents: HashMap<Utf8PathBuf, BTreeSet<Utf8PathBuf>>,
}

impl DependencyGraph {
    pub(super) fn contains(&self, test_file: &Utf8Path) -> bool {
        self.test_files.contains(test_file)
    }

    pub(super) fn test_files(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.test_files.iter()
    }

    /// Starts tracking a test file. Returns every path that needs watching: the test file
    /// followed by its transitive loads.
    pub(super) fn add_test_file(
        &mut self,
        test_file: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, WatchError> {
        let source = read(test_file)?;
        self.test_files.insert(test_file.to_owned());

        let mut to_watch = vec![test_file.to_owned()];
        let mut visited = HashSet::from([test_file.to_owned()]);
        self.track(test_file, test_file, &source, &mut visited, &mut to_watch);
        Ok(to_watch)
    }

    fn track(
        &mut self,
        test_file: &Utf8Path,
        file: &Utf8Path,
        source: &str,
        visited: &mut HashSet<Utf8PathBuf>,
        to_watch: &mut Vec<Utf8PathBuf>,
    ) {
        let deps: Vec<_> = extract_loads(source)
            .into_iter()
            .filter_map(|label| resolve_load(file, label))
            .collect();
        self.loads.insert(file.to_owned(), deps.clone());

        for dep in deps {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(test_file.to_owned());
            if !visited.insert(dep.clone()) {
                continue;
            }
            debug!(%test_file, %dep, "tracking dependency");
            to_watch.push(dep.clone());

            match read(&dep) {
                Ok(source) => self.track(test_file, &dep, &source, visited, to_watch),
                Err(error) => warn!(%dep, %error, "failed to read dependency, not following its loads"),
            }
        }
    }

    /// Stops tracking a test file. Returns false if it wasn't tracked.
    pub(super) fn remove_test_file(&mut self, test_file: &Utf8Path) -> bool {
        if !self.test_files.remove(test_file) {
            return false;
        }
        self.drop_dependents(test_file);
        true
    }

    /// Re-reads a test file's loads after it changed, dropping edges it no longer has. Returns
    /// the paths that need watching, or nothing if the file isn't a tracked test file.
    pub(super) fn refresh(&mut self, test_file: &Utf8Path) -> Result<Vec<Utf8PathBuf>, WatchError> {
        if !self.test_files.contains(test_file) {
            return Ok(Vec::new());
        }
        self.drop_dependents(test_file);
        self.add_test_file(test_file)
    }

    /// Removes `test_file` from every dependency's dependents, then forgets the loads of files
    /// that no tracked test file reaches anymore.
    fn drop_dependents(&mut self, test_file: &Utf8Path) {
        self.dependents.retain(|_, dependents| {
            dependents.remove(test_file);
            !dependents.is_empty()
        });
        let (test_files, dependents) = (&self.test_files, &self.dependents);
        self.loads
            .retain(|file, _| test_files.contains(file) || dependents.contains_key(file));
    }

    /// The test files to re-run when `path` changes: the file itself if it's a test file,
    /// plus every test file that loads it. Sorted.
    pub(super) fn affected(&self, path: &Utf8Path) -> Vec<Utf8PathBuf> {
        let mut affected = BTreeSet::new();
        if self.test_files.contains(path) {
            affected.insert(path.to_owned());
        }
        if let Some(dependents) = self.dependents.get(path) {
            affected.extend(dependents.iter().cloned());
        }
        affected.into_iter().collect()
    }

    /// The files a tracked file loads directly.
    #[cfg(test)]
    pub(super) fn direct_loads(&self, file: &Utf8Path) -> &[Utf8PathBuf] {
        self.loads.get(file).map_or(&[], Vec::as_slice)
    }
}

fn read(path: &Utf8Path) -> Result<String, WatchError> {
    std::fs::read_to_string(path).map_err(|error| WatchError::Read {
        path: path.to_owned(),
        error,
    })
}
