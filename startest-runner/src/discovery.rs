// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finding test files on disk.
//!
//! Arguments may be files, directories or glob patterns. A file argument may also name a single
//! test with `path::test_name`.

use crate::errors::DiscoveryError;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use indexmap::IndexSet;
use std::collections::BTreeMap;
use tracing::debug;
use walkdir::WalkDir;

/// The default file name patterns for test files.
pub const DEFAULT_TEST_PATTERNS: &[&str] = &["*_test.star", "test_*.star"];

/// The separator between a file and a test name in a selector.
pub const TEST_SELECTOR_SEPARATOR: &str = "::";

/// Finds test files from path arguments.
#[derive(Clone, Debug)]
pub struct TestDiscovery {
    patterns: GlobSet,
    recursive: bool,
}

impl TestDiscovery {
    /// Creates a discovery with the default patterns, walking directories recursively.
    pub fn new() -> Self {
        Self::with_patterns(DEFAULT_TEST_PATTERNS)
            .expect("default test patterns are valid globs")
    }

    /// Creates a discovery matching file names against the given patterns.
    pub fn with_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, DiscoveryError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|error| DiscoveryError::InvalidGlob {
                pattern: pattern.to_owned(),
                error,
            })?;
            builder.add(glob);
        }
        let patterns = builder
            .build()
            .map_err(|error| DiscoveryError::InvalidGlob {
                pattern: "<pattern set>".to_owned(),
                error,
            })?;

        Ok(Self {
            patterns,
            recursive: true,
        })
    }

    /// Sets whether directories are walked recursively.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Returns true if the file name of `path` matches a test pattern.
    pub fn is_test_file(&self, path: &Utf8Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.patterns.is_match(name))
    }

    /// Expands path arguments into test files.
    ///
    /// Files are deduplicated and sorted. Fails with [`DiscoveryError::NoFilesFound`] if nothing
    /// matched.
    pub fn discover<S: AsRef<str>>(&self, args: &[S]) -> Result<DiscoveredFiles, DiscoveryError> {
        let mut files = IndexSet::new();
        let mut test_names: BTreeMap<Utf8PathBuf, Vec<String>> = BTreeMap::new();

        for arg in args {
            let arg = arg.as_ref();
            let (path, test_name) = parse_selector(arg);
            if let Some(test_name) = test_name {
                test_names
                    .entry(Utf8PathBuf::from(path))
                    .or_default()
                    .push(test_name.to_owned());
            }

            if is_glob(path) {
                self.expand_glob(path, &mut files)?;
            } else if Utf8Path::new(path).is_dir() {
                self.walk_dir(Utf8Path::new(path), &mut files)?;
            } else {
                // Missing files are kept so that reading them reports a proper error.
                files.insert(Utf8PathBuf::from(path));
            }
        }

        if files.is_empty() {
            return Err(DiscoveryError::NoFilesFound {
                paths: args.iter().map(|arg| arg.as_ref().to_owned()).collect(),
            });
        }

        let mut files: Vec<_> = files.into_iter().collect();
        files.sort();
        debug!(count = files.len(), "discovered test files");

        Ok(DiscoveredFiles { files, test_names })
    }

    fn walk_dir(
        &self,
        dir: &Utf8Path,
        files: &mut IndexSet<Utf8PathBuf>,
    ) -> Result<(), DiscoveryError> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(dir)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));

        for entry in walker {
            let entry = entry.map_err(|error| DiscoveryError::Walk {
                path: dir.to_owned(),
                error,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = utf8_path(entry.into_path())?;
            if self.is_test_file(&path) {
                files.insert(path);
            }
        }

        Ok(())
    }

    fn expand_glob(
        &self,
        pattern: &str,
        files: &mut IndexSet<Utf8PathBuf>,
    ) -> Result<(), DiscoveryError> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|error| DiscoveryError::InvalidGlob {
                pattern: pattern.to_owned(),
                error,
            })?
            .compile_matcher();

        let base = glob_base(pattern);
        let max_depth = glob_max_depth(pattern, base.as_deref());
        let (walk_root, strip_dot) = match base {
            Some(base) => (base, false),
            None => (Utf8PathBuf::from("."), true),
        };
        if !walk_root.is_dir() {
            return Ok(());
        }

        let walker = WalkDir::new(&walk_root)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));
        for entry in walker {
            let entry = entry.map_err(|error| DiscoveryError::Walk {
                path: walk_root.clone(),
                error,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = utf8_path(entry.into_path())?;
            let path = if strip_dot {
                path.strip_prefix(".")
                    .map(Utf8Path::to_owned)
                    .unwrap_or(path)
            } else {
                path
            };
            if matcher.is_match(path.as_std_path()) {
                files.insert(path);
            }
        }

        Ok(())
    }
}

impl Default for TestDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Test files found by [`TestDiscovery::discover`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiscoveredFiles {
    files: Vec<Utf8PathBuf>,
    test_names: BTreeMap<Utf8PathBuf, Vec<String>>,
}

impl DiscoveredFiles {
    /// The files, sorted.
    pub fn files(&self) -> &[Utf8PathBuf] {
        &self.files
    }

    /// Tests selected in `file` with `file::test` arguments. Empty means every test.
    pub fn test_names(&self, file: &Utf8Path) -> &[String] {
        self.test_names.get(file).map_or(&[], Vec::as_slice)
    }
}

/// Returns true if `name` is a test function name for the given prefix.
pub fn is_test_function(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix)
}

/// Splits `path::test_name` into its parts.
pub fn parse_selector(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once(TEST_SELECTOR_SEPARATOR) {
        Some((path, test)) if !test.is_empty() => (path, Some(test)),
        Some((path, _)) => (path, None),
        None => (arg, None),
    }
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// The longest leading directory of a glob pattern that contains no metacharacters.
fn glob_base(pattern: &str) -> Option<Utf8PathBuf> {
    let mut base = Utf8PathBuf::new();
    let components: Vec<_> = Utf8Path::new(pattern).components().collect();
    // The last component names files, so it is never part of the base.
    for component in components.iter().take(components.len().saturating_sub(1)) {
        if is_glob(component.as_str()) {
            break;
        }
        base.push(component);
    }
    (!base.as_str().is_empty()).then_some(base)
}

/// How deep below its base a glob can match. Without `**`, each component matches exactly one
/// path segment.
fn glob_max_depth(pattern: &str, base: Option<&Utf8Path>) -> usize {
    if pattern.contains("**") {
        return usize::MAX;
    }
    let pattern_depth = Utf8Path::new(pattern).components().count();
    let base_depth = base.map_or(0, |base| base.components().count());
    pattern_depth.saturating_sub(base_depth).max(1)
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.') || name == crate::snapshot::SNAPSHOT_DIR)
}

fn utf8_path(path: std::path::PathBuf) -> Result<Utf8PathBuf, DiscoveryError> {
    Utf8PathBuf::try_from(path).map_err(|error| DiscoveryError::NonUtf8Path {
        path: error.into_path_buf(),
    })
}
