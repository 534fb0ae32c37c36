// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot assertions.
//!
//! A snapshot is the deterministic serialization of a value, stored next to the test file under
//! `__snapshots__/<file stem>/<test>__<name>.snap`. The first comparison writes the file;
//! subsequent comparisons fail with a diff unless update mode is on.

use crate::{
    engine::Value,
    errors::{SnapshotError, SnapshotMismatch},
};
use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use similar::TextDiff;
use std::{cmp::Ordering, fs, io, sync::Arc};
use swrite::{SWrite, swrite};
use tracing::debug;

/// The directory snapshots are stored in, relative to the test file.
pub const SNAPSHOT_DIR: &str = "__snapshots__";

/// The result of a successful snapshot comparison.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SnapshotOutcome {
    /// The stored snapshot matched.
    Matched,

    /// No snapshot existed, so one was written.
    Created,

    /// The stored snapshot differed and was overwritten in update mode.
    Updated,
}

/// Compares values against stored snapshots, and records what changed over a run.
///
/// One manager is shared by every file in a run. Tests compare through a [`SnapshotContext`]
/// bound to their own file and name, so files running in parallel never see each other's
/// context.
#[derive(Debug)]
pub struct SnapshotManager {
    update_mode: bool,
    records: Mutex<SnapshotRecords>,
}

#[derive(Debug, Default)]
struct SnapshotRecords {
    updates: Vec<String>,
    mismatches: Vec<SnapshotMismatch>,
}

impl SnapshotManager {
    /// Creates a new manager. In update mode, mismatching snapshots are overwritten.
    pub fn new(update_mode: bool) -> Self {
        Self {
            update_mode,
            records: Mutex::new(SnapshotRecords::default()),
        }
    }

    /// Returns true if mismatching snapshots are overwritten.
    pub fn update_mode(&self) -> bool {
        self.update_mode
    }

    /// Returns a context for comparing snapshots from one test.
    pub fn for_test(
        self: &Arc<Self>,
        test_file: impl Into<Utf8PathBuf>,
        test_name: impl Into<String>,
    ) -> SnapshotContext {
        SnapshotContext {
            manager: self.clone(),
            test_file: test_file.into(),
            test_name: test_name.into(),
        }
    }

    /// Compares `value` against the snapshot `name` of the given test.
    pub fn compare(
        &self,
        test_file: &Utf8Path,
        test_name: &str,
        value: &Value,
        name: &str,
    ) -> Result<SnapshotOutcome, SnapshotError> {
        let serialized = serialize_value(value);
        let path = snapshot_path(test_file, test_name, name);

        let existing = match fs::read_to_string(&path) {
            Ok(existing) => existing,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                write_snapshot(&path, &serialized).map_err(|error| SnapshotError::Write {
                    name: name.to_owned(),
                    path: path.clone(),
                    error,
                })?;
                debug!(%path, "created snapshot");
                self.records.lock().updates.push(name.to_owned());
                return Ok(SnapshotOutcome::Created);
            }
            Err(error) => {
                return Err(SnapshotError::Read {
                    name: name.to_owned(),
                    path,
                    error,
                });
            }
        };

        if existing == serialized {
            return Ok(SnapshotOutcome::Matched);
        }

        if self.update_mode {
            write_snapshot(&path, &serialized).map_err(|error| SnapshotError::Write {
                name: name.to_owned(),
                path: path.clone(),
                error,
            })?;
            debug!(%path, "updated snapshot");
            self.records.lock().updates.push(name.to_owned());
            return Ok(SnapshotOutcome::Updated);
        }

        let mismatch = SnapshotMismatch {
            name: name.to_owned(),
            diff: unified_diff(&existing, &serialized),
            expected: existing,
            actual: serialized,
        };
        self.records.lock().mismatches.push(mismatch.clone());
        Err(SnapshotError::Mismatch(mismatch))
    }

    /// Names of the snapshots created or updated so far.
    pub fn updates(&self) -> Vec<String> {
        self.records.lock().updates.clone()
    }

    /// Mismatches recorded so far.
    pub fn mismatches(&self) -> Vec<SnapshotMismatch> {
        self.records.lock().mismatches.clone()
    }
}

/// Snapshot comparisons for a single test.
#[derive(Clone, Debug)]
pub struct SnapshotContext {
    manager: Arc<SnapshotManager>,
    test_file: Utf8PathBuf,
    test_name: String,
}

impl SnapshotContext {
    /// Compares `value` against the snapshot called `name`.
    pub fn compare(&self, value: &Value, name: &str) -> Result<SnapshotOutcome, SnapshotError> {
        self.manager
            .compare(&self.test_file, &self.test_name, value, name)
    }

    /// The path the snapshot called `name` is stored at.
    pub fn path_for(&self, name: &str) -> Utf8PathBuf {
        snapshot_path(&self.test_file, &self.test_name, name)
    }
}

/// Returns the path of a snapshot: `<dir>/__snapshots__/<stem>/<test>__<name>.snap`.
pub fn snapshot_path(test_file: &Utf8Path, test_name: &str, name: &str) -> Utf8PathBuf {
    let dir = test_file.parent().unwrap_or(Utf8Path::new(""));
    let stem = test_file.file_stem().unwrap_or_default();
    dir.join(SNAPSHOT_DIR).join(stem).join(format!(
        "{}__{}.snap",
        sanitize(test_name),
        sanitize(name)
    ))
}

/// Replaces characters that are invalid in file names on common platforms.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

fn write_snapshot(path: &Utf8Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

fn unified_diff(expected: &str, actual: &str) -> String {
    TextDiff::from_lines(expected, actual)
        .unified_diff()
        .context_radius(3)
        .header("Expected", "Actual")
        .to_string()
}

/// Serializes a value into the deterministic text form stored in snapshot files.
///
/// Containers are written one element per line with two-space indentation and trailing commas.
/// Dict keys and set items are sorted, and struct fields are sorted by name, so the output
/// doesn't depend on insertion order.
pub fn serialize_value(value: &Value) -> String {
    let mut out = String::new();
    serialize_into(&mut out, value, 0);
    out
}

fn serialize_into(out: &mut String, value: &Value, indent: usize) {
    match value {
        Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) => {
            swrite!(out, "{value}");
        }
        Value::String(s) => swrite!(out, "{s:?}"),
        Value::Bytes(b) => swrite!(out, "b\"{}\"", b.escape_ascii()),
        Value::List(items) if items.is_empty() => out.push_str("[]"),
        Value::List(items) => write_block(out, "[", "]", indent, items, |out, item| {
            serialize_into(out, item, indent + 1)
        }),
        Value::Tuple(items) if items.is_empty() => out.push_str("()"),
        Value::Tuple(items) if items.len() == 1 => {
            out.push('(');
            serialize_into(out, &items[0], indent);
            out.push_str(",)");
        }
        Value::Tuple(items) => write_block(out, "(", ")", indent, items, |out, item| {
            serialize_into(out, item, indent + 1)
        }),
        Value::Dict(pairs) if pairs.is_empty() => out.push_str("{}"),
        Value::Dict(pairs) => {
            let mut pairs: Vec<_> = pairs.iter().collect();
            pairs.sort_by(|(a, _), (b, _)| canonical_order(a, b));
            write_block(out, "{", "}", indent, &pairs, |out, (k, v)| {
                serialize_into(out, k, indent + 1);
                out.push_str(": ");
                serialize_into(out, v, indent + 1);
            });
        }
        Value::Set(items) if items.is_empty() => out.push_str("set()"),
        Value::Set(items) => {
            let mut items: Vec<_> = items.iter().collect();
            items.sort_by(|a, b| canonical_order(a, b));
            write_block(out, "set([", "])", indent, &items, |out, item| {
                serialize_into(out, item, indent + 1)
            });
        }
        Value::Struct(fields) if fields.is_empty() => out.push_str("struct()"),
        Value::Struct(fields) => {
            let fields: Vec<_> = fields.iter().collect();
            write_block(out, "struct(", ")", indent, &fields, |out, (k, v)| {
                swrite!(out, "{k} = ");
                serialize_into(out, v, indent + 1);
            });
        }
        Value::Module(_) | Value::Callable(_) => {
            swrite!(out, "<{}: {value}>", value.type_name());
        }
    }
}

fn write_block<T>(
    out: &mut String,
    open: &str,
    close: &str,
    indent: usize,
    items: &[T],
    mut write_item: impl FnMut(&mut String, &T),
) {
    let pad = "  ".repeat(indent);
    out.push_str(open);
    out.push('\n');
    for item in items {
        swrite!(out, "{pad}  ");
        write_item(out, item);
        out.push_str(",\n");
    }
    out.push_str(&pad);
    out.push_str(close);
}

/// Orders values by type name, then by value. Values that can't be compared directly fall back
/// to their serialized form.
fn canonical_order(a: &Value, b: &Value) -> Ordering {
    a.type_name().cmp(b.type_name()).then_with(|| {
        a.compare(b)
            .unwrap_or_else(|| serialize_value(a).cmp(&serialize_value(b)))
    })
}
