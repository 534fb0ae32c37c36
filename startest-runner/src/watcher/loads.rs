// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::sync::LazyLock;

// Only top-level `load` statements count. The first argument is the module label.
static LOAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^load\s*\(\s*(?:"([^"]*)"|'([^']*)')"#).expect("load regex is valid")
});

/// Returns the module labels of every top-level `load` in `source`, in order.
pub(super) fn extract_loads(source: &str) -> Vec<&str> {
    LOAD_RE
        .captures_iter(source)
        .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|label| label.as_str())
        .collect()
}

/// Resolves a load label relative to the file that loads it.
///
/// Repository labels (`//pkg:file.star`, `@repo//...`) are not tracked. Returns `None` if the
/// target does not exist.
pub(super) fn resolve_load(from_file: &Utf8Path, label: &str) -> Option<Utf8PathBuf> {
    if label.is_empty() || label.starts_with("//") || label.starts_with('@') {
        return None;
    }
    let dir = from_file.parent().unwrap_or(Utf8Path::new("."));
    let target = dir.join(label);
    if !target.is_file() {
        return None;
    }
    target.canonicalize_utf8().ok()
}
