// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for indenting multi-line displays.
//!
//! This module is adapted from [indenter](https://github.com/eyre-rs/indenter) and is used under the
//! terms of the MIT or Apache-2.0 licenses.

use std::fmt;

/// Wraps a `fmt::Write` so that every line written through it is indented.
pub(crate) struct Indented<'a, D: ?Sized> {
    inner: &'a mut D,
    indentation: &'static str,
    needs_indent: bool,
}

/// Indents everything written through the returned writer by four spaces.
pub(crate) fn indented<D: ?Sized>(f: &mut D) -> Indented<'_, D> {
    Indented {
        inner: f,
        indentation: "    ",
        needs_indent: true,
    }
}

impl<D: ?Sized> Indented<'_, D> {
    /// Uses the given string as indentation.
    pub(crate) fn with_str(mut self, indentation: &'static str) -> Self {
        self.indentation = indentation;
        self
    }

    /// Doesn't indent the first line.
    pub(crate) fn skip_initial(mut self) -> Self {
        self.needs_indent = false;
        self
    }
}

impl<D: fmt::Write + ?Sized> fmt::Write for Indented<'_, D> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for (idx, line) in s.split('\n').enumerate() {
            if idx > 0 {
                self.inner.write_char('\n')?;
                self.needs_indent = true;
            }
            // Blank lines stay blank.
            if self.needs_indent && !line.is_empty() {
                self.inner.write_str(self.indentation)?;
                self.needs_indent = false;
            }
            self.inner.write_str(line)?;
        }

        Ok(())
    }
}

/// Indents each line of `text`, for line-oriented output.
pub(crate) fn indent_lines(text: &str, indentation: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (idx, line) in text.lines().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        if !line.is_empty() {
            out.push_str(indentation);
        }
        out.push_str(line);
    }
    out
}
