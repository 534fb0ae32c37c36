// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The boundary between startest and a Starlark interpreter.
//!
//! startest does not parse or evaluate Starlark itself. Embedders implement [`Engine`] (and
//! [`Callable`] for the interpreter's function values), and the runner drives everything else:
//! which files to execute, which functions to call with which arguments, and what to do with
//! the results.
//!
//! Values cross the boundary as [`Value`]. Builtins provided by startest (the `assert` module,
//! the `mock` fixture) are [`NativeFunction`]s that the engine calls like any other function.

mod context;
mod value;

pub use context::*;
pub use value::*;

use crate::errors::EngineError;
use camino::Utf8Path;

/// A Starlark interpreter.
pub trait Engine: Send + Sync {
    /// Parses and executes `source` with the given predeclared names in scope, returning the
    /// file's top-level bindings in declaration order.
    ///
    /// `path` is used for `load` resolution and error locations. Execution must observe
    /// `cx.cancellation()` and fail with a cancellation error once it is cancelled.
    fn exec_file(
        &self,
        path: &Utf8Path,
        source: &str,
        predeclared: &Namespace,
        cx: &ExecContext,
    ) -> Result<Namespace, EngineError>;
}
