// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for startest, a test framework for Starlark.
//!
//! The basic flow is:
//!
//! 1. [`discovery`] turns command-line arguments into a list of test files.
//! 2. A [`runner::TestRunner`] executes each file through an embedder-supplied
//!    [`engine::Engine`], resolving [`fixtures`] and collecting a [`results::FileResult`].
//! 3. An [`executor::Executor`] spreads files over worker threads and hands results to a
//!    [`reporter::Reporter`].
//!
//! Watch mode ([`watcher`] and [`executor::WatchLoop`]) re-runs the files affected by a change.

pub mod assertions;
pub mod config;
pub mod coverage;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod fixtures;
mod indenter;
pub mod mock;
pub mod reporter;
pub mod results;
pub mod runner;
pub mod snapshot;
pub mod test_filter;
#[cfg(test)]
mod test_helpers;
mod time;
pub mod watcher;
