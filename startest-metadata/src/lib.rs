// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Documented exit codes and machine-readable run summaries for startest.
//!
//! The JSON reporter writes a [`RunSummary`]; tooling that consumes that output can deserialize it
//! with the types in this crate.

mod exit_codes;
mod summary;

pub use exit_codes::*;
pub use summary::*;
