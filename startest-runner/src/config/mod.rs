// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for startest.
//!
//! Configuration lives in a `startest.toml` file with a `[test]` table. The defaults are embedded
//! in the crate and overlaid by the user's file, so a config file only needs the keys it changes.

mod imp;
mod test_threads;

pub use imp::*;
pub use test_threads::*;
