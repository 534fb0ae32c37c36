// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`], which runs every test in one file. The
//! [`executor`](crate::executor) module drives it across many files.

mod imp;
mod meta;
mod timer;

pub use imp::*;
pub use meta::*;
