// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `runwatch` command-line tool.
//!
//! `runwatch replay` loads run snapshots for one or more scopes, applies a
//! captured event log through the run registry and prints the resulting
//! views. `runwatch validate` checks an event log without replaying it.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{Color, OutputContext, OutputWriter, StderrStyles};
