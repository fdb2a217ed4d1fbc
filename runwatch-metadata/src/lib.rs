// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Wire formats consumed by [runwatch](https://crates.io/crates/runwatch-core).
//!
//! This crate describes the JSON shapes that arrive from the outside world:
//!
//! * snapshot fetches, which return arrays of [`WireRunRecord`];
//! * real-time events, which arrive as [`RunEvent`] values carrying a
//!   [`RunPatch`] of changed fields.
//!
//! Field omission in a patch means "unchanged". An explicit `null` means
//! "clear". The distinction is preserved by [`Patch`].

mod exit_codes;
mod ids;
mod patch;
mod wire;

pub use exit_codes::*;
pub use ids::*;
pub use patch::*;
pub use wire::*;
