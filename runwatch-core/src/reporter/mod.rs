// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering views for people and machines.

mod display;

pub use display::*;
