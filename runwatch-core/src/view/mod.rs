// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped views over the run registry.
//!
//! Each visible list (all runs, one project, one test) is backed by a
//! [`ScopedViewReconciler`], which combines snapshot loads with the
//! registry's contents.

mod reconciler;
mod scope;

pub use reconciler::*;
pub use scope::*;
