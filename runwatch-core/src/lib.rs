// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for runwatch: keeping scoped lists of test runs
//! consistent while snapshots load and real-time events stream in.
//!
//! The basic flow is:
//!
//! 1. A [`SnapshotLoader`](loader::SnapshotLoader) fetches runs for a
//!    [`RunScope`](view::RunScope) and seeds a mounted view.
//! 2. The [`RunHub`](hub::RunHub) owns the process-wide
//!    [`RunRegistry`](registry::RunRegistry), the only component that applies
//!    raw [`RunEvent`](runwatch_metadata::RunEvent)s.
//! 3. Each [`MountedView`](hub::MountedView) observes registry changes and
//!    recomputes its visible list through a
//!    [`ScopedViewReconciler`](view::ScopedViewReconciler).
//! 4. The [`filter`] module narrows a view's output for rendering.

pub mod errors;
pub mod event_log;
pub mod filter;
pub mod hub;
pub mod loader;
pub mod record;
pub mod registry;
pub mod reporter;
#[cfg(test)]
mod test_helpers;
pub mod user_config;
pub mod view;
