// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod files;
mod fixtures;
mod reconcile;
