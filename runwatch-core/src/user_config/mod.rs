// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-specific configuration for runwatch.
//!
//! ## Config file location
//!
//! The user config file is read from `$XDG_CONFIG_HOME/runwatch/config.toml`,
//! or `~/.config/runwatch/config.toml` if `XDG_CONFIG_HOME` is unset.
//!
//! ## Configuration hierarchy
//!
//! Settings are resolved in the following order (highest priority first):
//!
//! 1. CLI arguments (e.g. `--show-each-change`)
//! 2. Environment variables (e.g. `RUNWATCH_SHOW_EACH_CHANGE`)
//! 3. The user config file
//! 4. Built-in defaults

mod discovery;
mod imp;

pub use discovery::*;
pub use imp::*;
