// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::UserConfigError;
use camino::Utf8PathBuf;
use etcetera::{BaseStrategy, HomeDirError, base_strategy::Xdg};

/// Returns the path the user config file is read from by default, or `None` if
/// no home directory could be determined.
pub fn user_config_path() -> Result<Option<Utf8PathBuf>, UserConfigError> {
    let strategy = match Xdg::new() {
        Ok(strategy) => strategy,
        Err(HomeDirError) => return Ok(None),
    };

    let config_path = strategy.config_dir().join("runwatch").join("config.toml");
    Utf8PathBuf::try_from(config_path)
        .map(Some)
        .map_err(|error| UserConfigError::NonUtf8Path { error })
}
