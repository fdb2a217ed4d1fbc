// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::discovery::user_config_path;
use crate::{errors::UserConfigError, view::SortOrder};
use camino::Utf8Path;
use serde::Deserialize;
use std::{collections::BTreeSet, io};
use tracing::{debug, warn};

/// Special value for `--user-config-file` and `RUNWATCH_USER_CONFIG_FILE` that
/// skips user config loading entirely.
pub const USER_CONFIG_NONE: &str = "none";

/// Specifies where to load user configuration from.
#[derive(Clone, Copy, Debug)]
pub enum UserConfigLocation<'a> {
    /// Discover user config from the default location.
    Default,

    /// Skip user config loading entirely, using only built-in defaults.
    ///
    /// This is useful for test isolation.
    Isolated,

    /// Load user config from an explicit path.
    ///
    /// Returns an error if the file does not exist.
    Explicit(&'a Utf8Path),
}

impl<'a> UserConfigLocation<'a> {
    /// Creates a user config location from a CLI or environment variable value.
    ///
    /// Returns `Default` if `None`, `Isolated` if `"none"`, otherwise
    /// `Explicit` with the path.
    pub fn from_cli_or_env(s: Option<&'a str>) -> Self {
        match s {
            None => Self::Default,
            Some(s) if s == USER_CONFIG_NONE => Self::Isolated,
            Some(s) => Self::Explicit(Utf8Path::new(s)),
        }
    }
}

/// User configuration with the user's settings layered over the defaults.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserConfig {
    /// Display settings.
    pub display: DisplayConfig,
    /// Replay settings.
    pub replay: ReplayConfig,
}

/// Resolved `[display]` settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DisplayConfig {
    /// Shown in place of a persona when a run has none.
    pub persona_placeholder: String,
    /// The order runs are listed in.
    pub sort: SortOrder,
}

/// Resolved `[replay]` settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplayConfig {
    /// Print views after every published change.
    pub show_each_change: bool,
}

impl UserConfig {
    /// Loads user configuration from the given location and resolves it
    /// against the built-in defaults.
    pub fn from_location(location: UserConfigLocation<'_>) -> Result<Self, UserConfigError> {
        let user_config =
            DeserializedUserConfig::from_location(location, &mut DefaultUserConfigWarnings)?;
        Ok(Self::resolve(DefaultUserConfig::from_embedded(), user_config))
    }

    /// Returns the built-in defaults.
    pub fn defaults() -> Self {
        Self::resolve(DefaultUserConfig::from_embedded(), None)
    }

    fn resolve(defaults: DefaultUserConfig, user: Option<DeserializedUserConfig>) -> Self {
        let user = user.unwrap_or_default();
        Self {
            display: DisplayConfig {
                persona_placeholder: user
                    .display
                    .persona_placeholder
                    .unwrap_or(defaults.display.persona_placeholder),
                sort: user.display.sort.unwrap_or(defaults.display.sort),
            },
            replay: ReplayConfig {
                show_each_change: user
                    .replay
                    .show_each_change
                    .unwrap_or(defaults.replay.show_each_change),
            },
        }
    }
}

/// Handles warnings produced while reading user configuration.
trait UserConfigWarnings {
    /// Handle unknown configuration keys found in a user config file.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Logs warnings with tracing.
struct DefaultUserConfigWarnings;

impl UserConfigWarnings for DefaultUserConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if let [single] = unknown.iter().collect::<Vec<_>>().as_slice() {
            unknown_str.push_str("key: ");
            unknown_str.push_str(single);
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                unknown_str.push('\n');
                unknown_str.push_str("  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        warn!(
            "in user config file {}, ignoring unknown configuration {unknown_str}",
            config_file,
        );
    }
}

/// User configuration as read from a file. Every setting is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedUserConfig {
    #[serde(default)]
    display: DeserializedDisplayConfig,

    #[serde(default)]
    replay: DeserializedReplayConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedDisplayConfig {
    #[serde(default)]
    persona_placeholder: Option<String>,
    #[serde(default)]
    sort: Option<SortOrder>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedReplayConfig {
    #[serde(default)]
    show_each_change: Option<bool>,
}

impl DeserializedUserConfig {
    fn from_location(
        location: UserConfigLocation<'_>,
        warnings: &mut impl UserConfigWarnings,
    ) -> Result<Option<Self>, UserConfigError> {
        match location {
            UserConfigLocation::Isolated => {
                debug!("user config: skipping (isolated)");
                Ok(None)
            }
            UserConfigLocation::Explicit(path) => {
                debug!("user config: loading from explicit path {path}");
                match Self::from_path_with_warnings(path, warnings)? {
                    Some(config) => Ok(Some(config)),
                    None => Err(UserConfigError::FileNotFound {
                        path: path.to_owned(),
                    }),
                }
            }
            UserConfigLocation::Default => match user_config_path()? {
                Some(path) => Self::from_path_with_warnings(&path, warnings),
                None => {
                    debug!("user config: could not determine config directory");
                    Ok(None)
                }
            },
        }
    }

    /// Loads user config from a specific path.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    fn from_path_with_warnings(
        path: &Utf8Path,
        warnings: &mut impl UserConfigWarnings,
    ) -> Result<Option<Self>, UserConfigError> {
        debug!("user config: attempting to load from {path}");
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("user config: file does not exist at {path}");
                return Ok(None);
            }
            Err(error) => {
                return Err(UserConfigError::Read {
                    path: path.to_owned(),
                    error,
                });
            }
        };

        let (config, unknown) =
            Self::deserialize_toml(&contents).map_err(|error| UserConfigError::Parse {
                path: path.to_owned(),
                error,
            })?;

        if !unknown.is_empty() {
            warnings.unknown_config_keys(path, &unknown);
        }

        debug!("user config: loaded successfully from {path}");
        Ok(Some(config))
    }

    fn deserialize_toml(contents: &str) -> Result<(Self, BTreeSet<String>), toml::de::Error> {
        let deserializer = toml::Deserializer::parse(contents)?;
        let mut unknown = BTreeSet::new();
        let config: DeserializedUserConfig = serde_ignored::deserialize(deserializer, |path| {
            unknown.insert(path.to_string());
        })?;
        Ok((config, unknown))
    }
}

/// The embedded defaults. Every setting is required.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultUserConfig {
    display: DefaultDisplayConfig,
    replay: DefaultReplayConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultDisplayConfig {
    persona_placeholder: String,
    sort: SortOrder,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultReplayConfig {
    show_each_change: bool,
}

impl DefaultUserConfig {
    const DEFAULT_CONFIG: &'static str = include_str!("../../default-user-config.toml");

    /// Parses the embedded defaults.
    ///
    /// Panics if the embedded TOML is invalid or contains unknown keys.
    fn from_embedded() -> Self {
        let deserializer = toml::Deserializer::parse(Self::DEFAULT_CONFIG)
            .expect("embedded default user config should parse");
        let mut unknown = BTreeSet::new();
        let config: DefaultUserConfig =
            serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("embedded default user config should be valid");

        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default user config: {}",
                unknown.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
        config
    }
}
