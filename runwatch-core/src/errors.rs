// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by runwatch.

use crate::view::RunScope;
use camino::{FromPathBufError, Utf8PathBuf};
use runwatch_metadata::{ParseVariantError, RunId};
use std::fmt;
use thiserror::Error;

/// An update was merged into a record with a different id.
///
/// Records are keyed by id, so this indicates a programming error in the
/// caller. The record is left untouched.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("attempted to merge an update for run `{incoming}` into run `{existing}`")]
pub struct MergeIdentityViolation {
    /// The id of the record being merged into.
    pub existing: RunId,
    /// The id carried by the update.
    pub incoming: RunId,
}

/// The registry was accessed while it was applying an event.
///
/// Registry listeners receive a read-only view of the registry and must not
/// call back into the hub.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("run registry is busy applying an event (re-entrant access from a listener?)")]
pub struct RegistryBusy;

/// An error returned by a [`RunSource`](crate::loader::RunSource) while
/// fetching a snapshot.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The request could not be completed.
    #[error("network request failed: {message}")]
    Network {
        /// A description of the failure.
        message: String,
    },

    /// The request was rejected as unauthorized.
    #[error("request was not authorized")]
    Unauthorized,

    /// Reading the snapshot failed.
    #[error("failed to read snapshot at {path}")]
    Read {
        /// The path that failed to be read.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The snapshot could not be parsed.
    #[error("failed to parse snapshot{}", .path.as_ref().map(|p| format!(" at {p}")).unwrap_or_default())]
    Parse {
        /// The path of the snapshot, if it came from a file.
        path: Option<Utf8PathBuf>,
        /// The underlying deserialization error.
        #[source]
        error: serde_json::Error,
    },
}

/// A snapshot could not be loaded for a scope.
///
/// This is the only user-visible error in the reconciliation core: views show
/// an error affordance for it. It never corrupts registry state.
#[derive(Debug, Error)]
#[error("failed to load runs for {scope}")]
pub struct LoadError {
    scope: RunScope,
    #[source]
    error: FetchError,
}

impl LoadError {
    pub(crate) fn new(scope: RunScope, error: FetchError) -> Self {
        Self { scope, error }
    }

    /// Returns the scope that failed to load.
    pub fn scope(&self) -> &RunScope {
        &self.scope
    }

    /// Returns the underlying fetch error.
    pub fn fetch_error(&self) -> &FetchError {
        &self.error
    }
}

/// A persona lookup could not be completed.
///
/// Lookups are best-effort: this error is logged and the record keeps its
/// bare persona id.
#[derive(Clone, Debug, Error)]
#[error("persona lookup unavailable: {reason}")]
pub struct PersonaLookupError {
    reason: String,
}

impl PersonaLookupError {
    /// Creates a new lookup error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An error that occurred while reading a persona directory file.
#[derive(Debug, Error)]
pub enum PersonaDirectoryError {
    /// The file could not be read.
    #[error("failed to read persona file at {path}")]
    Read {
        /// The path that failed to be read.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The file could not be parsed.
    #[error("failed to parse persona file at {path}")]
    Parse {
        /// The path that failed to be parsed.
        path: Utf8PathBuf,
        /// The underlying deserialization error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while reading an event log.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// The event log could not be opened.
    #[error("failed to open event log at {path}")]
    Open {
        /// The path that failed to be opened.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// A line could not be read.
    #[error("failed to read event log line {line}")]
    Read {
        /// The 1-based line number.
        line: usize,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// A line did not contain a valid event.
    #[error("invalid event on line {line}")]
    Parse {
        /// The 1-based line number.
        line: usize,
        /// The underlying deserialization error.
        #[source]
        error: serde_json::Error,
    },
}

impl EventLogError {
    /// Returns the 1-based line number this error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Open { .. } => None,
            Self::Read { line, .. } | Self::Parse { line, .. } => Some(*line),
        }
    }
}

/// An error returned while parsing a filter value.
#[derive(Clone, Debug, Error)]
#[error("invalid {field} filter")]
pub struct FilterParseError {
    field: &'static str,
    #[source]
    error: ParseVariantError,
}

impl FilterParseError {
    pub(crate) fn new(field: &'static str, error: ParseVariantError) -> Self {
        Self { field, error }
    }
}

/// A search query could not be compiled.
#[derive(Clone, Debug, Error)]
#[error("failed to compile search query `{query}`")]
pub struct SearchQueryError {
    query: String,
    #[source]
    error: aho_corasick::BuildError,
}

impl SearchQueryError {
    pub(crate) fn new(query: impl Into<String>, error: aho_corasick::BuildError) -> Self {
        Self {
            query: query.into(),
            error,
        }
    }
}

/// An error that occurred while loading user configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UserConfigError {
    /// The user config file specified explicitly was not found.
    #[error("user config file not found at {path}")]
    FileNotFound {
        /// The path that was specified.
        path: Utf8PathBuf,
    },

    /// Failed to read the user config file.
    #[error("failed to read user config at {path}")]
    Read {
        /// The path to the config file.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// Failed to parse the user config file.
    #[error("failed to parse user config at {path}")]
    Parse {
        /// The path to the config file.
        path: Utf8PathBuf,
        /// The underlying TOML error.
        #[source]
        error: toml::de::Error,
    },

    /// The user config directory path is not valid UTF-8.
    #[error("user config path contains non-UTF-8 characters")]
    NonUtf8Path {
        /// The underlying error.
        #[source]
        error: FromPathBufError,
    },
}

/// The kind of a [`LoadError`], used to choose how to present it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadErrorKind {
    /// A network or IO failure; retrying may help.
    Transport,
    /// The response could not be parsed.
    Parse,
    /// The request was rejected.
    Auth,
}

impl LoadError {
    /// Classifies this error.
    pub fn kind(&self) -> LoadErrorKind {
        match &self.error {
            FetchError::Network { .. } | FetchError::Read { .. } => LoadErrorKind::Transport,
            FetchError::Parse { .. } => LoadErrorKind::Parse,
            FetchError::Unauthorized => LoadErrorKind::Auth,
        }
    }
}

impl fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadErrorKind::Transport => write!(f, "transport"),
            LoadErrorKind::Parse => write!(f, "parse"),
            LoadErrorKind::Auth => write!(f, "auth"),
        }
    }
}
