// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use camino::Utf8PathBuf;
use itertools::Itertools;
use owo_colors::OwoColorize;
use runwatch_core::errors::{
    EventLogError, LoadError, PersonaDirectoryError, RegistryBusy, UserConfigError,
};
use runwatch_metadata::RunwatchExitCode;
use std::{error::Error, rc::Rc};
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholder messages: the expected way to print
// out errors is with the display_to_stderr method, which colorizes errors.

/// An error the user can act on.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("user config error")]
    UserConfigError {
        #[from]
        err: UserConfigError,
    },
    #[error("persona directory error")]
    PersonaDirectoryError {
        #[from]
        err: PersonaDirectoryError,
    },
    #[error("failed to build async runtime")]
    RuntimeBuildError {
        #[source]
        err: std::io::Error,
    },
    #[error("event log error")]
    EventLogError {
        path: Utf8PathBuf,
        #[source]
        err: EventLogError,
    },
    #[error("snapshot load failed")]
    SnapshotLoadFailed { errors: Vec<Rc<LoadError>> },
    #[error("views are empty")]
    EmptyView { labels: Vec<String> },
    #[error("error writing output")]
    WriteError {
        #[source]
        err: std::io::Error,
    },
    #[error("run registry was busy")]
    RegistryBusy {
        #[from]
        err: RegistryBusy,
    },
}

impl ExpectedError {
    pub(crate) fn event_log_error(path: impl Into<Utf8PathBuf>, err: EventLogError) -> Self {
        Self::EventLogError {
            path: path.into(),
            err,
        }
    }

    pub(crate) fn write_error(err: std::io::Error) -> Self {
        Self::WriteError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::UserConfigError { .. }
            | Self::PersonaDirectoryError { .. }
            | Self::RuntimeBuildError { .. } => RunwatchExitCode::SETUP_ERROR,
            Self::EventLogError { .. } => RunwatchExitCode::EVENT_LOG_INVALID,
            Self::SnapshotLoadFailed { .. } => RunwatchExitCode::SNAPSHOT_LOAD_FAILED,
            Self::EmptyView { .. } => RunwatchExitCode::EMPTY_VIEW,
            Self::WriteError { .. } => RunwatchExitCode::WRITE_OUTPUT_ERROR,
            // Listeners never re-enter the registry from the command line.
            Self::RegistryBusy { .. } => 1,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error: Option<&dyn Error> = match self {
            Self::UserConfigError { err } => {
                error!("{err}");
                err.source()
            }
            Self::PersonaDirectoryError { err } => {
                error!("{err}");
                err.source()
            }
            Self::RuntimeBuildError { err } => {
                error!("failed to build async runtime");
                Some(err as &dyn Error)
            }
            Self::EventLogError { path, err } => {
                error!(
                    "failed to read event log at `{}`: {err}",
                    path.style(styles.bold)
                );
                err.source()
            }
            Self::SnapshotLoadFailed { errors } => {
                for load_error in errors {
                    error!("{load_error}");
                    let mut source = load_error.source();
                    while let Some(err) = source {
                        error!(target: NO_HEADING, "\nCaused by:\n  {err}");
                        source = err.source();
                    }
                }
                None
            }
            Self::EmptyView { labels } => {
                error!(
                    "{}: {}",
                    "no runs to show".style(styles.warning_text),
                    labels.iter().map(|label| label.style(styles.bold)).join(", ")
                );
                None
            }
            Self::WriteError { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::RegistryBusy { err } => {
                error!("internal error: {err}");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {err}");
            next_error = err.source();
        }
    }
}
