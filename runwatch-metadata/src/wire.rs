// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{Patch, PersonaId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{error, fmt, str::FromStr};

/// The result status of a test run.
///
/// This is independent of [`ExecutionState`]: a run can finish with any
/// outcome.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// The run has not produced a result yet.
    Pending,
    /// The run completed and the test passed.
    Succeeded,
    /// The run completed and the test failed.
    Failed,
    /// The run was cancelled.
    Cancelled,
}

impl RunStatus {
    /// Returns the string values accepted by [`FromStr`].
    pub fn variants() -> [&'static str; 4] {
        ["pending", "succeeded", "failed", "cancelled"]
    }

    /// Returns the string form of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true if this status is a final outcome.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Pending)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = match s {
            "pending" => RunStatus::Pending,
            "succeeded" => RunStatus::Succeeded,
            "failed" => RunStatus::Failed,
            "cancelled" => RunStatus::Cancelled,
            other => {
                return Err(ParseVariantError::new(
                    "run status",
                    other,
                    &Self::variants(),
                ));
            }
        };
        Ok(val)
    }
}

/// The execution state of a test run.
///
/// This axis is independent of [`RunStatus`].
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionState {
    /// The run is executing.
    Running,
    /// The run is paused and may resume.
    Paused,
    /// The run was stopped before finishing.
    Stopped,
    /// The run finished executing.
    Finished,
}

impl ExecutionState {
    /// Returns the string values accepted by [`FromStr`].
    pub fn variants() -> [&'static str; 4] {
        ["running", "paused", "stopped", "finished"]
    }

    /// Returns the string form of this state.
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::Running => "running",
            ExecutionState::Paused => "paused",
            ExecutionState::Stopped => "stopped",
            ExecutionState::Finished => "finished",
        }
    }

    /// Returns true if the run may still make progress in this state.
    pub fn is_active(self) -> bool {
        matches!(self, ExecutionState::Running | ExecutionState::Paused)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionState {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = match s {
            "running" => ExecutionState::Running,
            "paused" => ExecutionState::Paused,
            "stopped" => ExecutionState::Stopped,
            "finished" => ExecutionState::Finished,
            other => {
                return Err(ParseVariantError::new(
                    "execution state",
                    other,
                    &Self::variants(),
                ));
            }
        };
        Ok(val)
    }
}

#[cfg(feature = "proptest1")]
mod arbitrary {
    use super::{ExecutionState, RunStatus};
    use proptest::prelude::*;

    impl Arbitrary for RunStatus {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_: ()) -> Self::Strategy {
            prop_oneof![
                Just(RunStatus::Pending),
                Just(RunStatus::Succeeded),
                Just(RunStatus::Failed),
                Just(RunStatus::Cancelled),
            ]
            .boxed()
        }
    }

    impl Arbitrary for ExecutionState {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_: ()) -> Self::Strategy {
            prop_oneof![
                Just(ExecutionState::Running),
                Just(ExecutionState::Paused),
                Just(ExecutionState::Stopped),
                Just(ExecutionState::Finished),
            ]
            .boxed()
        }
    }
}

/// An error returned while parsing an enum value from a string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseVariantError {
    kind: &'static str,
    input: String,
    known: Vec<&'static str>,
}

impl ParseVariantError {
    fn new(kind: &'static str, input: &str, known: &[&'static str]) -> Self {
        Self {
            kind,
            input: input.to_owned(),
            known: known.to_vec(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for ParseVariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unrecognized value for {}: {}\n(known values: {})",
            self.kind,
            self.input,
            self.known.join(", ")
        )
    }
}

impl error::Error for ParseVariantError {}

/// A reference to a project, test or persona as it appears on the wire.
///
/// Depending on the producer, a reference is either a bare string id or a
/// populated object. Use [`EntityRef::id`] to normalize it.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EntityRef {
    /// A bare identifier.
    Id(String),
    /// A populated object.
    Populated(PopulatedRef),
}

impl EntityRef {
    /// Returns the identifier of the referenced entity.
    pub fn id(&self) -> &str {
        match self {
            EntityRef::Id(id) => id,
            EntityRef::Populated(populated) => &populated.id,
        }
    }

    /// Returns the embedded display name, if the reference was populated with
    /// one.
    pub fn name(&self) -> Option<&str> {
        match self {
            EntityRef::Id(_) => None,
            EntityRef::Populated(populated) => populated.name.as_deref(),
        }
    }

    /// Returns the embedded avatar URL, if any.
    pub fn avatar_url(&self) -> Option<&str> {
        match self {
            EntityRef::Id(_) => None,
            EntityRef::Populated(populated) => populated.avatar_url.as_deref(),
        }
    }
}

/// A populated entity reference.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedRef {
    /// The entity identifier.
    #[serde(alias = "_id")]
    pub id: String,

    /// The display name, if embedded.
    #[serde(default, alias = "title", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The avatar URL, if embedded (personas only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A single step of the screenshot timeline captured during a run.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotStep {
    /// The position of this step in the timeline, if provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    /// The screenshot URL.
    pub url: String,

    /// A description of the action taken at this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// When the screenshot was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
}

/// A media recording attached to a run.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    /// The recording URL.
    pub url: String,

    /// The media kind, e.g. `video` or `audio`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// The duration of the recording in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// A full run record as returned by a snapshot fetch.
///
/// Scope and persona references are kept in their wire form; they are
/// normalized when the record is ingested.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRunRecord {
    /// The run identifier.
    #[serde(alias = "_id")]
    pub id: RunId,

    /// The owning project.
    #[serde(default, alias = "project", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<EntityRef>,

    /// The test this run executes.
    #[serde(default, alias = "test", skip_serializing_if = "Option::is_none")]
    pub test_id: Option<EntityRef>,

    /// The test display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,

    /// The persona driving this run.
    #[serde(default, alias = "persona", skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<EntityRef>,

    /// The persona display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_name: Option<String>,

    /// The persona avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_avatar_url: Option<String>,

    /// The result status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,

    /// The execution state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_state: Option<ExecutionState>,

    /// Free-text narrative produced by the persona.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_output: Option<String>,

    /// Structured analysis of the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,

    /// The screenshot timeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_steps: Option<Vec<ScreenshotStep>>,

    /// Media recordings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recordings: Option<Vec<Recording>>,

    /// When the run was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// When the run was last updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The changed fields carried by an upsert event.
///
/// Every field is a [`Patch`]: omitted fields are left unchanged, `null`
/// clears.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPatch {
    /// The owning project.
    #[serde(default, alias = "project", skip_serializing_if = "Patch::is_absent")]
    pub project_id: Patch<EntityRef>,

    /// The test this run executes.
    #[serde(default, alias = "test", skip_serializing_if = "Patch::is_absent")]
    pub test_id: Patch<EntityRef>,

    /// The test display name.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub test_name: Patch<String>,

    /// The persona driving this run.
    #[serde(default, alias = "persona", skip_serializing_if = "Patch::is_absent")]
    pub persona_id: Patch<EntityRef>,

    /// The persona display name.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub persona_name: Patch<String>,

    /// The persona avatar URL.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub persona_avatar_url: Patch<String>,

    /// The result status.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub status: Patch<RunStatus>,

    /// The execution state.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub execution_state: Patch<ExecutionState>,

    /// Free-text narrative produced by the persona.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub narrative_output: Patch<String>,

    /// Structured analysis of the run.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub analysis: Patch<serde_json::Value>,

    /// The screenshot timeline.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub screenshot_steps: Patch<Vec<ScreenshotStep>>,

    /// Media recordings.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub recordings: Patch<Vec<Recording>>,

    /// When the run was created.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub created_at: Patch<DateTime<Utc>>,

    /// When the run was last updated.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub updated_at: Patch<DateTime<Utc>>,
}

/// A real-time event consumed by the run registry.
///
/// On the wire:
///
/// ```json
/// { "id": "run-1", "kind": "upsert", "fields": { "status": "succeeded" } }
/// { "id": "run-1", "kind": "delete" }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RunEvent {
    /// Create or update a run. Unknown ids are created.
    Upsert {
        /// The run identifier.
        id: RunId,

        /// The changed fields. A missing `fields` object is an empty patch.
        #[serde(default)]
        fields: RunPatch,
    },

    /// Delete (trash) a run.
    Delete {
        /// The run identifier.
        id: RunId,
    },
}

impl RunEvent {
    /// Returns the id of the run this event refers to.
    pub fn id(&self) -> &RunId {
        match self {
            RunEvent::Upsert { id, .. } | RunEvent::Delete { id } => id,
        }
    }
}

/// A persona as stored in a persona cache.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePersona {
    /// The persona identifier.
    #[serde(alias = "_id")]
    pub id: PersonaId,

    /// The display name.
    pub name: String,

    /// The avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}
