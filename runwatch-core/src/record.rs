// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The canonical run record and its merge rules.
//!
//! Wire data arrives either as full records (from a snapshot fetch) or as
//! partial patches (from real-time events). Both are funneled through
//! [`RunRecord::merge`], so there is exactly one place where fields are
//! written.
//!
//! Merging follows a "patch, don't replace" rule:
//!
//! * omitted fields are left unchanged;
//! * fields set to `null` are cleared;
//! * *rich* fields (narrative, analysis, screenshots, recordings and the
//!   denormalized persona display fields) additionally ignore updates that set
//!   them to an empty value. Only an explicit `null` empties a rich field.

use crate::errors::MergeIdentityViolation;
use chrono::{DateTime, Utc};
use runwatch_metadata::{
    EntityRef, ExecutionState, Patch, PersonaId, ProjectId, Recording, RunId, RunPatch,
    RunStatus, ScreenshotStep, TestId, WireRunRecord,
};
use serde::Serialize;
use tracing::error;

/// A test run, normalized from its wire form.
///
/// Scope references are plain ids; polymorphic wire references are resolved
/// when the record is built.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    id: RunId,

    /// The owning project, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,

    /// The test this run executes, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<TestId>,

    /// The test display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,

    /// The persona driving this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<PersonaId>,

    /// The persona display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_name: Option<String>,

    /// The persona avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_avatar_url: Option<String>,

    /// The result status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,

    /// The execution state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_state: Option<ExecutionState>,

    /// Free-text narrative produced by the persona.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_output: Option<String>,

    /// Structured analysis of the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,

    /// The screenshot timeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_steps: Option<Vec<ScreenshotStep>>,

    /// Media recordings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recordings: Option<Vec<Recording>>,

    /// When the run was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// When the run was last updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Creates a record with only an id.
    pub fn new(id: RunId) -> Self {
        Self {
            id,
            project_id: None,
            test_id: None,
            test_name: None,
            persona_id: None,
            persona_name: None,
            persona_avatar_url: None,
            status: None,
            execution_state: None,
            narrative_output: None,
            analysis: None,
            screenshot_steps: None,
            recordings: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Builds a record from a full wire record.
    pub fn from_wire(wire: WireRunRecord) -> Self {
        let (id, patch) = split_wire(wire);
        let mut record = Self::new(id);
        record.apply_patch(&patch);
        record
    }

    /// Returns the run id.
    pub fn id(&self) -> &RunId {
        &self.id
    }

    /// Merges a patch for run `id` into this record.
    ///
    /// Returns an error, leaving the record untouched, if `id` does not match
    /// this record's id.
    pub fn merge(
        &mut self,
        id: &RunId,
        patch: &RunPatch,
    ) -> Result<MergeOutcome, MergeIdentityViolation> {
        if id != &self.id {
            return Err(MergeIdentityViolation {
                existing: self.id.clone(),
                incoming: id.clone(),
            });
        }
        Ok(self.apply_patch(patch))
    }

    fn apply_patch(&mut self, patch: &RunPatch) -> MergeOutcome {
        let mut changed = false;

        changed |= apply_plain(
            &mut self.project_id,
            patch.project_id.as_ref().map(|r| ProjectId::new(r.id())),
        );

        let test_id = patch.test_id.as_ref().map(|r| TestId::new(r.id()));
        let test_switched = is_switch(&test_id, self.test_id.as_ref());
        let test_name = display_patch(
            &patch.test_name,
            patch.test_id.as_set().and_then(EntityRef::name),
            test_switched,
        );
        changed |= apply_plain(&mut self.test_id, test_id);
        changed |= apply_plain(&mut self.test_name, test_name);

        let persona_id = patch.persona_id.as_ref().map(|r| PersonaId::new(r.id()));
        let persona_switched = is_switch(&persona_id, self.persona_id.as_ref());
        let persona_name = display_patch(
            &patch.persona_name,
            patch.persona_id.as_set().and_then(EntityRef::name),
            persona_switched,
        );
        let persona_avatar_url = display_patch(
            &patch.persona_avatar_url,
            patch.persona_id.as_set().and_then(EntityRef::avatar_url),
            persona_switched,
        );
        changed |= apply_plain(&mut self.persona_id, persona_id);
        changed |= apply_rich(&mut self.persona_name, persona_name);
        changed |= apply_rich(&mut self.persona_avatar_url, persona_avatar_url);

        changed |= apply_plain(&mut self.status, patch.status.clone());
        changed |= apply_plain(&mut self.execution_state, patch.execution_state.clone());

        changed |= apply_rich(&mut self.narrative_output, patch.narrative_output.clone());
        changed |= apply_rich(&mut self.analysis, patch.analysis.clone());
        changed |= apply_rich(&mut self.screenshot_steps, patch.screenshot_steps.clone());
        changed |= apply_rich(&mut self.recordings, patch.recordings.clone());

        changed |= apply_plain(&mut self.created_at, patch.created_at.clone());
        changed |= apply_plain(&mut self.updated_at, patch.updated_at.clone());

        if changed {
            MergeOutcome::Changed
        } else {
            MergeOutcome::Unchanged
        }
    }

    /// Returns a patch that sets every populated field of this record.
    ///
    /// Merging the result into another record with the same id overlays this
    /// record on top of it.
    pub fn to_patch(&self) -> RunPatch {
        RunPatch {
            project_id: self
                .project_id
                .as_ref()
                .map(|id| EntityRef::Id(id.to_string()))
                .into(),
            test_id: self
                .test_id
                .as_ref()
                .map(|id| EntityRef::Id(id.to_string()))
                .into(),
            test_name: self.test_name.clone().into(),
            persona_id: self
                .persona_id
                .as_ref()
                .map(|id| EntityRef::Id(id.to_string()))
                .into(),
            persona_name: self.persona_name.clone().into(),
            persona_avatar_url: self.persona_avatar_url.clone().into(),
            status: self.status.into(),
            execution_state: self.execution_state.into(),
            narrative_output: self.narrative_output.clone().into(),
            analysis: self.analysis.clone().into(),
            screenshot_steps: self.screenshot_steps.clone().into(),
            recordings: self.recordings.clone().into(),
            created_at: self.created_at.into(),
            updated_at: self.updated_at.into(),
        }
    }

    /// Returns true if the run may still make progress.
    ///
    /// Neither axis decides this alone: an active execution state is live
    /// regardless of status, and when the execution state is unknown a
    /// pending (or unknown) status is treated as live.
    pub fn is_live(&self) -> bool {
        match self.execution_state {
            Some(state) => state.is_active(),
            None => !self.status.is_some_and(RunStatus::is_terminal),
        }
    }

    /// Returns the persona display label: the name if known, otherwise the
    /// bare id.
    pub fn persona_label(&self) -> Option<&str> {
        self.persona_name
            .as_deref()
            .or_else(|| self.persona_id.as_ref().map(PersonaId::as_str))
    }

    /// Returns the test display label: the name if known, otherwise the bare
    /// id.
    pub fn test_label(&self) -> Option<&str> {
        self.test_name
            .as_deref()
            .or_else(|| self.test_id.as_ref().map(TestId::as_str))
    }
}

/// Whether a merge changed a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MergeOutcome {
    /// At least one field changed.
    Changed,
    /// The record is identical to what it was before.
    Unchanged,
}

impl MergeOutcome {
    /// Returns true if the merge changed the record.
    pub fn is_changed(self) -> bool {
        matches!(self, MergeOutcome::Changed)
    }
}

/// Merges a patch whose id is known to match, logging a violation instead of
/// returning it.
pub(crate) fn merge_logged(record: &mut RunRecord, id: &RunId, patch: &RunPatch) {
    if let Err(violation) = record.merge(id, patch) {
        debug_assert_eq!(violation.existing, violation.incoming);
        error!(%violation, "rejected update");
    }
}

/// Splits a full wire record into its id and a patch setting every present
/// field.
pub(crate) fn split_wire(wire: WireRunRecord) -> (RunId, RunPatch) {
    let patch = RunPatch {
        project_id: wire.project_id.into(),
        test_id: wire.test_id.into(),
        test_name: wire.test_name.into(),
        persona_id: wire.persona_id.into(),
        persona_name: wire.persona_name.into(),
        persona_avatar_url: wire.persona_avatar_url.into(),
        status: wire.status.into(),
        execution_state: wire.execution_state.into(),
        narrative_output: wire.narrative_output.into(),
        analysis: wire.analysis.into(),
        screenshot_steps: wire.screenshot_steps.into(),
        recordings: wire.recordings.into(),
        created_at: wire.created_at.into(),
        updated_at: wire.updated_at.into(),
    };
    (wire.id, patch)
}

/// A field whose "empty" value carries no information.
trait RichField: PartialEq {
    fn is_empty_value(&self) -> bool;
}

impl RichField for String {
    fn is_empty_value(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T: PartialEq> RichField for Vec<T> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl RichField for serde_json::Value {
    fn is_empty_value(&self) -> bool {
        match self {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(a) => a.is_empty(),
            serde_json::Value::Object(o) => o.is_empty(),
            serde_json::Value::Bool(_) | serde_json::Value::Number(_) => false,
        }
    }
}

fn apply_plain<T: PartialEq>(slot: &mut Option<T>, patch: Patch<T>) -> bool {
    match patch {
        Patch::Absent => false,
        Patch::Clear => slot.take().is_some(),
        Patch::Set(value) => {
            if slot.as_ref() == Some(&value) {
                false
            } else {
                *slot = Some(value);
                true
            }
        }
    }
}

fn apply_rich<T: RichField>(slot: &mut Option<T>, patch: Patch<T>) -> bool {
    match patch {
        // Setting an empty value is not a clear.
        Patch::Set(value) if value.is_empty_value() => false,
        other => apply_plain(slot, other),
    }
}

/// Returns true if `incoming` moves a populated reference to another entity
/// or clears it.
fn is_switch<T: PartialEq>(incoming: &Patch<T>, existing: Option<&T>) -> bool {
    match (incoming, existing) {
        (Patch::Set(new), Some(old)) => new != old,
        (Patch::Clear, Some(_)) => true,
        _ => false,
    }
}

/// Computes the effective patch for a denormalized display field.
///
/// An explicit value wins. Otherwise a value embedded in a populated reference
/// is used, and if the reference moved to another entity the stale display
/// value is cleared.
fn display_patch(explicit: &Patch<String>, embedded: Option<&str>, switched: bool) -> Patch<String> {
    match explicit {
        Patch::Absent => match embedded {
            Some(value) => Patch::Set(value.to_owned()),
            None if switched => Patch::Clear,
            None => Patch::Absent,
        },
        other => other.clone(),
    }
}
