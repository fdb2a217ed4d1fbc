// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RunScope, ScopeMatch, ViewScope};
use crate::{
    errors::LoadError,
    loader::{PersonaLookup, enrich_persona},
    record::{RunRecord, merge_logged},
    registry::{RegistryChange, RegistryView},
};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use runwatch_metadata::{RunId, RunPatch};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, rc::Rc};
use tracing::debug;

/// The lifecycle phase of a scoped view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ViewPhase {
    /// No snapshot has loaded yet.
    Uninitialized,

    /// A snapshot has loaded, but no relevant registry change has been seen.
    ///
    /// Irrelevant changes are ignored in this phase, so an unrelated event
    /// can never blank out the list.
    Seeded,

    /// A relevant registry change has been seen. Every relevant change is now
    /// applied, including ones that empty the list.
    Live,
}

impl fmt::Display for ViewPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewPhase::Uninitialized => write!(f, "uninitialized"),
            ViewPhase::Seeded => write!(f, "seeded"),
            ViewPhase::Live => write!(f, "live"),
        }
    }
}

/// What a view currently shows.
#[derive(Clone, Debug)]
pub enum ViewState {
    /// The first load has not completed.
    Loading,

    /// The first load failed.
    Failed(Rc<LoadError>),

    /// The visible list. An empty list is an empty state, not an error.
    Ready(Rc<[RunRecord]>),
}

impl ViewState {
    /// Returns the visible records, if the view is ready.
    pub fn records(&self) -> Option<&Rc<[RunRecord]>> {
        match self {
            ViewState::Ready(records) => Some(records),
            ViewState::Loading | ViewState::Failed(_) => None,
        }
    }
}

/// The order runs are listed in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Most recently created first.
    #[default]
    NewestFirst,
    /// Least recently created first.
    OldestFirst,
}

impl SortOrder {
    /// Compares two records. Records without a creation time sort last, and
    /// ties are broken by id.
    pub fn compare(self, a: &RunRecord, b: &RunRecord) -> Ordering {
        let by_time = match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => match self {
                SortOrder::NewestFirst => y.cmp(&x),
                SortOrder::OldestFirst => x.cmp(&y),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time.then_with(|| a.id().cmp(b.id()))
    }
}

/// Reconciles one scoped list of runs with the global registry.
///
/// A reconciler is seeded from snapshot loads and observes every registry
/// change. It only publishes a new list when the visible records actually
/// differ from the previous output.
#[derive(Debug)]
pub struct ScopedViewReconciler<S> {
    scope: S,
    phase: ViewPhase,
    seen_relevant_before_seed: bool,
    entries: IndexMap<RunId, RunRecord>,
    output: Option<Rc<[RunRecord]>>,
    load_error: Option<Rc<LoadError>>,
    generation: u64,
    sort: SortOrder,
    personas: DebugIgnore<Option<Rc<dyn PersonaLookup>>>,
}

impl<S: ViewScope> ScopedViewReconciler<S> {
    /// Creates a reconciler for the given scope.
    pub fn new(scope: S) -> Self {
        Self {
            scope,
            phase: ViewPhase::Uninitialized,
            seen_relevant_before_seed: false,
            entries: IndexMap::new(),
            output: None,
            load_error: None,
            generation: 0,
            sort: SortOrder::default(),
            personas: DebugIgnore(None),
        }
    }

    /// Sets the order of the visible list.
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the persona lookup used to backfill display names of records
    /// that arrive through the registry.
    pub fn with_personas(mut self, personas: Option<Rc<dyn PersonaLookup>>) -> Self {
        self.personas = DebugIgnore(personas);
        self
    }

    /// Returns the scope of this view.
    pub fn scope(&self) -> &S {
        &self.scope
    }

    /// Returns the scope snapshots are fetched for.
    pub fn fetch_scope(&self) -> RunScope {
        self.scope.fetch_scope()
    }

    /// Returns the current phase.
    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    /// Returns what the view currently shows.
    pub fn state(&self) -> ViewState {
        match (&self.output, &self.load_error) {
            (Some(records), _) => ViewState::Ready(records.clone()),
            (None, Some(error)) => ViewState::Failed(error.clone()),
            (None, None) => ViewState::Loading,
        }
    }

    /// Returns the number of times the visible state has changed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the error of the most recent load, if it failed.
    ///
    /// A failed reload keeps the current list; this is how callers find out
    /// about it.
    pub fn last_load_error(&self) -> Option<&Rc<LoadError>> {
        self.load_error.as_ref()
    }

    /// Merges a loaded snapshot into the view.
    ///
    /// Snapshots are unioned into the current list: records missing from a
    /// later snapshot are kept. Returns true if the visible state changed.
    pub fn seed(&mut self, snapshot: Vec<RunRecord>, registry: RegistryView<'_>) -> bool {
        let total = snapshot.len();
        for record in snapshot {
            if self.scope.admits(&record) == ScopeMatch::Mismatch {
                continue;
            }
            match self.entries.get_mut(record.id()) {
                Some(existing) => merge_logged(existing, record.id(), &record.to_patch()),
                None => {
                    self.entries.insert(record.id().clone(), record);
                }
            }
        }
        self.load_error = None;

        if self.phase != ViewPhase::Live
            && (self.seen_relevant_before_seed || self.registry_touches(registry))
        {
            debug!(
                scope = %self.scope.fetch_scope(),
                "view is live after seeding: registry already holds relevant runs"
            );
            self.phase = ViewPhase::Live;
        }
        if self.phase == ViewPhase::Uninitialized {
            self.phase = ViewPhase::Seeded;
        }
        if self.phase == ViewPhase::Live {
            self.sync_with_registry(registry);
        }

        debug!(
            scope = %self.scope.fetch_scope(),
            snapshot = total,
            visible = self.entries.len(),
            phase = %self.phase,
            "seeded view"
        );
        self.publish()
    }

    /// Records a failed load. Returns true if the visible state changed.
    pub fn load_failed(&mut self, error: LoadError) -> bool {
        debug!(scope = %self.scope.fetch_scope(), error = %error, "view load failed");
        self.load_error = Some(Rc::new(error));
        if self.output.is_none() {
            self.generation += 1;
            true
        } else {
            false
        }
    }

    /// Observes a registry change. Returns true if the visible state changed.
    pub fn observe(&mut self, change: &RegistryChange, registry: RegistryView<'_>) -> bool {
        let relevant = self.is_relevant(change, registry);
        match self.phase {
            ViewPhase::Uninitialized => {
                if relevant {
                    self.seen_relevant_before_seed = true;
                }
                return false;
            }
            ViewPhase::Seeded => {
                if !relevant {
                    return false;
                }
                debug!(
                    scope = %self.scope.fetch_scope(),
                    id = %change.id,
                    "view is live after first relevant change"
                );
                self.phase = ViewPhase::Live;
                self.sync_with_registry(registry);
                self.apply_fields(&change.id, change.fields.as_ref());
            }
            ViewPhase::Live => {
                if !relevant {
                    return false;
                }
                self.apply_change(change, registry);
            }
        }
        self.publish()
    }

    fn is_relevant(&self, change: &RegistryChange, registry: RegistryView<'_>) -> bool {
        self.entries.contains_key(&change.id)
            || registry
                .get(&change.id)
                .is_some_and(|record| self.scope.admits(record) == ScopeMatch::Match)
            || change
                .before
                .as_ref()
                .is_some_and(|record| self.scope.admits(record) == ScopeMatch::Match)
    }

    fn registry_touches(&self, registry: RegistryView<'_>) -> bool {
        self.entries
            .keys()
            .any(|id| registry.is_deleted(id) || registry.get(id).is_some())
            || registry
                .iter()
                .any(|record| self.scope.admits(record) == ScopeMatch::Match)
    }

    /// Overlays the registry on every known record and adds every in-scope
    /// record the view does not know yet.
    fn sync_with_registry(&mut self, registry: RegistryView<'_>) {
        let scope = &self.scope;
        let personas = &self.personas;
        self.entries.retain(|id, record| {
            if registry.is_deleted(id) {
                return false;
            }
            if let Some(current) = registry.get(id) {
                merge_logged(record, id, &current.to_patch());
                backfill_with(personas, record);
            }
            scope.admits(record) != ScopeMatch::Mismatch
        });

        let added: Vec<RunRecord> = registry
            .iter()
            .filter(|record| {
                !self.entries.contains_key(record.id())
                    && self.scope.admits(record) == ScopeMatch::Match
            })
            .cloned()
            .collect();
        for mut record in added {
            self.backfill(&mut record);
            self.entries.insert(record.id().clone(), record);
        }
    }

    fn apply_change(&mut self, change: &RegistryChange, registry: RegistryView<'_>) {
        let Some(current) = registry.get(&change.id) else {
            self.entries.shift_remove(&change.id);
            return;
        };

        if self.entries.contains_key(&change.id) {
            self.apply_fields(&change.id, change.fields.as_ref());
        } else if self.scope.admits(current) == ScopeMatch::Match {
            let mut record = current.clone();
            self.backfill(&mut record);
            self.entries.insert(record.id().clone(), record);
        }
    }

    /// Merges the fields of an upsert into a known record, dropping the
    /// record if it moved out of scope.
    fn apply_fields(&mut self, id: &RunId, fields: Option<&RunPatch>) {
        let Some(record) = self.entries.get_mut(id) else {
            return;
        };
        if let Some(fields) = fields {
            merge_logged(record, id, fields);
            // A persona switch clears the stale name.
            backfill_with(&self.personas, record);
        }
        if self.scope.admits(record) == ScopeMatch::Mismatch {
            debug!(id = %id, scope = %self.scope.fetch_scope(), "run moved out of scope");
            self.entries.shift_remove(id);
        }
    }

    fn backfill(&self, record: &mut RunRecord) {
        backfill_with(&self.personas, record);
    }

    fn publish(&mut self) -> bool {
        let mut records: Vec<RunRecord> = self.entries.values().cloned().collect();
        let sort = self.sort;
        records.sort_by(|a, b| sort.compare(a, b));

        if self.output.as_deref() == Some(records.as_slice()) {
            return false;
        }
        self.output = Some(records.into());
        self.generation += 1;
        true
    }
}

fn backfill_with(personas: &DebugIgnore<Option<Rc<dyn PersonaLookup>>>, record: &mut RunRecord) {
    if let Some(personas) = &**personas {
        enrich_persona(record, personas.as_ref());
    }
}
