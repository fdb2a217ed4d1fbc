// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The global run registry.
//!
//! The registry is the single source of truth that scoped views re-derive
//! from. [`RunRegistry::apply`] is its only write path: every real-time event
//! flows through it, and listeners are notified synchronously once the merge
//! has fully completed.

use crate::record::RunRecord;
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use runwatch_metadata::{RunEvent, RunId, RunPatch};
use std::{collections::HashSet, fmt};
use tracing::{debug, error};

/// A registry listener.
///
/// Listeners are called once per applied event, with the change and a
/// read-only view of the registry after the change.
pub type RegistryListener = Box<dyn FnMut(&RegistryChange, RegistryView<'_>)>;

/// Process-wide map of run records, keyed by run id.
///
/// Deleted ids are remembered as tombstones for the registry's lifetime, so
/// that a snapshot loaded after a delete cannot bring the run back. Memory
/// grows with the number of distinct deleted ids; a hub is expected to live
/// for one session and be torn down with it.
#[derive(Debug)]
pub struct RunRegistry {
    records: IndexMap<RunId, RunRecord>,
    tombstones: HashSet<RunId>,
    listeners: DebugIgnore<Vec<(SubscriptionId, RegistryListener)>>,
    next_subscription: u64,
    version: u64,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self {
            records: IndexMap::new(),
            tombstones: HashSet::new(),
            listeners: DebugIgnore(Vec::new()),
            next_subscription: 0,
            version: 0,
        }
    }

    /// Applies a single real-time event, then notifies listeners.
    ///
    /// Upserts for unknown ids create the record. Deletes remove the record
    /// and leave a tombstone, which a later upsert for the same id lifts.
    pub fn apply(&mut self, event: &RunEvent) -> RegistryChange {
        self.version += 1;

        let change = match event {
            RunEvent::Upsert { id, fields } => {
                self.tombstones.remove(id);
                match self.records.get_mut(id) {
                    Some(record) => {
                        let before = record.clone();
                        let kind = match record.merge(id, fields) {
                            Ok(outcome) if outcome.is_changed() => ChangeKind::Updated,
                            Ok(_) => ChangeKind::Unchanged,
                            Err(violation) => {
                                debug_assert_eq!(violation.existing, violation.incoming);
                                error!(%violation, "rejected update");
                                ChangeKind::Unchanged
                            }
                        };
                        RegistryChange {
                            version: self.version,
                            id: id.clone(),
                            kind,
                            before: Some(before),
                            fields: Some(fields.clone()),
                        }
                    }
                    None => {
                        let mut record = RunRecord::new(id.clone());
                        if let Err(violation) = record.merge(id, fields) {
                            debug_assert_eq!(violation.existing, violation.incoming);
                            error!(%violation, "rejected update");
                        }
                        self.records.insert(id.clone(), record);
                        RegistryChange {
                            version: self.version,
                            id: id.clone(),
                            kind: ChangeKind::Created,
                            before: None,
                            fields: Some(fields.clone()),
                        }
                    }
                }
            }
            RunEvent::Delete { id } => {
                let removed = self.records.shift_remove(id);
                self.tombstones.insert(id.clone());
                RegistryChange {
                    version: self.version,
                    id: id.clone(),
                    kind: if removed.is_some() {
                        ChangeKind::Deleted
                    } else {
                        ChangeKind::DeletedUnknown
                    },
                    before: removed,
                    fields: None,
                }
            }
        };

        debug!(
            id = %change.id,
            kind = %change.kind,
            version = change.version,
            "applied run event"
        );

        let view = RegistryView {
            records: &self.records,
            tombstones: &self.tombstones,
        };
        for (_, listener) in self.listeners.iter_mut() {
            listener(&change, view);
        }

        change
    }

    /// Returns a point-in-time copy of every known record, in arbitrary order.
    pub fn snapshot(&self) -> Vec<RunRecord> {
        self.records.values().cloned().collect()
    }

    /// Returns a read-only view of the registry.
    pub fn view(&self) -> RegistryView<'_> {
        RegistryView {
            records: &self.records,
            tombstones: &self.tombstones,
        }
    }

    /// Returns the number of events applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Registers a listener, returning an id that can be used to unsubscribe.
    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&RegistryChange, RegistryView<'_>) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        debug!(subscription = %id, "registry listener subscribed");
        id
    }

    /// Removes a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        let removed = self.listeners.len() != before;
        if removed {
            debug!(subscription = %id, "registry listener unsubscribed");
        }
        removed
    }

    /// Returns the number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// A read-only view of the registry, handed to listeners.
#[derive(Clone, Copy, Debug)]
pub struct RegistryView<'a> {
    records: &'a IndexMap<RunId, RunRecord>,
    tombstones: &'a HashSet<RunId>,
}

impl<'a> RegistryView<'a> {
    /// Looks up a record by id.
    pub fn get(&self, id: &RunId) -> Option<&'a RunRecord> {
        self.records.get(id)
    }

    /// Returns true if the id was deleted and not recreated since.
    pub fn is_deleted(&self, id: &RunId) -> bool {
        self.tombstones.contains(id)
    }

    /// Iterates over every known record.
    pub fn iter(&self) -> impl Iterator<Item = &'a RunRecord> + 'a {
        self.records.values()
    }

    /// Returns the number of known records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no records are known.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The outcome of applying a single event.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryChange {
    /// The registry version after this change.
    pub version: u64,

    /// The run the event referred to.
    pub id: RunId,

    /// What happened.
    pub kind: ChangeKind,

    /// The record as it was before the event, if it existed.
    pub before: Option<RunRecord>,

    /// The fields carried by an upsert. `None` for deletes.
    pub fields: Option<RunPatch>,
}

/// The kind of a [`RegistryChange`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    /// An upsert created a previously unknown record.
    Created,
    /// An upsert changed an existing record.
    Updated,
    /// An upsert matched the existing record exactly.
    Unchanged,
    /// A delete removed a record.
    Deleted,
    /// A delete referred to an unknown record.
    DeletedUnknown,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Updated => write!(f, "updated"),
            ChangeKind::Unchanged => write!(f, "unchanged"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::DeletedUnknown => write!(f, "deleted-unknown"),
        }
    }
}

/// Identifies a registry listener.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{delete, upsert};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use runwatch_metadata::RunStatus;
    use serde_json::json;
    use std::{cell::RefCell, rc::Rc};
    use test_strategy::proptest;

    #[test]
    fn upsert_for_unknown_id_creates() {
        let mut registry = RunRegistry::new();
        let change = registry.apply(&upsert("r1", json!({"status": "pending"})));
        assert_eq!(change.kind, ChangeKind::Created);
        assert_eq!(change.before, None);
        let record = registry.view().get(&RunId::new("r1")).cloned().unwrap();
        assert_eq!(record.status, Some(RunStatus::Pending));
    }

    #[test]
    fn repeated_upsert_is_unchanged() {
        let mut registry = RunRegistry::new();
        let event = upsert("r1", json!({"status": "pending", "analysis": {"score": 1}}));
        registry.apply(&event);
        let once = registry.snapshot();
        let change = registry.apply(&event);
        assert_eq!(change.kind, ChangeKind::Unchanged);
        assert_eq!(registry.snapshot(), once);
        assert_eq!(registry.version(), 2);
    }

    #[test]
    fn delete_leaves_tombstone_until_recreated() {
        let mut registry = RunRegistry::new();
        registry.apply(&upsert("r1", json!({"status": "pending"})));

        let change = registry.apply(&delete("r1"));
        assert_eq!(change.kind, ChangeKind::Deleted);
        assert!(change.before.is_some());
        assert!(registry.view().is_deleted(&RunId::new("r1")));
        assert!(registry.view().is_empty());

        let change = registry.apply(&upsert("r1", json!({"status": "failed"})));
        assert_eq!(change.kind, ChangeKind::Created);
        assert!(!registry.view().is_deleted(&RunId::new("r1")));
    }

    #[test]
    fn delete_of_unknown_id_is_recorded() {
        let mut registry = RunRegistry::new();
        let change = registry.apply(&delete("ghost"));
        assert_eq!(change.kind, ChangeKind::DeletedUnknown);
        assert!(registry.view().is_deleted(&RunId::new("ghost")));
    }

    #[test]
    fn listeners_observe_fully_merged_state() {
        let mut registry = RunRegistry::new();
        registry.apply(&upsert(
            "r1",
            json!({"status": "pending", "narrativeOutput": "Started."}),
        ));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        let subscription = registry.subscribe(move |change, view| {
            let record = view.get(&change.id).cloned();
            seen2.borrow_mut().push((change.kind, record));
        });

        registry.apply(&upsert("r1", json!({"status": "succeeded"})));
        {
            let seen = seen.borrow();
            assert_eq!(seen.len(), 1);
            let (kind, record) = &seen[0];
            assert_eq!(*kind, ChangeKind::Updated);
            let record = record.as_ref().unwrap();
            assert_eq!(record.status, Some(RunStatus::Succeeded));
            assert_eq!(record.narrative_output.as_deref(), Some("Started."));
        }

        assert!(registry.unsubscribe(subscription));
        assert!(!registry.unsubscribe(subscription));
        registry.apply(&delete("r1"));
        assert_eq!(seen.borrow().len(), 1, "no notifications after unsubscribe");
    }

    #[proptest]
    fn applying_each_event_twice_matches_applying_once(
        #[strategy(proptest::collection::vec((0u8..4, any::<RunStatus>(), any::<bool>()), 1..16))]
        updates: Vec<(u8, RunStatus, bool)>,
    ) {
        let mut once = RunRegistry::new();
        let mut twice = RunRegistry::new();
        for (n, status, is_delete) in updates {
            let id = format!("r{n}");
            let event = if is_delete {
                delete(&id)
            } else {
                upsert(&id, json!({"status": status}))
            };
            once.apply(&event);
            twice.apply(&event);
            let change = twice.apply(&event);
            prop_assert!(matches!(
                change.kind,
                ChangeKind::Unchanged | ChangeKind::DeletedUnknown
            ));
        }
        prop_assert_eq!(once.snapshot(), twice.snapshot());
    }
}
