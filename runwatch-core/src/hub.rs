// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The process-wide run hub.
//!
//! A [`RunHub`] owns the [`RunRegistry`] and the load sequencer, and mounts
//! scoped views on top of them. The registry itself is never handed out: all
//! writes go through [`RunHub::apply`].
//!
//! Everything here is single-threaded. The hub is installed once per thread
//! with [`RunHub::install`] and torn down with [`RunHub::teardown`].

use crate::{
    errors::{LoadError, RegistryBusy},
    filter::FilterOptions,
    loader::{PersonaLookup, RunSource, SnapshotLoader},
    record::RunRecord,
    registry::{RegistryChange, RegistryView, RunRegistry, SubscriptionId},
    view::{RunScope, ScopedViewReconciler, SortOrder, ViewPhase, ViewScope, ViewState},
};
use debug_ignore::DebugIgnore;
use runwatch_metadata::RunEvent;
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::Rc,
};
use tracing::{debug, error, warn};

thread_local! {
    static CURRENT_HUB: RefCell<Option<RunHub>> = const { RefCell::new(None) };
}

/// Owns the run registry and mounts scoped views over it.
///
/// Cloning a hub is cheap and yields a handle to the same state.
#[derive(Clone, Debug)]
pub struct RunHub {
    inner: Rc<HubInner>,
}

#[derive(Debug)]
struct HubInner {
    registry: RefCell<RunRegistry>,
    loads: RefCell<LoadSequencer>,
    next_mount: Cell<u64>,
    personas: DebugIgnore<Option<Rc<dyn PersonaLookup>>>,
    sort: SortOrder,
}

impl Default for RunHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RunHub {
    /// Creates a new hub with an empty registry.
    pub fn new() -> Self {
        RunHubBuilder::default().build()
    }

    /// Returns a builder for a hub with non-default view settings.
    pub fn builder() -> RunHubBuilder {
        RunHubBuilder::default()
    }

    /// Installs this hub as the current hub for this thread, returning a
    /// handle to it.
    ///
    /// A previously installed hub is replaced.
    pub fn install(self) -> Self {
        CURRENT_HUB.with(|current| {
            if current.borrow_mut().replace(self.clone()).is_some() {
                warn!("replacing previously installed run hub");
            }
        });
        debug!("installed run hub");
        self
    }

    /// Returns the hub installed on this thread, if any.
    pub fn current() -> Option<Self> {
        CURRENT_HUB.with(|current| current.borrow().clone())
    }

    /// Uninstalls the current hub. Returns false if no hub was installed.
    ///
    /// Handles to the hub stay valid; the hub is dropped once the last handle
    /// goes away.
    pub fn teardown() -> bool {
        let removed = CURRENT_HUB.with(|current| current.borrow_mut().take());
        if removed.is_some() {
            debug!("tore down run hub");
        }
        removed.is_some()
    }

    /// Applies a real-time event to the registry.
    ///
    /// Mounted views observe the change before this returns. Fails if called
    /// from within a registry listener.
    pub fn apply(&self, event: &RunEvent) -> Result<RegistryChange, RegistryBusy> {
        let mut registry = self
            .inner
            .registry
            .try_borrow_mut()
            .map_err(|_| RegistryBusy)?;
        Ok(registry.apply(event))
    }

    /// Returns a point-in-time copy of every known record.
    pub fn snapshot(&self) -> Result<Vec<RunRecord>, RegistryBusy> {
        let registry = self.inner.registry.try_borrow().map_err(|_| RegistryBusy)?;
        Ok(registry.snapshot())
    }

    /// Subscribes a listener to registry changes.
    pub fn subscribe(
        &self,
        listener: impl FnMut(&RegistryChange, RegistryView<'_>) + 'static,
    ) -> Result<SubscriptionId, RegistryBusy> {
        let mut registry = self
            .inner
            .registry
            .try_borrow_mut()
            .map_err(|_| RegistryBusy)?;
        Ok(registry.subscribe(listener))
    }

    /// Unsubscribes a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, RegistryBusy> {
        let mut registry = self
            .inner
            .registry
            .try_borrow_mut()
            .map_err(|_| RegistryBusy)?;
        Ok(registry.unsubscribe(id))
    }

    /// Mounts a view for the given scope.
    ///
    /// The view observes registry changes until it is dropped.
    pub fn mount<S: ViewScope + 'static>(&self, scope: S) -> Result<MountedView<S>, RegistryBusy> {
        let mount = MountId(self.inner.next_mount.get());
        self.inner.next_mount.set(mount.0 + 1);

        let reconciler = Rc::new(RefCell::new(
            ScopedViewReconciler::new(scope)
                .with_sort(self.inner.sort)
                .with_personas(self.inner.personas.0.clone()),
        ));
        let weak = Rc::downgrade(&reconciler);
        let subscription = self.subscribe(move |change, view| {
            let Some(reconciler) = weak.upgrade() else {
                return;
            };
            match reconciler.try_borrow_mut() {
                Ok(mut reconciler) => {
                    reconciler.observe(change, view);
                }
                Err(_) => {
                    error!(id = %change.id, "view is busy, dropping registry change");
                }
            }
        })?;

        debug!(
            %mount,
            scope = %reconciler.borrow().fetch_scope(),
            "mounted view"
        );
        Ok(MountedView {
            hub: self.clone(),
            mount,
            subscription,
            latest_applied: Cell::new(0),
            reconciler,
        })
    }

    /// Returns the number of registry listeners, which includes one per
    /// mounted view.
    pub fn listener_count(&self) -> Result<usize, RegistryBusy> {
        let registry = self.inner.registry.try_borrow().map_err(|_| RegistryBusy)?;
        Ok(registry.listener_count())
    }
}

/// Configures the views a [`RunHub`] mounts.
///
/// Settings are fixed once the hub is built, since every mounted view shares
/// them.
#[derive(Debug, Default)]
pub struct RunHubBuilder {
    personas: DebugIgnore<Option<Rc<dyn PersonaLookup>>>,
    sort: SortOrder,
}

impl RunHubBuilder {
    /// Backfills persona display fields of mounted views from `personas`.
    pub fn set_personas(&mut self, personas: Rc<dyn PersonaLookup>) -> &mut Self {
        self.personas = DebugIgnore(Some(personas));
        self
    }

    /// Lists runs in mounted views in the given order.
    pub fn set_sort(&mut self, sort: SortOrder) -> &mut Self {
        self.sort = sort;
        self
    }

    /// Creates a hub with an empty registry.
    pub fn build(&self) -> RunHub {
        RunHub {
            inner: Rc::new(HubInner {
                registry: RefCell::new(RunRegistry::new()),
                loads: RefCell::new(LoadSequencer::default()),
                next_mount: Cell::new(0),
                personas: DebugIgnore(self.personas.0.clone()),
                sort: self.sort,
            }),
        }
    }
}

/// Issues load tickets, numbered in request order per scope.
#[derive(Debug, Default)]
struct LoadSequencer {
    issued: HashMap<RunScope, u64>,
}

impl LoadSequencer {
    fn begin(&mut self, scope: RunScope, mount: MountId) -> LoadTicket {
        let issued = self.issued.entry(scope.clone()).or_default();
        *issued += 1;
        LoadTicket {
            scope,
            sequence: *issued,
            mount,
        }
    }
}

/// Identifies a single mount of a view.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct MountId(u64);

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mount-{}", self.0)
    }
}

/// Identifies an in-flight snapshot load.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoadTicket {
    scope: RunScope,
    sequence: u64,
    mount: MountId,
}

impl LoadTicket {
    /// Returns the scope to fetch.
    pub fn scope(&self) -> &RunScope {
        &self.scope
    }

    /// Returns the position of this load among loads of the same scope.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// The result of completing a load.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadOutcome {
    /// The snapshot was merged into the view.
    Applied,

    /// A newer load had already completed, or the ticket belongs to another
    /// mount. The response was discarded.
    Stale,

    /// The load failed. The view shows an error if it had no data yet, and
    /// keeps its list otherwise.
    Failed,
}

/// A view mounted on a [`RunHub`].
///
/// Dropping the view unsubscribes it from the registry.
#[derive(Debug)]
pub struct MountedView<S: ViewScope + 'static> {
    hub: RunHub,
    mount: MountId,
    subscription: SubscriptionId,
    latest_applied: Cell<u64>,
    reconciler: Rc<RefCell<ScopedViewReconciler<S>>>,
}

impl<S: ViewScope + 'static> MountedView<S> {
    /// Returns the mount id.
    pub fn mount_id(&self) -> MountId {
        self.mount
    }

    /// Returns what the view currently shows.
    pub fn state(&self) -> ViewState {
        self.reconciler.borrow().state()
    }

    /// Returns the current phase.
    pub fn phase(&self) -> ViewPhase {
        self.reconciler.borrow().phase()
    }

    /// Returns the number of times the visible state has changed.
    pub fn generation(&self) -> u64 {
        self.reconciler.borrow().generation()
    }

    /// Returns the error of the most recent load, if it failed.
    pub fn last_load_error(&self) -> Option<Rc<LoadError>> {
        self.reconciler.borrow().last_load_error().cloned()
    }

    /// Returns the scope snapshots are fetched for.
    pub fn fetch_scope(&self) -> RunScope {
        self.reconciler.borrow().fetch_scope()
    }

    /// Returns the filter options for the visible list, if the view is ready.
    pub fn filter_options(&self) -> Option<FilterOptions> {
        let reconciler = self.reconciler.borrow();
        let spans_multiple_tests = reconciler.scope().spans_multiple_tests();
        reconciler
            .state()
            .records()
            .map(|records| FilterOptions::derive(records, spans_multiple_tests))
    }

    /// Starts a load for this view's scope.
    pub fn begin_load(&self) -> LoadTicket {
        let scope = self.fetch_scope();
        self.hub.inner.loads.borrow_mut().begin(scope, self.mount)
    }

    /// Completes a load started with [`Self::begin_load`].
    ///
    /// A response is discarded if this view has already applied a newer load
    /// of the same scope, or if the ticket was issued to another mount.
    /// Failed loads never make a later-completing older success stale.
    pub fn complete_load(
        &self,
        ticket: LoadTicket,
        result: Result<Vec<RunRecord>, LoadError>,
    ) -> Result<LoadOutcome, RegistryBusy> {
        if ticket.mount != self.mount {
            debug!(
                mount = %self.mount,
                ticket_mount = %ticket.mount,
                "discarding load issued to another mount"
            );
            return Ok(LoadOutcome::Stale);
        }
        if ticket.sequence <= self.latest_applied.get() {
            debug!(
                scope = %ticket.scope,
                sequence = ticket.sequence,
                latest = self.latest_applied.get(),
                "discarding stale load"
            );
            return Ok(LoadOutcome::Stale);
        }

        match result {
            Ok(records) => {
                let registry = self
                    .hub
                    .inner
                    .registry
                    .try_borrow()
                    .map_err(|_| RegistryBusy)?;
                self.latest_applied.set(ticket.sequence);
                self.reconciler
                    .borrow_mut()
                    .seed(records, registry.view());
                Ok(LoadOutcome::Applied)
            }
            Err(error) => {
                self.reconciler.borrow_mut().load_failed(error);
                Ok(LoadOutcome::Failed)
            }
        }
    }

    /// Loads this view's scope with `loader` and merges the result.
    pub async fn refresh<Src: RunSource>(
        &self,
        loader: &SnapshotLoader<Src>,
    ) -> Result<LoadOutcome, RegistryBusy> {
        let ticket = self.begin_load();
        let result = loader.load(ticket.scope()).await;
        self.complete_load(ticket, result)
    }
}

impl<S: ViewScope + 'static> Drop for MountedView<S> {
    fn drop(&mut self) {
        match self.hub.unsubscribe(self.subscription) {
            Ok(_) => debug!(mount = %self.mount, "unmounted view"),
            Err(RegistryBusy) => {
                // The listener holds a weak reference, so it becomes a no-op.
                debug!(mount = %self.mount, "registry busy while unmounting view");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::FetchError,
        loader::{InMemoryRunSource, PersonaDirectory},
        test_helpers::{delete, record, upsert, wire},
    };
    use pretty_assertions::assert_eq;
    use runwatch_metadata::{PersonaId, ProjectId, WirePersona};
    use serde_json::json;

    fn p1() -> RunScope {
        RunScope::Project(ProjectId::new("p1"))
    }

    fn visible_ids<S: ViewScope + 'static>(view: &MountedView<S>) -> Vec<String> {
        view.state()
            .records()
            .expect("view is ready")
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    }

    #[test]
    fn install_current_teardown() {
        assert!(RunHub::current().is_none());
        let hub = RunHub::new().install();
        hub.apply(&upsert("r1", json!({}))).unwrap();

        let current = RunHub::current().expect("hub installed");
        assert_eq!(current.snapshot().unwrap().len(), 1);

        assert!(RunHub::teardown());
        assert!(!RunHub::teardown());
        assert!(RunHub::current().is_none());
    }

    #[test]
    fn builder_settings_apply_to_every_mounted_view() {
        let personas = PersonaDirectory::from_personas([WirePersona {
            id: PersonaId::new("alice"),
            name: "Alice".to_owned(),
            avatar_url: None,
        }]);
        let hub = RunHub::builder()
            .set_sort(SortOrder::OldestFirst)
            .set_personas(Rc::new(personas))
            .build();
        hub.apply(&upsert(
            "r1",
            json!({"personaId": "alice", "createdAt": "2026-01-01T00:00:00Z"}),
        ))
        .unwrap();

        // Clones share the registry the first event went into.
        let view = hub.clone().mount(RunScope::All).unwrap();
        let ticket = view.begin_load();
        assert_eq!(
            view.complete_load(ticket, Ok(Vec::new())).unwrap(),
            LoadOutcome::Applied
        );
        hub.apply(&upsert("r2", json!({"createdAt": "2026-02-01T00:00:00Z"})))
            .unwrap();

        assert_eq!(visible_ids(&view), ["r1", "r2"]);
        let state = view.state();
        let records = state.records().expect("view is ready");
        assert_eq!(records[0].persona_name.as_deref(), Some("Alice"));
        assert_eq!(hub.snapshot().unwrap().len(), 2);
    }

    #[test]
    fn listeners_cannot_reenter_the_registry() {
        let hub = RunHub::new();
        let result = Rc::new(RefCell::new(None));
        let hub2 = hub.clone();
        let result2 = result.clone();
        hub.subscribe(move |_, _| {
            *result2.borrow_mut() = Some(hub2.apply(&delete("r1")));
        })
        .unwrap();

        hub.apply(&upsert("r1", json!({}))).unwrap();
        assert_eq!(*result.borrow(), Some(Err(RegistryBusy)));
        assert_eq!(hub.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn dropping_a_view_unsubscribes() {
        let hub = RunHub::new();
        let view = hub.mount(p1()).unwrap();
        assert_eq!(hub.listener_count().unwrap(), 1);
        drop(view);
        assert_eq!(hub.listener_count().unwrap(), 0);
    }

    #[test]
    fn mounted_views_follow_registry_events() {
        let hub = RunHub::new();
        let view = hub.mount(p1()).unwrap();
        let ticket = view.begin_load();
        view.complete_load(
            ticket,
            Ok(vec![record(json!({"id": "r1", "projectId": "p1", "status": "pending"}))]),
        )
        .unwrap();

        hub.apply(&upsert("r1", json!({"status": "succeeded"}))).unwrap();
        assert_eq!(view.phase(), ViewPhase::Live);
        hub.apply(&delete("r1")).unwrap();
        assert_eq!(visible_ids(&view), Vec::<String>::new());
    }

    #[test]
    fn older_load_completing_late_is_stale() {
        let hub = RunHub::new();
        let view = hub.mount(p1()).unwrap();
        let first = view.begin_load();
        let second = view.begin_load();
        assert!(second.sequence() > first.sequence());

        let outcome = view
            .complete_load(second, Ok(vec![record(json!({"id": "new", "projectId": "p1"}))]))
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Applied);

        let outcome = view
            .complete_load(first, Ok(vec![record(json!({"id": "old", "projectId": "p1"}))]))
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Stale);
        assert_eq!(visible_ids(&view), ["new"]);
    }

    #[test]
    fn failed_newer_load_does_not_discard_older_success() {
        let hub = RunHub::new();
        let view = hub.mount(p1()).unwrap();
        let first = view.begin_load();
        let second = view.begin_load();

        let error = LoadError::new(p1(), FetchError::Unauthorized);
        assert_eq!(
            view.complete_load(second, Err(error)).unwrap(),
            LoadOutcome::Failed
        );
        assert!(matches!(view.state(), ViewState::Failed(_)));

        assert_eq!(
            view.complete_load(first, Ok(vec![record(json!({"id": "r1", "projectId": "p1"}))]))
                .unwrap(),
            LoadOutcome::Applied
        );
        assert_eq!(visible_ids(&view), ["r1"]);
    }

    #[test]
    fn tickets_from_a_previous_mount_are_stale() {
        let hub = RunHub::new();
        let first_mount = hub.mount(p1()).unwrap();
        let ticket = first_mount.begin_load();
        drop(first_mount);

        let remount = hub.mount(p1()).unwrap();
        let outcome = remount
            .complete_load(ticket, Ok(vec![record(json!({"id": "r1", "projectId": "p1"}))]))
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Stale);
        assert!(matches!(remount.state(), ViewState::Loading));
    }

    #[test]
    fn views_with_the_same_scope_load_independently() {
        let hub = RunHub::new();
        let a = hub.mount(p1()).unwrap();
        let b = hub.mount(p1()).unwrap();
        let a_ticket = a.begin_load();
        let b_ticket = b.begin_load();

        b.complete_load(b_ticket, Ok(Vec::new())).unwrap();
        assert_eq!(
            a.complete_load(a_ticket, Ok(Vec::new())).unwrap(),
            LoadOutcome::Applied
        );
    }

    #[tokio::test]
    async fn refresh_loads_through_the_loader() {
        let hub = RunHub::new();
        let source = InMemoryRunSource::new(vec![
            wire(json!({"id": "r1", "projectId": "p1"})),
            wire(json!({"id": "r2", "projectId": "p2"})),
        ]);
        let loader = SnapshotLoader::new(source);
        let view = hub.mount(p1()).unwrap();

        assert_eq!(view.refresh(&loader).await.unwrap(), LoadOutcome::Applied);
        assert_eq!(visible_ids(&view), ["r1"]);

        loader.source().set_failure(Some("offline".to_owned()));
        assert_eq!(view.refresh(&loader).await.unwrap(), LoadOutcome::Failed);
        assert_eq!(visible_ids(&view), ["r1"]);
        assert!(view.last_load_error().is_some());
    }
}
