// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loading run snapshots.
//!
//! A [`RunSource`] fetches raw wire records for a [`RunScope`]. The
//! [`SnapshotLoader`] normalizes them into [`RunRecord`]s, stamps missing
//! scope ids and enriches persona display fields on a best-effort basis.
//!
//! Deciding whether a completed load is stale is left to the view that
//! requested it (see [`MountedView`](crate::hub::MountedView)).

mod persona;

pub use persona::*;

use crate::{
    errors::{FetchError, LoadError},
    record::{RunRecord, merge_logged},
    view::RunScope,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use runwatch_metadata::{RunId, WireRunRecord};
use std::{cell::RefCell, future::Future, rc::Rc};
use tracing::debug;

/// A source of run snapshots, such as a REST endpoint.
pub trait RunSource {
    /// Fetches every run in a scope. The order of the result is not
    /// meaningful.
    fn fetch(
        &self,
        scope: &RunScope,
    ) -> impl Future<Output = Result<Vec<WireRunRecord>, FetchError>>;
}

/// Loads normalized snapshots from a [`RunSource`].
pub struct SnapshotLoader<Src> {
    source: Src,
    personas: Option<Rc<dyn PersonaLookup>>,
}

impl<Src: RunSource> SnapshotLoader<Src> {
    /// Creates a loader without persona enrichment.
    pub fn new(source: Src) -> Self {
        Self {
            source,
            personas: None,
        }
    }

    /// Sets the persona cache used for enrichment.
    pub fn with_personas(mut self, personas: Rc<dyn PersonaLookup>) -> Self {
        self.personas = Some(personas);
        self
    }

    /// Returns the underlying source.
    pub fn source(&self) -> &Src {
        &self.source
    }

    /// Loads the runs of a scope.
    ///
    /// An empty scope is `Ok(vec![])`, never an error. Duplicate ids in the
    /// response are merged in order.
    pub async fn load(&self, scope: &RunScope) -> Result<Vec<RunRecord>, LoadError> {
        let wire = self
            .source
            .fetch(scope)
            .await
            .map_err(|error| LoadError::new(scope.clone(), error))?;
        let fetched = wire.len();

        let mut records: IndexMap<RunId, RunRecord> = IndexMap::with_capacity(fetched);
        for wire in wire {
            let mut record = RunRecord::from_wire(wire);
            scope.stamp(&mut record);
            if let Some(existing) = records.get_mut(record.id()) {
                debug!(run = %record.id(), "duplicate run in snapshot, merging");
                merge_logged(existing, record.id(), &record.to_patch());
                continue;
            }
            records.insert(record.id().clone(), record);
        }

        let mut enriched = 0;
        if let Some(personas) = &self.personas {
            for record in records.values_mut() {
                if enrich_persona(record, personas.as_ref()) {
                    enriched += 1;
                }
            }
        }

        debug!(
            %scope,
            fetched,
            loaded = records.len(),
            enriched,
            "loaded snapshot"
        );
        Ok(records.into_values().collect())
    }
}

/// A [`RunSource`] reading a JSON array of runs from a file.
///
/// Scope filtering is applied after reading, the way a server would apply
/// it.
#[derive(Clone, Debug)]
pub struct FileRunSource {
    path: Utf8PathBuf,
}

impl FileRunSource {
    /// Creates a new source for the given path.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path this source reads from.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl RunSource for FileRunSource {
    async fn fetch(&self, scope: &RunScope) -> Result<Vec<WireRunRecord>, FetchError> {
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|error| FetchError::Read {
                    path: self.path.clone(),
                    error,
                })?;
        let records: Vec<WireRunRecord> =
            serde_json::from_str(&contents).map_err(|error| FetchError::Parse {
                path: Some(self.path.clone()),
                error,
            })?;
        Ok(records
            .into_iter()
            .filter(|record| scope.contains_wire(record))
            .collect())
    }
}

/// A [`RunSource`] serving runs held in memory.
///
/// Useful for tests and for replaying captured data. A failure can be
/// injected to exercise error handling.
#[derive(Debug, Default)]
pub struct InMemoryRunSource {
    records: RefCell<Vec<WireRunRecord>>,
    failure: RefCell<Option<String>>,
}

impl InMemoryRunSource {
    /// Creates a source serving the given runs.
    pub fn new(records: Vec<WireRunRecord>) -> Self {
        Self {
            records: RefCell::new(records),
            failure: RefCell::new(None),
        }
    }

    /// Replaces the runs served by later fetches.
    pub fn set_records(&self, records: Vec<WireRunRecord>) {
        *self.records.borrow_mut() = records;
    }

    /// Makes later fetches fail with a network error, or succeed again if
    /// `message` is `None`.
    pub fn set_failure(&self, message: Option<String>) {
        *self.failure.borrow_mut() = message;
    }
}

impl RunSource for InMemoryRunSource {
    async fn fetch(&self, scope: &RunScope) -> Result<Vec<WireRunRecord>, FetchError> {
        if let Some(message) = self.failure.borrow().clone() {
            return Err(FetchError::Network { message });
        }
        Ok(self
            .records
            .borrow()
            .iter()
            .filter(|record| scope.contains_wire(record))
            .cloned()
            .collect())
    }
}

impl<Src: RunSource> RunSource for Rc<Src> {
    fn fetch(
        &self,
        scope: &RunScope,
    ) -> impl Future<Output = Result<Vec<WireRunRecord>, FetchError>> {
        (**self).fetch(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::wire;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use runwatch_metadata::{PersonaId, ProjectId, WirePersona};
    use serde_json::json;

    #[tokio::test]
    async fn load_normalizes_references_and_filters_scope() {
        let source = InMemoryRunSource::new(vec![
            wire(json!({"_id": "r1", "project": {"_id": "p1", "name": "Shop"}, "status": "pending"})),
            wire(json!({"id": "r2", "projectId": "p2"})),
        ]);
        let loader = SnapshotLoader::new(source);

        let records = loader
            .load(&RunScope::Project(ProjectId::new("p1")))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id().as_str(), "r1");
        assert_eq!(records[0].project_id, Some(ProjectId::new("p1")));
    }

    struct UnfilteredSource(Vec<WireRunRecord>);

    impl RunSource for UnfilteredSource {
        async fn fetch(&self, _: &RunScope) -> Result<Vec<WireRunRecord>, FetchError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn missing_scope_ids_are_stamped() {
        let loader = SnapshotLoader::new(UnfilteredSource(vec![wire(json!({"id": "r1"}))]));
        let records = loader
            .load(&RunScope::Project(ProjectId::new("p1")))
            .await
            .unwrap();
        assert_eq!(records[0].project_id, Some(ProjectId::new("p1")));
    }

    #[tokio::test]
    async fn empty_scope_is_not_an_error() {
        let loader = SnapshotLoader::new(InMemoryRunSource::default());
        let records = loader.load(&RunScope::All).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn fetch_failures_become_load_errors() {
        let source = InMemoryRunSource::default();
        source.set_failure(Some("connection refused".to_owned()));
        let loader = SnapshotLoader::new(source);

        let err = loader.load(&RunScope::All).await.unwrap_err();
        assert_eq!(err.scope(), &RunScope::All);
        assert_eq!(err.kind(), crate::errors::LoadErrorKind::Transport);
    }

    #[tokio::test]
    async fn duplicate_ids_are_merged() {
        let source = InMemoryRunSource::new(vec![
            wire(json!({"id": "r1", "narrativeOutput": "first"})),
            wire(json!({"id": "r1", "status": "failed", "narrativeOutput": ""})),
        ]);
        let records = SnapshotLoader::new(source)
            .load(&RunScope::All)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].narrative_output.as_deref(), Some("first"));
        assert_eq!(
            records[0].status,
            Some(runwatch_metadata::RunStatus::Failed)
        );
    }

    #[tokio::test]
    async fn personas_are_enriched() {
        let personas = PersonaDirectory::from_personas([WirePersona {
            id: PersonaId::new("alice"),
            name: "Alice".to_owned(),
            avatar_url: None,
        }]);
        let source = InMemoryRunSource::new(vec![
            wire(json!({"id": "r1", "persona": "alice"})),
            wire(json!({"id": "r2", "persona": "ghost"})),
        ]);
        let loader = SnapshotLoader::new(source).with_personas(Rc::new(personas));
        let records = loader.load(&RunScope::All).await.unwrap();
        assert_eq!(records[0].persona_label(), Some("Alice"));
        assert_eq!(records[1].persona_label(), Some("ghost"));
    }

    #[tokio::test]
    async fn file_source_reads_and_filters() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("runs.json");
        std::fs::write(
            &path,
            r#"[{"id": "r1", "test": "t1"}, {"id": "r2", "test": {"_id": "t2"}}]"#,
        )
        .unwrap();

        let source = FileRunSource::new(path.clone());
        let scope = RunScope::Test(runwatch_metadata::TestId::new("t2"));
        let records = source.fetch(&scope).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_str(), "r2");

        std::fs::write(&path, "not json").unwrap();
        let err = source.fetch(&scope).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = Utf8TempDir::new().unwrap();
        let source = FileRunSource::new(dir.path().join("missing.json"));
        let err = source.fetch(&RunScope::All).await.unwrap_err();
        assert!(matches!(err, FetchError::Read { .. }), "{err:?}");
    }
}
