// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::sorted_ids;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use runwatch_core::{
    errors::EventLogError,
    event_log::EventLogReader,
    filter::RunFilters,
    hub::{LoadOutcome, RunHub},
    loader::{FileRunSource, PersonaDirectory, SnapshotLoader},
    reporter::ViewDisplay,
    view::{RunScope, ViewState},
};
use runwatch_metadata::ProjectId;
use std::rc::Rc;

const RUNS: &str = indoc! {r#"
    [
        {"_id": "r1", "project": {"_id": "p1", "name": "Shop"}, "test": {"_id": "t1", "name": "Checkout"}, "persona": "alice", "status": "pending", "executionState": "running", "createdAt": "2026-01-02T10:00:00Z"},
        {"_id": "r2", "project": "p1", "test": "t2", "status": "failed", "executionState": "finished", "createdAt": "2026-01-01T10:00:00Z"},
        {"_id": "r3", "project": "p2", "status": "succeeded"}
    ]
"#};

const EVENTS: &str = indoc! {r#"
    {"id": "r1", "kind": "upsert", "fields": {"status": "succeeded", "executionState": "finished"}}

    {"id": "r9", "kind": "upsert", "fields": {"projectId": "p3"}}
    {"id": "r2", "kind": "delete"}
"#};

const PERSONAS: &str = r#"[{"id": "alice", "name": "Alice"}]"#;

#[tokio::test]
async fn replay_from_files() -> Result<()> {
    let dir = Utf8TempDir::new()?;
    let runs_path = dir.path().join("runs.json");
    let events_path = dir.path().join("events.jsonl");
    let personas_path = dir.path().join("personas.json");
    std::fs::write(&runs_path, RUNS)?;
    std::fs::write(&events_path, EVENTS)?;
    std::fs::write(&personas_path, PERSONAS)?;

    let personas = Rc::new(PersonaDirectory::load(&personas_path).await?);
    let loader = SnapshotLoader::new(FileRunSource::new(runs_path)).with_personas(personas);
    let hub = RunHub::new();
    let view = hub.mount(RunScope::Project(ProjectId::new("p1")))?;
    assert_eq!(view.refresh(&loader).await?, LoadOutcome::Applied);
    assert_eq!(sorted_ids(&view), ["r1", "r2"]);

    for event in EventLogReader::open(&events_path)? {
        hub.apply(&event?)?;
    }
    assert_eq!(sorted_ids(&view), ["r1"]);

    let state = view.state();
    let filters = RunFilters::default();
    let display = ViewDisplay::new("project `p1`", view.phase(), &state, &filters, "-");
    assert_eq!(
        display.to_string(),
        "project `p1`: 1 run (live)\n  r1  succeeded  finished  Alice  Checkout\n"
    );
    Ok(())
}

#[tokio::test]
async fn snapshots_are_sorted_newest_first() -> Result<()> {
    let dir = Utf8TempDir::new()?;
    let runs_path = dir.path().join("runs.json");
    std::fs::write(&runs_path, RUNS)?;

    let loader = SnapshotLoader::new(FileRunSource::new(runs_path));
    let hub = RunHub::new();
    let view = hub.mount(RunScope::All)?;
    view.refresh(&loader).await?;

    let ViewState::Ready(records) = view.state() else {
        panic!("expected ready state");
    };
    let ids: Vec<&str> = records.iter().map(|r| r.id().as_str()).collect();
    // Runs without a creation time sort last.
    assert_eq!(ids, ["r1", "r2", "r3"]);
    Ok(())
}

#[test]
fn invalid_event_logs_report_the_line() -> Result<()> {
    let dir = Utf8TempDir::new()?;
    let events_path = dir.path().join("events.jsonl");
    std::fs::write(&events_path, "{\"id\": \"r1\", \"kind\": \"delete\"}\n{not json}\n")?;

    let results: Vec<_> = EventLogReader::open(&events_path)?.collect();
    assert_eq!(results.len(), 2);
    let Err(error) = &results[1] else {
        panic!("expected second line to fail");
    };
    assert!(matches!(error, EventLogError::Parse { line: 2, .. }), "{error:?}");
    Ok(())
}
