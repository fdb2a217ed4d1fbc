// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;
use runwatch_core::{
    filter::{FilterValue, RunFilters, project},
    hub::{LoadOutcome, RunHub},
    loader::PersonaDirectory,
    registry::ChangeKind,
    view::{RunScope, ViewPhase, ViewState},
};
use runwatch_metadata::{
    ExecutionState, PersonaId, ProjectId, RunStatus, TestId, WirePersona,
};
use serde_json::json;
use std::rc::Rc;

fn p1() -> RunScope {
    RunScope::Project(ProjectId::new("p1"))
}

#[tokio::test]
async fn status_update_reaches_a_seeded_view() -> Result<()> {
    let hub = RunHub::new();
    let (_, loader) = memory_loader(vec![json!({"id": "1", "projectId": "p1", "status": "pending"})]);
    let view = hub.mount(p1())?;
    assert_eq!(view.refresh(&loader).await?, LoadOutcome::Applied);

    hub.apply(&upsert("1", json!({"status": "succeeded"})))?;

    let ViewState::Ready(records) = view.state() else {
        panic!("expected ready state");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id().as_str(), "1");
    assert_eq!(records[0].status, Some(RunStatus::Succeeded));
    Ok(())
}

#[tokio::test]
async fn irrelevant_event_before_snapshot_does_not_block_empty_state() -> Result<()> {
    let hub = RunHub::new();
    let (_, loader) = memory_loader(Vec::new());
    let view = hub.mount(RunScope::Test(TestId::new("T")))?;
    assert!(matches!(view.state(), ViewState::Loading));

    hub.apply(&upsert("99", json!({"testId": "other"})))?;
    view.refresh(&loader).await?;

    assert_eq!(sorted_ids(&view), Vec::<String>::new());
    assert_eq!(view.phase(), ViewPhase::Seeded);
    Ok(())
}

#[tokio::test]
async fn deleting_the_last_known_run_shows_empty_state() -> Result<()> {
    let hub = RunHub::new();
    let (_, loader) = memory_loader(vec![json!({"id": "5", "projectId": "p1"})]);
    let view = hub.mount(p1())?;
    view.refresh(&loader).await?;
    assert_eq!(sorted_ids(&view), ["5"]);

    let change = hub.apply(&delete("5"))?;
    assert_eq!(change.kind, ChangeKind::DeletedUnknown);
    assert_eq!(sorted_ids(&view), Vec::<String>::new());
    assert_eq!(view.phase(), ViewPhase::Live);
    Ok(())
}

#[tokio::test]
async fn unrelated_events_never_disturb_a_seeded_view() -> Result<()> {
    let hub = RunHub::new();
    let (_, loader) = memory_loader(vec![
        json!({"id": "r1", "projectId": "p1"}),
        json!({"id": "r2", "projectId": "p1"}),
    ]);
    let view = hub.mount(p1())?;
    view.refresh(&loader).await?;
    let generation = view.generation();

    hub.apply(&upsert("x1", json!({"projectId": "p2", "status": "failed"})))?;
    hub.apply(&delete("x2"))?;
    hub.apply(&upsert("x3", json!({"status": "pending"})))?;

    ensure!(
        view.generation() == generation,
        "unrelated events published a new list"
    );
    assert_eq!(view.phase(), ViewPhase::Seeded);
    assert_eq!(sorted_ids(&view), ["r1", "r2"]);
    Ok(())
}

#[tokio::test]
async fn once_live_every_change_is_applied() -> Result<()> {
    let hub = RunHub::new();
    let (_, loader) = memory_loader(vec![
        json!({"id": "r1", "projectId": "p1"}),
        json!({"id": "r2", "projectId": "p1"}),
    ]);
    let view = hub.mount(p1())?;
    view.refresh(&loader).await?;

    hub.apply(&upsert("r3", json!({"projectId": "p1"})))?;
    assert_eq!(view.phase(), ViewPhase::Live);
    assert_eq!(sorted_ids(&view), ["r1", "r2", "r3"]);

    // Moving a run to another project drops it.
    hub.apply(&upsert("r3", json!({"projectId": "p2"})))?;
    assert_eq!(sorted_ids(&view), ["r1", "r2"]);

    hub.apply(&delete("r1"))?;
    hub.apply(&delete("r2"))?;
    assert_eq!(sorted_ids(&view), Vec::<String>::new());
    Ok(())
}

#[tokio::test]
async fn rich_fields_survive_partial_events() -> Result<()> {
    let hub = RunHub::new();
    let (_, loader) = memory_loader(vec![json!({
        "id": "r1",
        "projectId": "p1",
        "status": "pending",
        "narrativeOutput": "The persona found the checkout button.",
        "analysis": {"score": 4},
        "screenshotSteps": [{"url": "https://example.com/1.png", "description": "home"}],
    })]);
    let view = hub.mount(p1())?;
    view.refresh(&loader).await?;

    hub.apply(&upsert("r1", json!({"status": "succeeded", "executionState": "finished"})))?;
    hub.apply(&upsert("r1", json!({"narrativeOutput": "", "screenshotSteps": []})))?;

    let ViewState::Ready(records) = view.state() else {
        panic!("expected ready state");
    };
    let run = &records[0];
    assert_eq!(run.status, Some(RunStatus::Succeeded));
    assert_eq!(run.execution_state, Some(ExecutionState::Finished));
    assert_eq!(
        run.narrative_output.as_deref(),
        Some("The persona found the checkout button.")
    );
    assert_eq!(run.analysis, Some(json!({"score": 4})));
    assert_eq!(run.screenshot_steps.as_ref().map(Vec::len), Some(1));

    hub.apply(&upsert("r1", json!({"narrativeOutput": null})))?;
    let ViewState::Ready(records) = view.state() else {
        panic!("expected ready state");
    };
    assert_eq!(records[0].narrative_output, None);
    Ok(())
}

#[test]
fn applying_an_event_twice_changes_nothing() -> Result<()> {
    let hub = RunHub::new();
    let event = upsert("r1", json!({"projectId": "p1", "status": "failed"}));
    hub.apply(&event)?;
    let before = hub.snapshot()?;

    let change = hub.apply(&event)?;
    assert_eq!(change.kind, ChangeKind::Unchanged);
    assert_eq!(hub.snapshot()?, before);
    Ok(())
}

#[tokio::test]
async fn reloads_union_and_stale_loads_are_discarded() -> Result<()> {
    let hub = RunHub::new();
    let (source, loader) = memory_loader(vec![json!({"id": "r1", "projectId": "p1"})]);
    let view = hub.mount(p1())?;
    view.refresh(&loader).await?;

    let older = view.begin_load();
    source.set_records(vec![wire(json!({"id": "r2", "projectId": "p1"}))]);
    let newer = view.begin_load();

    let newer_result = loader.load(newer.scope()).await;
    assert_eq!(view.complete_load(newer, newer_result)?, LoadOutcome::Applied);
    assert_eq!(sorted_ids(&view), ["r1", "r2"]);

    source.set_records(vec![wire(json!({"id": "r3", "projectId": "p1"}))]);
    let older_result = loader.load(older.scope()).await;
    assert_eq!(view.complete_load(older, older_result)?, LoadOutcome::Stale);
    assert_eq!(sorted_ids(&view), ["r1", "r2"]);
    Ok(())
}

#[tokio::test]
async fn failed_first_load_then_recovery() -> Result<()> {
    let hub = RunHub::new();
    let (source, loader) = memory_loader(vec![json!({"id": "r1", "projectId": "p1"})]);
    source.set_failure(Some("connection reset".to_owned()));
    let view = hub.mount(p1())?;

    assert_eq!(view.refresh(&loader).await?, LoadOutcome::Failed);
    let ViewState::Failed(error) = view.state() else {
        panic!("expected failed state");
    };
    assert_eq!(error.scope(), &p1());

    source.set_failure(None);
    assert_eq!(view.refresh(&loader).await?, LoadOutcome::Applied);
    assert_eq!(sorted_ids(&view), ["r1"]);
    assert!(view.last_load_error().is_none());
    Ok(())
}

#[tokio::test]
async fn views_of_different_scopes_share_the_registry() -> Result<()> {
    let hub = RunHub::new().install();
    let (_, loader) = memory_loader(vec![
        json!({"id": "r1", "projectId": "p1", "testId": "t1"}),
        json!({"id": "r2", "projectId": "p1", "testId": "t2"}),
    ]);
    let project_view = hub.mount(p1())?;
    let test_view = hub.mount(RunScope::Test(TestId::new("t2")))?;
    let all_view = hub.mount(RunScope::All)?;
    for outcome in [
        project_view.refresh(&loader).await?,
        test_view.refresh(&loader).await?,
        all_view.refresh(&loader).await?,
    ] {
        assert_eq!(outcome, LoadOutcome::Applied);
    }

    let current = RunHub::current().expect("hub is installed");
    current.apply(&upsert("r2", json!({"status": "failed"})))?;
    current.apply(&upsert("r3", json!({"projectId": "p1", "testId": "t2"})))?;

    assert_eq!(sorted_ids(&project_view), ["r1", "r2", "r3"]);
    assert_eq!(sorted_ids(&test_view), ["r2", "r3"]);
    assert_eq!(sorted_ids(&all_view), ["r1", "r2", "r3"]);
    assert_eq!(current.listener_count()?, 3);

    drop(test_view);
    assert_eq!(current.listener_count()?, 2);
    assert!(RunHub::teardown());
    Ok(())
}

#[tokio::test]
async fn new_runs_get_persona_names_backfilled() -> Result<()> {
    let personas = PersonaDirectory::from_personas([WirePersona {
        id: PersonaId::new("alice"),
        name: "Alice".to_owned(),
        avatar_url: None,
    }]);
    let hub = RunHub::builder().set_personas(Rc::new(personas)).build();
    let (_, loader) = memory_loader(Vec::new());
    let view = hub.mount(p1())?;
    view.refresh(&loader).await?;

    hub.apply(&upsert("r1", json!({"projectId": "p1", "personaId": "alice"})))?;
    let ViewState::Ready(records) = view.state() else {
        panic!("expected ready state");
    };
    assert_eq!(records[0].persona_label(), Some("Alice"));
    Ok(())
}

#[tokio::test]
async fn filters_narrow_the_reconciled_list() -> Result<()> {
    let hub = RunHub::new();
    let (_, loader) = memory_loader(vec![
        json!({"id": "r1", "projectId": "p1", "status": "failed", "persona": {"_id": "a", "name": "Alice"}}),
        json!({"id": "r2", "projectId": "p1", "status": "succeeded", "persona": {"_id": "b", "name": "Bob"}}),
        json!({"id": "r3", "projectId": "p1"}),
    ]);
    let view = hub.mount(p1())?;
    view.refresh(&loader).await?;

    let ViewState::Ready(records) = view.state() else {
        panic!("expected ready state");
    };
    let filters = RunFilters {
        status: FilterValue::Exactly(RunStatus::Failed),
        ..RunFilters::default()
    };
    let visible: Vec<&str> = project(&records, &filters)
        .into_iter()
        .map(|r| r.id().as_str())
        .collect();
    assert_eq!(visible, ["r1"]);

    let filters = RunFilters {
        search: Some("bob".parse()?),
        ..RunFilters::default()
    };
    assert_eq!(project(&records, &filters).len(), 1);
    assert_eq!(project(&records, &RunFilters::default()).len(), 3);

    let options = view.filter_options().expect("view is ready");
    assert_eq!(
        options.personas.into_iter().collect::<Vec<_>>(),
        ["Alice", "Bob"]
    );
    assert!(options.tests.is_some());
    Ok(())
}
