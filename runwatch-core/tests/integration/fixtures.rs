// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use runwatch_core::{
    hub::MountedView,
    loader::{InMemoryRunSource, SnapshotLoader},
    view::{ViewScope, ViewState},
};
use runwatch_metadata::{RunEvent, WireRunRecord};
use serde_json::json;
use std::rc::Rc;

pub(crate) fn wire(value: serde_json::Value) -> WireRunRecord {
    serde_json::from_value(value).expect("valid wire record")
}

pub(crate) fn upsert(id: &str, fields: serde_json::Value) -> RunEvent {
    serde_json::from_value(json!({"id": id, "kind": "upsert", "fields": fields}))
        .expect("valid upsert event")
}

pub(crate) fn delete(id: &str) -> RunEvent {
    serde_json::from_value(json!({"id": id, "kind": "delete"})).expect("valid delete event")
}

/// A loader over an in-memory source the test can keep changing.
pub(crate) fn memory_loader(
    records: Vec<serde_json::Value>,
) -> (Rc<InMemoryRunSource>, SnapshotLoader<Rc<InMemoryRunSource>>) {
    let source = Rc::new(InMemoryRunSource::new(
        records.into_iter().map(wire).collect(),
    ));
    let loader = SnapshotLoader::new(source.clone());
    (source, loader)
}

/// Returns the visible run ids of a ready view, sorted.
pub(crate) fn sorted_ids<S: ViewScope + 'static>(view: &MountedView<S>) -> Vec<String> {
    let ViewState::Ready(records) = view.state() else {
        panic!("expected view to be ready, found {:?}", view.state());
    };
    let mut ids: Vec<String> = records.iter().map(|r| r.id().to_string()).collect();
    ids.sort();
    ids
}
