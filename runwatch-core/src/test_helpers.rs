// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders shared by unit tests.

use crate::record::RunRecord;
use runwatch_metadata::{RunEvent, RunPatch, WireRunRecord};
use serde_json::json;

/// Parses a full wire record from JSON.
pub(crate) fn wire(value: serde_json::Value) -> WireRunRecord {
    serde_json::from_value(value).expect("valid wire record")
}

/// Builds a normalized record from JSON.
pub(crate) fn record(value: serde_json::Value) -> RunRecord {
    RunRecord::from_wire(wire(value))
}

/// Parses a patch from a JSON object.
pub(crate) fn patch(value: serde_json::Value) -> RunPatch {
    serde_json::from_value(value).expect("valid patch")
}

pub(crate) fn upsert(id: &str, fields: serde_json::Value) -> RunEvent {
    serde_json::from_value(json!({"id": id, "kind": "upsert", "fields": fields}))
        .expect("valid upsert event")
}

pub(crate) fn delete(id: &str) -> RunEvent {
    serde_json::from_value(json!({"id": id, "kind": "delete"})).expect("valid delete event")
}
