// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::record::RunRecord;
use runwatch_metadata::{ProjectId, TestId, WireRunRecord};
use serde::Serialize;
use std::fmt;

/// Determines which runs belong to a view.
pub trait ViewScope: fmt::Debug {
    /// The scope used to fetch this view's snapshot and to sequence its
    /// loads.
    fn fetch_scope(&self) -> RunScope;

    /// Decides whether a record belongs to this view.
    fn admits(&self, record: &RunRecord) -> ScopeMatch;

    /// Returns true if runs in this view may belong to more than one test.
    fn spans_multiple_tests(&self) -> bool {
        true
    }
}

/// The result of matching a record against a scope.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScopeMatch {
    /// The record is in scope.
    Match,

    /// The record does not carry the field the scope is keyed on.
    ///
    /// Known records stay; new records are not added.
    Unknown,

    /// The record is known to be outside the scope.
    Mismatch,
}

impl ScopeMatch {
    fn from_field<T: PartialEq>(field: Option<&T>, expected: &T) -> Self {
        match field {
            Some(value) if value == expected => ScopeMatch::Match,
            Some(_) => ScopeMatch::Mismatch,
            None => ScopeMatch::Unknown,
        }
    }
}

/// A scope that runs can be fetched for.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum RunScope {
    /// Every run.
    All,
    /// Runs of one project.
    Project(ProjectId),
    /// Runs of one test.
    Test(TestId),
}

impl RunScope {
    /// Fills in the scope id of a record fetched for this scope if the record
    /// does not carry one.
    pub fn stamp(&self, record: &mut RunRecord) {
        match self {
            RunScope::All => {}
            RunScope::Project(project_id) => {
                if record.project_id.is_none() {
                    record.project_id = Some(project_id.clone());
                }
            }
            RunScope::Test(test_id) => {
                if record.test_id.is_none() {
                    record.test_id = Some(test_id.clone());
                }
            }
        }
    }

    /// Returns true if a wire record would be returned by a fetch for this
    /// scope.
    ///
    /// Records without the scope field are excluded, as a server-side query
    /// would exclude them.
    pub fn contains_wire(&self, record: &WireRunRecord) -> bool {
        match self {
            RunScope::All => true,
            RunScope::Project(project_id) => record
                .project_id
                .as_ref()
                .is_some_and(|r| r.id() == project_id.as_str()),
            RunScope::Test(test_id) => record
                .test_id
                .as_ref()
                .is_some_and(|r| r.id() == test_id.as_str()),
        }
    }
}

impl ViewScope for RunScope {
    fn fetch_scope(&self) -> RunScope {
        self.clone()
    }

    fn admits(&self, record: &RunRecord) -> ScopeMatch {
        match self {
            RunScope::All => ScopeMatch::Match,
            RunScope::Project(project_id) => {
                ScopeMatch::from_field(record.project_id.as_ref(), project_id)
            }
            RunScope::Test(test_id) => ScopeMatch::from_field(record.test_id.as_ref(), test_id),
        }
    }

    fn spans_multiple_tests(&self) -> bool {
        !matches!(self, RunScope::Test(_))
    }
}

impl fmt::Display for RunScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunScope::All => write!(f, "all runs"),
            RunScope::Project(id) => write!(f, "project `{id}`"),
            RunScope::Test(id) => write!(f, "test `{id}`"),
        }
    }
}
