// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering and searching a reconciled list of runs.
//!
//! Everything here is a pure function of its inputs: filter options are
//! derived from the current list, so they grow and shrink along with it.

use crate::{
    errors::{FilterParseError, SearchQueryError},
    record::RunRecord,
};
use aho_corasick::AhoCorasick;
use runwatch_metadata::{ExecutionState, RunStatus};
use serde::Serialize;
use std::{
    borrow::{Borrow, Cow},
    collections::BTreeSet,
    convert::Infallible,
    fmt,
    str::FromStr,
};

/// The string that selects [`FilterValue::Any`].
pub const FILTER_ANY: &str = "any";

/// A filter on a single field: either anything, or exactly one value.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum FilterValue<T> {
    /// Matches every record, including ones missing the field.
    #[default]
    Any,

    /// Matches records whose field equals this value. Records missing the
    /// field never match.
    Exactly(T),
}

impl<T> FilterValue<T> {
    /// Returns true if this is [`FilterValue::Any`].
    pub fn is_any(&self) -> bool {
        matches!(self, FilterValue::Any)
    }

    /// Matches a field value against this filter.
    pub fn matches<U>(&self, value: Option<&U>) -> bool
    where
        T: Borrow<U>,
        U: PartialEq + ?Sized,
    {
        match self {
            FilterValue::Any => true,
            FilterValue::Exactly(expected) => value.is_some_and(|value| expected.borrow() == value),
        }
    }
}

impl<T: fmt::Display> fmt::Display for FilterValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Any => f.write_str(FILTER_ANY),
            FilterValue::Exactly(value) => value.fmt(f),
        }
    }
}

impl FromStr for FilterValue<RunStatus> {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == FILTER_ANY {
            return Ok(FilterValue::Any);
        }
        s.parse()
            .map(FilterValue::Exactly)
            .map_err(|error| FilterParseError::new("status", error))
    }
}

impl FromStr for FilterValue<ExecutionState> {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == FILTER_ANY {
            return Ok(FilterValue::Any);
        }
        s.parse()
            .map(FilterValue::Exactly)
            .map_err(|error| FilterParseError::new("execution state", error))
    }
}

impl FromStr for FilterValue<String> {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == FILTER_ANY {
            Ok(FilterValue::Any)
        } else {
            Ok(FilterValue::Exactly(s.to_owned()))
        }
    }
}

/// A conjunction of filters over a list of runs.
#[derive(Clone, Debug, Default)]
pub struct RunFilters {
    /// The result status.
    pub status: FilterValue<RunStatus>,

    /// The execution state.
    pub execution_state: FilterValue<ExecutionState>,

    /// The persona display label (name, or bare id if no name is known).
    pub persona: FilterValue<String>,

    /// The test display label (name, or bare id if no name is known).
    ///
    /// Only meaningful for views spanning multiple tests. See
    /// [`RunFilters::for_view`].
    pub test: FilterValue<String>,

    /// Free-text search.
    pub search: Option<SearchQuery>,
}

impl RunFilters {
    /// Returns true if every filter matches everything.
    pub fn is_unfiltered(&self) -> bool {
        self.status.is_any()
            && self.execution_state.is_any()
            && self.persona.is_any()
            && self.test.is_any()
            && self.search.as_ref().is_none_or(SearchQuery::is_empty)
    }

    /// Returns the filters that apply to a view.
    ///
    /// A view of a single test offers no test options, so the test filter is
    /// dropped for it.
    pub fn for_view(&self, spans_multiple_tests: bool) -> Cow<'_, Self> {
        if spans_multiple_tests || self.test.is_any() {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(Self {
                test: FilterValue::Any,
                ..self.clone()
            })
        }
    }

    /// Returns true if a record passes every filter.
    pub fn matches(&self, record: &RunRecord) -> bool {
        self.status.matches(record.status.as_ref())
            && self
                .execution_state
                .matches(record.execution_state.as_ref())
            && self.persona.matches::<str>(record.persona_label())
            && self.test.matches::<str>(record.test_label())
            && self
                .search
                .as_ref()
                .is_none_or(|search| search.matches(record))
    }
}

/// Narrows a list of runs to those matching `filters`, preserving order.
pub fn project<'a>(records: &'a [RunRecord], filters: &RunFilters) -> Vec<&'a RunRecord> {
    records.iter().filter(|record| filters.matches(record)).collect()
}

/// The values offered for each filter, derived from a list of runs.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterOptions {
    /// Distinct result statuses.
    pub statuses: BTreeSet<RunStatus>,

    /// Distinct execution states.
    pub execution_states: BTreeSet<ExecutionState>,

    /// Distinct persona display labels.
    pub personas: BTreeSet<String>,

    /// Distinct test display labels, or `None` if the list belongs to a
    /// single test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<BTreeSet<String>>,
}

impl FilterOptions {
    /// Derives the options from a list of runs.
    pub fn derive(records: &[RunRecord], spans_multiple_tests: bool) -> Self {
        let mut options = Self {
            tests: spans_multiple_tests.then(BTreeSet::new),
            ..Self::default()
        };
        for record in records {
            options.statuses.extend(record.status);
            options.execution_states.extend(record.execution_state);
            options
                .personas
                .extend(record.persona_label().map(str::to_owned));
            if let Some(tests) = &mut options.tests {
                tests.extend(record.test_label().map(str::to_owned));
            }
        }
        options
    }
}

/// A free-text search over run ids, test labels and persona labels.
///
/// The query is split on whitespace. A record matches if every term occurs,
/// case-insensitively, in at least one of the searched fields. Terms and
/// fields are compared in their Unicode lowercase forms.
#[derive(Clone, Debug)]
pub struct SearchQuery {
    query: String,
    terms: usize,
    matcher: Option<Box<AhoCorasick>>,
}

impl SearchQuery {
    /// Compiles a query.
    pub fn new(query: &str) -> Result<Self, SearchQueryError> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let matcher = if terms.is_empty() {
            None
        } else {
            let matcher = AhoCorasick::builder()
                .build(&terms)
                .map_err(|error| SearchQueryError::new(query, error))?;
            Some(Box::new(matcher))
        };
        Ok(Self {
            query: query.to_owned(),
            terms: terms.len(),
            matcher,
        })
    }

    /// Returns the query as written.
    pub fn as_str(&self) -> &str {
        &self.query
    }

    /// Returns true if the query has no terms and so matches everything.
    pub fn is_empty(&self) -> bool {
        self.matcher.is_none()
    }

    /// Returns true if every term occurs in the record's searchable fields.
    pub fn matches(&self, record: &RunRecord) -> bool {
        let Some(matcher) = &self.matcher else {
            return true;
        };

        let mut found = vec![false; self.terms];
        let haystacks = [
            Some(record.id().as_str()),
            record.test_label(),
            record.persona_label(),
        ];
        for haystack in haystacks.into_iter().flatten() {
            let haystack = haystack.to_lowercase();
            for hit in matcher.find_overlapping_iter(&haystack) {
                found[hit.pattern().as_usize()] = true;
            }
        }
        found.into_iter().all(|hit| hit)
    }
}

impl FromStr for SearchQuery {
    type Err = SearchQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
