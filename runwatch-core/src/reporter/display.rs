// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    filter::{FilterOptions, RunFilters, project},
    record::RunRecord,
    view::{ViewPhase, ViewState},
};
use itertools::Itertools;
use owo_colors::{OwoColorize, Style};
use runwatch_metadata::{ExecutionState, RunStatus};
use serde::Serialize;
use std::{fmt, io};
use swrite::{SWrite, swrite};

/// The format views are written in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ViewFormat {
    /// Aligned, optionally colored lines.
    #[default]
    Human,
    /// One JSON object per view.
    Json,
}

/// Renders one view: its state, projected through a set of filters.
#[derive(Debug)]
pub struct ViewDisplay<'a> {
    label: &'a str,
    phase: ViewPhase,
    state: &'a ViewState,
    filters: &'a RunFilters,
    options: Option<&'a FilterOptions>,
    persona_placeholder: &'a str,
    styles: Box<Styles>,
}

impl<'a> ViewDisplay<'a> {
    /// Creates a display for a view state.
    pub fn new(
        label: &'a str,
        phase: ViewPhase,
        state: &'a ViewState,
        filters: &'a RunFilters,
        persona_placeholder: &'a str,
    ) -> Self {
        Self {
            label,
            phase,
            state,
            filters,
            options: None,
            persona_placeholder,
            styles: Box::default(),
        }
    }

    /// Also renders the filter options derived from the view.
    pub fn with_options(mut self, options: &'a FilterOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Colorizes human output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Writes the view in the given format.
    pub fn write(&self, format: ViewFormat, mut writer: impl io::Write) -> io::Result<()> {
        match format {
            ViewFormat::Human => write!(writer, "{self}"),
            ViewFormat::Json => {
                serde_json::to_writer(&mut writer, &self.to_json())?;
                writeln!(writer)
            }
        }
    }

    /// Returns the machine-readable form of the view.
    pub fn to_json(&self) -> JsonView<'_> {
        let (state, runs, error) = match self.state {
            ViewState::Loading => ("loading", None, None),
            ViewState::Failed(error) => ("failed", None, Some(error.to_string())),
            ViewState::Ready(records) => ("ready", Some(project(records, self.filters)), None),
        };
        JsonView {
            label: self.label,
            phase: self.phase.to_string(),
            state,
            total: self.state.records().map(|records| records.len()),
            runs,
            error,
            options: self.options,
        }
    }

    fn write_runs(&self, f: &mut fmt::Formatter<'_>, records: &[RunRecord]) -> fmt::Result {
        let visible = project(records, self.filters);
        write!(
            f,
            "{}: {} {}",
            self.label.style(self.styles.label),
            records.len().style(self.styles.count),
            plural_runs(records.len()),
        )?;
        if !self.filters.is_unfiltered() {
            write!(f, ", {} shown", visible.len().style(self.styles.count))?;
        }
        writeln!(f, " ({})", self.phase)?;

        if records.is_empty() {
            return writeln!(f, "  no runs yet");
        }
        if visible.is_empty() {
            return writeln!(f, "  no runs match the current filters");
        }

        let rows: Vec<Row<'_>> = visible
            .iter()
            .map(|record| Row::new(record, self.persona_placeholder))
            .collect();
        let id_width = column_width(rows.iter().map(|row| row.id));
        let status_width = column_width(rows.iter().map(|row| row.status));
        let state_width = column_width(rows.iter().map(|row| row.state));
        let persona_width = column_width(rows.iter().map(|row| row.persona));

        for (row, record) in rows.iter().zip(&visible) {
            let mut line = String::new();
            swrite!(line, "  {}", pad(row.id, id_width).style(self.styles.id));
            swrite!(
                line,
                "  {}",
                pad(row.status, status_width).style(self.styles.status(record.status))
            );
            swrite!(
                line,
                "  {}",
                pad(row.state, state_width).style(self.styles.state(record.execution_state))
            );
            swrite!(line, "  {}", pad(row.persona, persona_width));
            if let Some(test) = row.test {
                swrite!(line, "  {test}");
            }
            writeln!(f, "{}", line.trim_end())?;
        }
        Ok(())
    }

    fn write_options(&self, f: &mut fmt::Formatter<'_>, options: &FilterOptions) -> fmt::Result {
        let mut line = String::new();
        swrite!(
            line,
            "  {} status: {}; state: {}; persona: {}",
            "filters".style(self.styles.label),
            options_list(options.statuses.iter()),
            options_list(options.execution_states.iter()),
            options_list(options.personas.iter()),
        );
        if let Some(tests) = &options.tests {
            swrite!(line, "; test: {}", options_list(tests.iter()));
        }
        writeln!(f, "{line}")
    }
}

impl fmt::Display for ViewDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            ViewState::Loading => writeln!(f, "{}: loading", self.label.style(self.styles.label)),
            ViewState::Failed(error) => writeln!(
                f,
                "{}: {} ({})",
                self.label.style(self.styles.label),
                error.style(self.styles.error),
                error.kind(),
            ),
            ViewState::Ready(records) => {
                self.write_runs(f, records)?;
                if let Some(options) = self.options {
                    self.write_options(f, options)?;
                }
                Ok(())
            }
        }
    }
}

/// A view as written by [`ViewFormat::Json`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct JsonView<'a> {
    label: &'a str,
    phase: String,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    runs: Option<Vec<&'a RunRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a FilterOptions>,
}

struct Row<'a> {
    id: &'a str,
    status: &'static str,
    state: &'static str,
    persona: &'a str,
    test: Option<&'a str>,
}

impl<'a> Row<'a> {
    fn new(record: &'a RunRecord, persona_placeholder: &'a str) -> Self {
        Self {
            id: record.id().as_str(),
            status: record.status.map_or("-", RunStatus::as_str),
            state: record.execution_state.map_or("-", ExecutionState::as_str),
            persona: record.persona_label().unwrap_or(persona_placeholder),
            test: record.test_label(),
        }
    }
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values.map(|value| value.chars().count()).max().unwrap_or(0)
}

fn pad(value: &str, width: usize) -> String {
    format!("{value:<width$}")
}

fn plural_runs(count: usize) -> &'static str {
    if count == 1 { "run" } else { "runs" }
}

fn options_list<T: fmt::Display>(mut values: impl Iterator<Item = T>) -> String {
    let joined = values.join(", ");
    if joined.is_empty() {
        "-".to_owned()
    } else {
        joined
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    label: Style,
    count: Style,
    id: Style,
    error: Style,
    pending: Style,
    succeeded: Style,
    failed: Style,
    cancelled: Style,
    active: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.label = Style::new().bold();
        self.count = Style::new().bold();
        self.id = Style::new().blue();
        self.error = Style::new().red().bold();
        self.pending = Style::new().yellow();
        self.succeeded = Style::new().green().bold();
        self.failed = Style::new().red().bold();
        self.cancelled = Style::new().dimmed();
        self.active = Style::new().cyan();
    }

    fn status(&self, status: Option<RunStatus>) -> Style {
        match status {
            Some(RunStatus::Pending) => self.pending,
            Some(RunStatus::Succeeded) => self.succeeded,
            Some(RunStatus::Failed) => self.failed,
            Some(RunStatus::Cancelled) => self.cancelled,
            None => Style::new(),
        }
    }

    fn state(&self, state: Option<ExecutionState>) -> Style {
        match state {
            Some(state) if state.is_active() => self.active,
            _ => Style::new(),
        }
    }
}
