// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputOpts, OutputWriter, clap_styles},
};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use runwatch_core::{
    event_log::EventLogReader,
    filter::{FILTER_ANY, FilterValue, RunFilters, SearchQuery, project},
    hub::{LoadOutcome, MountedView, RunHub},
    loader::{FileRunSource, PersonaDirectory, PersonaLookup, SnapshotLoader},
    registry::RegistryChange,
    reporter::{ViewDisplay, ViewFormat},
    user_config::{UserConfig, UserConfigLocation},
    view::{RunScope, SortOrder, ViewScope, ViewState},
};
use runwatch_metadata::{
    ExecutionState, ProjectId, RunEvent, RunStatus, RunwatchExitCode, TestId,
};
use std::{collections::BTreeSet, io::Write, rc::Rc};
use tracing::debug;

/// Replays test-run snapshots and real-time events through scoped views.
#[derive(Debug, Parser)]
#[command(version, name = "runwatch", styles = clap_styles::style())]
pub struct RunwatchApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config_opts: UserConfigOpts,

    #[command(subcommand)]
    command: Command,
}

impl RunwatchApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        match self.command {
            Command::Replay(opts) => {
                let user_config = self.config_opts.make_user_config()?;
                opts.exec(&user_config, output, output_writer)
            }
            Command::Validate(opts) => opts.exec(output_writer),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load snapshots, apply an event log and print the resulting views
    Replay(ReplayOpts),

    /// Check that an event log is valid
    Validate(ValidateOpts),
}

#[derive(Debug, Args)]
struct UserConfigOpts {
    /// User config file [default: <config dir>/runwatch/config.toml]
    ///
    /// Pass `none` to skip user config entirely.
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "RUNWATCH_USER_CONFIG_FILE"
    )]
    user_config_file: Option<String>,
}

impl UserConfigOpts {
    fn make_user_config(&self) -> Result<UserConfig> {
        let location = UserConfigLocation::from_cli_or_env(self.user_config_file.as_deref());
        Ok(UserConfig::from_location(location)?)
    }
}

#[derive(Debug, Args)]
struct ReplayOpts {
    /// JSON file with a snapshot of runs
    #[arg(long, value_name = "PATH")]
    runs: Utf8PathBuf,

    /// JSON Lines file with real-time events, applied in order
    #[arg(long, value_name = "PATH")]
    events: Utf8PathBuf,

    /// JSON file with personas used to fill in display names
    #[arg(long, value_name = "PATH")]
    personas: Option<Utf8PathBuf>,

    #[command(flatten)]
    scopes: ScopeOpts,

    #[command(flatten)]
    filters: FilterOpts,

    /// Print views after every event that changes them
    #[arg(long, env = "RUNWATCH_SHOW_EACH_CHANGE")]
    show_each_change: bool,

    /// Order to list runs in [default: from user config]
    #[arg(long, value_enum, value_name = "ORDER")]
    sort: Option<SortOpt>,

    /// Output format
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    message_format: MessageFormat,

    /// Exit with a non-zero code if a view has no runs to show
    #[arg(long)]
    fail_on_empty: bool,
}

impl ReplayOpts {
    fn exec(
        self,
        user_config: &UserConfig,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|err| ExpectedError::RuntimeBuildError { err })?;
        runtime.block_on(self.replay(user_config, output, output_writer))
    }

    async fn replay(
        &self,
        user_config: &UserConfig,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let sort = self.sort.map_or(user_config.display.sort, SortOrder::from);
        let mut hub_builder = RunHub::builder();
        hub_builder.set_sort(sort);
        let mut loader = SnapshotLoader::new(FileRunSource::new(self.runs.clone()));
        if let Some(path) = &self.personas {
            let personas: Rc<dyn PersonaLookup> = Rc::new(PersonaDirectory::load(path).await?);
            hub_builder.set_personas(personas.clone());
            loader = loader.with_personas(personas);
        }
        let hub = hub_builder.build().install();

        let views = self
            .scopes
            .scopes()
            .into_iter()
            .map(|scope| hub.mount(scope))
            .collect::<Result<Vec<_>, _>>()?;

        let mut load_errors = Vec::new();
        for view in &views {
            match view.refresh(&loader).await? {
                LoadOutcome::Applied => {}
                LoadOutcome::Failed => load_errors.extend(view.last_load_error()),
                LoadOutcome::Stale => {
                    debug!(mount = %view.mount_id(), "initial load was stale");
                }
            }
        }

        let filters = self.filters.to_filters();
        let format = ViewFormat::from(self.message_format);
        let printer = ViewPrinter {
            filters: &filters,
            format,
            persona_placeholder: &user_config.display.persona_placeholder,
            colorize: format == ViewFormat::Human
                && output.color.should_colorize(supports_color::Stream::Stdout),
        };
        let show_each_change = self.show_each_change || user_config.replay.show_each_change;

        let reader = EventLogReader::open(&self.events)
            .map_err(|err| ExpectedError::event_log_error(self.events.clone(), err))?;
        let mut writer = output_writer.stdout_writer();

        if show_each_change {
            for view in &views {
                printer.print(view, &mut writer)?;
            }
        }
        let mut generations: Vec<u64> = views.iter().map(|view| view.generation()).collect();
        let mut applied = 0;
        for event in reader {
            let event =
                event.map_err(|err| ExpectedError::event_log_error(self.events.clone(), err))?;
            let change = hub.apply(&event)?;
            applied += 1;
            if !show_each_change {
                continue;
            }

            let mut header_printed = false;
            for (view, generation) in views.iter().zip(&mut generations) {
                if view.generation() == *generation {
                    continue;
                }
                *generation = view.generation();
                if !header_printed {
                    printer.print_change(&change, &mut writer)?;
                    header_printed = true;
                }
                printer.print(view, &mut writer)?;
            }
        }
        debug!(applied, "replayed event log");

        if !show_each_change {
            for view in &views {
                printer.print(view, &mut writer)?;
            }
        }
        writer.flush().map_err(ExpectedError::write_error)?;

        let empty: Vec<String> = views
            .iter()
            .filter(|view| shows_nothing(view, &filters))
            .map(|view| view.fetch_scope().to_string())
            .collect();
        drop(views);
        RunHub::teardown();

        if !load_errors.is_empty() {
            return Err(ExpectedError::SnapshotLoadFailed {
                errors: load_errors,
            });
        }
        if self.fail_on_empty && !empty.is_empty() {
            return Err(ExpectedError::EmptyView { labels: empty });
        }
        Ok(RunwatchExitCode::OK)
    }
}

fn shows_nothing(view: &MountedView<RunScope>, filters: &RunFilters) -> bool {
    let filters = filters.for_view(view.fetch_scope().spans_multiple_tests());
    match view.state() {
        ViewState::Ready(records) => project(&records, &filters).is_empty(),
        ViewState::Loading | ViewState::Failed(_) => false,
    }
}

struct ViewPrinter<'a> {
    filters: &'a RunFilters,
    format: ViewFormat,
    persona_placeholder: &'a str,
    colorize: bool,
}

impl ViewPrinter<'_> {
    fn print(&self, view: &MountedView<RunScope>, writer: &mut impl Write) -> Result<()> {
        let scope = view.fetch_scope();
        let label = scope.to_string();
        let filters = self.filters.for_view(scope.spans_multiple_tests());
        let state = view.state();
        let options = view.filter_options();
        let mut display = ViewDisplay::new(
            &label,
            view.phase(),
            &state,
            &filters,
            self.persona_placeholder,
        );
        if let Some(options) = &options {
            display = display.with_options(options);
        }
        if self.colorize {
            display.colorize();
        }
        display
            .write(self.format, writer)
            .map_err(ExpectedError::write_error)
    }

    fn print_change(&self, change: &RegistryChange, writer: &mut impl Write) -> Result<()> {
        if self.format != ViewFormat::Human {
            return Ok(());
        }
        writeln!(
            writer,
            "-- event {}: {} `{}`",
            change.version, change.kind, change.id
        )
        .map_err(ExpectedError::write_error)
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Scope options")]
struct ScopeOpts {
    /// Show a view of every run (default if no other scope is given)
    #[arg(long)]
    all: bool,

    /// Show a view of the runs of a project
    #[arg(long = "project", value_name = "ID")]
    projects: Vec<String>,

    /// Show a view of the runs of a test
    #[arg(long = "test", value_name = "ID")]
    tests: Vec<String>,
}

impl ScopeOpts {
    fn scopes(&self) -> Vec<RunScope> {
        let all = (self.all || (self.projects.is_empty() && self.tests.is_empty()))
            .then_some(RunScope::All);
        all.into_iter()
            .chain(
                self.projects
                    .iter()
                    .map(|id| RunScope::Project(ProjectId::new(id))),
            )
            .chain(self.tests.iter().map(|id| RunScope::Test(TestId::new(id))))
            .unique()
            .collect()
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Filter options")]
struct FilterOpts {
    /// Only show runs with this result status
    #[arg(long, value_name = "STATUS", default_value = FILTER_ANY)]
    status: FilterValue<RunStatus>,

    /// Only show runs in this execution state
    #[arg(long, value_name = "STATE", default_value = FILTER_ANY)]
    execution_state: FilterValue<ExecutionState>,

    /// Only show runs driven by the persona with this name
    #[arg(long, value_name = "NAME", default_value = FILTER_ANY)]
    persona: FilterValue<String>,

    /// Only show runs of the test with this name
    #[arg(long, value_name = "NAME", default_value = FILTER_ANY)]
    test_name: FilterValue<String>,

    /// Only show runs whose id, test or persona contains every term
    #[arg(long, value_name = "QUERY")]
    search: Option<SearchQuery>,
}

impl FilterOpts {
    fn to_filters(&self) -> RunFilters {
        RunFilters {
            status: self.status.clone(),
            execution_state: self.execution_state.clone(),
            persona: self.persona.clone(),
            test: self.test_name.clone(),
            search: self.search.clone(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum MessageFormat {
    /// Aligned text
    #[default]
    Human,
    /// One JSON object per view
    Json,
}

impl From<MessageFormat> for ViewFormat {
    fn from(format: MessageFormat) -> Self {
        match format {
            MessageFormat::Human => ViewFormat::Human,
            MessageFormat::Json => ViewFormat::Json,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SortOpt {
    /// Most recently created first
    NewestFirst,
    /// Least recently created first
    OldestFirst,
}

impl From<SortOpt> for SortOrder {
    fn from(sort: SortOpt) -> Self {
        match sort {
            SortOpt::NewestFirst => SortOrder::NewestFirst,
            SortOpt::OldestFirst => SortOrder::OldestFirst,
        }
    }
}

#[derive(Debug, Args)]
struct ValidateOpts {
    /// JSON Lines file with real-time events
    #[arg(long, value_name = "PATH")]
    events: Utf8PathBuf,
}

impl ValidateOpts {
    fn exec(self, output_writer: &mut OutputWriter) -> Result<i32> {
        let reader = EventLogReader::open(&self.events)
            .map_err(|err| ExpectedError::event_log_error(self.events.clone(), err))?;

        let (mut upserts, mut deletes) = (0usize, 0usize);
        let mut ids = BTreeSet::new();
        for event in reader {
            let event =
                event.map_err(|err| ExpectedError::event_log_error(self.events.clone(), err))?;
            match &event {
                RunEvent::Upsert { .. } => upserts += 1,
                RunEvent::Delete { .. } => deletes += 1,
            }
            ids.insert(event.id().clone());
        }

        let mut writer = output_writer.stdout_writer();
        writeln!(
            writer,
            "{}: {} events ({upserts} upserts, {deletes} deletes) for {} runs",
            self.events,
            upserts + deletes,
            ids.len(),
        )
        .map_err(ExpectedError::write_error)?;
        writer.flush().map_err(ExpectedError::write_error)?;
        Ok(RunwatchExitCode::OK)
    }
}
