use crate::application::bootstrap::bootstrap_workspace;
use crate::application::selection_controller::{
    ControllerError, ControllerOptions, Notification, OutputUpdate, SelectionController,
};
use crate::domain::models::{RangeKind, WeekStart};
use crate::domain::range::Direction;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_source::EventSource;
use crate::infrastructure::google_calendar_client::GoogleCalendarEventSource;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::snapshot_repository::{SnapshotRepository, SqliteSnapshotRepository};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

const MAX_OFFSET: i64 = 5_000;

#[derive(Parser, Debug)]
#[command(name = "calendar-hours")]
#[command(version, about = "Totals calendar hours per project over a date range")]
pub struct Cli {
    /// Workspace holding config/, state/ and logs/
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// OAuth access token for the Google Calendar API
    #[arg(long, global = true, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the calendars visible to the access token
    Calendars,

    /// Print per-project hours for a calendar and range
    Report(ReportArgs),
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Calendar id; defaults to the last reported calendar
    #[arg(long)]
    pub calendar: Option<String>,

    /// day, week, month, year, total or custom
    #[arg(long)]
    pub kind: Option<RangeKind>,

    /// Periods to move from the current one, negative moves back
    #[arg(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(-MAX_OFFSET..=MAX_OFFSET)
    )]
    pub offset: i64,

    /// Custom range start (RFC 3339)
    #[arg(long, requires = "to")]
    pub from: Option<DateTime<Utc>>,

    /// Custom range end (RFC 3339)
    #[arg(long, requires = "from")]
    pub to: Option<DateTime<Utc>>,

    /// monday or sunday
    #[arg(long)]
    pub week_start: Option<WeekStart>,

    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("missing access token: pass --access-token or set GOOGLE_ACCESS_TOKEN")]
    MissingAccessToken,
    #[error("no calendar selected: pass --calendar")]
    NoCalendar,
    #[error("calendar service unavailable ({0})")]
    Connect(String),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    Infra(#[from] InfraError),
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    init_logging(&cli.log_level)?;
    let workspace = bootstrap_workspace(&cli.workspace)?;
    let access_token = cli.access_token.ok_or(CliError::MissingAccessToken)?;
    let source = GoogleCalendarEventSource::with_api_base(access_token, &workspace.config.api_base_url)?
        .with_page_size(workspace.config.page_size);
    let time_zone = workspace.config.time_zone()?;

    match cli.command {
        Commands::Calendars => {
            for calendar in source.list_calendars().await? {
                println!("{}\t{}", calendar.id, calendar.summary);
            }
            Ok(())
        }
        Commands::Report(args) => {
            let repository = SqliteSnapshotRepository::new(&workspace.database_path);
            let mut snapshot = match repository.load() {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    warn!(%error, "ignoring unreadable selection snapshot");
                    None
                }
            };
            if args.calendar.is_some() {
                if let Some(snapshot) = snapshot.as_mut() {
                    snapshot.last_selected_calendar_cid = None;
                }
            }

            let options = ControllerOptions::new(time_zone)
                .with_default_week_start(workspace.config.default_week_start)
                .with_snapshot(snapshot);
            let (controller, notifications) = SelectionController::new(Arc::new(source), options);
            let output = run_report(controller, notifications, &repository, &args).await?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&output).map_err(InfraError::from)?);
            } else {
                print!("{}", render_report(&output, time_zone));
            }
            Ok(())
        }
    }
}

async fn run_report<S>(
    mut controller: SelectionController<S>,
    mut notifications: UnboundedReceiver<Notification>,
    repository: &dyn SnapshotRepository,
    args: &ReportArgs,
) -> Result<OutputUpdate, CliError>
where
    S: EventSource + 'static,
{
    if let Some(week_start) = args.week_start {
        controller.set_week_start(week_start);
    }
    match (args.from, args.to) {
        (Some(from), Some(to)) => controller.select_custom_range(from, to),
        _ => {
            if let Some(kind) = args.kind {
                controller.select_range_kind(kind);
                controller.advance(Direction::Today);
            }
        }
    }
    let direction = Direction::from_step(args.offset);
    for _ in 0..args.offset.unsigned_abs() {
        controller.advance(direction);
    }

    controller.load_calendars().await?;
    if let Some(calendar_id) = args.calendar.as_deref() {
        controller.select_calendar(calendar_id)?;
    }
    if controller.selected_calendar().is_none() && controller.loading_calendar().is_none() {
        return Err(CliError::NoCalendar);
    }
    controller.settle().await;

    let mut output = None;
    let mut connect_error = None;
    while let Ok(notification) = notifications.try_recv() {
        match notification {
            Notification::OutputUpdated(update) => output = Some(update),
            Notification::SnapshotUpdated(snapshot) => repository.save(&snapshot)?,
            Notification::ConnectError { context } => connect_error = Some(context),
            _ => {}
        }
    }

    if let Some(context) = connect_error {
        return Err(CliError::Connect(context));
    }
    let output = output.ok_or(CliError::NoCalendar)?;
    info!(total_hours = output.total_hours, "report ready");
    Ok(output)
}

pub fn render_report(output: &OutputUpdate, time_zone: Tz) -> String {
    let interval = &output.interval;
    let mut rendered = String::new();
    let _ = writeln!(
        rendered,
        "{} {} .. {} ({time_zone})",
        interval.kind,
        interval.start.with_timezone(&time_zone).format("%Y-%m-%d %H:%M"),
        interval.end.with_timezone(&time_zone).format("%Y-%m-%d %H:%M"),
    );
    let _ = writeln!(rendered, "Total: {:.2} h", output.total_hours);

    let width = output
        .projects
        .iter()
        .map(|project| project.label.chars().count())
        .max()
        .unwrap_or(0);
    for project in &output.projects {
        let _ = writeln!(rendered, "  {:<width$}  {:>7.2} h", project.label, project.hours);
    }
    rendered
}
