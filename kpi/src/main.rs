mod calendar;
mod config;
mod error;
mod kpi;
mod orquestra;
mod overview;
mod prepare;
mod storage;
mod timeline;
mod types;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

use crate::config::Settings;
use crate::storage::sqlite::SqliteStore;
use crate::storage::{Source, WorkItemStore};
use crate::types::{KpiColor, KpiResult, WorkItem, WorkItemFilter};

#[derive(Parser)]
#[command(name = "kpi")]
#[command(about = "Sprint KPI dashboard - tactical indicators from tracker work items", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: ./kpi.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Args)]
struct SourceArgs {
    /// Tracker export (JSON array of work items)
    #[arg(short, long, conflicts_with = "db")]
    input: Option<PathBuf>,

    /// Work-item database written by `kpi import`
    #[arg(long)]
    db: Option<PathBuf>,
}

impl SourceArgs {
    fn source(&self) -> Result<Source> {
        match (&self.input, &self.db) {
            (Some(input), _) => Ok(Source::JsonExport(input.clone())),
            (None, Some(db)) => Ok(Source::Sqlite(db.clone())),
            (None, None) => bail!("no data source given, use --input <export.json> or --db <items.db>"),
        }
    }
}

#[derive(Args)]
struct FilterArgs {
    /// Only items of this sprint
    #[arg(short, long)]
    sprint: Option<u64>,

    /// Only items of this type (repeatable)
    #[arg(short = 't', long = "type")]
    types: Vec<String>,

    /// Only items in this state
    #[arg(long)]
    state: Option<String>,
}

impl FilterArgs {
    fn empty() -> Self {
        FilterArgs {
            sprint: None,
            types: Vec::new(),
            state: None,
        }
    }

    fn filter(&self) -> WorkItemFilter {
        WorkItemFilter {
            sprint: self.sprint,
            types: self.types.clone(),
            state: self.state.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the four sprint indicators
    Compute {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// Only items closed in this month (YYYY-MM)
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Print prepared work items (parsed dates and sprint boundaries)
    Prepare {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// List sprints present in the data, most recent first
    Sprints {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// List months with closed items, most recent first
    Months {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show item counters and status distribution
    Overview {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show one work item
    Show {
        /// Work item id
        id: i64,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Show the resolved dates of a sprint
    Calendar {
        /// Sprint number
        sprint: u64,
    },

    /// Import a tracker export into the work-item database
    Import {
        /// Tracker export (JSON array of work items)
        #[arg(short, long)]
        input: PathBuf,

        /// Work-item database path
        #[arg(long)]
        db: PathBuf,
    },

    /// Compute Orquestra ticket indicators
    Tickets {
        /// Ticket export (JSON array of Orquestra tickets)
        #[arg(short, long)]
        input: PathBuf,

        /// Only tickets of this request type (e.g. Bug, Melhoria, Ajuste)
        #[arg(short = 't', long = "type")]
        request_type: Option<String>,

        /// Only tickets of this system
        #[arg(long)]
        system: Option<String>,
    },

    /// Show phase progress of a project timeline document
    Timeline {
        /// Timeline JSON file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match &cli.command {
        Some(Commands::Compute { source, filter, month }) => {
            let items = load_items(&settings, source, filter)?;
            let calendar = settings.sprint_calendar()?;
            let mut prepared = prepare::prepare_items(&items, &calendar);
            if let Some(month) = month {
                prepared = overview::filter_by_closed_month(&prepared, month)?;
            }
            let kpis = kpi::compute_kpis(&prepared);

            if cli.json {
                return print_json(&kpis);
            }
            println!("{} work items", prepared.len());
            for (key, result) in kpis.entries() {
                print_kpi(key, result);
            }
            Ok(())
        }
        Some(Commands::Prepare { source, filter }) => {
            let items = load_items(&settings, source, filter)?;
            let prepared = prepare::prepare_items(&items, &settings.sprint_calendar()?);
            print_json(&prepared)
        }
        Some(Commands::Sprints { source }) => {
            let items = load_items(&settings, source, &FilterArgs::empty())?;
            let sprints = overview::available_sprints(&items);
            if cli.json {
                return print_json(&sprints);
            }
            for sprint in sprints {
                println!("Sprint {}", sprint);
            }
            Ok(())
        }
        Some(Commands::Months { source, filter }) => {
            let items = load_items(&settings, source, filter)?;
            let prepared = prepare::prepare_items(&items, &settings.sprint_calendar()?);
            let months = overview::available_months(&prepared);
            if cli.json {
                return print_json(&months);
            }
            for month in months {
                println!("{}", month);
            }
            Ok(())
        }
        Some(Commands::Overview { source, filter }) => {
            let items = load_items(&settings, source, filter)?;
            let summary = overview::overview(&items);
            if cli.json {
                return print_json(&summary);
            }
            println!("Total items:    {}", summary.total_items);
            println!("Closed items:   {}", summary.closed_items);
            println!("Epics:          {}", summary.epics);
            println!("Sprints:        {}", summary.unique_sprints);
            for status in &summary.status_distribution {
                println!("  {:<20} {}", status.state, status.count);
            }
            Ok(())
        }
        Some(Commands::Show { id, source }) => {
            let store = storage::open(&source.source()?, &settings.fields)?;
            let Some(item) = store.get(*id)? else {
                bail!("work item {} not found in {}", id, store.path());
            };
            let prepared = prepare::prepare_item(&item, &settings.sprint_calendar()?);
            if cli.json {
                return print_json(&prepared);
            }
            println!("{} {}", format!("#{}", item.id).bold(), item.title);
            println!("  type:       {}", item.work_item_type);
            println!("  state:      {}", item.state);
            println!("  iteration:  {}", item.iteration.as_deref().unwrap_or("-"));
            println!("  sprint:     {}", show_or_dash(prepared.sprint_num));
            println!("  created:    {}", show_or_dash(prepared.parsed_created_date));
            println!("  closed:     {}", show_or_dash(prepared.parsed_closed_date));
            println!("  solution:   {}", item.solution_type.as_deref().unwrap_or("-"));
            Ok(())
        }
        Some(Commands::Calendar { sprint }) => {
            let calendar = settings.sprint_calendar()?;
            let bounds = calendar.bounds(*sprint);
            if bounds.is_unresolved() {
                bail!("sprint {} is outside the range the calendar can extrapolate", sprint);
            }
            if cli.json {
                return print_json(&bounds);
            }
            println!("Sprint {}", bounds.sprint);
            println!("  start:      {}", show_or_dash(bounds.start));
            println!("  end:        {}", show_or_dash(bounds.end));
            println!("  tolerance:  {}", show_or_dash(bounds.end_tol));
            Ok(())
        }
        Some(Commands::Import { input, db }) => {
            let export = storage::json::JsonExportStore::new(input.clone(), settings.fields.clone());
            let items = export.load_all()?;
            let store = SqliteStore::new(db.clone())?;
            let previous_import = store.get_metadata("last_import_at")?;
            let summary = store.import_items(&items)?;
            store.set_metadata("last_import_source", export.path())?;
            store.set_metadata("last_import_at", &Utc::now().to_rfc3339())?;
            let total = store.count()?;

            if cli.json {
                return print_json(&serde_json::json!({
                    "summary": summary,
                    "total": total,
                    "previous_import": previous_import,
                }));
            }
            println!(
                "Imported {} work items into {}: {} new, {} updated, {} unchanged",
                items.len(),
                store.path(),
                summary.inserted,
                summary.updated,
                summary.unchanged
            );
            println!("Database now holds {} work items", total);
            if let Some(previous) = previous_import {
                println!("Previous import: {}", previous);
            }
            Ok(())
        }
        Some(Commands::Tickets { input, request_type, system }) => {
            let filter = orquestra::TicketFilter {
                request_type: request_type.clone(),
                system: system.clone(),
            };
            let tickets = filter.apply(storage::json::load_tickets(input)?);
            let kpis = orquestra::compute_ticket_kpis(&tickets);

            if cli.json {
                return print_json(&kpis);
            }
            println!("Tickets:                  {}", kpis.total);
            println!(
                "Finalizados:              {} ({:.0}%)",
                kpis.finished,
                kpis.completion_rate()
            );
            println!("Em andamento:             {}", kpis.in_progress);
            println!("Tempo médio de resolução: {:.1} dias", kpis.mean_resolution_days);
            println!("Reaberturas (média):      {:.2}", kpis.mean_reopenings);
            println!("Taxa de sucesso:          {:.1}%", kpis.success_rate);
            Ok(())
        }
        Some(Commands::Timeline { file }) => {
            let text = fs::read_to_string(file)
                .with_context(|| format!("Failed to read timeline at {:?}", file))?;
            let mut doc: timeline::Timeline = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse timeline at {:?}", file))?;
            doc.refresh_progress();

            if cli.json {
                return print_json(&doc);
            }
            for phase in &doc.phases {
                println!(
                    "{:<40} {:>3}% ({}/{})",
                    phase.name,
                    phase.progress,
                    phase.delivered(),
                    phase.activities.len()
                );
            }
            println!("Risks: {}  Lessons: {}", doc.risks.len(), doc.lessons.len());
            Ok(())
        }
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    }
}

fn load_items(settings: &Settings, source: &SourceArgs, filter: &FilterArgs) -> Result<Vec<WorkItem>> {
    let store = storage::open(&source.source()?, &settings.fields)?;
    let items = store.load_all()?;
    Ok(filter.filter().apply(items))
}

fn show_or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn paint(text: String, color: Option<KpiColor>) -> ColoredString {
    match color {
        Some(KpiColor::Green) => text.green(),
        Some(KpiColor::Yellow) => text.yellow(),
        Some(KpiColor::Red) => text.red(),
        Some(KpiColor::Off) => text.dimmed(),
        None => text.normal(),
    }
}

fn print_kpi(key: &str, result: &KpiResult) {
    let (title, value) = match key {
        "tempo_medio" => (
            "Tempo Médio de Análise",
            format!("{:.1} {}", result.value, result.unit.as_deref().unwrap_or("")),
        ),
        "implantacao" => ("Taxa de Implantação", format!("{:.1}%", result.value)),
        "cronograma" => ("Cronograma", format!("{:.0}%", result.value)),
        _ => ("Desvio de Escopo", format!("{:.1}%", result.value)),
    };

    let mut line = format!("{:<24} {}", title, paint(value, result.color).bold());
    if let Some(ref message) = result.message {
        line.push_str(&format!("  {}", message));
    }
    if let Some(ref label) = result.classification {
        if !result.message.as_deref().unwrap_or("").contains(label.as_str()) {
            line.push_str(&format!("  [{}]", paint(label.clone(), result.color)));
        }
    }
    println!("{}", line);
}
