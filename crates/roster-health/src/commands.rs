//! Subcommand handlers and their text rendering.
//!
//! Every handler opens the stores it needs, runs one use case and prints the
//! result, as text or as JSON with `--json`. Rendering lives in plain
//! functions returning `String` so it can be tested without a terminal.

use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use health_core::alerts::Alert;
use health_core::error::CoreError;
use health_core::formatting::{format_date, format_money, format_mrr, format_number, format_score};
use health_core::health::{HealthClassification, HealthScoreCalculator};
use health_core::models::{AccountType, Customer, CustomerStatus};
use health_core::settings::{Command, SearchArgs, Settings};
use health_data::aggregator::{CustomerStatistics, HealthDistribution, MrrByCountry};
use health_data::exporter::{export_to_path, ExportOptions};
use health_data::file_store::JsonFileRepository;
use health_data::history::ScoreHistoryStore;
use health_data::reader::read_records_from_path;
use health_data::repository::{CustomerRepository, SearchCriteria, SearchResult};
use health_runtime::orchestrator::{ImportSnapshot, WatchOrchestrator};
use health_runtime::pipeline::{ImportOutcome, ImportPipeline};
use health_runtime::roster_source::RosterSource;
use serde::Serialize;

const CLASSIFICATIONS: [HealthClassification; 3] = [
    HealthClassification::Healthy,
    HealthClassification::AtRisk,
    HealthClassification::Critical,
];

// ── Dispatch ──────────────────────────────────────────────────────────────────

pub async fn run(settings: &Settings, command: Command) -> Result<ExitCode> {
    match command {
        Command::Import { file } => import(settings, &file),
        Command::Search(args) => search(settings, args),
        Command::Stats => stats(settings),
        Command::Export { file, with_health } => export(settings, &file, with_health),
        Command::Alerts { ack } => alerts(settings, ack),
        Command::Watch { file, interval } => watch(settings, &file, interval).await,
        Command::Clear => clear(settings),
    }
}

fn open_repository(settings: &Settings) -> Result<JsonFileRepository> {
    Ok(JsonFileRepository::open(settings.store_path())?)
}

fn open_history(settings: &Settings) -> Result<ScoreHistoryStore> {
    Ok(ScoreHistoryStore::open(settings.history_path())?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── import ────────────────────────────────────────────────────────────────────

fn import(settings: &Settings, file: &Path) -> Result<ExitCode> {
    let records = read_records_from_path(file, settings.delimiter)?;
    let mut repository = open_repository(settings)?;
    let mut history = open_history(settings)?;

    let outcome = ImportPipeline::new(&mut repository, &mut history, HealthScoreCalculator::now())
        .execute(&records);

    if settings.json {
        print_json(&outcome)?;
    } else {
        print!("{}", render_import(&outcome));
    }

    Ok(if outcome.summary.is_storage_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn render_import(outcome: &ImportOutcome) -> String {
    let summary = &outcome.summary;
    let mut out = String::new();

    if let Some(code) = summary.storage_error {
        let _ = writeln!(out, "Import failed: {}", code.user_message());
    }
    let _ = writeln!(
        out,
        "Imported {}, updated {}, rejected {} of {} rows",
        summary.imported_count, summary.skipped_count, summary.error_count, summary.total_rows
    );

    if !summary.errors.is_empty() {
        let _ = writeln!(out, "\nErrors:");
        for e in &summary.errors {
            let _ = writeln!(out, "  Row {}: {} {}", e.row, e.field, e.message);
        }
    }
    if !summary.warnings.is_empty() {
        let _ = writeln!(out, "\nWarnings:");
        for w in &summary.warnings {
            let _ = writeln!(out, "  {w}");
        }
    }
    if !summary.health_scores.is_empty() && !summary.is_storage_failure() {
        let _ = writeln!(out, "\nHealth:");
        for h in &summary.health_scores {
            let _ = writeln!(out, "  Row {:<4} {:<16} {}", h.row, h.customer_id, format_score(h.score));
        }
    }
    if !outcome.alerts.is_empty() {
        let _ = writeln!(out, "\nAlerts:");
        out.push_str(&render_alert_lines(&outcome.alerts));
    }
    if let Some(code) = outcome.history_error {
        let _ = writeln!(out, "\nScore history not saved: {}", code.user_message());
    }
    out
}

// ── search ────────────────────────────────────────────────────────────────────

/// A customer with its current score, as printed by `search --json`.
#[derive(Serialize)]
struct ScoredCustomer<'a> {
    #[serde(flatten)]
    customer: &'a Customer,
    health_score: u8,
    health_status: HealthClassification,
}

#[derive(Serialize)]
struct ScoredPage<'a> {
    customers: Vec<ScoredCustomer<'a>>,
    total_count: usize,
}

fn search(settings: &Settings, args: SearchArgs) -> Result<ExitCode> {
    let criteria = criteria_from_args(args)?;
    let repository = open_repository(settings)?;
    let calculator = HealthScoreCalculator::now();
    let result = repository.search(&criteria, calculator)?;

    if settings.json {
        let page = ScoredPage {
            customers: result
                .customers
                .iter()
                .map(|customer| {
                    let score = calculator.score(customer);
                    ScoredCustomer {
                        customer,
                        health_score: score.value(),
                        health_status: score.classification(),
                    }
                })
                .collect(),
            total_count: result.total_count,
        };
        print_json(&page)?;
    } else {
        print!("{}", render_search(&result, &criteria, calculator));
    }
    Ok(ExitCode::SUCCESS)
}

/// Turn the parsed CLI filters into repository criteria.
fn criteria_from_args(args: SearchArgs) -> Result<SearchCriteria, CoreError> {
    Ok(SearchCriteria {
        query: args.query.filter(|q| !q.trim().is_empty()),
        status: args
            .status
            .as_deref()
            .map(str::parse::<CustomerStatus>)
            .transpose()?,
        country: args.country,
        account_type: args
            .account_type
            .as_deref()
            .map(str::parse::<AccountType>)
            .transpose()?,
        languages: args.languages,
        channels: args.channels,
        health: args
            .health
            .as_deref()
            .map(str::parse::<HealthClassification>)
            .transpose()?,
        offset: args.offset,
        limit: args.limit,
    })
}

fn render_search(
    result: &SearchResult,
    criteria: &SearchCriteria,
    calculator: HealthScoreCalculator,
) -> String {
    let mut out = String::new();
    if result.customers.is_empty() {
        let _ = writeln!(out, "No customers found ({} matches)", result.total_count);
        return out;
    }

    let _ = writeln!(
        out,
        "{:<16} {:<28} {:<20} {:<16} {:<8} {:<18} {:>16}  {}",
        "ID", "Account", "Owner", "Country", "Type", "Status", "MRR", "Health"
    );
    for c in &result.customers {
        let _ = writeln!(
            out,
            "{:<16} {:<28} {:<20} {:<16} {:<8} {:<18} {:>16}  {}",
            c.id(),
            c.account_name(),
            c.account_owner(),
            c.billing_country(),
            c.account_type().label(),
            c.status().label(),
            format_mrr(c.mrr()),
            format_score(calculator.score(c))
        );
    }

    let first = criteria.offset + 1;
    let last = criteria.offset + result.customers.len();
    let _ = writeln!(out, "\nShowing {first}-{last} of {}", result.total_count);
    out
}

// ── stats ─────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StatsReport {
    statistics: CustomerStatistics,
    health_distribution: HealthDistribution,
    mrr_by_country: Vec<MrrByCountry>,
}

fn stats(settings: &Settings) -> Result<ExitCode> {
    let repository = open_repository(settings)?;
    let calculator = HealthScoreCalculator::now();
    let report = StatsReport {
        statistics: repository.get_statistics(calculator)?,
        health_distribution: repository.get_health_distribution(calculator)?,
        mrr_by_country: repository.get_mrr_by_country()?,
    };

    if settings.json {
        print_json(&report)?;
    } else {
        print!("{}", render_stats(&report));
    }
    Ok(ExitCode::SUCCESS)
}

/// Currency to show next to totals: the roster's only currency, or none when
/// it mixes several.
fn reporting_currency(stats: &CustomerStatistics) -> &str {
    let mut codes = stats.mrr_by_currency.keys();
    match (codes.next(), codes.next()) {
        (Some(only), None) => only.as_str(),
        _ => "",
    }
}

fn render_stats(report: &StatsReport) -> String {
    let s = &report.statistics;
    let currency = reporting_currency(s);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Customers:            {} ({} active, {} inactive)",
        s.total_customers, s.active_customers, s.inactive_customers
    );
    let _ = writeln!(
        out,
        "Account types:        {} Pro, {} Starter",
        s.pro_customers, s.starter_customers
    );
    let _ = writeln!(out, "Total MRR:            {}", format_money(s.total_mrr, currency));
    let _ = writeln!(out, "Average MRR:          {}", format_money(s.average_mrr, currency));
    let _ = writeln!(
        out,
        "Average health score: {}",
        format_number(s.average_health_score, 1)
    );
    if s.mrr_by_currency.len() > 1 {
        for (code, amount) in &s.mrr_by_currency {
            let _ = writeln!(out, "  {}", format_money(*amount, code));
        }
    }

    let _ = writeln!(out, "\nHealth distribution:");
    for classification in CLASSIFICATIONS {
        let _ = writeln!(
            out,
            "  {:<10} {:>6}  {:>5}%",
            classification.label(),
            report.health_distribution.count(classification),
            format_number(report.health_distribution.percentage(classification), 1)
        );
    }

    if !report.mrr_by_country.is_empty() {
        let _ = writeln!(out, "\nMRR by country:");
        for row in &report.mrr_by_country {
            let _ = writeln!(
                out,
                "  {:<20} {:>16}  ({} customers)",
                row.country,
                format_money(row.total_mrr, currency),
                row.customer_count
            );
        }
    }
    out
}

// ── export ────────────────────────────────────────────────────────────────────

fn export(settings: &Settings, file: &Path, with_health: bool) -> Result<ExitCode> {
    let repository = open_repository(settings)?;
    let customers = repository.get_all()?;
    let options = ExportOptions {
        delimiter: settings.delimiter,
        health: with_health.then(HealthScoreCalculator::now),
    };
    export_to_path(file, &customers, &options)?;

    if settings.json {
        print_json(&serde_json::json!({
            "exported": customers.len(),
            "path": file,
        }))?;
    } else {
        println!("Exported {} customers to {}", customers.len(), file.display());
    }
    Ok(ExitCode::SUCCESS)
}

// ── alerts ────────────────────────────────────────────────────────────────────

fn alerts(settings: &Settings, ack: Option<u64>) -> Result<ExitCode> {
    let mut history = open_history(settings)?;

    if let Some(id) = ack {
        history.acknowledge(id)?;
        if settings.json {
            print_json(&serde_json::json!({ "acknowledged": id }))?;
        } else {
            println!("Alert #{id} acknowledged");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let open = history.unacknowledged();
    if settings.json {
        print_json(&open)?;
    } else if open.is_empty() {
        println!("No open alerts");
    } else {
        let owned: Vec<Alert> = open.into_iter().cloned().collect();
        print!("{}", render_alert_lines(&owned));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_alert_lines(alerts: &[Alert]) -> String {
    let mut out = String::new();
    for a in alerts {
        let _ = writeln!(
            out,
            "  #{:<4} {}  {:<16} {:<14} {}",
            a.id,
            format_date(a.created_at),
            a.customer_id,
            a.kind.as_str(),
            a.message
        );
    }
    out
}

// ── watch ─────────────────────────────────────────────────────────────────────

async fn watch(settings: &Settings, file: &Path, interval_secs: u64) -> Result<ExitCode> {
    let repository = open_repository(settings)?;
    let history = open_history(settings)?;
    let orchestrator = WatchOrchestrator::new(
        Duration::from_secs(interval_secs),
        RosterSource::new(file, settings.delimiter),
        Box::new(repository),
        history,
    );

    let (mut rx, handle) = orchestrator.start();
    tracing::info!("Watching {} every {}s; Ctrl+C to stop", file.display(), interval_secs);

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(snapshot) = received else { break };
                if settings.json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else {
                    print!("{}", render_snapshot(&snapshot));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; stopping watch");
                break;
            }
        }
    }

    handle.abort();
    Ok(ExitCode::SUCCESS)
}

fn render_snapshot(snapshot: &ImportSnapshot) -> String {
    let outcome = ImportOutcome {
        summary: snapshot.summary.clone(),
        alerts: snapshot.alerts.clone(),
        history_error: snapshot.history_error,
    };
    let s = &snapshot.statistics;
    format!(
        "{}Roster: {} customers, total MRR {}\n\n",
        render_import(&outcome),
        s.total_customers,
        format_money(s.total_mrr, reporting_currency(s))
    )
}

// ── clear ─────────────────────────────────────────────────────────────────────

fn clear(settings: &Settings) -> Result<ExitCode> {
    let mut repository = open_repository(settings)?;
    let removed = repository.count()?;
    repository.clear()?;

    if settings.json {
        print_json(&serde_json::json!({ "removed": removed }))?;
    } else {
        println!("Removed {removed} customers from {}", repository.path().display());
    }
    Ok(ExitCode::SUCCESS)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
