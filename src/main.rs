use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use odds_radar::config::{
    Config, DEFAULT_CONFIG_PATH, DEFAULT_LOG_LEVEL, ENV_DATE, ENV_ISSUE, ENV_LOG,
};
use odds_radar::http_client::{DEFAULT_REQUEST_TIMEOUT_SECS, build_http_client};
use odds_radar::lottery_feed::{fetch_issue_fixtures, fetch_recent_issues};
use odds_radar::pipeline::{self, PassReport};
use odds_radar::report::write_dashboard;
use odds_radar::snapshot::SnapshotStage;
use odds_radar::store::SnapshotStore;
use odds_radar::team_alias::AliasTable;
use odds_radar::titan_pages::HttpPageSource;
use odds_radar::xlsx_export::export_workbook;

#[derive(Parser, Debug)]
#[command(name = "odds_radar", version, about = "Football odds snapshot tracker and dashboard")]
struct Cli {
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Overrides the configured issue number.
    #[arg(long, global = true)]
    issue: Option<String>,

    /// Overrides the configured listing date (YYYYMMDD).
    #[arg(long, global = true)]
    date: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List recent lottery issue numbers.
    Issues,
    /// Seed the store with the issue's fixtures.
    Fixtures,
    /// Link fixtures to titan007 match ids for the configured date.
    Match,
    /// Capture one snapshot stage.
    Snapshot {
        #[arg(value_parser = parse_stage)]
        stage: SnapshotStage,
    },
    /// Render the HTML dashboard.
    Report,
    /// Write the xlsx workbook.
    Export,
    /// Show fill counts per stage.
    Status,
}

fn parse_stage(raw: &str) -> Result<SnapshotStage, String> {
    raw.parse()
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let cli = Cli::parse();
    let mut overrides = HashMap::new();
    if let Some(issue) = cli.issue.clone() {
        overrides.insert(ENV_ISSUE.to_string(), issue);
    }
    if let Some(date) = cli.date.clone() {
        overrides.insert(ENV_DATE.to_string(), date);
    }

    if let Command::Issues = cli.command {
        init_logging(&std::env::var(ENV_LOG).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()));
        let timeout = Config::load(&cli.config, &overrides)
            .map(|c| c.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        let client = build_http_client(timeout)?;
        let issues = fetch_recent_issues(&client)?;
        println!("Recent issues: {}", issues.len());
        for issue in issues {
            println!("  {issue}");
        }
        return Ok(());
    }

    let cfg = Config::load(&cli.config, &overrides)?;
    init_logging(&cfg.log_level);
    info!(issue = %cfg.issue, date = %cfg.date, db = %cfg.db_path.display(), "odds_radar starting");

    let mut store = SnapshotStore::open(&cfg.db_path)?;
    match cli.command {
        Command::Issues => {}
        Command::Fixtures => {
            let client = build_http_client(cfg.request_timeout_secs)?;
            let fixtures = fetch_issue_fixtures(&client, &cfg.issue)
                .with_context(|| format!("failed loading fixtures for issue {}", cfg.issue))?;
            let report = pipeline::seed_fixtures(&mut store, &fixtures)?;
            print_report(&report);
        }
        Command::Match => {
            let aliases = AliasTable::load_csv(&cfg.alias_csv, cfg.alias_duplicates)?;
            info!(aliases = aliases.len(), "alias table loaded");
            let source = page_source(&cfg)?;
            let report = pipeline::match_pass(
                &mut store,
                &cfg.issue,
                &source,
                &cfg.date,
                &aliases,
                cfg.candidate_duplicates,
            )?;
            print_report(&report);
        }
        Command::Snapshot { stage } => {
            let source = page_source(&cfg)?;
            let report = pipeline::snapshot_pass(
                &mut store,
                &cfg.issue,
                stage,
                &source,
                &cfg.target_providers,
            )?;
            print_report(&report);
        }
        Command::Report => {
            let records = store.load_issue(&cfg.issue)?;
            let (rows, report) = pipeline::build_report_rows(records, cfg.lean_tie);
            write_dashboard(&cfg.output_html, &cfg.issue, &rows)?;
            print_report(&report);
            println!("Dashboard: {}", cfg.output_html.display());
        }
        Command::Export => {
            let records = store.load_issue(&cfg.issue)?;
            let (rows, _) = pipeline::build_report_rows(records, cfg.lean_tie);
            let export = export_workbook(&cfg.excel_path, &cfg.issue, &rows)?;
            println!("Workbook: {}", cfg.excel_path.display());
            println!("Fixtures: {} (linked {})", export.fixtures, export.linked);
        }
        Command::Status => {
            let status = store.issue_status(&cfg.issue)?;
            println!("Issue {}", cfg.issue);
            println!(
                "Fixtures: {} (matched {}, unmatched {}, pending {})",
                status.fixtures, status.matched, status.unmatched, status.pending
            );
            for (stage, counts) in status.stages {
                println!(
                    "  {}: complete {}, partial {}, empty {}",
                    stage.label(),
                    counts.complete,
                    counts.partial,
                    counts.empty
                );
            }
        }
    }
    Ok(())
}

fn page_source(cfg: &Config) -> Result<HttpPageSource> {
    let client = build_http_client(cfg.request_timeout_secs)?;
    Ok(HttpPageSource::new(client, cfg.pacing_ms))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_report(report: &PassReport) {
    println!("Pass {} complete", report.pass);
    println!("Visited: {}", report.visited);
    println!("Filled: {}", report.filled);
    println!("Skipped: {}", report.skipped);
    if report.degradations.is_empty() {
        return;
    }
    println!("Degradations: {}", report.degradations.len());
    for (kind, count) in report.counts_by_kind() {
        println!("  {kind}: {count}");
    }
    for d in &report.degradations {
        println!("   - {d}");
    }
}
