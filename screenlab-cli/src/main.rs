//! ScreenLab CLI — calculation cycles and indicator queries.
//!
//! Commands:
//! - `cycle` — run a daily or backfill calculation cycle
//! - `latest` — print the latest indicator set for a symbol (with fallback)
//! - `history` — print or export a symbol's indicator history
//! - `status` — raw data vs. stored indicators, per symbol

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use screenlab_core::data::{ParquetPriceStore, SymbolUniverse, Universe};
use screenlab_core::store::{HistoryStore, JsonFileStore, SnapshotStore};
use screenlab_runner::{
    export_history_csv, export_report_json, history_csv_string, BatchOrchestrator, CycleRequest,
    IndicatorService, ScreenConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "screenlab",
    about = "ScreenLab CLI — incremental technical indicator engine"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Universe TOML (sector → tickers). Overrides `[data].universe_file`.
    #[arg(long, global = true)]
    universe: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a calculation cycle.
    Cycle {
        /// Daily target date (YYYY-MM-DD). Defaults to the newest raw date.
        #[arg(long, conflicts_with_all = ["start", "end"])]
        date: Option<String>,

        /// Backfill start date (YYYY-MM-DD).
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Backfill end date (YYYY-MM-DD).
        #[arg(long, requires = "start")]
        end: Option<String>,

        /// Recompute and replace dates that already have history.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Wall-clock budget in seconds. Overrides `[batch].time_budget_secs`.
        #[arg(long)]
        budget_secs: Option<u64>,

        /// Symbols to process (comma separated). Defaults to the universe.
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Raw-data source to require. Overrides `[data].default_source`.
        #[arg(long)]
        source: Option<String>,

        /// Print the full report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the latest indicator set for a symbol.
    Latest {
        symbol: String,

        /// Serve stored snapshots only; never compute on demand.
        #[arg(long, default_value_t = false)]
        no_fallback: bool,
    },
    /// Print or export indicator history for a symbol.
    History {
        symbol: String,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Write CSV to this path instead of stdout.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Report raw data and stored indicator dates per symbol.
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ScreenConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ScreenConfig::default(),
    };
    let ctx = Workspace::open(config, cli.universe)?;

    match cli.command {
        Commands::Cycle {
            date,
            start,
            end,
            force,
            budget_secs,
            symbols,
            source,
            json,
        } => run_cycle(&ctx, date, start, end, force, budget_secs, symbols, source, json),
        Commands::Latest {
            symbol,
            no_fallback,
        } => run_latest(&ctx, &symbol, no_fallback),
        Commands::History {
            symbol,
            start,
            end,
            csv,
        } => run_history(&ctx, &symbol, &start, &end, csv),
        Commands::Status => run_status(&ctx),
    }
}

/// Stores and config shared by every command.
struct Workspace {
    config: ScreenConfig,
    prices: Arc<ParquetPriceStore>,
    store: Arc<JsonFileStore>,
    universe: Arc<dyn SymbolUniverse>,
}

impl Workspace {
    fn open(config: ScreenConfig, universe_override: Option<PathBuf>) -> Result<Self> {
        let prices = Arc::new(ParquetPriceStore::new(&config.data.price_dir));
        let store = Arc::new(JsonFileStore::new(&config.data.store_dir));
        let universe: Arc<dyn SymbolUniverse> =
            match universe_override.or_else(|| config.data.universe_file.clone()) {
                Some(path) => Arc::new(
                    Universe::from_file(&path)
                        .with_context(|| format!("failed to load universe {}", path.display()))?,
                ),
                None => prices.clone(),
            };
        Ok(Self {
            config,
            prices,
            store,
            universe,
        })
    }

    fn service(&self, fallback: bool) -> IndicatorService {
        if fallback {
            IndicatorService::from_config(
                &self.config,
                self.prices.clone(),
                self.store.clone(),
                self.store.clone(),
            )
        } else {
            IndicatorService::new(self.store.clone(), self.store.clone())
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

#[allow(clippy::too_many_arguments)]
fn run_cycle(
    ctx: &Workspace,
    date: Option<String>,
    start: Option<String>,
    end: Option<String>,
    force: bool,
    budget_secs: Option<u64>,
    symbols: Vec<String>,
    source: Option<String>,
    json: bool,
) -> Result<()> {
    let mut request = match (start, end) {
        (Some(start), Some(end)) => CycleRequest::backfill(parse_date(&start)?, parse_date(&end)?),
        (None, None) => CycleRequest::daily(date.as_deref().map(parse_date).transpose()?),
        _ => bail!("--start and --end must be given together"),
    }
    .with_force(force);

    if !symbols.is_empty() {
        request = request.with_symbols(symbols);
    }
    if let Some(budget) = budget_secs.map(Duration::from_secs).or(ctx.config.time_budget()) {
        request = request.with_time_budget(budget);
    }
    if let Some(source) = source {
        request = request.with_source(source);
    }

    let orchestrator = BatchOrchestrator::from_config(
        &ctx.config,
        ctx.prices.clone(),
        ctx.store.clone(),
        ctx.store.clone(),
        ctx.universe.clone(),
    );
    let report = orchestrator.run_calculation_cycle(&request)?;

    if json {
        println!("{}", export_report_json(&report)?);
    } else {
        println!("{report}");
    }

    if !report.failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_latest(ctx: &Workspace, symbol: &str, no_fallback: bool) -> Result<()> {
    let set = ctx.service(!no_fallback).get_latest(symbol)?;
    println!("{}", serde_json::to_string_pretty(&set)?);
    Ok(())
}

fn run_history(
    ctx: &Workspace,
    symbol: &str,
    start: &str,
    end: &str,
    csv: Option<PathBuf>,
) -> Result<()> {
    let (start, end) = (parse_date(start)?, parse_date(end)?);
    if start > end {
        bail!("--start {start} is after --end {end}");
    }
    let records = ctx.service(false).get_history(symbol, start, end)?;

    match csv {
        Some(path) => {
            export_history_csv(&path, &records)?;
            info!(symbol, records = records.len(), path = %path.display(), "history exported");
            println!("{} records written to {}", records.len(), path.display());
        }
        None => print!("{}", history_csv_string(&records)?),
    }
    Ok(())
}

fn run_status(ctx: &Workspace) -> Result<()> {
    let mut symbols = ctx.prices.symbols()?;
    for symbol in ctx.store.symbols()? {
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols.sort();

    if symbols.is_empty() {
        println!("No raw data under {}", ctx.config.data.price_dir.display());
        return Ok(());
    }

    let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
    let raw = ctx.prices.status(&refs);

    println!(
        "{:<10} {:>8} {:>12} {:>12} {:>12}",
        "symbol", "points", "raw_end", "history", "snapshot"
    );
    for status in raw {
        let history = ctx.store.latest_date(&status.symbol)?;
        let snapshot = ctx
            .store
            .get_snapshot(&status.symbol)?
            .map(|s| s.calculated_date);
        println!(
            "{:<10} {:>8} {:>12} {:>12} {:>12}",
            status.symbol,
            status.point_count.map_or("-".to_string(), |n| n.to_string()),
            fmt_date(status.end_date),
            fmt_date(history),
            fmt_date(snapshot),
        );
    }
    Ok(())
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map_or("-".to_string(), |d| d.to_string())
}
