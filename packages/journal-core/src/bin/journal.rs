//! Journal CLI - Command line interface for trading journal analytics.
//!
//! Every command prints a JSON `ApiResponse` on stdout; logs go to stderr.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use journal_core::{
    analytics::{analyze, breakdown_by, period_pnl, Attribute, Period},
    behavior::analyze_behavior,
    time::{day_key_str, today},
    ApiResponse, Direction, FilterSpec, JournalConfig, LedgerEvent, Position, PositionLedger,
    PositionRecord, StatusFilter, SystemClock, Timezone,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "journal")]
#[command(about = "Trading journal CLI - position ledger, analytics and behavior checks")]
#[command(version)]
struct Cli {
    /// Timezone for day bucketing (overrides config)
    #[arg(long, global = true)]
    tz: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Performance report over a positions file
    Analytics {
        /// JSON array of positions (or `{ "positions": [...] }`)
        #[arg(short, long)]
        file: PathBuf,
        /// First local day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last local day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        #[arg(long, value_enum, default_value = "all")]
        status: StatusArg,
        /// Symbols to include (repeatable)
        #[arg(short, long)]
        symbol: Vec<String>,
        #[arg(long)]
        strategy: Vec<String>,
        #[arg(long)]
        timeframe: Vec<String>,
        #[arg(long, value_enum)]
        direction: Vec<DirectionArg>,
        /// Starting balance (overrides config)
        #[arg(long)]
        balance: Option<f64>,
        /// Add a breakdown by this attribute
        #[arg(long, value_enum)]
        breakdown: Option<AttributeArg>,
        /// Add a PnL calendar at this granularity
        #[arg(long, value_enum)]
        period: Option<PeriodArg>,
    },
    /// Revenge-trade and tilt detection over a positions file
    Behavior {
        #[arg(short, long)]
        file: PathBuf,
        /// Revenge window in minutes (overrides config)
        #[arg(short, long)]
        window: Option<i64>,
    },
    /// Apply a ledger event to a position snapshot
    Apply {
        /// JSON position snapshot
        #[arg(short, long)]
        file: PathBuf,
        /// JSON event, e.g. '{"type":"close","price":105,"reason":"manual"}'
        #[arg(short, long)]
        event: String,
        /// Write the updated snapshot back to the file
        #[arg(long)]
        write: bool,
    },
    /// Local day key of a timestamp (today when omitted)
    DayKey {
        #[arg(short, long)]
        timestamp: Option<String>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum StatusArg {
    All,
    Open,
    Closed,
}

impl From<StatusArg> for StatusFilter {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::All => StatusFilter::All,
            StatusArg::Open => StatusFilter::Open,
            StatusArg::Closed => StatusFilter::Closed,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum DirectionArg {
    Long,
    Short,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Long => Direction::Long,
            DirectionArg::Short => Direction::Short,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum AttributeArg {
    Symbol,
    Strategy,
    Timeframe,
    Direction,
}

impl From<AttributeArg> for Attribute {
    fn from(arg: AttributeArg) -> Self {
        match arg {
            AttributeArg::Symbol => Attribute::Symbol,
            AttributeArg::Strategy => Attribute::Strategy,
            AttributeArg::Timeframe => Attribute::Timeframe,
            AttributeArg::Direction => Attribute::Direction,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum PeriodArg {
    Day,
    Week,
    Month,
}

impl From<PeriodArg> for Period {
    fn from(arg: PeriodArg) -> Self {
        match arg {
            PeriodArg::Day => Period::Day,
            PeriodArg::Week => Period::Week,
            PeriodArg::Month => Period::Month,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let output = match run(cli) {
        Ok(data) => render(&ApiResponse::ok(data))?,
        Err(e) => {
            tracing::error!("{:#}", e);
            render(&ApiResponse::<()>::err(format!("{:#}", e)))?
        }
    };
    println!("{}", output);
    Ok(())
}

fn render<T: Serialize>(response: &ApiResponse<T>) -> anyhow::Result<String> {
    serde_json::to_string_pretty(response).context("failed to serialize response")
}

fn run(cli: Cli) -> anyhow::Result<Value> {
    let mut config = JournalConfig::load().context("failed to load config")?;
    if let Some(tz) = cli.tz.as_deref() {
        config.timezone = tz.parse()?;
    }

    match cli.command {
        Commands::Analytics {
            file,
            from,
            to,
            status,
            symbol,
            strategy,
            timeframe,
            direction,
            balance,
            breakdown,
            period,
        } => {
            if let Some(balance) = balance {
                config.starting_balance = balance;
                config.validate()?;
            }
            let filter = FilterSpec {
                from: from.as_deref().map(journal_core::time::parse_day).transpose()?,
                to: to.as_deref().map(journal_core::time::parse_day).transpose()?,
                status: status.into(),
                symbols: symbol,
                strategies: strategy,
                timeframes: timeframe,
                directions: direction.into_iter().map(Direction::from).collect(),
            };
            handle_analytics(&file, &filter, &config, breakdown, period)
        }
        Commands::Behavior { file, window } => {
            if let Some(window) = window {
                config.revenge_window_minutes = window;
                config.validate()?;
            }
            handle_behavior(&file, &config)
        }
        Commands::Apply { file, event, write } => handle_apply(&file, &event, write, &config),
        Commands::DayKey { timestamp } => handle_day_key(timestamp.as_deref(), &config.timezone),
    }
}

fn load(file: &Path) -> anyhow::Result<(Vec<Position>, Value)> {
    let (positions, rejected) = journal_core::records::load_positions_from_path(file)
        .with_context(|| format!("failed to read positions from {}", file.display()))?;
    if !rejected.is_empty() {
        tracing::warn!(
            "{} of {} records excluded",
            rejected.len(),
            rejected.len() + positions.len()
        );
    }
    Ok((positions, serde_json::to_value(rejected)?))
}

fn handle_analytics(
    file: &Path,
    filter: &FilterSpec,
    config: &JournalConfig,
    breakdown: Option<AttributeArg>,
    period: Option<PeriodArg>,
) -> anyhow::Result<Value> {
    let (positions, rejected) = load(file)?;
    let params = config.analytics_params();
    let report = analyze(&positions, filter, &params);

    let mut data = json!({
        "timezone": config.timezone,
        "report": report,
        "rejected": rejected,
    });

    let filtered = filter.apply(&positions, &params.timezone);
    if let Some(attribute) = breakdown {
        data["breakdown"] =
            serde_json::to_value(breakdown_by(&filtered, attribute.into(), params.be_threshold))?;
    }
    if let Some(period) = period {
        data["calendar"] = serde_json::to_value(period_pnl(
            &filtered,
            period.into(),
            &params.timezone,
            params.be_threshold,
        ))?;
    }
    Ok(data)
}

fn handle_behavior(file: &Path, config: &JournalConfig) -> anyhow::Result<Value> {
    let (positions, rejected) = load(file)?;
    let report = analyze_behavior(
        &positions,
        config.revenge_window_minutes,
        config.be_threshold,
        &config.timezone,
        &config.tilt,
    );
    Ok(json!({
        "window_minutes": config.revenge_window_minutes,
        "revenge": report.revenge,
        "tilt": report.tilt,
        "rejected": rejected,
    }))
}

/// Read a snapshot, accepting both the canonical and the legacy record shape.
fn read_snapshot(file: &Path) -> anyhow::Result<Position> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("failed to read position from {}", file.display()))?;
    if let Ok(position) = serde_json::from_str::<Position>(&content) {
        return Ok(position);
    }
    let record: PositionRecord = serde_json::from_str(&content)?;
    Ok(record.into_position()?)
}

fn handle_apply(
    file: &Path,
    event: &str,
    write: bool,
    config: &JournalConfig,
) -> anyhow::Result<Value> {
    let position = read_snapshot(file)?;
    let event: LedgerEvent = serde_json::from_str(event).context("invalid event JSON")?;

    let ledger = PositionLedger::new(SystemClock).with_close_epsilon(config.close_epsilon);
    let updated = ledger.apply(&position, event)?;

    if write {
        write_atomically(file, &serde_json::to_string_pretty(&updated)?)?;
        tracing::info!("Updated {} ({})", updated.id, event.name());
    }
    Ok(json!({
        "event": event.name(),
        "position": updated,
    }))
}

/// Replace `file` through a sibling temp file so a failed write never
/// truncates the original snapshot.
fn write_atomically(file: &Path, content: &str) -> anyhow::Result<()> {
    let mut tmp_name = file.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = file.with_file_name(tmp_name);

    fs::write(&tmp, content).with_context(|| format!("failed to write {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, file) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("failed to replace {}", file.display()));
    }
    Ok(())
}

fn handle_day_key(timestamp: Option<&str>, tz: &Timezone) -> anyhow::Result<Value> {
    let key = match timestamp {
        Some(ts) => day_key_str(ts, tz)?,
        None => today(&SystemClock, tz),
    };
    Ok(json!({
        "timezone": tz,
        "day": key,
    }))
}
