//! NIFTY market data CLI
//!
//! # Usage
//!
//! ```bash
//! # Full option chain for one expiry/trade date
//! nifty-md --root /mnt/NiftyHistorical query 01FEB24 01JAN24
//!
//! # Liquid ATM calls between 10:00 and 11:00
//! nifty-md query 01FEB24 01JAN24 --strikes 21600,21700,21800 --option-type C \
//!     --start "2024-01-01 10:00" --end "2024-01-01 11:00" --min-volume 10
//!
//! # Discovery
//! nifty-md expiries 01JAN24
//! nifty-md days 2024 JAN
//!
//! # Volatility surface input at 10:00
//! nifty-md --format json surface 01JAN24 "2024-01-01 10:00" --n-expiries 8
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use nifty_marketdata::query::parse_strike_list;
use nifty_marketdata::{
    EngineConfig, OnMissing, OptionQuery, OptionRow, QueryEngine, SurfaceRequest,
    TimeSeriesRequest,
};

#[derive(Parser)]
#[command(name = "nifty-md")]
#[command(about = "Query historical NIFTY options and spot data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Dataset root (overrides the config file and NIFTY_DATA_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Return rows without spot prices when a spot file is missing
    #[arg(long, global = true)]
    allow_missing_spot: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "csv", global = true)]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Option rows for one expiry and trade date
    Query {
        /// Expiry (DDMMMYY)
        expiry: String,
        /// Trade date (DDMMMYY)
        trade_date: String,
        /// Comma-separated strikes
        #[arg(long)]
        strikes: Option<String>,
        /// C or P
        #[arg(long)]
        option_type: Option<String>,
        /// Window start, YYYY-MM-DD HH:MM
        #[arg(long)]
        start: Option<String>,
        /// Window end, YYYY-MM-DD HH:MM
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        min_volume: Option<u64>,
        /// Fail when no rows match
        #[arg(long)]
        raise_if_empty: bool,
    },

    /// Expiries available on a trade date
    Expiries { trade_date: String },

    /// Strikes present in one option file
    Strikes { expiry: String, trade_date: String },

    /// Trade dates with data in a month
    Days { year: i32, month: String },

    /// ATM strike and symmetric strike grid
    Atm {
        expiry: String,
        trade_date: String,
        #[arg(long, default_value_t = 10)]
        n_strikes: i64,
        #[arg(long, default_value_t = 100)]
        step: i64,
    },

    /// Multi-expiry snapshot at one instant
    Surface {
        trade_date: String,
        /// YYYY-MM-DD HH:MM
        timestamp: String,
        #[arg(long, default_value_t = 8)]
        n_expiries: usize,
        #[arg(long, default_value_t = 10)]
        n_strikes: i64,
        #[arg(long, default_value_t = 100)]
        step: i64,
        #[arg(long)]
        option_type: Option<String>,
        #[arg(long, default_value_t = 0)]
        min_volume: u64,
    },

    /// One expiry across several trade dates
    Series {
        expiry: String,
        /// Comma-separated trade dates
        #[arg(long)]
        trade_dates: String,
        #[arg(long)]
        strikes: Option<String>,
        #[arg(long)]
        option_type: Option<String>,
        /// HH:MM
        #[arg(long)]
        snapshot_time: Option<String>,
        #[arg(long, default_value_t = 0)]
        min_volume: u64,
        /// skip or fail
        #[arg(long)]
        on_missing: Option<String>,
    },
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    }
    .with_env_overrides();

    if let Some(root) = &cli.root {
        config.data_root = root.clone();
    }
    if cli.allow_missing_spot {
        config.require_spot = false;
    }
    Ok(config)
}

fn write_rows(rows: &[OptionRow], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(io::stdout().lock());
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        OutputFormat::Json => write_json(&rows)?,
    }
    Ok(())
}

fn write_list<T: Serialize + std::fmt::Display>(items: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Csv => {
            let mut out = io::stdout().lock();
            for item in items {
                writeln!(out, "{}", item)?;
            }
        }
        OutputFormat::Json => write_json(&items)?,
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn strikes_arg(raw: Option<String>) -> Result<Option<Vec<i64>>> {
    Ok(raw.as_deref().map(parse_strike_list).transpose()?)
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nifty_marketdata=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let engine = QueryEngine::new(config).context("Failed to open dataset")?;
    let format = cli.format;

    match cli.command {
        Commands::Query {
            expiry,
            trade_date,
            strikes,
            option_type,
            start,
            end,
            min_volume,
            raise_if_empty,
        } => {
            let query = OptionQuery {
                strikes: strikes_arg(strikes)?,
                option_type,
                start,
                end,
                min_volume,
                raise_if_empty,
            };
            let output = engine.query(&expiry, &trade_date, &query)?;
            if output.skipped_option_rows > 0 || output.skipped_spot_rows > 0 {
                eprintln!(
                    "skipped {} option row(s) and {} spot row(s) that failed to parse",
                    output.skipped_option_rows, output.skipped_spot_rows
                );
            }
            write_rows(&output.rows, format)?;
        }
        Commands::Expiries { trade_date } => {
            write_list(&engine.list_expiries(&trade_date)?, format)?;
        }
        Commands::Strikes { expiry, trade_date } => {
            write_list(&engine.list_strikes(&expiry, &trade_date)?, format)?;
        }
        Commands::Days { year, month } => {
            write_list(&engine.list_trading_days(year, &month)?, format)?;
        }
        Commands::Atm {
            expiry,
            trade_date,
            n_strikes,
            step,
        } => {
            let grid = engine
                .surface()
                .get_atm_strikes(&expiry, &trade_date, n_strikes, step)?;
            match format {
                OutputFormat::Json => write_json(&grid)?,
                OutputFormat::Csv => {
                    println!("atm_strike,{}", grid.atm_strike);
                    println!("reference_spot,{}", grid.reference_spot);
                    write_list(&grid.strikes, format)?;
                }
            }
        }
        Commands::Surface {
            trade_date,
            timestamp,
            n_expiries,
            n_strikes,
            step,
            option_type,
            min_volume,
        } => {
            let request = SurfaceRequest {
                n_expiries,
                n_strikes,
                step,
                option_type,
                min_volume,
            };
            let rows = engine
                .surface()
                .surface_snapshot(&trade_date, &timestamp, &request)?;
            write_rows(&rows, format)?;
        }
        Commands::Series {
            expiry,
            trade_dates,
            strikes,
            option_type,
            snapshot_time,
            min_volume,
            on_missing,
        } => {
            let on_missing = match on_missing {
                Some(raw) => Some(
                    OnMissing::from_str_case_insensitive(&raw)
                        .with_context(|| format!("Invalid --on-missing '{}', expected skip or fail", raw))?,
                ),
                None => None,
            };
            let dates: Vec<&str> = trade_dates
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect();
            let request = TimeSeriesRequest {
                strikes: strikes_arg(strikes)?,
                option_type,
                snapshot_time,
                min_volume,
                on_missing,
            };
            let series = engine
                .surface()
                .query_time_series(&expiry, &dates, &request)?;
            for skipped in &series.skipped {
                eprintln!("[SKIP] {}: {}", skipped.trade_date, skipped.reason);
            }
            write_rows(&series.rows, format)?;
        }
    }

    Ok(())
}
