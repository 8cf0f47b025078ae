use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use stocksense_core::{AllocationMode, BacktestRequest, ConfigLoader, SignalStatus, Ticker};
use stocksense_data::SignalFilter;
use stocksense_engine::SignalEngine;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "stocksense")]
#[command(about = "Multi-agent equity signal engine", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and persist a signal for one ticker
    Signal {
        ticker: String,
    },
    /// Generate signals for several tickers (or the active watchlist)
    Batch {
        /// Tickers; empty means the active watchlist
        tickers: Vec<String>,
    },
    /// List persisted signals
    List {
        #[arg(long)]
        ticker: Option<String>,
        /// BUY, SELL, or HOLD
        #[arg(long)]
        signal_type: Option<String>,
        /// PENDING, APPROVED, EXECUTED, or CLOSED
        #[arg(long)]
        status: Option<String>,
        /// Lookback window in days
        #[arg(long)]
        days: Option<i64>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Show one signal with its agent analyses
    Show {
        id: i64,
    },
    /// Advance a signal's status
    Status {
        id: i64,
        /// APPROVED, EXECUTED, or CLOSED
        new_status: String,
        /// Realised P&L, only meaningful when closing
        #[arg(long)]
        pnl: Option<Decimal>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Replay persisted BUY signals under an allocation mode
    Backtest {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
        /// CORE_FOCUS, BALANCED, or DIVERSIFIED
        #[arg(long, default_value = "BALANCED")]
        mode: String,
        #[arg(long, default_value = "100000")]
        capital: Decimal,
        #[arg(long, default_value_t = 30)]
        hold_days: u32,
    },
    /// Run all three allocation modes over the same selection
    CompareModes {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value = "100000")]
        capital: Decimal,
        #[arg(long, default_value_t = 30)]
        hold_days: u32,
    },
    /// Load a saved backtest report
    ShowBacktest {
        run_id: Uuid,
    },
    /// Signal statistics over a lookback window
    Stats {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::load_from(&cli.config)?;
    let pool = stocksense_data::connect(&config.database).await?;
    stocksense_data::apply_schema(&pool).await?;
    let engine = SignalEngine::new(config, pool);

    match cli.command {
        Commands::Signal { ticker } => {
            let report = engine.generate_signal(&ticker).await?;
            print_json(&report)?;
        }
        Commands::Batch { tickers } => {
            let tickers = if tickers.is_empty() {
                engine
                    .active_watchlist()
                    .await?
                    .into_iter()
                    .map(|t| t.to_string())
                    .collect()
            } else {
                tickers
            };
            let items = engine.generate_batch(&tickers).await;
            print_json(&items)?;
        }
        Commands::List {
            ticker,
            signal_type,
            status,
            days,
            limit,
            offset,
        } => {
            let filter = SignalFilter {
                ticker: ticker.as_deref().map(Ticker::parse).transpose()?,
                signal_type: signal_type
                    .as_deref()
                    .map(str::parse)
                    .transpose()
                    .map_err(|e: String| anyhow::anyhow!(e))?,
                status: status.as_deref().map(str::parse).transpose()?,
                window_days: days,
                limit,
                offset,
            };
            let verdicts = engine.list_signals(&filter).await?;
            print_json(&verdicts)?;
        }
        Commands::Show { id } => {
            let verdict = engine.get_signal(id).await?;
            print_json(&verdict)?;
        }
        Commands::Status {
            id,
            new_status,
            pnl,
            notes,
        } => {
            let new_status: SignalStatus = new_status.parse()?;
            let verdict = engine.update_signal_status(id, new_status, pnl, notes).await?;
            print_json(&verdict)?;
        }
        Commands::Backtest {
            start,
            end,
            mode,
            capital,
            hold_days,
        } => {
            let mode: AllocationMode = mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let request = BacktestRequest {
                start_date: start,
                end_date: end,
                mode,
                starting_capital: capital,
                hold_period_days: hold_days,
                tickers: None,
            };
            let report = engine.run_backtest(&request).await?;
            print_json(&report)?;
        }
        Commands::CompareModes {
            start,
            end,
            capital,
            hold_days,
        } => {
            let request = BacktestRequest {
                start_date: start,
                end_date: end,
                mode: AllocationMode::Balanced,
                starting_capital: capital,
                hold_period_days: hold_days,
                tickers: None,
            };
            let reports = engine.compare_backtest_modes(&request).await?;
            print_json(&reports)?;
        }
        Commands::ShowBacktest { run_id } => {
            let report = engine.get_backtest(run_id).await?;
            print_json(&report)?;
        }
        Commands::Stats { days } => {
            let stats = engine.statistics(days).await?;
            println!("period: {} days", stats.period_days);
            println!("signals: {}", stats.total);
            for (signal_type, count) in &stats.by_type {
                println!("  {signal_type}: {count}");
            }
            for (status, count) in &stats.by_status {
                println!("  {status}: {count}");
            }
            if let Some(win_rate) = stats.win_rate {
                println!("closed: {} (win rate {:.1}%)", stats.closed, win_rate * 100.0);
            }
            if let Some(avg) = stats.average_pnl {
                println!("average pnl: {avg}");
            }
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
