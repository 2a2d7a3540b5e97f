//! NeuroSniper CLI: backtest, train and query commands.
//!
//! Commands:
//! - `backtest` replays one or more instruments from a TOML config
//! - `train` fits a new prediction model over history and writes it to disk
//! - `query` lists recorded runs or positions from a run store

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use neurosniper_core::domain::ModelVersion;
use neurosniper_runner::runner::parse_date;
use neurosniper_runner::{
    load_market_data, load_model, retrain, run_backtests, save_model, BacktestConfig, BacktestRun, RunQuery,
    RunStore,
};

#[derive(Parser)]
#[command(name = "neurosniper", about = "NeuroSniper: signal decisions and backtesting for index derivatives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay history through the decision pipeline.
    Backtest {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Instruments to replay. Defaults to `backtest.instrument` from the config.
        #[arg(long = "instrument", short = 'i')]
        instruments: Vec<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Replay twice and fail unless both decision sequences match.
        #[arg(long, default_value_t = false)]
        verify: bool,

        /// Record runs in this store directory.
        #[arg(long)]
        store: Option<PathBuf>,

        /// Print full run results as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Train a prediction model and write it to a file.
    Train {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, short = 'i')]
        instrument: Option<String>,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// Output model file. An existing model here is superseded by the next version.
        #[arg(long, default_value = "models/model.json")]
        out: PathBuf,
    },
    /// Query recorded runs.
    Query {
        /// Run store directory.
        #[arg(long, default_value = "runs")]
        store: PathBuf,

        #[arg(long, short = 'i')]
        instrument: Option<String>,

        /// Earliest date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,

        /// Latest date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<String>,

        /// List positions instead of runs.
        #[arg(long, default_value_t = false)]
        positions: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            config,
            instruments,
            start,
            end,
            verify,
            store,
            json,
        } => run_backtest_cmd(config.as_deref(), instruments, &start, &end, verify, store, json),
        Commands::Train {
            config,
            instrument,
            start,
            end,
            out,
        } => run_train(config.as_deref(), instrument, &start, &end, &out),
        Commands::Query {
            store,
            instrument,
            from,
            to,
            positions,
        } => {
            init_logging("warn");
            run_query(&store, instrument, from.as_deref(), to.as_deref(), positions)
        }
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<BacktestConfig> {
    let config = match path {
        Some(path) => {
            BacktestConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?
        }
        None => BacktestConfig::default(),
    };
    init_logging(&config.log_level);
    Ok(config)
}

fn run_backtest_cmd(
    config_path: Option<&Path>,
    instruments: Vec<String>,
    start: &str,
    end: &str,
    verify: bool,
    store: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if verify {
        config.backtest.verify_determinism = true;
    }
    if store.is_some() {
        config.backtest.store_dir = store;
    }
    let instruments = if instruments.is_empty() {
        vec![config.backtest.instrument.clone()]
    } else {
        instruments
    };

    info!(instruments = ?instruments, start, end, "running backtests");
    let mut failed = 0;
    for (instrument, result) in run_backtests(&instruments, start, end, &config) {
        match result {
            Ok(run) if json => println!("{}", serde_json::to_string_pretty(&run)?),
            Ok(run) => print_summary(&run),
            Err(e) => {
                eprintln!("Error for {instrument}: {e}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} backtests failed", instruments.len());
    }
    Ok(())
}

fn run_train(config_path: Option<&Path>, instrument: Option<String>, start: &str, end: &str, out: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let instrument = instrument
        .unwrap_or_else(|| config.backtest.instrument.clone())
        .to_ascii_uppercase();
    let (start, end) = (parse_date(start)?, parse_date(end)?);
    let data = load_market_data(&instrument, start, end, &config.backtest.data, config.timeframes.cross_check)?;

    let version = if out.exists() {
        ModelVersion(load_model(out)?.version.0 + 1)
    } else {
        ModelVersion(1)
    };
    let model = retrain(&data, &config, version)?;
    save_model(out, &model)?;
    println!("Model {version} trained on {instrument} {start} to {end}");
    println!("Saved to: {}", out.display());
    Ok(())
}

fn run_query(
    store_dir: &Path,
    instrument: Option<String>,
    from: Option<&str>,
    to: Option<&str>,
    positions: bool,
) -> Result<()> {
    if !store_dir.exists() {
        println!("Run store does not exist: {}", store_dir.display());
        return Ok(());
    }
    let store = RunStore::open(store_dir)?;
    let mut query = RunQuery::default();
    if let Some(instrument) = instrument {
        query = query.instrument(instrument);
    }
    query.from = from.map(parse_date).transpose()?;
    query.to = to.map(parse_date).transpose()?;

    if positions {
        let rows = store.query_positions(&query)?;
        println!(
            "{:<11} {:<16} {:<6} {:<20} {:>10} {:>10} {:>12}",
            "Instrument", "Decision", "Side", "Entry", "Price", "Exit", "Net P&L"
        );
        println!("{}", "-".repeat(91));
        for row in &rows {
            let p = &row.position;
            println!(
                "{:<11} {:<16} {:<6} {:<20} {:>10.2} {:>10} {:>12.2}",
                p.instrument,
                p.decision_id.to_string(),
                p.direction.to_string(),
                p.entry_time.format("%Y-%m-%d %H:%M").to_string(),
                p.entry_price,
                p.exit_price.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".into()),
                p.realized_pnl
            );
        }
        println!("{} positions", rows.len());
    } else {
        let runs = store.query_runs(&query)?;
        println!(
            "{:<11} {:<23} {:>9} {:>7} {:>12} {:<16}",
            "Instrument", "Period", "Decisions", "Trades", "Net P&L", "Fingerprint"
        );
        println!("{}", "-".repeat(83));
        for run in &runs {
            println!(
                "{:<11} {:<23} {:>9} {:>7} {:>12.2} {:<16}",
                run.instrument,
                format!("{} to {}", run.start, run.end),
                run.decision_count,
                run.metrics.trade_count,
                run.metrics.total_pnl,
                &run.fingerprint_hash[..run.fingerprint_hash.len().min(16)]
            );
        }
        println!("{} runs", runs.len());
    }
    Ok(())
}

fn print_summary(run: &BacktestRun) {
    let approved = run.decisions.iter().filter(|d| d.is_approved()).count();
    println!();
    println!("=== Backtest Result ===");
    println!("Instrument:     {}", run.instrument);
    println!("Period:         {} to {}", run.start, run.end);
    println!("Candles:        {}", run.candle_count);
    println!("Decisions:      {} ({} approved)", run.decisions.len(), approved);
    println!("Trades:         {}", run.metrics.trade_count);
    println!("Faults:         {}", run.fault_count);
    println!();
    println!("--- Performance ---");
    println!("Net P&L:        {:.2}", run.metrics.total_pnl);
    println!("Total Return:   {:.2}%", run.metrics.total_return * 100.0);
    println!("Max Drawdown:   {:.2}%", run.metrics.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", run.metrics.win_rate * 100.0);
    println!("Expectancy:     {:.2}", run.metrics.expectancy);
    println!("Profit Factor:  {:.2}", run.metrics.profit_factor);
    println!("Avg Hold:       {:.0} min", run.metrics.avg_holding_minutes);
    println!("Max Consec Loss:{}", run.metrics.max_consecutive_losses);
    println!();
    println!("Model:          {}", run.fingerprint.model_version);
    println!("Fingerprint:    {}", run.fingerprint_hash);
    println!("Decision hash:  {}", run.decision_digest);
    if run.synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
}
