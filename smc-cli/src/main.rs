//! SMC CLI: backtest, config check, replay and live simulation commands.
//!
//! Commands:
//! - `backtest`: run one or more CSV files through the decision engine
//! - `check-config`: validate a TOML strategy file and print its fingerprint
//! - `replay`: run the same input twice and compare event-log digests
//! - `simulate`: stream a CSV through the live driver, printing plan events
//! - `presets`: list the built-in strategy presets

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use smc_core::{Pipeline, StrategyConfig, StrategyPreset};
use smc_runner::{
    load_candles, load_config, replay_check, resolve_config, run_backtests, save_artifacts,
    AggregateMetrics, BacktestJob, ChannelExecutor, FeedMessage, LiveDriver,
};

#[derive(Parser)]
#[command(
    name = "smc",
    about = "SMC CLI: market structure and fair value gap decision engine"
)]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one or more instruments from CSV files.
    Backtest {
        /// Path to a TOML strategy file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Named preset: structure_gap, momentum_blend.
        #[arg(long)]
        preset: Option<String>,

        /// Instrument data as SYMBOL=path.csv. Repeatable.
        #[arg(long = "data", required = true)]
        data: Vec<String>,

        /// Print the full per-instrument results as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Write JSON and CSV artifacts under this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Validate a strategy file.
    CheckConfig {
        /// Path to a TOML strategy file.
        path: PathBuf,
    },
    /// Run one instrument twice and compare the event-log digests.
    Replay {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        preset: Option<String>,

        /// Instrument data as SYMBOL=path.csv.
        #[arg(long = "data")]
        data: String,
    },
    /// Stream a CSV through the live driver and print plan events.
    Simulate {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        preset: Option<String>,

        /// Instrument data as SYMBOL=path.csv.
        #[arg(long = "data")]
        data: String,

        /// Candle interval in seconds.
        #[arg(long, default_value_t = 60)]
        interval_secs: i64,
    },
    /// List the built-in strategy presets.
    Presets,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match cli.command {
        Commands::Backtest {
            config,
            preset,
            data,
            json,
            output_dir,
        } => run_backtest_cmd(config, preset, &data, json, output_dir),
        Commands::CheckConfig { path } => run_check_config(&path),
        Commands::Replay {
            config,
            preset,
            data,
        } => run_replay(config, preset, &data),
        Commands::Simulate {
            config,
            preset,
            data,
            interval_secs,
        } => run_simulate(config, preset, &data, interval_secs),
        Commands::Presets => {
            for preset in StrategyPreset::all() {
                let config = preset.config();
                println!(
                    "{:<16} entry={:?} threshold={} fingerprint={}",
                    preset.name(),
                    config.plan.entry_mode,
                    config.aggregator.threshold,
                    &config.fingerprint()[..12]
                );
            }
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise `info`.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn strategy(config: Option<PathBuf>, preset: Option<String>) -> Result<StrategyConfig> {
    if config.is_some() && preset.is_some() {
        bail!("--config and --preset are mutually exclusive");
    }
    Ok(resolve_config(config.as_deref(), preset.as_deref())?)
}

/// Parse `SYMBOL=path.csv`.
fn parse_data_arg(arg: &str) -> Result<(String, PathBuf)> {
    match arg.split_once('=') {
        Some((symbol, path)) if !symbol.is_empty() && !path.is_empty() => {
            Ok((symbol.to_string(), PathBuf::from(path)))
        }
        _ => bail!("expected SYMBOL=path.csv, got '{arg}'"),
    }
}

fn load_job(arg: &str) -> Result<BacktestJob> {
    let (symbol, path) = parse_data_arg(arg)?;
    let loaded =
        load_candles(&path).with_context(|| format!("loading {symbol} from {}", path.display()))?;
    tracing::info!(
        instrument = %symbol,
        candles = loaded.candles.len(),
        dataset = %loaded.dataset_hash,
        "data loaded"
    );
    Ok(BacktestJob::new(symbol, loaded.candles))
}

fn run_backtest_cmd(
    config_path: Option<PathBuf>,
    preset_name: Option<String>,
    data: &[String],
    json: bool,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let config = strategy(config_path, preset_name)?;
    let jobs = data
        .iter()
        .map(|arg| load_job(arg))
        .collect::<Result<Vec<_>>>()?;

    let results = run_backtests(&jobs, &config)?;
    let metrics = AggregateMetrics::compute(&results);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!(
            "strategy: {} (fingerprint {})",
            config.name,
            &config.fingerprint()[..12]
        );
        print!("{}", metrics.render_table());
        println!("max drawdown: {:.2} R", metrics.max_drawdown_r);
        for r in &results {
            if !r.skip_counts.is_empty() {
                let skips: Vec<String> = r
                    .skip_counts
                    .iter()
                    .map(|(code, n)| format!("{code}={n}"))
                    .collect();
                println!("{} skipped: {}", r.instrument, skips.join(" "));
            }
            if !r.rejected.is_empty() {
                println!("{} rejected candles: {}", r.instrument, r.rejected.len());
            }
        }
    }

    if let Some(dir) = output_dir {
        let run_dir = save_artifacts(&results, &metrics, &dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    println!("{}: ok", path.display());
    println!("  name:        {}", config.name);
    println!("  entry mode:  {:?}", config.plan.entry_mode);
    println!("  threshold:   {}", config.aggregator.threshold);
    let weights: Vec<String> = config
        .aggregator
        .weights
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    println!("  weights:     {}", weights.join(" "));
    println!("  fingerprint: {}", config.fingerprint());
    Ok(())
}

fn run_replay(config: Option<PathBuf>, preset: Option<String>, data: &str) -> Result<()> {
    let config = strategy(config, preset)?;
    let job = load_job(data)?;
    let report = replay_check(&job, &config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_deterministic() {
        bail!("replay diverged for {}", report.instrument);
    }
    Ok(())
}

fn run_simulate(
    config: Option<PathBuf>,
    preset: Option<String>,
    data: &str,
    interval_secs: i64,
) -> Result<()> {
    let config = strategy(config, preset)?;
    let job = load_job(data)?;
    let pipeline = Pipeline::new(job.instrument.clone(), Arc::new(config))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    runtime.block_on(async move {
        let (executor, mut events) = ChannelExecutor::new();
        let (driver, stop) =
            LiveDriver::new(pipeline, chrono::Duration::seconds(interval_secs), executor);
        let (feed_tx, feed_rx) = tokio::sync::mpsc::channel(256);

        let feeder = tokio::spawn(async move {
            for candle in job.candles {
                if feed_tx.send(FeedMessage::Candle(candle)).await.is_err() {
                    break;
                }
            }
        });
        let printer = tokio::spawn(async move {
            while let Some((instrument, event)) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{instrument} {line}"),
                    Err(e) => tracing::warn!(error = %e, "failed to encode plan event"),
                }
            }
        });

        let driver_task = tokio::spawn(driver.run(feed_rx));
        tokio::select! {
            _ = tokio::signal::ctrl_c() => stop.stop(),
            _ = feeder => {}
        }

        // The driver drops its executor on return, which ends the printer.
        let report = driver_task.await.context("live driver task failed")?;
        printer.await.context("event printer task failed")?;
        let closed = report.pipeline.closed_plans().len();
        let open = report.pipeline.active_plan().cloned();

        println!(
            "cause={:?} candles={} rejected={} dropped={} reordered={} skipped={} closed_plans={} open_plan={}",
            report.cause,
            report.stats.candles_processed,
            report.stats.rejected,
            report.stats.dropped_candles,
            report.stats.reordered,
            report.stats.skipped_indices,
            closed,
            open.map(|p| p.id.to_string()).unwrap_or_else(|| "none".into())
        );
        Ok::<(), anyhow::Error>(())
    })
}
