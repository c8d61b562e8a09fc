//! Reporting and export: JSON and CSV artifacts for a backtest run.
//!
//! - **JSON**: the full `BacktestResult`, event log included
//! - **CSV**: the closed-plan tape for external analysis tools

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use smc_core::plan::TradePlan;
use smc_core::BacktestResult;

use crate::metrics::AggregateMetrics;

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Export closed plans as CSV, one row per plan in close order.
pub fn export_plans_csv(instrument: &str, plans: &[TradePlan]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "instrument",
        "plan_id",
        "direction",
        "entry_price",
        "initial_stop",
        "final_stop",
        "take_profit",
        "size",
        "opened_at",
        "filled_at",
        "closed_at",
        "exit_reason",
        "exit_price",
        "r_multiple",
    ])?;

    let opt_index = |v: Option<u64>| v.map(|i| i.to_string()).unwrap_or_default();
    let opt_price = |v: Option<f64>| v.map(|p| format!("{p:.6}")).unwrap_or_default();

    for p in plans {
        wtr.write_record([
            instrument,
            &p.id.to_string(),
            &format!("{:?}", p.direction),
            &format!("{:.6}", p.entry_price),
            &format!("{:.6}", p.initial_stop),
            &format!("{:.6}", p.stop_loss),
            &format!("{:.6}", p.take_profit),
            &format!("{:.6}", p.size),
            &p.opened_at_candle_index.to_string(),
            &opt_index(p.filled_at_candle_index),
            &opt_index(p.closed_at_candle_index),
            &p.exit_reason.map(|r| r.to_string()).unwrap_or_default(),
            &opt_price(p.exit_price),
            &p.r_multiple().map(|r| format!("{r:.4}")).unwrap_or_default(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write one JSON result and one plan CSV per instrument, plus a
/// `summary.json` with the cross-instrument metrics, into a new
/// timestamped directory under `output_dir`.
pub fn save_artifacts(
    results: &[BacktestResult],
    metrics: &AggregateMetrics,
    output_dir: &Path,
) -> Result<PathBuf> {
    let run_dir = output_dir.join(format!("run_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create {}", run_dir.display()))?;

    for result in results {
        let stem = sanitize(&result.instrument);
        std::fs::write(run_dir.join(format!("{stem}.json")), export_json(result)?)?;
        std::fs::write(
            run_dir.join(format!("{stem}_plans.csv")),
            export_plans_csv(&result.instrument, &result.closed_plans)?,
        )?;
    }

    let summary =
        serde_json::to_string_pretty(metrics).context("failed to serialize run summary")?;
    std::fs::write(run_dir.join("summary.json"), summary)?;

    Ok(run_dir)
}

/// Instrument names like "BTC/USD" become safe file stems.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
