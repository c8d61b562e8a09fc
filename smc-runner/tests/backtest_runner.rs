//! CSV → parallel backtest → metrics, through the public runner API.

use std::io::Write;
use std::path::Path;

use smc_runner::{
    load_candles, parse_config, replay_check, run_backtests, AggregateMetrics, BacktestJob,
};

const REVERSAL_CSV: &str = "\
time,open,high,low,close,volume
2024-03-01T09:30:00Z,107.0,110.0,106.0,107.0,10000
2024-03-01T09:35:00Z,107.0,108.0,104.0,105.0,10000
2024-03-01T09:40:00Z,105.0,109.0,105.0,106.0,10000
2024-03-01T09:45:00Z,106.0,107.0,103.0,104.0,10000
2024-03-01T09:50:00Z,104.0,104.0,100.0,101.0,10000
2024-03-01T09:55:00Z,101.0,103.0,100.5,102.0,10000
2024-03-01T10:00:00Z,102.0,104.0,101.0,103.0,10000
2024-03-01T10:05:00Z,103.0,103.5,101.5,102.0,10000
2024-03-01T10:10:00Z,102.0,107.0,102.0,106.5,10000
2024-03-01T10:15:00Z,106.5,109.0,106.0,108.5,10000
2024-03-01T10:20:00Z,108.5,109.5,106.5,107.5,10000
2024-03-01T10:25:00Z,107.5,108.0,104.5,105.0,10000
2024-03-01T10:30:00Z,105.0,108.0,104.8,107.5,10000
2024-03-01T10:35:00Z,107.5,111.0,107.0,110.5,10000
";

const CONFIG_TOML: &str = r#"
name = "reversal"

[structure]
swing_lookback = 1

[plan]
stop_buffer_bps = 0.0
reward_multiple = 2.0
"#;

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn csv_to_summary() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "rev.csv", REVERSAL_CSV);
    let config = parse_config(CONFIG_TOML).unwrap();

    let loaded = load_candles(&path).unwrap();
    assert_eq!(loaded.candles.len(), 14);

    // A second instrument with a corrupt row in the middle.
    let mut corrupt = loaded.candles.clone();
    corrupt[5].low = corrupt[5].high + 1.0;

    let jobs = vec![
        BacktestJob::new("REV", loaded.candles.clone()),
        BacktestJob::new("BAD", corrupt),
    ];
    let results = run_backtests(&jobs, &config).unwrap();

    let rev = &results[0];
    assert_eq!(rev.strategy, "reversal");
    assert_eq!(rev.summary.trades, 1);
    assert_eq!(rev.summary.total_r, 2.0);
    assert!(rev.rejected.is_empty());

    let bad = &results[1];
    assert_eq!(bad.rejected.len(), 1);
    assert_eq!(bad.rejected[0].code, "malformed_candle");
    assert_eq!(bad.candles_processed, 13);

    let metrics = AggregateMetrics::compute(&results);
    assert_eq!(metrics.rows.len(), 2);
    assert!(metrics.trades >= 1);
    let table = metrics.render_table();
    assert!(table.contains("REV"));
    assert!(table.contains("BAD"));
}

#[test]
fn replay_of_loaded_csv_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "rev.csv", REVERSAL_CSV);
    let loaded = load_candles(&path).unwrap();

    let config = parse_config(CONFIG_TOML).unwrap();
    let report = replay_check(&BacktestJob::new("REV", loaded.candles), &config).unwrap();
    assert!(report.is_deterministic());
    assert!(report.events > 0);
}
