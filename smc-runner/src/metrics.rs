//! Cross-instrument metrics: pure functions over backtest results.

use serde::{Deserialize, Serialize};
use smc_core::engine::BacktestSummary;
use smc_core::plan::TradePlan;
use smc_core::BacktestResult;

/// One row of the per-instrument report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRow {
    pub instrument: String,
    pub candles: u64,
    pub rejected: usize,
    pub skipped: u64,
    pub summary: BacktestSummary,
    pub max_consecutive_losses: usize,
}

impl InstrumentRow {
    pub fn from_result(result: &BacktestResult) -> Self {
        Self {
            instrument: result.instrument.clone(),
            candles: result.candles_processed,
            rejected: result.rejected.len(),
            skipped: result.skip_counts.values().sum(),
            summary: result.summary.clone(),
            max_consecutive_losses: max_consecutive_losses(&result.closed_plans),
        }
    }
}

/// Totals across every instrument of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub rows: Vec<InstrumentRow>,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_r: f64,
    pub average_r: f64,
    /// Largest peak-to-trough drop of the cumulative R curve, in R.
    pub max_drawdown_r: f64,
}

impl AggregateMetrics {
    pub fn compute(results: &[BacktestResult]) -> Self {
        let rows: Vec<InstrumentRow> = results.iter().map(InstrumentRow::from_result).collect();
        let trades: usize = rows.iter().map(|r| r.summary.trades).sum();
        let wins: usize = rows.iter().map(|r| r.summary.wins).sum();
        let losses: usize = rows.iter().map(|r| r.summary.losses).sum();
        let total_r: f64 = rows.iter().map(|r| r.summary.total_r).sum();

        // Interleave closed plans by exit candle so the R curve reflects
        // the order trades actually finished in.
        let mut closed: Vec<&TradePlan> = results.iter().flat_map(|r| &r.closed_plans).collect();
        closed.sort_by_key(|p| p.closed_at_candle_index);
        let r_curve: Vec<f64> = closed.iter().filter_map(|p| p.r_multiple()).collect();

        Self {
            rows,
            trades,
            wins,
            losses,
            win_rate: if trades > 0 {
                wins as f64 / trades as f64
            } else {
                0.0
            },
            total_r,
            average_r: if trades > 0 { total_r / trades as f64 } else { 0.0 },
            max_drawdown_r: max_drawdown_r(&r_curve),
        }
    }

    /// Fixed-width text table for terminal output.
    pub fn render_table(&self) -> String {
        let mut out = format!(
            "{:<12} {:>8} {:>7} {:>5} {:>5} {:>7} {:>8} {:>8}\n",
            "instrument", "candles", "trades", "wins", "loss", "win%", "total R", "avg R"
        );
        for row in &self.rows {
            let s = &row.summary;
            out.push_str(&format!(
                "{:<12} {:>8} {:>7} {:>5} {:>5} {:>6.1}% {:>8.2} {:>8.2}\n",
                row.instrument,
                row.candles,
                s.trades,
                s.wins,
                s.losses,
                s.win_rate * 100.0,
                s.total_r,
                s.average_r
            ));
        }
        out.push_str(&format!(
            "{:<12} {:>8} {:>7} {:>5} {:>5} {:>6.1}% {:>8.2} {:>8.2}\n",
            "TOTAL",
            self.rows.iter().map(|r| r.candles).sum::<u64>(),
            self.trades,
            self.wins,
            self.losses,
            self.win_rate * 100.0,
            self.total_r,
            self.average_r
        ));
        out
    }
}

/// Longest run of losing trades in exit order.
pub fn max_consecutive_losses(plans: &[TradePlan]) -> usize {
    let mut max = 0;
    let mut current = 0;
    for r in plans.iter().filter_map(TradePlan::r_multiple) {
        if r < 0.0 {
            current += 1;
            max = max.max(current);
        } else {
            current = 0;
        }
    }
    max
}

/// Max drawdown of the cumulative sum of a sequence of R multiples.
pub fn max_drawdown_r(r_multiples: &[f64]) -> f64 {
    let mut equity = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for r in r_multiples {
        equity += r;
        peak = peak.max(equity);
        max_dd = max_dd.max(peak - equity);
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawdown_of_empty_curve_is_zero() {
        assert_eq!(max_drawdown_r(&[]), 0.0);
    }

    #[test]
    fn drawdown_tracks_peak_to_trough() {
        // 0 → 2 → 1 → 0 → 3 → 2
        let dd = max_drawdown_r(&[2.0, -1.0, -1.0, 3.0, -1.0]);
        assert!((dd - 2.0).abs() < 1e-12);
    }

    #[test]
    fn drawdown_counts_losses_from_start() {
        let dd = max_drawdown_r(&[-1.0, -1.0, 4.0]);
        assert!((dd - 2.0).abs() < 1e-12);
    }

    #[test]
    fn aggregate_of_nothing_is_zero() {
        let m = AggregateMetrics::compute(&[]);
        assert_eq!(m.trades, 0);
        assert_eq!(m.win_rate, 0.0);
        assert!(m.render_table().contains("TOTAL"));
    }
}
