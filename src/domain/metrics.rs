//! Performance metrics over a finished run.

use serde::{Deserialize, Serialize};

use super::ledger::LedgerSnapshot;
use super::position::Trade;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Ratios that are undefined for the run are `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub initial_equity: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_bars_held: f64,
    pub sqn: Option<f64>,
}

impl Metrics {
    pub fn compute(
        initial_equity: f64,
        snapshots: &[LedgerSnapshot],
        trades: &[Trade],
        risk_free_rate: f64,
    ) -> Self {
        let final_equity = snapshots.last().map_or(initial_equity, |s| s.equity);

        let total_return = if initial_equity > 0.0 {
            final_equity / initial_equity - 1.0
        } else {
            0.0
        };

        let n_bars = snapshots.len() as f64;
        let annualized_return = if n_bars > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / n_bars) - 1.0
        } else if total_return <= -1.0 {
            -1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(snapshots);

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(snapshots, daily_rf);

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_bars_held = 0usize;

        for trade in trades {
            let pnl = trade.net_pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            total_bars_held += trade.bars_held();
        }

        let total_trades = trades.len();
        let win_rate = (total_trades > 0).then(|| trades_won as f64 / total_trades as f64);
        let profit_factor = (total_losses > 0.0).then(|| total_wins / total_losses);

        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };

        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        let avg_bars_held = if total_trades > 0 {
            total_bars_held as f64 / total_trades as f64
        } else {
            0.0
        };

        Metrics {
            initial_equity,
            final_equity,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            avg_bars_held,
            sqn: compute_sqn(trades),
        }
    }
}

/// Largest peak-to-trough decline as a fraction of the peak, and the longest
/// run of bars spent below a prior peak.
fn compute_drawdown(snapshots: &[LedgerSnapshot]) -> (f64, usize) {
    let Some(first) = snapshots.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for snap in snapshots {
        if snap.equity >= peak {
            peak = snap.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - snap.equity) / peak);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(snapshots: &[LedgerSnapshot], daily_rf: f64) -> (Option<f64>, Option<f64>) {
    let returns: Vec<f64> = snapshots
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    if returns.len() < 2 {
        return (None, None);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess_return = mean - daily_rf;

    let sharpe = (stddev > 0.0).then(|| excess_return / stddev * TRADING_DAYS_PER_YEAR.sqrt());

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside.sqrt();
    let sortino = (downside_stddev > 0.0)
        .then(|| excess_return / downside_stddev * TRADING_DAYS_PER_YEAR.sqrt());

    (sharpe, sortino)
}

/// System Quality Number: sqrt(n) * mean(net pnl) / stddev(net pnl).
fn compute_sqn(trades: &[Trade]) -> Option<f64> {
    if trades.len() < 2 {
        return None;
    }
    let n = trades.len() as f64;
    let mean = trades.iter().map(|t| t.net_pnl).sum::<f64>() / n;
    let variance = trades
        .iter()
        .map(|t| (t.net_pnl - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let stddev = variance.sqrt();
    (stddev > 0.0).then(|| n.sqrt() * mean / stddev)
}
