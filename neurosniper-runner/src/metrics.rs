//! Performance metrics: pure functions over an equity curve and closed positions.

use serde::{Deserialize, Serialize};

use neurosniper_core::domain::Position;

/// Aggregate performance metrics for a single replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub trade_count: usize,
    pub win_rate: f64,
    /// Mean net P&L per trade.
    pub expectancy: f64,
    pub total_pnl: f64,
    pub total_return: f64,
    pub profit_factor: f64,
    /// Negative fraction, e.g. -0.04 for a 4% peak-to-trough drop.
    pub max_drawdown: f64,
    pub avg_holding_minutes: f64,
    pub max_consecutive_losses: usize,
}

impl PerformanceMetrics {
    pub fn compute(equity_curve: &[f64], positions: &[Position], initial_capital: f64) -> Self {
        let closed: Vec<&Position> = positions.iter().filter(|p| !p.is_open()).collect();
        let pnl = total_pnl(&closed);
        Self {
            trade_count: closed.len(),
            win_rate: win_rate(&closed),
            expectancy: expectancy(&closed),
            total_pnl: pnl,
            total_return: if initial_capital > 0.0 { pnl / initial_capital } else { 0.0 },
            profit_factor: profit_factor(&closed),
            max_drawdown: max_drawdown(equity_curve),
            avg_holding_minutes: avg_holding_minutes(&closed),
            max_consecutive_losses: max_consecutive_losses(&closed),
        }
    }
}

fn is_winner(p: &Position) -> bool {
    p.realized_pnl > 0.0
}

pub fn total_pnl(positions: &[&Position]) -> f64 {
    positions.iter().map(|p| p.realized_pnl).sum()
}

/// Fraction of closed positions with positive net P&L.
pub fn win_rate(positions: &[&Position]) -> f64 {
    if positions.is_empty() {
        return 0.0;
    }
    positions.iter().filter(|p| is_winner(p)).count() as f64 / positions.len() as f64
}

pub fn expectancy(positions: &[&Position]) -> f64 {
    if positions.is_empty() {
        return 0.0;
    }
    total_pnl(positions) / positions.len() as f64
}

/// Gross profits / gross losses, capped at 100.0 when nothing was lost.
pub fn profit_factor(positions: &[&Position]) -> f64 {
    if positions.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = positions
        .iter()
        .filter(|p| p.realized_pnl > 0.0)
        .map(|p| p.realized_pnl)
        .sum();
    let gross_loss: f64 = positions
        .iter()
        .filter(|p| p.realized_pnl < 0.0)
        .map(|p| p.realized_pnl.abs())
        .sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Maximum drawdown as a negative fraction of the running peak.
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let mut peak = equity_curve[0];
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

pub fn avg_holding_minutes(positions: &[&Position]) -> f64 {
    let held: Vec<i64> = positions.iter().filter_map(|p| p.holding_minutes()).collect();
    if held.is_empty() {
        return 0.0;
    }
    held.iter().sum::<i64>() as f64 / held.len() as f64
}

pub fn max_consecutive_losses(positions: &[&Position]) -> usize {
    let mut max = 0;
    let mut current = 0;
    for p in positions {
        if is_winner(p) {
            current = 0;
        } else {
            current += 1;
            max = max.max(current);
        }
    }
    max
}
