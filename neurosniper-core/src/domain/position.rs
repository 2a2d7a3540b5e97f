//! Simulated or paper-tracked positions opened from approved decisions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::direction::Direction;
use super::ids::DecisionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Intraday square-off at the session cutoff.
    SessionClose,
    /// Still open when the replay ran out of data.
    EndOfData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub decision_id: DecisionId,
    pub direction: Direction,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub state: PositionState,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: f64,
    pub costs: f64,
    pub bars_held: usize,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }

    /// Mark-to-market P&L before costs; zero once closed.
    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        if !self.is_open() {
            return 0.0;
        }
        self.direction.sign() * (mark - self.entry_price) * self.size
    }

    /// Loss that would be booked if the stop filled exactly.
    pub fn risk_at_stop(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs() * self.size
    }

    pub fn close(&mut self, time: NaiveDateTime, price: f64, reason: ExitReason, exit_costs: f64) {
        if !self.is_open() {
            return;
        }
        self.costs += exit_costs;
        self.realized_pnl = self.direction.sign() * (price - self.entry_price) * self.size - self.costs;
        self.exit_time = Some(time);
        self.exit_price = Some(price);
        self.exit_reason = Some(reason);
        self.state = PositionState::Closed;
    }

    pub fn holding_minutes(&self) -> Option<i64> {
        self.exit_time.map(|exit| (exit - self.entry_time).num_minutes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 5)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn short_position() -> Position {
        Position {
            instrument: "NIFTY".into(),
            decision_id: DecisionId::new("NIFTY", 1),
            direction: Direction::Short,
            entry_time: t(10, 0),
            entry_price: 22_000.0,
            size: 75.0,
            stop_loss: 22_040.0,
            take_profit: Some(21_900.0),
            state: PositionState::Open,
            exit_time: None,
            exit_price: None,
            exit_reason: None,
            realized_pnl: 0.0,
            costs: 10.0,
            bars_held: 0,
        }
    }

    #[test]
    fn short_pnl_sign() {
        let pos = short_position();
        assert_eq!(pos.unrealized_pnl(21_990.0), 750.0);
        assert_eq!(pos.risk_at_stop(), 3000.0);
    }

    #[test]
    fn close_books_costs_once() {
        let mut pos = short_position();
        pos.close(t(10, 30), 21_900.0, ExitReason::TakeProfit, 5.0);
        assert!(!pos.is_open());
        assert_eq!(pos.realized_pnl, 7500.0 - 15.0);
        assert_eq!(pos.holding_minutes(), Some(30));
        // second close is ignored
        pos.close(t(11, 0), 22_500.0, ExitReason::StopLoss, 5.0);
        assert_eq!(pos.exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(pos.unrealized_pnl(1.0), 0.0);
    }
}
