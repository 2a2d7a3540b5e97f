//! Simulated fills and the per-lane position book.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Candle, Decision, Direction, ExitReason, Instrument, Position, PositionState};
use crate::risk::SessionRules;

/// Slippage, spread and commission applied to simulated fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillModel {
    pub slippage_bps: f64,
    /// Full quoted spread; half is paid on each side.
    pub spread_bps: f64,
    pub cost_per_lot: f64,
}

impl Default for FillModel {
    fn default() -> Self {
        Self {
            slippage_bps: 1.0,
            spread_bps: 1.0,
            cost_per_lot: 20.0,
        }
    }
}

impl FillModel {
    /// Frictionless fills.
    pub fn zero() -> Self {
        Self {
            slippage_bps: 0.0,
            spread_bps: 0.0,
            cost_per_lot: 0.0,
        }
    }

    fn adverse_bps(&self) -> f64 {
        self.slippage_bps + self.spread_bps / 2.0
    }

    pub fn entry_price(&self, reference: f64, direction: Direction) -> f64 {
        reference * (1.0 + direction.sign() * self.adverse_bps() / 10_000.0)
    }

    pub fn exit_price(&self, reference: f64, direction: Direction) -> f64 {
        reference * (1.0 - direction.sign() * self.adverse_bps() / 10_000.0)
    }

    pub fn costs(&self, size: f64, instrument: &Instrument) -> f64 {
        if instrument.lot_size <= 0.0 {
            return 0.0;
        }
        self.cost_per_lot * (size / instrument.lot_size)
    }
}

/// Open and closed positions for one instrument, plus approved entries
/// waiting for the next primary bar.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    queued: Vec<Decision>,
    open: Vec<Position>,
    closed: Vec<Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter at the open of the next primary candle.
    pub fn queue_entry(&mut self, decision: &Decision) {
        if decision.size > 0.0 && decision.direction.is_directional() && decision.stop_loss.is_some() {
            self.queued.push(decision.clone());
        }
    }

    pub fn queued(&self) -> &[Decision] {
        &self.queued
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open
    }

    pub fn closed_positions(&self) -> &[Position] {
        &self.closed
    }

    pub fn realized_pnl(&self) -> f64 {
        self.closed.iter().map(|p| p.realized_pnl).sum()
    }

    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        self.open.iter().map(|p| p.unrealized_pnl(mark)).sum()
    }

    /// Advance the book through one primary candle.
    ///
    /// Queued entries fill at the candle's open. Stops are checked before
    /// targets, so a candle touching both books the loss. A candle closing at
    /// or after the square-off time flattens everything at its close.
    /// Returns positions closed on this candle.
    pub fn on_candle(
        &mut self,
        candle: &Candle,
        instrument: &Instrument,
        fill: &FillModel,
        session: &SessionRules,
    ) -> Vec<Position> {
        for decision in std::mem::take(&mut self.queued) {
            let Some(stop) = decision.stop_loss else { continue };
            let entry_price = fill.entry_price(candle.open, decision.direction);
            self.open.push(Position {
                instrument: decision.instrument.clone(),
                decision_id: decision.id.clone(),
                direction: decision.direction,
                entry_time: candle.timestamp,
                entry_price,
                size: decision.size,
                stop_loss: stop,
                take_profit: decision.take_profit,
                state: PositionState::Open,
                exit_time: None,
                exit_price: None,
                exit_reason: None,
                realized_pnl: 0.0,
                costs: fill.costs(decision.size, instrument),
                bars_held: 0,
            });
        }

        let square_off = session.should_square_off(candle.close_time());
        for position in &mut self.open {
            position.bars_held += 1;
            let exit = exit_level(position, candle).or_else(|| {
                square_off.then_some((candle.close, ExitReason::SessionClose))
            });
            if let Some((level, reason)) = exit {
                let price = fill.exit_price(level, position.direction);
                let exit_costs = fill.costs(position.size, instrument);
                position.close(candle.close_time(), price, reason, exit_costs);
                debug!(
                    instrument = %position.instrument,
                    id = %position.decision_id,
                    ?reason,
                    pnl = position.realized_pnl,
                    "position closed"
                );
            }
        }
        self.drain_closed()
    }

    /// Close everything at `price`, e.g. when the replay runs out of data.
    pub fn close_all(
        &mut self,
        time: NaiveDateTime,
        price: f64,
        reason: ExitReason,
        instrument: &Instrument,
        fill: &FillModel,
    ) -> Vec<Position> {
        self.queued.clear();
        for position in &mut self.open {
            let exit = fill.exit_price(price, position.direction);
            position.close(time, exit, reason, fill.costs(position.size, instrument));
        }
        self.drain_closed()
    }

    fn drain_closed(&mut self) -> Vec<Position> {
        let (closed, open): (Vec<Position>, Vec<Position>) =
            std::mem::take(&mut self.open).into_iter().partition(|p| !p.is_open());
        self.open = open;
        self.closed.extend(closed.iter().cloned());
        closed
    }
}

/// Stop or target hit inside `candle`, stop first. Gaps through a level
/// fill at the open.
fn exit_level(position: &Position, candle: &Candle) -> Option<(f64, ExitReason)> {
    match position.direction {
        Direction::Long => {
            if candle.low <= position.stop_loss {
                return Some((candle.open.min(position.stop_loss), ExitReason::StopLoss));
            }
            match position.take_profit {
                Some(tp) if candle.high >= tp => Some((candle.open.max(tp), ExitReason::TakeProfit)),
                _ => None,
            }
        }
        Direction::Short => {
            if candle.high >= position.stop_loss {
                return Some((candle.open.max(position.stop_loss), ExitReason::StopLoss));
            }
            match position.take_profit {
                Some(tp) if candle.low <= tp => Some((candle.open.min(tp), ExitReason::TakeProfit)),
                _ => None,
            }
        }
        Direction::Flat => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DecisionId, DecisionStatus, Timeframe, TradingMode};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 6)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn bar(h: u32, m: u32, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            instrument: "NIFTY".into(),
            timeframe: Timeframe::M15,
            timestamp: at(h, m),
            open,
            high,
            low,
            close,
            volume: 1000.0,
            open_interest: None,
        }
    }

    fn approved(direction: Direction, stop: f64, target: f64) -> Decision {
        Decision {
            id: DecisionId::new("NIFTY", 1),
            instrument: "NIFTY".into(),
            timeframe: Timeframe::M15,
            timestamp: at(10, 0),
            direction,
            confidence: 0.8,
            reference_price: 100.0,
            stop_loss: Some(stop),
            take_profit: Some(target),
            size: 75.0,
            mode: TradingMode::DryRun,
            status: DecisionStatus::Approved,
            reason: None,
            contributing: Vec::new(),
            model_version: None,
            model_fallback: false,
        }
    }

    fn nifty() -> Instrument {
        Instrument::preset("NIFTY")
    }

    #[test]
    fn entry_fills_at_next_open_with_friction() {
        let fill = FillModel {
            slippage_bps: 10.0,
            spread_bps: 20.0,
            cost_per_lot: 20.0,
        };
        let mut book = PositionBook::new();
        book.queue_entry(&approved(Direction::Long, 95.0, 110.0));
        let closed = book.on_candle(&bar(10, 0, 100.0, 101.0, 99.0, 100.5), &nifty(), &fill, &SessionRules::default());
        assert!(closed.is_empty());
        let open = &book.open_positions()[0];
        assert!((open.entry_price - 100.2).abs() < 1e-9);
        assert_eq!(open.costs, 20.0);
        assert_eq!(open.entry_time, at(10, 0));
    }

    #[test]
    fn stop_wins_when_both_levels_touch() {
        let mut book = PositionBook::new();
        book.queue_entry(&approved(Direction::Long, 95.0, 110.0));
        let session = SessionRules::default();
        book.on_candle(&bar(10, 0, 100.0, 101.0, 99.0, 100.0), &nifty(), &FillModel::zero(), &session);
        let closed = book.on_candle(&bar(10, 15, 100.0, 111.0, 94.0, 105.0), &nifty(), &FillModel::zero(), &session);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(closed[0].realized_pnl, -5.0 * 75.0);
        assert_eq!(closed[0].bars_held, 2);
        assert!(book.open_positions().is_empty());
        assert_eq!(book.realized_pnl(), -375.0);
    }

    #[test]
    fn short_target_and_gap_fill() {
        let mut book = PositionBook::new();
        book.queue_entry(&approved(Direction::Short, 105.0, 90.0));
        let session = SessionRules::default();
        book.on_candle(&bar(10, 0, 100.0, 101.0, 99.0, 100.0), &nifty(), &FillModel::zero(), &session);
        // opens below the target: fills at the better open
        let closed = book.on_candle(&bar(10, 15, 88.0, 89.0, 87.0, 88.5), &nifty(), &FillModel::zero(), &session);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(closed[0].exit_price, Some(88.0));
    }

    #[test]
    fn squares_off_at_session_close() {
        let mut book = PositionBook::new();
        book.queue_entry(&approved(Direction::Long, 95.0, 110.0));
        let session = SessionRules::default();
        let closed = book.on_candle(&bar(15, 0, 100.0, 101.0, 99.0, 100.5), &nifty(), &FillModel::zero(), &session);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::SessionClose));
        assert_eq!(closed[0].exit_price, Some(100.5));
    }

    #[test]
    fn close_all_drops_queued_entries() {
        let mut book = PositionBook::new();
        book.queue_entry(&approved(Direction::Long, 95.0, 110.0));
        let session = SessionRules::disabled();
        book.on_candle(&bar(10, 0, 100.0, 101.0, 99.0, 100.0), &nifty(), &FillModel::zero(), &session);
        book.queue_entry(&approved(Direction::Long, 95.0, 110.0));
        let closed = book.close_all(at(10, 30), 102.0, ExitReason::EndOfData, &nifty(), &FillModel::zero());
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].realized_pnl, 150.0);
        assert!(book.queued().is_empty());
    }
}
