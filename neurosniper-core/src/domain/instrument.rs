//! Tradable index derivatives and their contract specifications.

use serde::{Deserialize, Serialize};

/// Contract metadata needed for sizing and price rounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    /// Contract multiplier; sizes are always whole multiples of this.
    pub lot_size: f64,
    pub tick_size: f64,
}

/// Lot size used for symbols without a preset.
pub const DEFAULT_LOT_SIZE: f64 = 50.0;

impl Instrument {
    pub fn new(symbol: impl Into<String>, lot_size: f64, tick_size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            lot_size,
            tick_size,
        }
    }

    /// Exchange preset for the supported NSE indices, falling back to a
    /// 50-unit lot for anything else.
    pub fn preset(symbol: &str) -> Self {
        let upper = symbol.to_ascii_uppercase();
        let lot = match upper.as_str() {
            "NIFTY" => 75.0,
            "BANKNIFTY" => 30.0,
            "FINNIFTY" => 65.0,
            "MIDCPNIFTY" => 120.0,
            _ => DEFAULT_LOT_SIZE,
        };
        Self::new(upper, lot, 0.05)
    }

    /// Round a price to the nearest tick.
    pub fn round_to_tick(&self, price: f64) -> f64 {
        if self.tick_size <= 0.0 {
            return price;
        }
        (price / self.tick_size).round() * self.tick_size
    }

    /// Largest whole-lot quantity not exceeding `units`.
    pub fn floor_to_lots(&self, units: f64) -> f64 {
        if !units.is_finite() || units <= 0.0 || self.lot_size <= 0.0 {
            return 0.0;
        }
        (units / self.lot_size).floor() * self.lot_size
    }
}
