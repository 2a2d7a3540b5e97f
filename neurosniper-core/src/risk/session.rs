//! Intraday session rules: trading hours, weekday filter, daily trade cap and
//! a volatility ceiling.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRules {
    pub enabled: bool,
    pub market_open: NaiveTime,
    /// No new entries at or after this time.
    pub entry_cutoff: NaiveTime,
    /// Open positions are flattened at or after this time.
    pub square_off: NaiveTime,
    pub weekdays_only: bool,
    pub max_trades_per_day: usize,
    /// Entries are blocked while the supplied VIX reading is above this level.
    pub max_vix: Option<f64>,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            enabled: true,
            market_open: hm(9, 15),
            entry_cutoff: hm(15, 0),
            square_off: hm(15, 15),
            weekdays_only: true,
            max_trades_per_day: 5,
            max_vix: None,
        }
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

/// Inputs to a session check that change during the day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionCheck {
    pub at: NaiveDateTime,
    pub trades_today: usize,
    pub vix: Option<f64>,
}

impl SessionRules {
    /// Rules that never block.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// `Err` carries every failed rule, comma separated.
    pub fn check(&self, check: SessionCheck) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        let mut failed = Vec::new();
        let time = check.at.time();
        if self.weekdays_only && matches!(check.at.weekday(), Weekday::Sat | Weekday::Sun) {
            failed.push("weekend".to_string());
        }
        if time < self.market_open {
            failed.push(format!("before market open {}", self.market_open.format("%H:%M")));
        }
        if time >= self.entry_cutoff {
            failed.push(format!("after entry cutoff {}", self.entry_cutoff.format("%H:%M")));
        }
        if check.trades_today >= self.max_trades_per_day {
            failed.push(format!("daily trade limit {} reached", self.max_trades_per_day));
        }
        if let (Some(limit), Some(vix)) = (self.max_vix, check.vix) {
            if vix > limit {
                failed.push(format!("vix {vix:.2} above {limit:.2}"));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(failed.join(", "))
        }
    }

    /// True once open positions must be flattened for the day.
    pub fn should_square_off(&self, at: NaiveDateTime) -> bool {
        self.enabled && at.time() >= self.square_off
    }
}
