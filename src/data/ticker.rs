use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Display label mirroring the lifecycle of one symbol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum TickerStatus {
    #[default]
    #[serde(rename = "watching")]
    Watching,
    #[serde(rename = "selected")]
    Selected,
    #[serde(rename = "tracking")]
    Tracking,
    #[serde(rename = "LONG")]
    Long,
    #[serde(rename = "PROFIT")]
    Profit,
    #[serde(rename = "STOP")]
    Stop,
    #[serde(rename = "TIME_EXIT")]
    TimeExit,
}

impl fmt::Display for TickerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TickerStatus::Watching => "watching",
            TickerStatus::Selected => "selected",
            TickerStatus::Tracking => "tracking",
            TickerStatus::Long => "LONG",
            TickerStatus::Profit => "PROFIT",
            TickerStatus::Stop => "STOP",
            TickerStatus::TimeExit => "TIME_EXIT",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    Profit,
    Stop,
    TimeExit,
}

impl ExitReason {
    pub fn status(self) -> TickerStatus {
        match self {
            ExitReason::Profit => TickerStatus::Profit,
            ExitReason::Stop => TickerStatus::Stop,
            ExitReason::TimeExit => TickerStatus::TimeExit,
        }
    }
}

/// Opening-window aggregate for one symbol.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OpeningRange {
    /// Open of the earliest bar seen in the window
    pub open: f64,
    /// True when that bar is not the one starting exactly at the open
    pub open_estimated: bool,
    pub baseline_bar_start: Option<DateTime<Utc>>,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub bars: u32,
}

impl OpeningRange {
    /// (high - low) / open, once open, high and low are all positive.
    pub fn range_pct(&self) -> Option<f64> {
        if self.open > 0.0 && self.high > 0.0 && self.low > 0.0 {
            Some((self.high - self.low) / self.open)
        } else {
            None
        }
    }
}

/// Running VWAP and the values immediately before the latest trade.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VwapState {
    pub cum_pv: f64,
    pub cum_volume: f64,
    pub last_price: f64,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub prev_price: f64,
    pub prev_vwap: f64,
}

impl VwapState {
    pub fn vwap(&self) -> Option<f64> {
        (self.cum_volume > 0.0).then(|| self.cum_pv / self.cum_volume)
    }
}

/// An open or closed simulated long position.
///
/// Entry, take-profit and stop are fixed at construction.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Position {
    entry_price: f64,
    entry_at: DateTime<Utc>,
    entry_minutes: f64,
    take_profit: f64,
    stop: f64,
    pub max_price: f64,
    pub max_at: DateTime<Utc>,
    pub min_price: f64,
    pub min_at: DateTime<Utc>,
}

impl Position {
    pub fn open(price: f64, at: DateTime<Utc>, minutes_after_open: f64, tp_pct: f64, sl_pct: f64) -> Self {
        Self {
            entry_price: price,
            entry_at: at,
            entry_minutes: minutes_after_open,
            take_profit: price * (1.0 + tp_pct),
            stop: price * (1.0 - sl_pct),
            max_price: price,
            max_at: at,
            min_price: price,
            min_at: at,
        }
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn entry_at(&self) -> DateTime<Utc> {
        self.entry_at
    }

    pub fn entry_minutes(&self) -> f64 {
        self.entry_minutes
    }

    pub fn take_profit(&self) -> f64 {
        self.take_profit
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    /// Updates favorable/adverse excursion for a trade at or after entry.
    pub fn track(&mut self, price: f64, at: DateTime<Utc>) {
        if at < self.entry_at {
            return;
        }
        if price > self.max_price {
            self.max_price = price;
            self.max_at = at;
        }
        if price < self.min_price {
            self.min_price = price;
            self.min_at = at;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PositionExit {
    pub reason: ExitReason,
    pub price: f64,
    pub at: DateTime<Utc>,
    pub minutes_after_open: f64,
}

/// First cross-up seen inside the arming window, kept even if nothing trades.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CrossDiagnostics {
    pub seen_in_window: bool,
    pub first_at: Option<DateTime<Utc>>,
    pub first_price: Option<f64>,
}

/// Everything the session knows about one watchlisted symbol.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TickerState {
    pub symbol: String,
    pub status: TickerStatus,
    pub opening: OpeningRange,
    pub selected: bool,

    pub hist_avg_volume: Option<f64>,
    pub today_pct: Option<f64>,
    pub history_error: Option<String>,

    pub vwap: VwapState,
    pub position: Option<Position>,
    pub exit: Option<PositionExit>,
    pub cross: CrossDiagnostics,
}

impl TickerState {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), ..Self::default() }
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn exited(&self) -> bool {
        self.exit.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.has_position() && !self.exited()
    }

    /// Last trade price, or entry when nothing has traded since.
    pub fn mark_price(&self) -> Option<f64> {
        let pos = self.position.as_ref()?;
        match self.vwap.last_trade_at {
            Some(at) if at >= pos.entry_at() && self.vwap.last_price > 0.0 => Some(self.vwap.last_price),
            _ => Some(pos.entry_price()),
        }
    }
}
