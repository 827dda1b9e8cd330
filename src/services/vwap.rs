use chrono::{DateTime, Utc};

use crate::data::session::SessionClock;
use crate::data::ticker::{CrossDiagnostics, VwapState};

/// Prices and VWAP on either side of one trade.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VwapTick {
    pub prev_price: f64,
    pub prev_vwap: f64,
    pub price: f64,
    pub vwap: f64,
}

impl VwapTick {
    /// Strictly below VWAP before, at or above after.
    pub fn is_cross_up(&self) -> bool {
        self.prev_price > 0.0
            && self.prev_vwap > 0.0
            && self.prev_price < self.prev_vwap
            && self.price >= self.vwap
    }

    pub fn at_or_above_vwap(&self) -> bool {
        self.vwap > 0.0 && self.price >= self.vwap
    }
}

/// Folds one trade into the running VWAP. Callers validate price and size first.
pub fn update(state: &mut VwapState, price: f64, size: f64, at: DateTime<Utc>) -> VwapTick {
    state.prev_price = state.last_price;
    state.prev_vwap = state.vwap().unwrap_or(0.0);

    state.cum_pv += price * size;
    state.cum_volume += size;
    state.last_price = price;
    state.last_trade_at = Some(at);

    VwapTick {
        prev_price: state.prev_price,
        prev_vwap: state.prev_vwap,
        price,
        vwap: state.vwap().unwrap_or(0.0),
    }
}

/// Records the first cross-up inside the arming window. Later crosses are ignored.
pub fn arm_on_cross(
    diag: &mut CrossDiagnostics,
    tick: &VwapTick,
    at: DateTime<Utc>,
    clock: &SessionClock,
) -> bool {
    if diag.seen_in_window || !tick.is_cross_up() || !clock.in_arming_window(at) {
        return false;
    }
    diag.seen_in_window = true;
    diag.first_at = Some(at);
    diag.first_price = Some(tick.price);
    true
}
