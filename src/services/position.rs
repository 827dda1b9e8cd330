use chrono::{DateTime, Utc};

use crate::config::RiskConfig;
use crate::constants::session::ENTRY_MINUTE_TOLERANCE;
use crate::data::filters::RuntimeFilters;
use crate::data::session::SessionClock;
use crate::data::ticker::{ExitReason, Position, PositionExit, TickerState, TickerStatus};

use super::vwap::VwapTick;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskParams {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
}

impl From<&RiskConfig> for RiskParams {
    fn from(risk: &RiskConfig) -> Self {
        Self { take_profit_pct: risk.take_profit_pct, stop_loss_pct: risk.stop_loss_pct }
    }
}

/// Every entry condition for a flat, never-exited symbol at this trade.
pub fn entry_allowed(
    state: &TickerState,
    tick: &VwapTick,
    at: DateTime<Utc>,
    clock: &SessionClock,
    filters: &RuntimeFilters,
) -> bool {
    if state.has_position() || state.exited() {
        return false;
    }
    if at < clock.selection || at >= clock.vwap_cutoff {
        return false;
    }

    let minutes = clock.minutes_after_open(at);
    if minutes < f64::from(filters.entry_min_after_open)
        || minutes > f64::from(filters.entry_max_after_open) + ENTRY_MINUTE_TOLERANCE
    {
        return false;
    }

    let Some(range_pct) = state.opening.range_pct() else {
        return false;
    };
    if !filters.range_pct_ok(range_pct) || !filters.volume_ok(state.opening.volume) {
        return false;
    }
    // Missing history counts as 0%.
    if !filters.today_pct_ok(state.today_pct.unwrap_or(0.0)) {
        return false;
    }
    if !filters.entry_price_ok(tick.price) {
        return false;
    }

    tick.at_or_above_vwap() && state.cross.seen_in_window
}

/// Opens the position. Never replaces an existing one.
pub fn open(state: &mut TickerState, price: f64, at: DateTime<Utc>, clock: &SessionClock, risk: RiskParams) -> bool {
    if state.has_position() || state.exited() {
        return false;
    }
    state.position = Some(Position::open(
        price,
        at,
        clock.minutes_after_open(at),
        risk.take_profit_pct,
        risk.stop_loss_pct,
    ));
    state.status = TickerStatus::Long;
    true
}

/// Take-profit is checked before stop, so a price satisfying both is a profit.
pub fn exit_signal(position: &Position, price: f64) -> Option<ExitReason> {
    if position.take_profit() > 0.0 && price >= position.take_profit() {
        Some(ExitReason::Profit)
    } else if position.stop() > 0.0 && price <= position.stop() {
        Some(ExitReason::Stop)
    } else {
        None
    }
}

/// Closes an open position. No-op once exited.
pub fn close(
    state: &mut TickerState,
    reason: ExitReason,
    price: f64,
    at: DateTime<Utc>,
    clock: &SessionClock,
) -> Option<PositionExit> {
    if !state.is_open() {
        return None;
    }
    let exit = PositionExit { reason, price, at, minutes_after_open: clock.minutes_after_open(at) };
    state.exit = Some(exit.clone());
    state.status = reason.status();
    Some(exit)
}

/// Closes at the last known price, or entry if nothing traded since.
pub fn time_exit(state: &mut TickerState, at: DateTime<Utc>, clock: &SessionClock) -> Option<PositionExit> {
    let price = state.mark_price()?;
    close(state, ExitReason::TimeExit, price, at, clock)
}
