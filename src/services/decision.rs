//! The per-trade decision function.
//!
//! Live streaming, VWAP seeding and historic replay all route every trade through
//! `apply_trade`, which runs inside a single store mutation. Identical ordered
//! trades therefore produce identical VWAP values and identical decisions.

use chrono::{DateTime, Utc};

use crate::data::filters::RuntimeFilters;
use crate::data::session::SessionClock;
use crate::data::ticker::{ExitReason, TickerState};
use crate::market::TradePrint;

use super::position::{self, RiskParams};
use super::vwap;

#[derive(Clone, Copy, Debug)]
pub struct DecisionContext {
    pub clock: SessionClock,
    pub filters: RuntimeFilters,
    pub risk: RiskParams,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TradeOutcome {
    /// Untracked symbol, invalid print, outside the session or out of order
    Rejected,
    /// Bookkeeping only
    Updated { armed: bool },
    Entered { price: f64, at: DateTime<Utc>, take_profit: f64, stop: f64 },
    Exited { reason: ExitReason, price: f64, at: DateTime<Utc>, entry_price: f64 },
}

pub fn apply_trade(state: &mut TickerState, trade: &TradePrint, ctx: &DecisionContext) -> TradeOutcome {
    let clock = &ctx.clock;
    let at = trade.at;

    if !state.selected {
        return TradeOutcome::Rejected;
    }
    if trade.price <= 0.0 || trade.size <= 0.0 {
        return TradeOutcome::Rejected;
    }
    if at < clock.open || at > clock.trade_acceptance_end() {
        return TradeOutcome::Rejected;
    }
    if matches!(state.vwap.last_trade_at, Some(last) if at < last) {
        return TradeOutcome::Rejected;
    }

    let tick = vwap::update(&mut state.vwap, trade.price, trade.size, at);

    if state.is_open() {
        if let Some(pos) = state.position.as_mut() {
            pos.track(trade.price, at);
        }
    }

    let armed = !state.has_position()
        && !state.exited()
        && vwap::arm_on_cross(&mut state.cross, &tick, at, clock);

    // The forced exit owns everything from its instant on.
    if at >= clock.force_exit {
        return TradeOutcome::Updated { armed };
    }

    if position::entry_allowed(state, &tick, at, clock, &ctx.filters) {
        position::open(state, trade.price, at, clock, ctx.risk);
        if let Some(pos) = state.position.as_ref() {
            return TradeOutcome::Entered {
                price: pos.entry_price(),
                at,
                take_profit: pos.take_profit(),
                stop: pos.stop(),
            };
        }
    }

    if state.is_open() {
        let signal = state.position.as_ref().and_then(|pos| position::exit_signal(pos, trade.price));
        if let Some(reason) = signal {
            let entry_price = state.position.as_ref().map(|p| p.entry_price()).unwrap_or_default();
            if position::close(state, reason, trade.price, at, clock).is_some() {
                return TradeOutcome::Exited { reason, price: trade.price, at, entry_price };
            }
        }
    }

    TradeOutcome::Updated { armed }
}
