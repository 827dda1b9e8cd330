use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::constants::report::{PROFIT_FACTOR_SENTINEL, SHARES};
use crate::data::filters::RuntimeFilters;
use crate::data::session::SessionClock;
use crate::data::ticker::{ExitReason, TickerState};

#[derive(Clone, Debug, Default, Serialize)]
pub struct HistoricSummary {
    pub date: Option<NaiveDate>,
    pub window_start: String,
    pub window_end: String,
    pub shares: u32,
    pub candidates: usize,
    pub trades_taken: usize,
    pub no_entry: usize,
    pub wins: usize,
    pub losses: usize,
    pub time_exits: usize,
    pub win_rate: f64,
    pub net_pnl: f64,
    pub total_notional: f64,
    pub net_return_pct: f64,
    pub avg_return_pct: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub profit_factor: f64,
    pub best_trade_pct: f64,
    pub worst_trade_pct: f64,
}

/// One simulated trade. Percentages are fractions of entry price.
#[derive(Clone, Debug, Serialize)]
pub struct HistoricTrade {
    pub symbol: String,
    pub entry_time: String,
    pub entry_price: f64,
    pub entry_minutes_after_open: f64,
    pub take_profit_price: f64,
    pub stop_price: f64,

    pub exit_time: String,
    pub exit_price: f64,
    pub exit_minutes_after_open: f64,
    pub exit_reason: Option<ExitReason>,

    pub shares: u32,
    pub realized_pnl_pct: f64,
    pub realized_pnl: f64,

    /// What holding to the end of the window would have returned
    pub hold_price: f64,
    pub hold_pnl_pct: f64,
    pub hold_pnl: f64,

    pub mfe_price: f64,
    pub mfe_time: String,
    pub mfe_pnl_pct: f64,
    pub mfe_pnl: f64,
    pub mae_price: f64,
    pub mae_time: String,
    pub mae_pnl_pct: f64,
    pub mae_pnl: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoricNoEntry {
    pub symbol: String,
    pub open_5m_vol: f64,
    pub open_5m_range_pct: Option<f64>,
    pub open_5m_today_pct: Option<f64>,
    pub saw_cross_in_window: bool,
    pub first_cross_time: Option<String>,
    pub first_cross_price: Option<f64>,
    pub reason: NoEntryReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NoEntryReason {
    #[serde(rename = "No VWAP cross in entry window")]
    NoCross,
    #[serde(rename = "Open5mToday% filter failed")]
    TodayPctFilter,
    #[serde(rename = "VWAP cross occurred but price filter failed")]
    CrossPriceFilter,
    #[serde(rename = "No entry (filters + cross never aligned)")]
    NeverAligned,
}

/// Best-effort explanation for a candidate that never traded, checked in order.
pub fn no_entry_reason(state: &TickerState, filters: &RuntimeFilters) -> NoEntryReason {
    if !state.cross.seen_in_window {
        return NoEntryReason::NoCross;
    }
    if !filters.today_pct_ok(state.today_pct.unwrap_or(0.0)) {
        return NoEntryReason::TodayPctFilter;
    }
    match state.cross.first_price {
        Some(price) if price > 0.0 && !filters.entry_price_ok(price) => NoEntryReason::CrossPriceFilter,
        _ => NoEntryReason::NeverAligned,
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct HistoricReport {
    pub summary: HistoricSummary,
    pub trades: Vec<HistoricTrade>,
    pub no_entries: Vec<HistoricNoEntry>,
    /// Set when the replay window stopped short of the forced exit
    pub note: Option<String>,
}

fn pct(price: f64, entry: f64) -> f64 {
    (price - entry) / entry
}

fn amount(price: f64, entry: f64) -> f64 {
    (price - entry) * f64::from(SHARES)
}

fn trade_row(state: &TickerState, clock: &SessionClock, end: DateTime<Utc>) -> Option<HistoricTrade> {
    let pos = state.position.as_ref()?;
    let entry = pos.entry_price();
    if entry <= 0.0 {
        return None;
    }

    let hold_price = state.mark_price().unwrap_or(entry);
    let (exit_price, exit_at, exit_minutes, exit_reason) = match &state.exit {
        Some(exit) => (exit.price, exit.at, exit.minutes_after_open, Some(exit.reason)),
        None => (hold_price, end, clock.minutes_after_open(end), None),
    };

    Some(HistoricTrade {
        symbol: state.symbol.clone(),
        entry_time: clock.local_hms(pos.entry_at()),
        entry_price: entry,
        entry_minutes_after_open: pos.entry_minutes(),
        take_profit_price: pos.take_profit(),
        stop_price: pos.stop(),
        exit_time: clock.local_hms(exit_at),
        exit_price,
        exit_minutes_after_open: exit_minutes,
        exit_reason,
        shares: SHARES,
        realized_pnl_pct: pct(exit_price, entry),
        realized_pnl: amount(exit_price, entry),
        hold_price,
        hold_pnl_pct: pct(hold_price, entry),
        hold_pnl: amount(hold_price, entry),
        mfe_price: pos.max_price,
        mfe_time: clock.local_hms(pos.max_at),
        mfe_pnl_pct: pct(pos.max_price, entry),
        mfe_pnl: amount(pos.max_price, entry),
        mae_price: pos.min_price,
        mae_time: clock.local_hms(pos.min_at),
        mae_pnl_pct: pct(pos.min_price, entry),
        mae_pnl: amount(pos.min_price, entry),
    })
}

/// Builds the replay report from the tracked symbols' terminal states.
pub fn build_report(
    states: &[TickerState],
    filters: &RuntimeFilters,
    clock: &SessionClock,
    end: DateTime<Utc>,
) -> HistoricReport {
    let mut trades = Vec::new();
    let mut no_entries = Vec::new();

    for state in states.iter().filter(|s| s.selected) {
        if let Some(row) = trade_row(state, clock, end) {
            trades.push(row);
        } else {
            no_entries.push(HistoricNoEntry {
                symbol: state.symbol.clone(),
                open_5m_vol: state.opening.volume,
                open_5m_range_pct: state.opening.range_pct(),
                open_5m_today_pct: state.today_pct,
                saw_cross_in_window: state.cross.seen_in_window,
                first_cross_time: state.cross.first_at.map(|at| clock.local_hms(at)),
                first_cross_price: state.cross.first_price,
                reason: no_entry_reason(state, filters),
            });
        }
    }

    trades.sort_by(|a, b| b.realized_pnl_pct.total_cmp(&a.realized_pnl_pct));
    no_entries.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let mut summary = compute_summary(&trades);
    summary.date = Some(clock.date);
    summary.window_start = clock.local_hms(clock.open);
    summary.window_end = clock.local_hms(end);
    summary.candidates = trades.len() + no_entries.len();
    summary.no_entry = no_entries.len();

    HistoricReport { summary, trades, no_entries, note: None }
}

/// Portfolio aggregates. A zero-PnL trade counts as a win.
pub fn compute_summary(trades: &[HistoricTrade]) -> HistoricSummary {
    let mut s = HistoricSummary { shares: SHARES, trades_taken: trades.len(), ..Default::default() };
    if trades.is_empty() {
        return s;
    }

    let (mut win_amt, mut loss_amt, mut win_pct, mut loss_pct, mut sum_pct) = (0.0, 0.0, 0.0, 0.0, 0.0);
    s.best_trade_pct = f64::MIN;
    s.worst_trade_pct = f64::MAX;

    for t in trades {
        s.net_pnl += t.realized_pnl;
        s.total_notional += t.entry_price * f64::from(SHARES);
        sum_pct += t.realized_pnl_pct;

        if t.exit_reason == Some(ExitReason::TimeExit) {
            s.time_exits += 1;
        }
        if t.realized_pnl >= 0.0 {
            s.wins += 1;
            win_amt += t.realized_pnl;
            win_pct += t.realized_pnl_pct;
        } else {
            s.losses += 1;
            loss_amt += t.realized_pnl;
            loss_pct += t.realized_pnl_pct;
        }
        s.best_trade_pct = s.best_trade_pct.max(t.realized_pnl_pct);
        s.worst_trade_pct = s.worst_trade_pct.min(t.realized_pnl_pct);
    }

    let n = trades.len() as f64;
    s.win_rate = s.wins as f64 / n;
    s.avg_return_pct = sum_pct / n;
    if s.total_notional > 0.0 {
        s.net_return_pct = s.net_pnl / s.total_notional;
    }
    if s.wins > 0 {
        s.avg_win_pct = win_pct / s.wins as f64;
    }
    if s.losses > 0 {
        s.avg_loss_pct = loss_pct / s.losses as f64;
    }

    s.profit_factor = if loss_amt < 0.0 {
        win_amt / -loss_amt
    } else if win_amt > 0.0 {
        PROFIT_FACTOR_SENTINEL
    } else {
        0.0
    };
    s
}
