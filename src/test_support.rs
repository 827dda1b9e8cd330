//! Shared fixtures for unit tests. Session day is Monday 2024-03-04 (EST, UTC-5).

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;

use crate::bus::EventBus;
use crate::config::MarketHours;
use crate::data::{Mode, RuntimeFilters, SessionClock, SessionStore};
use crate::market::{MinuteBar, TradePrint};

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
}

/// A New York wall-clock time on the test day, as UTC.
pub fn ny(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    chrono_tz::America::New_York
        .with_ymd_and_hms(2024, 3, 4, h, m, s)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn hours() -> MarketHours {
    MarketHours {
        tz: chrono_tz::America::New_York,
        open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        selection: NaiveTime::from_hms_opt(9, 35, 0).unwrap(),
        vwap_cutoff: NaiveTime::from_hms_opt(9, 43, 0).unwrap(),
        force_exit: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
    }
}

pub fn clock() -> SessionClock {
    SessionClock::for_date(day(), &hours()).unwrap()
}

/// Permissive bounds; tests tighten what they exercise.
pub fn filters() -> RuntimeFilters {
    RuntimeFilters {
        open_5m_range_pct_min: 0.01,
        open_5m_range_pct_max: 0.50,
        open_5m_vol_min: 1.0,
        open_5m_vol_max: 1e12,
        open_5m_today_pct_min: 0.0,
        open_5m_today_pct_max: f64::MAX,
        entry_min_after_open: 5,
        entry_max_after_open: 13,
        entry_price_min: 1.0,
        entry_price_max: 1000.0,
    }
}

pub fn store(mode: Mode) -> Arc<SessionStore> {
    Arc::new(SessionStore::new(
        mode,
        chrono_tz::America::New_York,
        filters(),
        50,
        EventBus::new(64),
    ))
}

pub fn trade(symbol: &str, at: DateTime<Utc>, price: f64, size: f64) -> TradePrint {
    TradePrint { symbol: symbol.to_string(), price, size, at }
}

pub fn bar(symbol: &str, start: DateTime<Utc>, open: f64, high: f64, low: f64, volume: f64) -> MinuteBar {
    MinuteBar {
        symbol: symbol.to_string(),
        start,
        open,
        high,
        low,
        close: (high + low) / 2.0,
        volume,
    }
}
