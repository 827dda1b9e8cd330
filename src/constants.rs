//! Session-wide constants and magic numbers
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make the session rules easier to tune.

use std::time::Duration;

/// Opening-range and session window constants
pub mod session {
    /// Number of one-minute bars in the opening window (09:30..09:34 inclusive)
    pub const OPENING_WINDOW_MINUTES: i64 = 5;

    /// Cross-ups are only armed from open + this many minutes
    pub const ARMING_DELAY_MINUTES: i64 = 1;

    /// Trades this long after the forced-exit instant are still accepted for bookkeeping
    pub const TRADE_GRACE_MINUTES: i64 = 5;

    /// Fractional tolerance added to the max entry minute (just under a full minute)
    pub const ENTRY_MINUTE_TOLERANCE: f64 = 0.999;
}

/// Simulated position and report constants
pub mod report {
    /// Fixed notional share count for every simulated trade
    pub const SHARES: u32 = 1000;

    /// Profit factor reported when there are wins and zero losses
    pub const PROFIT_FACTOR_SENTINEL: f64 = 999.0;
}

/// Market data transport constants
pub mod market {
    /// Page size for REST historical bar queries
    pub const BARS_PAGE_LIMIT: u32 = 10_000;

    /// Page size for REST historical trade queries
    pub const TRADES_PAGE_LIMIT: u32 = 10_000;

    /// Capacity of the message channel behind a live subscription
    pub const STREAM_CHANNEL_CAPACITY: usize = 4096;
}

/// Speech narration constants
pub mod speech {
    use super::*;

    /// Upper bound on a single synthesis call
    pub const SYNTH_TIMEOUT: Duration = Duration::from_secs(15);
}

/// Event bus capacity for SSE subscribers
pub const EVENT_BUS_CAPACITY: usize = 1000;

/// Logging event names for structured logging
pub mod events {
    pub const POSITION_OPENED: &str = "position_opened";
    pub const POSITION_CLOSED: &str = "position_closed";
    pub const CROSS_ARMED: &str = "cross_armed";
    pub const PHASE_CHANGED: &str = "phase_changed";
}
