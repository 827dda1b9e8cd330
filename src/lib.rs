//! Rust ORB - opening-range / VWAP equities session engine
//!
//! This library watches a fixed daily session: it measures each symbol's
//! opening range, selects candidates, tracks their VWAP on trade prints and
//! simulates long entries with take-profit, stop and time exits. The same
//! per-trade logic replays a past session from historical data and reports on it.

pub mod api;
pub mod bus;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod events;
pub mod market;
pub mod services;
pub mod shutdown;
pub mod speech;

// Re-export commonly used types
pub use bus::EventBus;
pub use config::AppConfig;
pub use data::{Mode, Phase, SessionClock, SessionStore};
pub use events::{Event, EventKind, EventLevel};
pub use services::replay::HistoricRunner;
pub use services::session::SessionEngine;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod events_tests;
