pub mod decision;
pub mod opening_range;
pub mod pool;
pub mod position;
pub mod replay;
pub mod reporting;
pub mod selection;
pub mod session;
pub mod volume_history;
pub mod vwap;

use chrono::{DateTime, Utc};
use tokio::time::Sleep;

use crate::shutdown::Shutdown;

/// How a bounded wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    Reached,
    Cancelled,
}

/// A sleep that completes at the wall-clock instant `at` (immediately if past).
pub fn wait_deadline(at: DateTime<Utc>) -> Sleep {
    let remaining = (at - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(remaining)
}

/// Races the deadline against cancellation.
pub async fn wait_until(at: DateTime<Utc>, shutdown: &Shutdown) -> Wait {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Wait::Cancelled,
        _ = wait_deadline(at) => Wait::Reached,
    }
}

#[cfg(test)]
mod decision_tests;
#[cfg(test)]
mod volume_history_tests;
