use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::data::session::SessionClock;
use crate::data::store::SessionStore;
use crate::data::ticker::OpeningRange;
use crate::error::MarketDataError;
use crate::market::{HistoricalData, MarketMessage, MinuteBar, StreamHandle};
use crate::shutdown::Shutdown;

use super::pool::fan_out;
use super::{wait_deadline, Wait};

/// Folds one in-window bar into the range.
///
/// The baseline open is the open of the earliest bar seen, so the result does
/// not depend on arrival order.
pub fn aggregate(range: &mut OpeningRange, bar: &MinuteBar, session_open: DateTime<Utc>) {
    let earliest = range.baseline_bar_start.map_or(true, |start| bar.start < start);
    if earliest {
        range.open = bar.open;
        range.baseline_bar_start = Some(bar.start);
        range.open_estimated = bar.start != session_open;
    }

    let high = bar.open.max(bar.high);
    if high > range.high {
        range.high = high;
    }
    let low = if bar.low > 0.0 { bar.low } else { bar.open };
    if range.low <= 0.0 || low < range.low {
        range.low = low;
    }

    range.volume += bar.volume.max(0.0);
    range.bars += 1;
}

/// Applies a bar for a watched symbol if it starts inside the opening window.
/// Returns false for anything discarded.
pub fn apply_bar(store: &SessionStore, clock: &SessionClock, watched: &HashSet<String>, bar: &MinuteBar) -> bool {
    if !watched.contains(&bar.symbol) || bar.open <= 0.0 || !clock.in_opening_window(bar.start) {
        return false;
    }
    store.upsert_ticker(&bar.symbol, |t| aggregate(&mut t.opening, bar, clock.open));
    true
}

/// Consumes the live bar subscription until the selection instant.
pub async fn collect_live(
    store: &SessionStore,
    clock: &SessionClock,
    watched: &HashSet<String>,
    bars: &mut StreamHandle,
    shutdown: &Shutdown,
) -> Result<Wait, MarketDataError> {
    let deadline = wait_deadline(clock.selection);
    tokio::pin!(deadline);
    let mut applied = 0usize;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(Wait::Cancelled),
            _ = &mut deadline => break,
            msg = bars.next() => match msg? {
                MarketMessage::Bar(bar) => {
                    if apply_bar(store, clock, watched, &bar) {
                        applied += 1;
                    }
                }
                MarketMessage::Trade(_) => {}
            },
        }
    }

    info!("[OPENING] collected {} in-window bars", applied);
    Ok(Wait::Reached)
}

/// One bounded range query per symbol, spread over the worker pool.
/// Returns the per-symbol failures; every other symbol is applied to the store.
pub async fn collect_historic(
    store: Arc<SessionStore>,
    history: Arc<dyn HistoricalData>,
    clock: SessionClock,
    symbols: Vec<String>,
    workers: usize,
    shutdown: &Shutdown,
) -> Vec<(String, MarketDataError)> {
    let watched: Arc<HashSet<String>> = Arc::new(symbols.iter().cloned().collect());

    let results = fan_out(symbols, workers, shutdown, move |symbol: String| {
        let store = Arc::clone(&store);
        let history = Arc::clone(&history);
        let watched = Arc::clone(&watched);
        async move {
            let bars: Result<Vec<MinuteBar>, MarketDataError> = history
                .minute_bars(&symbol, clock.open, clock.opening_window_end())
                .try_collect()
                .await;
            match bars {
                Ok(bars) => {
                    let applied = bars.iter().filter(|b| apply_bar(&store, &clock, &watched, b)).count();
                    debug!("[OPENING] {}: {} bars", symbol, applied);
                    Ok(())
                }
                Err(e) => Err((symbol, e)),
            }
        }
    })
    .await;

    results.into_iter().filter_map(Result::err).collect()
}
