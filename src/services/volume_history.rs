use chrono::{Duration, NaiveDate};
use futures_util::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{HistoryConfig, MarketHours};
use crate::data::session::SessionClock;
use crate::error::{HistoryError, MarketDataError};
use crate::market::{HistoricalData, MinuteBar};
use crate::shutdown::Shutdown;

use super::pool::fan_out;

/// Historical baseline for one candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeBaseline {
    pub average: f64,
    pub sessions: usize,
}

/// (today / average) * 100, undefined without a positive average.
pub fn today_pct(today_volume: f64, average: f64) -> Option<f64> {
    (average > 0.0).then(|| today_volume / average * 100.0)
}

/// Opening-window volume of one prior day. `Ok(None)` means no session that day.
async fn open_window_volume(
    history: &dyn HistoricalData,
    symbol: &str,
    day: NaiveDate,
    hours: &MarketHours,
) -> Result<Option<f64>, MarketDataError> {
    let Ok(clock) = SessionClock::for_date(day, hours) else {
        return Ok(None);
    };
    let bars: Vec<MinuteBar> = history
        .minute_bars(symbol, clock.open, clock.opening_window_end())
        .try_collect()
        .await?;
    let volume: f64 = bars.iter().map(|b| b.volume).sum();
    Ok((volume > 0.0).then_some(volume))
}

/// Walks back day by day from `today` until enough sessions are found or the
/// calendar lookback runs out. Days without data and failed queries are skipped;
/// if nothing was found, the last query failure is reported.
pub async fn average_open_volume(
    history: &dyn HistoricalData,
    symbol: &str,
    today: NaiveDate,
    hours: &MarketHours,
    config: &HistoryConfig,
    shutdown: &Shutdown,
) -> Result<VolumeBaseline, HistoryError> {
    let mut samples = Vec::with_capacity(config.open5m_lookback_sessions);
    let mut last_error = None;

    for back in 1..=i64::from(config.max_calendar_lookback_days) {
        if samples.len() >= config.open5m_lookback_sessions || shutdown.is_cancelled() {
            break;
        }
        let day = today - Duration::days(back);
        match open_window_volume(history, symbol, day, hours).await {
            Ok(Some(volume)) => samples.push(volume),
            Ok(None) => {}
            Err(e) => {
                debug!("[HISTORY] {} {}: {}", symbol, day, e);
                last_error = Some(e);
            }
        }
    }

    if samples.is_empty() {
        let lookback_days = config.max_calendar_lookback_days;
        return Err(match last_error {
            Some(last_error) => HistoryError::QueryFailed { lookback_days, last_error },
            None => HistoryError::NoHistory { lookback_days },
        });
    }
    let average = samples.iter().sum::<f64>() / samples.len() as f64;
    Ok(VolumeBaseline { average, sessions: samples.len() })
}

/// Normalizes every candidate on the worker pool.
pub async fn normalize(
    history: Arc<dyn HistoricalData>,
    candidates: Vec<String>,
    today: NaiveDate,
    hours: MarketHours,
    config: HistoryConfig,
    workers: usize,
    shutdown: &Shutdown,
) -> Vec<(String, Result<VolumeBaseline, HistoryError>)> {
    let inner_shutdown = shutdown.clone();
    let config = Arc::new(config);

    fan_out(candidates, workers, shutdown, move |symbol: String| {
        let history = Arc::clone(&history);
        let config = Arc::clone(&config);
        let shutdown = inner_shutdown.clone();
        async move {
            let result = average_open_volume(history.as_ref(), &symbol, today, &hours, &config, &shutdown).await;
            if let Err(e) = &result {
                warn!("[HISTORY] {}: {}", symbol, e);
            }
            (symbol, result)
        }
    })
    .await
}
