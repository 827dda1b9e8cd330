//! Historic replay.
//!
//! A replay walks the same phases as a live session, but every input comes from a
//! bounded historical range query and the window never extends past `now`.
//! Trades go through the same `SessionEngine::process_trade` as live prints.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::data::session::{resolve_replay_end, resolve_trading_date, Phase, SessionClock};
use crate::data::store::{HistoricMeta, SessionStore};
use crate::error::SessionError;
use crate::shutdown::{self, Shutdown, ShutdownTrigger};

use super::reporting::{build_report, HistoricReport};
use super::session::SessionEngine;
use super::{opening_range, selection, Wait};

/// Replays `target` as of now.
pub async fn run_historic(engine: &SessionEngine, target: NaiveDate, shutdown: &Shutdown) -> Result<Wait, SessionError> {
    run_historic_at(engine, target, Utc::now(), shutdown).await
}

/// Replays `target` as seen from the instant `now`.
///
/// Resets the store for a fresh session, then collects, selects, normalizes,
/// replays trades and builds the report. `Ok(Wait::Cancelled)` means the run
/// was superseded or shut down before it finished.
pub async fn run_historic_at(
    engine: &SessionEngine,
    target: NaiveDate,
    now: DateTime<Utc>,
    shutdown: &Shutdown,
) -> Result<Wait, SessionError> {
    let store = engine.store();
    let today = now.with_timezone(&engine.hours().tz).date_naive();
    if target > today {
        return Err(SessionError::FutureDate { date: target.to_string(), today: today.to_string() });
    }

    let (date, note) = resolve_trading_date(target);
    let session_id = store.reset_for_historic_run(target, date, note.clone());
    info!("⏪ [REPLAY] session {} replaying {} (requested {})", session_id, date, target);
    if let Some(note) = note {
        engine.warn_event(None, note);
    }

    let clock = match SessionClock::for_date(date, engine.hours()) {
        Ok(clock) => clock,
        Err(e) => {
            store.finish_historic_run(Some(e.to_string()));
            return Err(e.into());
        }
    };
    store.set_clock(clock);

    let waited = drive(engine, &clock, now, shutdown).await;
    store.finish_historic_run(None);
    Ok(waited)
}

async fn drive(engine: &SessionEngine, clock: &SessionClock, now: DateTime<Utc>, shutdown: &Shutdown) -> Wait {
    let store = engine.store();
    let (end, truncated) = resolve_replay_end(clock, now);
    let watchlist = store.watchlist();
    engine.system(format!("Historic replay {}: {} tickers", clock.date, watchlist.len()));

    if end < clock.selection {
        let message = format!(
            "{} has not reached selection time ({}) yet; nothing to replay",
            clock.date,
            clock.local_hms(clock.selection)
        );
        warn!("[REPLAY] {}", message);
        engine.warn_event(None, message.clone());
        engine.advance_phase(Phase::Closed);
        store.set_report(HistoricReport { note: Some(message), ..Default::default() });
        engine.system(format!("Report ready for {}", clock.date));
        return Wait::Reached;
    }

    // Opening window
    engine.advance_phase(Phase::CollectingOpen5m);
    let failures = opening_range::collect_historic(
        Arc::clone(store),
        engine.history(),
        *clock,
        watchlist,
        engine.workers(),
        shutdown,
    )
    .await;
    for (symbol, e) in failures {
        warn!("[REPLAY] opening bars failed for {}: {}", symbol, e);
        engine.warn_event(Some(&symbol), format!("Opening bars failed: {}", e));
    }
    if shutdown.is_cancelled() {
        return Wait::Cancelled;
    }

    // Selection
    engine.advance_phase(Phase::Selecting);
    let candidates = selection::run_selection(store);
    if candidates.is_empty() {
        engine.system("No tickers matched open_5m filters at selection.");
    } else {
        engine.system(format!("Selection: {} tickers matched opening filters", candidates.len()));

        if engine.prepare_tracked(clock, &candidates, shutdown).await == Wait::Cancelled {
            return Wait::Cancelled;
        }

        engine.advance_phase(Phase::TrackingTicks);
        let replayed = engine
            .replay_window(clock, &candidates, clock.selection, end, "Trade replay", shutdown)
            .await;
        if replayed == Wait::Cancelled {
            return Wait::Cancelled;
        }

        if truncated {
            engine.warn_event(
                None,
                format!(
                    "Replay window ends at {}, before the forced exit; open positions closed at last price",
                    clock.local_hms(end)
                ),
            );
            engine.close_open_positions(clock, end).await;
        } else {
            engine.forced_exit(clock).await;
        }
    }

    engine.advance_phase(Phase::Closed);
    let mut report = build_report(&store.ticker_states(), &store.filters(), clock, end);
    if truncated {
        report.note = Some(format!("Replay truncated at {} (market still open)", clock.local_hms(end)));
    }
    info!(
        "📋 [REPLAY] {}: {} candidates, {} trades, net PnL ${:.2}",
        clock.date, report.summary.candidates, report.summary.trades_taken, report.summary.net_pnl
    );
    store.set_report(report);
    engine.system(format!("Report ready for {}", clock.date));
    Wait::Reached
}

/// Runs one replay at a time, latest request wins.
///
/// A new request cancels the replay in flight, waits for it to exit, then starts
/// the newest requested date.
#[derive(Clone)]
pub struct HistoricRunner {
    requests: Arc<watch::Sender<Option<NaiveDate>>>,
    store: Arc<SessionStore>,
    lookback: Duration,
}

impl HistoricRunner {
    pub fn spawn(engine: SessionEngine, shutdown: Shutdown) -> (Self, JoinHandle<()>) {
        let runner_store = Arc::clone(engine.store());
        let lookback = Duration::days(i64::from(engine.config().history.max_calendar_lookback_days));

        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(supervise(engine, rx, shutdown));
        let runner = Self { requests: Arc::new(tx), store: runner_store, lookback };
        runner.refresh_range(Utc::now());
        (runner, handle)
    }

    /// Recomputes the selectable dates (today - lookback through today) as of `now`.
    pub fn refresh_range(&self, now: DateTime<Utc>) -> HistoricMeta {
        let today = now.with_timezone(&self.store.tz()).date_naive();
        self.store.set_historic_range(today - self.lookback, today);
        self.store.historic()
    }

    pub fn request(&self, date: NaiveDate) {
        info!("⏪ [REPLAY] requested {}", date);
        self.requests.send_replace(Some(date));
    }
}

async fn supervise(engine: SessionEngine, mut requests: watch::Receiver<Option<NaiveDate>>, shutdown: Shutdown) {
    let mut current: Option<(ShutdownTrigger, JoinHandle<()>)> = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            changed = requests.changed() => {
                if changed.is_err() {
                    break;
                }
                let requested = *requests.borrow_and_update();
                let Some(date) = requested else { continue };

                if let Some((trigger, handle)) = current.take() {
                    trigger.trigger();
                    if let Err(e) = handle.await {
                        error!("❌ [REPLAY] previous run panicked: {}", e);
                    }
                }
                current = Some(start_run(engine.clone(), date));
            }
        }
    }

    if let Some((trigger, handle)) = current {
        trigger.trigger();
        let _ = handle.await;
    }
    info!("[REPLAY] runner stopped");
}

fn start_run(engine: SessionEngine, date: NaiveDate) -> (ShutdownTrigger, JoinHandle<()>) {
    let (trigger, run_shutdown) = shutdown::channel();
    let handle = tokio::spawn(async move {
        match run_historic(&engine, date, &run_shutdown).await {
            Ok(Wait::Reached) => info!("✅ [REPLAY] {} complete", date),
            Ok(Wait::Cancelled) => info!("[REPLAY] {} superseded", date),
            Err(e) => {
                warn!("[REPLAY] {} failed: {}", date, e);
                engine.warn_event(None, e.to_string());
            }
        }
    });
    (trigger, handle)
}
