use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, MarketHours};
use crate::constants::events::{CROSS_ARMED, POSITION_CLOSED, POSITION_OPENED};
use crate::constants::speech::SYNTH_TIMEOUT;
use crate::data::session::{Mode, Phase, SessionClock};
use crate::data::store::SessionStore;
use crate::data::ticker::{ExitReason, TickerStatus};
use crate::error::{ConfigError, MarketDataError, SessionError, SpeechError};
use crate::events::{Event, EventKind, EventLevel};
use crate::market::{Channel, HistoricalData, MarketDataStream, MarketMessage, StreamHandle, TradePrint};
use crate::shutdown::Shutdown;
use crate::speech::{spell_nato, SpeechSynth};

use super::decision::{apply_trade, DecisionContext, TradeOutcome};
use super::pool::fan_out;
use super::position::{self, RiskParams};
use super::volume_history::{self, today_pct};
use super::{opening_range, selection, wait_deadline, wait_until, Wait};

/// Drives one trading session and owns the shared per-trade path.
///
/// Cloning is cheap; clones share the store and collaborators.
#[derive(Clone)]
pub struct SessionEngine {
    config: Arc<AppConfig>,
    hours: MarketHours,
    store: Arc<SessionStore>,
    history: Arc<dyn HistoricalData>,
    speech: Option<Arc<dyn SpeechSynth>>,
    /// Cancellation of the run this clone serves; narration gives up when it fires.
    cancel: Option<Shutdown>,
}

impl SessionEngine {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<SessionStore>,
        history: Arc<dyn HistoricalData>,
    ) -> Result<Self, ConfigError> {
        let hours = config.market_hours()?;
        Ok(Self { config, hours, store, history, speech: None, cancel: None })
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynth>) -> Self {
        self.speech = Some(speech);
        self
    }

    fn bound_to(&self, shutdown: &Shutdown) -> Self {
        let mut engine = self.clone();
        engine.cancel = Some(shutdown.clone());
        engine
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn hours(&self) -> &MarketHours {
        &self.hours
    }

    pub fn history(&self) -> Arc<dyn HistoricalData> {
        Arc::clone(&self.history)
    }

    pub fn workers(&self) -> usize {
        self.config.worker_count()
    }

    /// Current filters are read per trade, so committed updates apply to the next print.
    pub fn decision_context(&self, clock: &SessionClock) -> DecisionContext {
        DecisionContext {
            clock: *clock,
            filters: self.store.filters(),
            risk: RiskParams::from(&self.config.risk),
        }
    }

    // ---- events ----

    /// Appends an operator event, narrating it first when narration is available.
    pub async fn emit(&self, event: Event, narration: Option<&str>) {
        let audio_id = match narration {
            Some(text) => self.narrate(text).await,
            None => None,
        };
        self.store.add_event(event.with_audio(audio_id));
    }

    pub fn system(&self, message: impl Into<String>) {
        self.store.add_event(Event::system(Utc::now(), self.store.tz(), message));
    }

    pub fn warn_event(&self, symbol: Option<&str>, message: impl Into<String>) {
        let mut event = Event::system(Utc::now(), self.store.tz(), message).warn();
        if let Some(symbol) = symbol {
            event = event.with_symbol(symbol);
        }
        self.store.add_event(event);
    }

    /// Moves the store to `next` and logs the transition. Returns false if the
    /// store was already at or past `next`.
    pub fn advance_phase(&self, next: Phase) -> bool {
        let advanced = self.store.advance_phase(next);
        if advanced {
            info!("🔄 [SESSION] phase {}", next.as_str());
            let event = Event::new(Utc::now(), self.store.tz(), EventKind::Phase, format!("Phase: {}", next.as_str()));
            self.store.add_event(event);
        }
        advanced
    }

    /// Synchronous, bounded, realtime only. Failures and cancellation yield no audio.
    async fn narrate(&self, text: &str) -> Option<String> {
        if self.store.mode() != Mode::Realtime {
            return None;
        }
        let speech = self.speech.as_ref()?;
        let synth = tokio::time::timeout(SYNTH_TIMEOUT, speech.synthesize(text));
        let result = match &self.cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("[SPEECH] narration dropped on shutdown");
                    return None;
                }
                result = synth => result,
            },
            None => synth.await,
        };
        match result {
            Ok(Ok(clip)) => {
                let id = clip.id.clone();
                self.store.store_audio(clip);
                Some(id)
            }
            Ok(Err(e)) => {
                warn!("🔇 [SPEECH] synthesis failed: {}", e);
                None
            }
            Err(_) => {
                warn!("🔇 [SPEECH] {}", SpeechError::Timeout);
                None
            }
        }
    }

    // ---- per-trade path ----

    /// Applies one trade atomically and reports what it caused.
    pub async fn process_trade(&self, clock: &SessionClock, trade: &TradePrint) -> TradeOutcome {
        let ctx = self.decision_context(clock);
        let outcome = self
            .store
            .update_ticker(&trade.symbol, |t| apply_trade(t, trade, &ctx))
            .unwrap_or(TradeOutcome::Rejected);

        let symbol = trade.symbol.as_str();
        let tz = self.store.tz();
        match &outcome {
            TradeOutcome::Entered { price, at, take_profit, stop } => {
                info!(
                    event = POSITION_OPENED,
                    "📈 [POSITION] BUY {} @ ${:.4} (TP: ${:.4}, SL: ${:.4})",
                    symbol, price, take_profit, stop
                );
                let spelled = spell_nato(symbol);
                let event = Event::new(*at, tz, EventKind::Buy, format!("BUY {} ({})", symbol, spelled))
                    .with_symbol(symbol)
                    .with_level(EventLevel::Signal);
                self.emit(event, Some(&format!("Buy. {}", spelled))).await;
            }
            TradeOutcome::Exited { reason, price, at, entry_price } => {
                info!(
                    event = POSITION_CLOSED,
                    "📉 [POSITION] {:?} {} @ ${:.4} (entry ${:.4})",
                    reason, symbol, price, entry_price
                );
                let (kind, message) = match reason {
                    ExitReason::Profit => (EventKind::Profit, format!("PROFIT! {}", symbol)),
                    ExitReason::Stop => (EventKind::Stop, format!("STOP LOSS HIT! {}", symbol)),
                    ExitReason::TimeExit => (EventKind::TimeExit, format!("Time exit. {}", symbol)),
                };
                let event = Event::new(*at, tz, kind, message.clone())
                    .with_symbol(symbol)
                    .with_level(EventLevel::Signal);
                self.emit(event, Some(&message)).await;
            }
            TradeOutcome::Updated { armed: true } => {
                debug!(event = CROSS_ARMED, "[VWAP] {} cross-up armed at {}", symbol, trade.at);
            }
            TradeOutcome::Updated { armed: false } | TradeOutcome::Rejected => {}
        }
        outcome
    }

    /// Streams one symbol's historical trades in `[start, end)` through `process_trade`.
    pub async fn replay_trades(
        &self,
        clock: &SessionClock,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        shutdown: &Shutdown,
    ) -> Result<usize, MarketDataError> {
        let mut trades = self.history.trades(symbol, start, end);
        let mut applied = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = trades.next() => next,
            };
            match next {
                None => break,
                Some(Err(e)) => return Err(e),
                Some(Ok(trade)) => {
                    if self.process_trade(clock, &trade).await != TradeOutcome::Rejected {
                        applied += 1;
                    }
                }
            }
        }
        Ok(applied)
    }

    /// Replays `[start, end)` for every symbol on the worker pool. Per-symbol
    /// failures become warning events scoped to that symbol.
    pub async fn replay_window(
        &self,
        clock: &SessionClock,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        what: &str,
        shutdown: &Shutdown,
    ) -> Wait {
        let engine = self.clone();
        let clock = *clock;
        let inner_shutdown = shutdown.clone();

        let results = fan_out(symbols.to_vec(), self.workers(), shutdown, move |symbol: String| {
            let engine = engine.clone();
            let shutdown = inner_shutdown.clone();
            async move {
                let result = engine.replay_trades(&clock, &symbol, start, end, &shutdown).await;
                (symbol, result)
            }
        })
        .await;

        for (symbol, result) in results {
            match result {
                Ok(n) => debug!("[REPLAY] {} {}: {} trades", what, symbol, n),
                Err(e) => {
                    warn!("[REPLAY] {} failed for {}: {}", what, symbol, e);
                    self.warn_event(Some(&symbol), format!("{} failed: {}", what, e));
                }
            }
        }

        if shutdown.is_cancelled() {
            Wait::Cancelled
        } else {
            Wait::Reached
        }
    }

    // ---- phases ----

    /// Marks candidates as tracking, normalizes volume on the pool, then seeds
    /// VWAP from the open up to selection.
    pub async fn prepare_tracked(&self, clock: &SessionClock, candidates: &[String], shutdown: &Shutdown) -> Wait {
        for symbol in candidates {
            self.store.update_ticker(symbol, |t| t.status = TickerStatus::Tracking);
        }

        let baselines = volume_history::normalize(
            Arc::clone(&self.history),
            candidates.to_vec(),
            clock.date,
            self.hours,
            self.config.history.clone(),
            self.workers(),
            shutdown,
        )
        .await;
        if shutdown.is_cancelled() {
            return Wait::Cancelled;
        }

        for (symbol, result) in baselines {
            match result {
                Ok(baseline) => {
                    self.store.update_ticker(&symbol, |t| {
                        t.hist_avg_volume = Some(baseline.average);
                        t.today_pct = today_pct(t.opening.volume, baseline.average);
                    });
                }
                Err(e) => {
                    self.store.update_ticker(&symbol, |t| t.history_error = Some(e.to_string()));
                    self.warn_event(Some(&symbol), format!("History calc failed: {}", e));
                }
            }
        }

        self.replay_window(clock, candidates, clock.open, clock.selection, "VWAP seed", shutdown)
            .await
    }

    /// Closes every open tracked position at its last known price.
    pub async fn close_open_positions(&self, clock: &SessionClock, at: DateTime<Utc>) -> usize {
        let tz = self.store.tz();
        let mut closed = 0;
        for symbol in self.store.tracked() {
            let exit = self
                .store
                .update_ticker(&symbol, |t| position::time_exit(t, at, clock))
                .flatten();
            if let Some(exit) = exit {
                closed += 1;
                info!(event = POSITION_CLOSED, "⏰ [POSITION] TIME_EXIT {} @ ${:.4}", symbol, exit.price);
                let message = format!("Time exit. {}", symbol);
                let event = Event::new(at, tz, EventKind::TimeExit, message.clone())
                    .with_symbol(symbol.as_str())
                    .with_level(EventLevel::Signal);
                self.emit(event, Some(&message)).await;
            }
        }
        closed
    }

    /// The forced-exit instant: announce, then close everything still open.
    pub async fn forced_exit(&self, clock: &SessionClock) -> usize {
        let at = clock.force_exit;
        let event = Event::new(
            at,
            self.store.tz(),
            EventKind::SessionClose,
            format!("{} close", clock.local_hms(at)),
        );
        self.emit(event, Some("Session close")).await;
        self.close_open_positions(clock, at).await
    }

    fn transport_failure(&self, e: MarketDataError) -> SessionError {
        error!("❌ [SESSION] transport error: {}", e);
        self.warn_event(None, format!("Transport error: {}", e));
        SessionError::Transport(e)
    }

    /// Runs today's realtime session until the forced exit, a transport error,
    /// or cancellation. Cancellation returns `Ok`.
    pub async fn run_live(&self, stream: &dyn MarketDataStream, shutdown: &Shutdown) -> Result<(), SessionError> {
        let now = Utc::now();
        let clock = SessionClock::for_today(now, &self.hours)?;
        self.run_live_at(stream, clock, now, shutdown).await
    }

    /// Runs the realtime session bounded by `clock`, started at `now`.
    ///
    /// Waits are wall-clock deadlines taken from `clock`; `now` only decides
    /// which phases were already missed.
    pub async fn run_live_at(
        &self,
        stream: &dyn MarketDataStream,
        clock: SessionClock,
        now: DateTime<Utc>,
        shutdown: &Shutdown,
    ) -> Result<(), SessionError> {
        self.bound_to(shutdown).drive_live(stream, clock, now, shutdown).await
    }

    async fn drive_live(
        &self,
        stream: &dyn MarketDataStream,
        clock: SessionClock,
        now: DateTime<Utc>,
        shutdown: &Shutdown,
    ) -> Result<(), SessionError> {
        self.store.set_clock(clock);

        let watchlist = self.store.watchlist();
        self.system(format!("Loaded watchlist: {} tickers", watchlist.len()));

        if now >= clock.force_exit {
            self.warn_event(None, format!("Session already past forced exit ({})", clock.local_hms(clock.force_exit)));
            self.advance_phase(Phase::Closed);
            return Ok(());
        }
        if now >= clock.selection {
            warn!("[SESSION] started after selection time; opening range will be incomplete");
            self.warn_event(None, "Started after selection time; opening range will be incomplete");
        }

        if now < clock.open {
            self.system(format!("Waiting for market open at {}", clock.local_hms(clock.open)));
            if wait_until(clock.open, shutdown).await == Wait::Cancelled {
                return Ok(());
            }
        }

        // Opening window
        self.advance_phase(Phase::CollectingOpen5m);
        let mut bars = stream
            .subscribe(Channel::Bars, &watchlist)
            .await
            .map_err(|e| self.transport_failure(e))?;
        self.system("Collecting opening-window minute bars for open-5m metrics...");

        let watched: HashSet<String> = watchlist.iter().cloned().collect();
        let collected = opening_range::collect_live(&self.store, &clock, &watched, &mut bars, shutdown).await;
        bars.close().await;
        match collected {
            Ok(Wait::Reached) => {}
            Ok(Wait::Cancelled) => return Ok(()),
            Err(e) => return Err(self.transport_failure(e)),
        }

        // Selection
        self.advance_phase(Phase::Selecting);
        let candidates = selection::run_selection(&self.store);
        if candidates.is_empty() {
            self.system("No tickers matched open_5m filters at selection.");
            self.advance_phase(Phase::Closed);
            return Ok(());
        }
        self.system(format!(
            "Selection: {} tickers matched opening filters (switching to trades)",
            candidates.len()
        ));

        if self.prepare_tracked(&clock, &candidates, shutdown).await == Wait::Cancelled {
            return Ok(());
        }

        // Tracking
        self.advance_phase(Phase::TrackingTicks);
        let mut trades = stream
            .subscribe(Channel::Trades, &candidates)
            .await
            .map_err(|e| self.transport_failure(e))?;
        self.system("Tracking tick data (trades) for filtered tickers...");

        let result = self.track_live(&clock, &mut trades, shutdown).await;
        trades.close().await;
        result
    }

    async fn track_live(
        &self,
        clock: &SessionClock,
        trades: &mut StreamHandle,
        shutdown: &Shutdown,
    ) -> Result<(), SessionError> {
        let deadline = wait_deadline(clock.force_exit);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                _ = &mut deadline => {
                    let closed = self.forced_exit(clock).await;
                    info!("[SESSION] forced exit closed {} positions", closed);
                    self.advance_phase(Phase::Closed);
                    return Ok(());
                }
                msg = trades.next() => match msg {
                    Ok(MarketMessage::Trade(trade)) => {
                        self.process_trade(clock, &trade).await;
                    }
                    Ok(MarketMessage::Bar(_)) => {}
                    Err(e) => return Err(self.transport_failure(e)),
                },
            }
        }
    }
}
