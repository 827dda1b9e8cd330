use chrono::NaiveDate;
use chrono_tz::Tz;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::constants::events::PHASE_CHANGED;
use crate::error::FilterError;
use crate::events::Event;
use crate::services::reporting::HistoricReport;
use crate::speech::SpeechClip;

use super::filters::{FiltersPatch, RuntimeFilters};
use super::session::{Mode, Phase, SessionClock};
use super::ticker::{TickerState, TickerStatus};

/// Replay bookkeeping shown to the operator.
#[derive(Clone, Debug, Default, Serialize)]
pub struct HistoricMeta {
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub resolved_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub running: bool,
    pub error: Option<String>,
}

struct Inner {
    tickers: HashMap<String, TickerState>,
    watchlist: Vec<String>,
    tracked: Vec<String>,
    phase: Phase,
    clock: Option<SessionClock>,
    filters: RuntimeFilters,
    filters_version: u64,
    events: VecDeque<Event>,
    session_id: String,
    historic: HistoricMeta,
    report: Option<HistoricReport>,
}

/// The single shared-mutation point of a session.
///
/// Every method is atomic with respect to the others. Per-symbol mutation goes
/// through `upsert_ticker`/`update_ticker`, whose callbacks run under the write
/// lock and must not block.
pub struct SessionStore {
    inner: RwLock<Inner>,
    audio: DashMap<String, SpeechClip>,
    bus: EventBus,
    mode: Mode,
    tz: Tz,
    max_events: usize,
}

impl SessionStore {
    pub fn new(mode: Mode, tz: Tz, filters: RuntimeFilters, max_events: usize, bus: EventBus) -> Self {
        Self {
            inner: RwLock::new(Inner {
                tickers: HashMap::new(),
                watchlist: Vec::new(),
                tracked: Vec::new(),
                phase: Phase::WaitingOpen,
                clock: None,
                filters,
                filters_version: 1,
                events: VecDeque::with_capacity(max_events),
                session_id: new_session_id(),
                historic: HistoricMeta::default(),
                report: None,
            }),
            audio: DashMap::new(),
            bus,
            mode,
            tz,
            max_events: max_events.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn session_id(&self) -> String {
        self.read().session_id.clone()
    }

    // ---- tickers ----

    pub fn set_watchlist(&self, symbols: &[String]) {
        self.write().watchlist = symbols.to_vec();
    }

    pub fn watchlist(&self) -> Vec<String> {
        self.read().watchlist.clone()
    }

    /// Runs `f` on the symbol's state, creating it on first observation.
    pub fn upsert_ticker<R>(&self, symbol: &str, f: impl FnOnce(&mut TickerState) -> R) -> R {
        let mut inner = self.write();
        let state = inner
            .tickers
            .entry(symbol.to_string())
            .or_insert_with(|| TickerState::new(symbol));
        f(state)
    }

    /// Runs `f` only if the symbol already has state.
    pub fn update_ticker<R>(&self, symbol: &str, f: impl FnOnce(&mut TickerState) -> R) -> Option<R> {
        let mut inner = self.write();
        inner.tickers.get_mut(symbol).map(f)
    }

    pub fn get_ticker(&self, symbol: &str) -> Option<TickerState> {
        self.read().tickers.get(symbol).cloned()
    }

    /// All ticker states, sorted by symbol.
    pub fn ticker_states(&self) -> Vec<TickerState> {
        let inner = self.read();
        let mut states: Vec<TickerState> = inner.tickers.values().cloned().collect();
        states.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        states
    }

    /// Replaces the tracked set in one step and marks those symbols selected.
    pub fn replace_tracked(&self, symbols: Vec<String>) {
        let mut inner = self.write();
        for symbol in &symbols {
            let state = inner
                .tickers
                .entry(symbol.clone())
                .or_insert_with(|| TickerState::new(symbol.as_str()));
            state.selected = true;
            if state.status == TickerStatus::Watching {
                state.status = TickerStatus::Selected;
            }
        }
        inner.tracked = symbols;
    }

    pub fn tracked(&self) -> Vec<String> {
        self.read().tracked.clone()
    }

    // ---- filters ----

    pub fn filters(&self) -> RuntimeFilters {
        self.read().filters
    }

    pub fn filters_version(&self) -> u64 {
        self.read().filters_version
    }

    /// Validates the patched bundle as a whole; commits only when valid.
    pub fn update_filters(&self, patch: &FiltersPatch) -> Result<RuntimeFilters, FilterError> {
        let mut inner = self.write();
        let mut next = inner.filters;
        patch.apply_to(&mut next);
        next.validate()?;
        inner.filters = next;
        inner.filters_version += 1;
        info!("[FILTERS] committed version {}", inner.filters_version);
        Ok(next)
    }

    // ---- phase and clock ----

    pub fn phase(&self) -> Phase {
        self.read().phase
    }

    /// Moves the phase forward. Returns false if `next` is not ahead of the current phase.
    pub fn advance_phase(&self, next: Phase) -> bool {
        let mut inner = self.write();
        if next <= inner.phase {
            return false;
        }
        debug!(event = PHASE_CHANGED, from = ?inner.phase, to = ?next, "[SESSION] phase");
        inner.phase = next;
        true
    }

    pub fn set_clock(&self, clock: SessionClock) {
        self.write().clock = Some(clock);
    }

    pub fn clock(&self) -> Option<SessionClock> {
        self.read().clock
    }

    // ---- events and audio ----

    /// Appends to the bounded log (oldest dropped first) and publishes on the bus.
    pub fn add_event(&self, event: Event) {
        {
            let mut inner = self.write();
            while inner.events.len() >= self.max_events {
                inner.events.pop_front();
            }
            inner.events.push_back(event.clone());
        }
        self.bus.publish(event);
    }

    /// Events oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.read().events.iter().cloned().collect()
    }

    pub fn store_audio(&self, clip: SpeechClip) {
        self.audio.insert(clip.id.clone(), clip);
    }

    pub fn get_audio(&self, id: &str) -> Option<SpeechClip> {
        self.audio.get(id).map(|c| c.value().clone())
    }

    // ---- historic runs ----

    pub fn set_historic_range(&self, min_date: NaiveDate, max_date: NaiveDate) {
        let mut inner = self.write();
        inner.historic.min_date = Some(min_date);
        inner.historic.max_date = Some(max_date);
    }

    /// Starts a fresh session for a replay. Returns the new session id.
    pub fn reset_for_historic_run(&self, target: NaiveDate, resolved: NaiveDate, note: Option<String>) -> String {
        let mut inner = self.write();
        inner.tickers.clear();
        inner.tracked.clear();
        inner.events.clear();
        inner.phase = Phase::WaitingOpen;
        inner.clock = None;
        inner.report = None;
        inner.session_id = new_session_id();
        inner.historic.target_date = Some(target);
        inner.historic.resolved_date = Some(resolved);
        inner.historic.note = note;
        inner.historic.running = true;
        inner.historic.error = None;
        self.audio.clear();
        inner.session_id.clone()
    }

    pub fn finish_historic_run(&self, error: Option<String>) {
        let mut inner = self.write();
        inner.historic.running = false;
        inner.historic.error = error;
    }

    pub fn historic(&self) -> HistoricMeta {
        self.read().historic.clone()
    }

    pub fn set_report(&self, report: HistoricReport) {
        self.write().report = Some(report);
    }

    pub fn report(&self) -> Option<HistoricReport> {
        self.read().report.clone()
    }

    /// Point-in-time view of the whole session, taken under one read lock.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.read();
        let mut tickers: Vec<TickerView> = inner.tickers.values().map(TickerView::from_state).collect();
        tickers.sort_by(|a, b| a.state.symbol.cmp(&b.state.symbol));

        Snapshot {
            session_id: inner.session_id.clone(),
            mode: self.mode,
            phase: inner.phase,
            timezone: self.tz.name().to_string(),
            times: inner.clock.as_ref().map(SessionTimes::from_clock),
            filters: inner.filters,
            filters_version: inner.filters_version,
            watchlist: inner.watchlist.clone(),
            tracked: inner.tracked.clone(),
            tickers,
            events: inner.events.iter().rev().cloned().collect(),
            historic: (self.mode == Mode::Historic).then(|| inner.historic.clone()),
            report: inner.report.clone(),
        }
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionTimes {
    pub date: NaiveDate,
    pub open: String,
    pub selection: String,
    pub vwap_cutoff: String,
    pub force_exit: String,
}

impl SessionTimes {
    fn from_clock(clock: &SessionClock) -> Self {
        Self {
            date: clock.date,
            open: clock.local_hms(clock.open),
            selection: clock.local_hms(clock.selection),
            vwap_cutoff: clock.local_hms(clock.vwap_cutoff),
            force_exit: clock.local_hms(clock.force_exit),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TickerView {
    #[serde(flatten)]
    pub state: TickerState,
    pub range_pct: Option<f64>,
    pub current_vwap: Option<f64>,
}

impl TickerView {
    fn from_state(state: &TickerState) -> Self {
        Self {
            range_pct: state.opening.range_pct(),
            current_vwap: state.vwap.vwap(),
            state: state.clone(),
        }
    }
}

/// Serializable session state for the presentation layer. Events are newest first.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub session_id: String,
    pub mode: Mode,
    pub phase: Phase,
    pub timezone: String,
    pub times: Option<SessionTimes>,
    pub filters: RuntimeFilters,
    pub filters_version: u64,
    pub watchlist: Vec<String>,
    pub tracked: Vec<String>,
    pub tickers: Vec<TickerView>,
    pub events: Vec<Event>,
    pub historic: Option<HistoricMeta>,
    pub report: Option<HistoricReport>,
}
