use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::MarketHours;
use crate::constants::session::{ARMING_DELAY_MINUTES, OPENING_WINDOW_MINUTES, TRADE_GRACE_MINUTES};
use crate::error::ConfigError;

/// Session phase. Variants are declared in run order; the store only moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "waiting_open")]
    WaitingOpen,
    #[serde(rename = "collecting_open_5m")]
    CollectingOpen5m,
    #[serde(rename = "selecting_0935")]
    Selecting,
    #[serde(rename = "tracking_ticks")]
    TrackingTicks,
    #[serde(rename = "closed")]
    Closed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::WaitingOpen => "waiting_open",
            Phase::CollectingOpen5m => "collecting_open_5m",
            Phase::Selecting => "selecting_0935",
            Phase::TrackingTicks => "tracking_ticks",
            Phase::Closed => "closed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Realtime,
    Historic,
}

/// The four instants that bound one trading day, stored in UTC.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionClock {
    pub tz: Tz,
    pub date: NaiveDate,
    pub open: DateTime<Utc>,
    pub selection: DateTime<Utc>,
    pub vwap_cutoff: DateTime<Utc>,
    pub force_exit: DateTime<Utc>,
}

impl SessionClock {
    pub fn for_date(date: NaiveDate, hours: &MarketHours) -> Result<Self, ConfigError> {
        Ok(Self {
            tz: hours.tz,
            date,
            open: local_instant(hours.tz, date, hours.open)?,
            selection: local_instant(hours.tz, date, hours.selection)?,
            vwap_cutoff: local_instant(hours.tz, date, hours.vwap_cutoff)?,
            force_exit: local_instant(hours.tz, date, hours.force_exit)?,
        })
    }

    /// Session for the market-local calendar day containing `now`.
    pub fn for_today(now: DateTime<Utc>, hours: &MarketHours) -> Result<Self, ConfigError> {
        Self::for_date(now.with_timezone(&hours.tz).date_naive(), hours)
    }

    /// Bars starting in [open, window end) make up the opening range.
    pub fn opening_window_end(&self) -> DateTime<Utc> {
        (self.open + Duration::minutes(OPENING_WINDOW_MINUTES)).min(self.selection)
    }

    pub fn in_opening_window(&self, bar_start: DateTime<Utc>) -> bool {
        bar_start >= self.open && bar_start < self.opening_window_end()
    }

    pub fn arming_start(&self) -> DateTime<Utc> {
        self.open + Duration::minutes(ARMING_DELAY_MINUTES)
    }

    /// Cross-ups in [open + 1m, cutoff) arm a later entry.
    pub fn in_arming_window(&self, at: DateTime<Utc>) -> bool {
        at >= self.arming_start() && at < self.vwap_cutoff
    }

    /// Latest trade time still accepted for bookkeeping.
    pub fn trade_acceptance_end(&self) -> DateTime<Utc> {
        self.force_exit + Duration::minutes(TRADE_GRACE_MINUTES)
    }

    pub fn minutes_after_open(&self, at: DateTime<Utc>) -> f64 {
        (at - self.open).num_milliseconds() as f64 / 60_000.0
    }

    pub fn local_hms(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz).format("%H:%M:%S").to_string()
    }
}

fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, ConfigError> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ConfigError::NonexistentLocalTime {
            date: date.to_string(),
            time: time.to_string(),
        })
}

/// End of a replay: never past `now`, so nothing not-yet-printed is read.
/// Returns the end instant and whether it falls short of the forced exit.
pub fn resolve_replay_end(clock: &SessionClock, now: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    if now < clock.force_exit {
        (now, true)
    } else {
        (clock.force_exit, false)
    }
}

/// Weekend dates resolve to the preceding Friday. Holidays simply yield no data.
pub fn resolve_trading_date(target: NaiveDate) -> (NaiveDate, Option<String>) {
    let back = match target.weekday() {
        Weekday::Sat => 1,
        Weekday::Sun => 2,
        _ => return (target, None),
    };
    let resolved = target - Duration::days(back);
    let note = format!("{} is a weekend; replaying {} instead", target, resolved);
    (resolved, Some(note))
}
