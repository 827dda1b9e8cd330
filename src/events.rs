use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// What an operator-visible event is about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    System,
    Phase,
    Buy,
    Profit,
    Stop,
    TimeExit,
    SessionClose,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Signal,
}

/// Immutable, append-only log record shown to the operator.
///
/// `audio_id` correlates a narrated message with the clip held in the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub at: DateTime<Utc>,
    /// Wall-clock label in the market timezone ("HH:MM:SS")
    pub time_local: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_id: Option<String>,
    pub level: EventLevel,
}

impl Event {
    pub fn new(at: DateTime<Utc>, tz: Tz, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            at,
            time_local: at.with_timezone(&tz).format("%H:%M:%S").to_string(),
            kind,
            symbol: None,
            message: message.into(),
            audio_id: None,
            level: EventLevel::Info,
        }
    }

    pub fn system(at: DateTime<Utc>, tz: Tz, message: impl Into<String>) -> Self {
        Self::new(at, tz, EventKind::System, message)
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_audio(mut self, audio_id: Option<String>) -> Self {
        self.audio_id = audio_id;
        self
    }

    pub fn warn(self) -> Self {
        self.with_level(EventLevel::Warn)
    }
}
