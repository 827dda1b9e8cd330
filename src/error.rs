//! Custom error types for the session engine
//!
//! Provides structured, typed errors instead of generic Box<dyn Error>

use thiserror::Error;

/// Startup configuration errors. Fatal: the process does not proceed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Missing credential: {name}")]
    MissingCredential { name: &'static str },

    #[error("Unknown timezone: {0}")]
    Timezone(String),

    #[error("Invalid time for {field}: '{value}' (expected HH:MM:SS)")]
    InvalidTime { field: &'static str, value: String },

    #[error("Session times out of order: {0}")]
    TimesOutOfOrder(String),

    #[error("Local time {time} does not exist on {date}")]
    NonexistentLocalTime { date: String, time: String },

    #[error("Invalid filters: {0}")]
    Filters(#[from] FilterError),

    #[error("Invalid setting: {0}")]
    Invalid(String),

    #[error("Watchlist is empty")]
    EmptyWatchlist,
}

/// Runtime filter validation errors. An invalid bundle is never committed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("{field}_min/max invalid: min={min}, max={max}")]
    InvalidBounds {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("{field} must be positive")]
    NonPositive { field: &'static str },
}

/// Market data transport errors
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Market data stream ended")]
    StreamEnded,

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("No data for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },
}

/// Speech synthesis errors. Narration is best-effort, so these never abort a run.
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Speech synthesis disabled")]
    Disabled,

    #[error("Speech request failed: {0}")]
    Request(#[from] async_openai::error::OpenAIError),

    #[error("Speech request timed out")]
    Timeout,
}

/// Historical volume normalisation errors (scoped to one symbol)
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("No prior sessions found in lookback={lookback_days} days")]
    NoHistory { lookback_days: u32 },

    #[error("No prior sessions found in lookback={lookback_days} days (last error: {last_error})")]
    QueryFailed { lookback_days: u32, last_error: MarketDataError },

    #[error("Missing ticker state for {symbol}")]
    MissingTicker { symbol: String },
}

/// Session run errors. Cancellation is not an error and never produces one of these.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] MarketDataError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Replay date {date} is after today ({today})")]
    FutureDate { date: String, today: String },

    #[error("Worker task failed: {0}")]
    Worker(String),
}
