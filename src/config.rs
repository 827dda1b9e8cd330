use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;

use crate::data::filters::RuntimeFilters;
use crate::error::ConfigError;

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_open_time")]
    pub open_time: String,
    #[serde(default = "default_selection_time")]
    pub selection_time: String,
    #[serde(default = "default_cutoff_time")]
    pub vwap_cross_cutoff_time: String,
    #[serde(default = "default_force_exit_time")]
    pub force_exit_time: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct HistoryConfig {
    /// How many prior sessions to average for the open-5m volume baseline
    #[serde(default = "default_lookback_sessions")]
    pub open5m_lookback_sessions: usize,
    #[serde(default = "default_max_calendar_lookback")]
    pub max_calendar_lookback_days: u32,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AlpacaConfig {
    /// "sip" or "iex"
    #[serde(default = "default_feed")]
    pub feed: String,
    #[serde(default = "default_ws_batch_size")]
    pub ws_batch_size: usize,
    #[serde(default = "default_data_url")]
    pub data_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_response_format")]
    pub response_format: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub market: MarketConfig,
    pub filters: RuntimeFilters,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub alpaca: AlpacaConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

/// Parsed, validated session times in the market timezone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarketHours {
    pub tz: Tz,
    pub open: NaiveTime,
    pub selection: NaiveTime,
    pub vwap_cutoff: NaiveTime,
    pub force_exit: NaiveTime,
}

#[derive(Clone)]
pub struct AlpacaCredentials {
    pub key_id: String,
    pub secret_key: String,
}

impl AlpacaCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let key_id = env::var("APCA_API_KEY_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingCredential { name: "APCA_API_KEY_ID" })?;
        let secret_key = env::var("APCA_API_SECRET_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingCredential { name: "APCA_API_SECRET_KEY" })?;
        Ok(Self { key_id, secret_key })
    }
}

impl std::fmt::Debug for AlpacaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaCredentials")
            .field("key_id", &"***")
            .field("secret_key", &"***")
            .finish()
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content, &path.display().to_string())
    }

    pub fn from_yaml_str(content: &str, label: &str) -> Result<Self, ConfigError> {
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let config: AppConfig = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: label.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be 1..65535".into()));
        }
        self.filters.validate()?;
        if self.risk.take_profit_pct <= 0.0 {
            return Err(ConfigError::Invalid("risk.take_profit_pct must be positive".into()));
        }
        if self.risk.stop_loss_pct <= 0.0 || self.risk.stop_loss_pct >= 1.0 {
            return Err(ConfigError::Invalid("risk.stop_loss_pct must be in (0, 1)".into()));
        }
        if self.history.open5m_lookback_sessions == 0 {
            return Err(ConfigError::Invalid("history.open5m_lookback_sessions must be at least 1".into()));
        }
        if self.alpaca.ws_batch_size == 0 {
            return Err(ConfigError::Invalid("alpaca.ws_batch_size must be at least 1".into()));
        }
        if self.ui.max_events == 0 {
            return Err(ConfigError::Invalid("ui.max_events must be at least 1".into()));
        }
        self.market_hours()?;
        Ok(())
    }

    /// Worker pool size, never below one.
    pub fn worker_count(&self) -> usize {
        self.history.max_workers.max(1)
    }

    pub fn market_hours(&self) -> Result<MarketHours, ConfigError> {
        let tz: Tz = self
            .market
            .timezone
            .parse()
            .map_err(|_| ConfigError::Timezone(self.market.timezone.clone()))?;

        let hours = MarketHours {
            tz,
            open: parse_hms("market.open_time", &self.market.open_time)?,
            selection: parse_hms("market.selection_time", &self.market.selection_time)?,
            vwap_cutoff: parse_hms("market.vwap_cross_cutoff_time", &self.market.vwap_cross_cutoff_time)?,
            force_exit: parse_hms("market.force_exit_time", &self.market.force_exit_time)?,
        };

        if hours.selection <= hours.open {
            return Err(ConfigError::TimesOutOfOrder("selection_time must be after open_time".into()));
        }
        if hours.vwap_cutoff < hours.selection {
            return Err(ConfigError::TimesOutOfOrder(
                "vwap_cross_cutoff_time must not be before selection_time".into(),
            ));
        }
        if hours.force_exit < hours.vwap_cutoff {
            return Err(ConfigError::TimesOutOfOrder(
                "force_exit_time must not be before vwap_cross_cutoff_time".into(),
            ));
        }
        Ok(hours)
    }
}

fn parse_hms(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M:%S").map_err(|_| ConfigError::InvalidTime {
        field,
        value: value.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct WatchlistFile {
    #[serde(default)]
    watchlist: Vec<WatchlistEntry>,
}

#[derive(Debug, Deserialize)]
struct WatchlistEntry {
    symbol: String,
}

pub fn load_watchlist(path: impl AsRef<Path>) -> Result<Vec<String>, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_watchlist(&content, &path.display().to_string())
}

/// Upper-cases, trims and de-duplicates symbols, keeping first-seen order.
pub fn parse_watchlist(content: &str, label: &str) -> Result<Vec<String>, ConfigError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let file: WatchlistFile = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: label.to_string(),
        source,
    })?;

    let mut seen = HashSet::with_capacity(file.watchlist.len());
    let symbols: Vec<String> = file
        .watchlist
        .into_iter()
        .map(|e| e.symbol.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect();

    if symbols.is_empty() {
        return Err(ConfigError::EmptyWatchlist);
    }
    Ok(symbols)
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8097
}
fn default_timezone() -> String {
    "America/New_York".to_string()
}
fn default_open_time() -> String {
    "09:30:00".to_string()
}
fn default_selection_time() -> String {
    "09:35:00".to_string()
}
fn default_cutoff_time() -> String {
    "09:43:00".to_string()
}
fn default_force_exit_time() -> String {
    "11:00:00".to_string()
}
fn default_take_profit_pct() -> f64 {
    0.05
}
fn default_stop_loss_pct() -> f64 {
    0.02
}
fn default_lookback_sessions() -> usize {
    10
}
fn default_max_calendar_lookback() -> u32 {
    35
}
fn default_max_workers() -> usize {
    6
}
fn default_feed() -> String {
    "sip".to_string()
}
fn default_ws_batch_size() -> usize {
    200
}
fn default_data_url() -> String {
    "https://data.alpaca.markets".to_string()
}
fn default_stream_url() -> String {
    "wss://stream.data.alpaca.markets/v2".to_string()
}
fn default_tts_model() -> String {
    "tts-1".to_string()
}
fn default_voice() -> String {
    "alloy".to_string()
}
fn default_response_format() -> String {
    "mp3".to_string()
}
fn default_max_events() -> usize {
    250
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            open_time: default_open_time(),
            selection_time: default_selection_time(),
            vwap_cross_cutoff_time: default_cutoff_time(),
            force_exit_time: default_force_exit_time(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: default_take_profit_pct(),
            stop_loss_pct: default_stop_loss_pct(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            open5m_lookback_sessions: default_lookback_sessions(),
            max_calendar_lookback_days: default_max_calendar_lookback(),
            max_workers: default_max_workers(),
        }
    }
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            feed: default_feed(),
            ws_batch_size: default_ws_batch_size(),
            data_url: default_data_url(),
            stream_url: default_stream_url(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model: default_tts_model(),
            voice: default_voice(),
            response_format: default_response_format(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { max_events: default_max_events() }
    }
}
