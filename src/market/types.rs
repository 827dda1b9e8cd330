use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One-minute OHLCV bar, keyed by bar start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinuteBar {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A single trade print.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradePrint {
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    pub at: DateTime<Utc>,
}

/// Everything a live subscription can deliver to the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum MarketMessage {
    Bar(MinuteBar),
    Trade(TradePrint),
}

/// Which channel a subscription asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Bars,
    Trades,
}

impl Channel {
    pub fn wire_name(self) -> &'static str {
        match self {
            Channel::Bars => "bars",
            Channel::Trades => "trades",
        }
    }
}

// ---- Alpaca stream frames ----

/// One element of an Alpaca stream frame. Frames arrive as JSON arrays.
#[derive(Debug, Deserialize)]
#[serde(tag = "T")]
pub enum WireMessage {
    #[serde(rename = "b")]
    Bar(WireStreamBar),
    #[serde(rename = "t")]
    Trade(WireStreamTrade),
    #[serde(rename = "success")]
    Success { msg: String },
    #[serde(rename = "subscription")]
    Subscription {
        #[serde(default)]
        bars: Vec<String>,
        #[serde(default)]
        trades: Vec<String>,
    },
    #[serde(rename = "error")]
    Error { code: i64, msg: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct WireStreamBar {
    #[serde(rename = "S")]
    pub symbol: String,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct WireStreamTrade {
    #[serde(rename = "S")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "s")]
    pub size: f64,
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}

impl WireMessage {
    /// Market payload, if this element carries one.
    pub fn into_market(self) -> Option<MarketMessage> {
        match self {
            WireMessage::Bar(b) => Some(MarketMessage::Bar(MinuteBar {
                symbol: b.symbol,
                start: b.timestamp,
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.volume,
            })),
            WireMessage::Trade(t) => Some(MarketMessage::Trade(TradePrint {
                symbol: t.symbol,
                price: t.price,
                size: t.size,
                at: t.timestamp,
            })),
            WireMessage::Success { .. }
            | WireMessage::Subscription { .. }
            | WireMessage::Error { .. }
            | WireMessage::Unknown => None,
        }
    }
}

pub fn parse_frame(text: &str) -> Result<Vec<WireMessage>, serde_json::Error> {
    serde_json::from_str(text)
}

// ---- Alpaca REST pages ----

#[derive(Debug, Deserialize)]
pub struct BarsPage {
    #[serde(default)]
    pub bars: Option<Vec<RestBar>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RestBar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
}

impl RestBar {
    pub fn into_bar(self, symbol: &str) -> MinuteBar {
        MinuteBar {
            symbol: symbol.to_string(),
            start: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TradesPage {
    #[serde(default)]
    pub trades: Option<Vec<RestTrade>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RestTrade {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "s")]
    pub size: f64,
}

impl RestTrade {
    pub fn into_trade(self, symbol: &str) -> TradePrint {
        TradePrint {
            symbol: symbol.to_string(),
            price: self.price,
            size: self.size,
            at: self.timestamp,
        }
    }
}
