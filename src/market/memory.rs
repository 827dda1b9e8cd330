use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::constants::market::STREAM_CHANNEL_CAPACITY;
use crate::error::MarketDataError;

use super::traits::{HistoricalData, MarketDataStream, MarketStream, StreamHandle};
use super::types::{Channel, MarketMessage, MinuteBar, TradePrint};

/// A recorded market feed held in memory.
///
/// Serves historical range queries and live subscriptions from the same data,
/// which makes it useful for deterministic replays and tests.
#[derive(Clone, Default)]
pub struct MemoryFeed {
    bars: Arc<Vec<MinuteBar>>,
    trades: Arc<Vec<TradePrint>>,
    failing: Arc<HashSet<String>>,
    stream_failure: Option<String>,
    trade_queries: Arc<Mutex<Vec<TradeQuery>>>,
}

/// A recorded `trades` range query.
#[derive(Clone, Debug, PartialEq)]
pub struct TradeQuery {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MemoryFeed {
    pub fn new(mut bars: Vec<MinuteBar>, mut trades: Vec<TradePrint>) -> Self {
        bars.sort_by_key(|b| b.start);
        trades.sort_by_key(|t| t.at);
        Self {
            bars: Arc::new(bars),
            trades: Arc::new(trades),
            ..Self::default()
        }
    }

    /// Every query for `symbol` fails with `MarketDataError::Unavailable`.
    pub fn with_failing_symbol(mut self, symbol: &str) -> Self {
        let mut failing = (*self.failing).clone();
        failing.insert(symbol.to_string());
        self.failing = Arc::new(failing);
        self
    }

    /// Live subscriptions report a WebSocket error after their recorded messages.
    pub fn with_stream_failure(mut self, reason: &str) -> Self {
        self.stream_failure = Some(reason.to_string());
        self
    }

    pub fn trade_queries(&self) -> Vec<TradeQuery> {
        self.trade_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn unavailable<T: Send + 'static>(symbol: &str) -> MarketStream<T> {
        let err = MarketDataError::Unavailable {
            symbol: symbol.to_string(),
            reason: "simulated failure".to_string(),
        };
        stream::iter(vec![Err(err)]).boxed()
    }
}

impl HistoricalData for MemoryFeed {
    fn minute_bars(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> MarketStream<MinuteBar> {
        if self.failing.contains(symbol) {
            return Self::unavailable(symbol);
        }
        let bars: Vec<Result<MinuteBar, MarketDataError>> = self
            .bars
            .iter()
            .filter(|b| b.symbol == symbol && b.start >= start && b.start < end)
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(bars).boxed()
    }

    fn trades(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> MarketStream<TradePrint> {
        self.trade_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TradeQuery { symbol: symbol.to_string(), start, end });

        if self.failing.contains(symbol) {
            return Self::unavailable(symbol);
        }
        let trades: Vec<Result<TradePrint, MarketDataError>> = self
            .trades
            .iter()
            .filter(|t| t.symbol == symbol && t.at >= start && t.at < end)
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(trades).boxed()
    }
}

#[async_trait]
impl MarketDataStream for MemoryFeed {
    /// Emits the recorded messages for `symbols` in time order, then either fails
    /// or stays open until the handle is closed.
    async fn subscribe(&self, channel: Channel, symbols: &[String]) -> Result<StreamHandle, MarketDataError> {
        let wanted: HashSet<&str> = symbols.iter().map(String::as_str).collect();
        let messages: Vec<MarketMessage> = match channel {
            Channel::Bars => self
                .bars
                .iter()
                .filter(|b| wanted.contains(b.symbol.as_str()))
                .cloned()
                .map(MarketMessage::Bar)
                .collect(),
            Channel::Trades => self
                .trades
                .iter()
                .filter(|t| wanted.contains(t.symbol.as_str()))
                .cloned()
                .map(MarketMessage::Trade)
                .collect(),
        };

        let (msg_tx, msg_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);
        let failure = self.stream_failure.clone();
        let task = tokio::spawn(async move {
            for msg in messages {
                if msg_tx.send(msg).await.is_err() {
                    return;
                }
            }
            if let Some(reason) = failure {
                let _ = err_tx.send(MarketDataError::WebSocket(reason)).await;
            }
            msg_tx.closed().await;
        });

        Ok(StreamHandle::new(msg_rx, err_rx, Some(task)))
    }
}
