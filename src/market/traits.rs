use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::MarketDataError;

use super::types::{Channel, MarketMessage, MinuteBar, TradePrint};

/// Lazily produced, finite, forward-only historical sequence.
/// A transport failure surfaces as the terminal `Err` item.
pub type MarketStream<T> = BoxStream<'static, Result<T, MarketDataError>>;

/// Live subscription: typed messages plus a separate error channel.
///
/// Dropping or closing the handle stops the reader task.
pub struct StreamHandle {
    pub messages: mpsc::Receiver<MarketMessage>,
    pub errors: mpsc::Receiver<MarketDataError>,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn new(
        messages: mpsc::Receiver<MarketMessage>,
        errors: mpsc::Receiver<MarketDataError>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self { messages, errors, task }
    }

    /// Next message, or the error that ended the stream.
    pub async fn next(&mut self) -> Result<MarketMessage, MarketDataError> {
        tokio::select! {
            biased;
            Some(err) = self.errors.recv() => Err(err),
            msg = self.messages.recv() => match msg {
                Some(msg) => Ok(msg),
                None => Err(self.errors.try_recv().unwrap_or(MarketDataError::StreamEnded)),
            },
        }
    }

    pub async fn close(mut self) {
        self.messages.close();
        self.errors.close();
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
pub trait MarketDataStream: Send + Sync {
    /// Subscribe `symbols` on one channel. Implementations batch large symbol sets.
    async fn subscribe(&self, channel: Channel, symbols: &[String]) -> Result<StreamHandle, MarketDataError>;
}

/// Bounded historical range queries over `[start, end)`.
pub trait HistoricalData: Send + Sync {
    fn minute_bars(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> MarketStream<MinuteBar>;

    fn trades(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> MarketStream<TradePrint>;
}
