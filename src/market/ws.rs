use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::{AlpacaConfig, AlpacaCredentials};
use crate::constants::market::STREAM_CHANNEL_CAPACITY;
use crate::error::MarketDataError;

use super::traits::{MarketDataStream, StreamHandle};
use super::types::{parse_frame, Channel, WireMessage};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Alpaca real-time stock data over WebSocket (`{stream_url}/{feed}`).
#[derive(Clone)]
pub struct AlpacaStream {
    url: String,
    batch_size: usize,
    credentials: AlpacaCredentials,
}

impl AlpacaStream {
    pub fn new(config: &AlpacaConfig, credentials: AlpacaCredentials) -> Self {
        Self {
            url: format!("{}/{}", config.stream_url.trim_end_matches('/'), config.feed),
            batch_size: config.ws_batch_size.max(1),
            credentials,
        }
    }

    async fn auth(&self, write: &mut WsSink, read: &mut WsSource) -> Result<(), MarketDataError> {
        await_control(read, "connected").await?;
        let auth_msg = json!({
            "action": "auth",
            "key": self.credentials.key_id,
            "secret": self.credentials.secret_key,
        });
        write
            .send(Message::Text(auth_msg.to_string()))
            .await
            .map_err(|e| MarketDataError::WebSocket(e.to_string()))?;
        await_control(read, "authenticated").await
    }

    async fn subscribe_batches(
        &self,
        write: &mut WsSink,
        channel: Channel,
        symbols: &[String],
    ) -> Result<(), MarketDataError> {
        for batch in symbols.chunks(self.batch_size) {
            let mut sub = serde_json::Map::new();
            sub.insert("action".into(), Value::from("subscribe"));
            sub.insert(channel.wire_name().into(), Value::from(batch.to_vec()));
            write
                .send(Message::Text(Value::Object(sub).to_string()))
                .await
                .map_err(|e| MarketDataError::WebSocket(e.to_string()))?;
            debug!("[STREAM] subscribed {} {} symbols", batch.len(), channel.wire_name());
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataStream for AlpacaStream {
    async fn subscribe(&self, channel: Channel, symbols: &[String]) -> Result<StreamHandle, MarketDataError> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| MarketDataError::WebSocket(e.to_string()))?;
        info!("🔌 [STREAM] connected to {}", self.url);

        let (mut write, mut read) = ws.split();
        self.auth(&mut write, &mut read).await?;
        self.subscribe_batches(&mut write, channel, symbols).await?;

        let (msg_tx, msg_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            // Keep the sink alive for as long as we read.
            let _write = write;
            if let Err(e) = pump(read, msg_tx).await {
                let _ = err_tx.send(e).await;
            }
        });

        Ok(StreamHandle::new(msg_rx, err_rx, Some(task)))
    }
}

/// Reads until a control message with `expected` arrives.
async fn await_control(read: &mut WsSource, expected: &str) -> Result<(), MarketDataError> {
    while let Some(frame) = read.next().await {
        let text = match frame.map_err(|e| MarketDataError::WebSocket(e.to_string()))? {
            Message::Text(text) => text,
            Message::Close(_) => return Err(MarketDataError::StreamEnded),
            _ => continue,
        };
        for msg in parse_frame(&text)? {
            match msg {
                WireMessage::Success { msg } if msg == expected => return Ok(()),
                WireMessage::Error { code, msg } => {
                    return Err(MarketDataError::Subscription(format!("{}: {}", code, msg)));
                }
                _ => {}
            }
        }
    }
    Err(MarketDataError::StreamEnded)
}

/// Forwards market payloads until the socket fails, closes, or the consumer goes away.
async fn pump(mut read: WsSource, tx: mpsc::Sender<crate::market::MarketMessage>) -> Result<(), MarketDataError> {
    while let Some(frame) = read.next().await {
        let text = match frame.map_err(|e| MarketDataError::WebSocket(e.to_string()))? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let msgs = match parse_frame(&text) {
            Ok(msgs) => msgs,
            Err(e) => {
                warn!("[STREAM] unparseable frame: {}", e);
                continue;
            }
        };

        for msg in msgs {
            match msg {
                WireMessage::Error { code, msg } => {
                    return Err(MarketDataError::Subscription(format!("{}: {}", code, msg)));
                }
                WireMessage::Subscription { bars, trades } => {
                    debug!("[STREAM] subscription ack: {} bars, {} trades", bars.len(), trades.len());
                }
                other => {
                    if let Some(market) = other.into_market() {
                        if tx.send(market).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
    Err(MarketDataError::StreamEnded)
}
