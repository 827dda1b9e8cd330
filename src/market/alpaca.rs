use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{future, stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::debug;
use url::Url;

use crate::config::{AlpacaConfig, AlpacaCredentials};
use crate::constants::market::{BARS_PAGE_LIMIT, TRADES_PAGE_LIMIT};
use crate::error::MarketDataError;

use super::traits::{HistoricalData, MarketStream};
use super::types::{BarsPage, MinuteBar, TradePrint, TradesPage};

/// Alpaca market-data REST client for historical stock bars and trades.
#[derive(Clone)]
pub struct AlpacaHistorical {
    client: Client,
    data_url: String,
    feed: String,
    credentials: AlpacaCredentials,
}

impl AlpacaHistorical {
    pub fn new(config: &AlpacaConfig, credentials: AlpacaCredentials) -> Self {
        Self {
            client: Client::new(),
            data_url: config.data_url.trim_end_matches('/').to_string(),
            feed: config.feed.clone(),
            credentials,
        }
    }

    fn endpoint(
        &self,
        symbol: &str,
        resource: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
        page_token: Option<&str>,
    ) -> Result<Url, MarketDataError> {
        let mut url = Url::parse(&format!("{}/v2/stocks/{}/{}", self.data_url, symbol, resource))?;
        {
            let mut query = url.query_pairs_mut();
            if resource == "bars" {
                query.append_pair("timeframe", "1Min");
            }
            query
                .append_pair("start", &start.to_rfc3339_opts(SecondsFormat::Secs, true))
                .append_pair("end", &end.to_rfc3339_opts(SecondsFormat::Secs, true))
                .append_pair("limit", &limit.to_string())
                .append_pair("feed", &self.feed);
            if let Some(token) = page_token {
                query.append_pair("page_token", token);
            }
        }
        Ok(url)
    }

    async fn get_page<T: DeserializeOwned>(&self, url: Url) -> Result<T, MarketDataError> {
        debug!("[ALPACA] GET {}", url.path());
        let resp = self
            .client
            .get(url)
            .header("APCA-API-KEY-ID", &self.credentials.key_id)
            .header("APCA-API-SECRET-KEY", &self.credentials.secret_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MarketDataError::Http { status: status.as_u16(), body });
        }
        Ok(resp.json::<T>().await?)
    }
}

impl HistoricalData for AlpacaHistorical {
    fn minute_bars(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> MarketStream<MinuteBar> {
        let this = self.clone();
        let symbol = symbol.to_string();
        paginate(move |token| {
            let this = this.clone();
            let symbol = symbol.clone();
            async move {
                let url = this.endpoint(&symbol, "bars", start, end, BARS_PAGE_LIMIT, token.as_deref())?;
                let page: BarsPage = this.get_page(url).await?;
                let bars: Vec<MinuteBar> = page
                    .bars
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| b.into_bar(&symbol))
                    .collect();
                Ok::<_, MarketDataError>((bars, page.next_page_token))
            }
        })
        .try_filter(move |bar| future::ready(bar.start < end))
        .boxed()
    }

    fn trades(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> MarketStream<TradePrint> {
        let this = self.clone();
        let symbol = symbol.to_string();
        paginate(move |token| {
            let this = this.clone();
            let symbol = symbol.clone();
            async move {
                let url = this.endpoint(&symbol, "trades", start, end, TRADES_PAGE_LIMIT, token.as_deref())?;
                let page: TradesPage = this.get_page(url).await?;
                let trades: Vec<TradePrint> = page
                    .trades
                    .unwrap_or_default()
                    .into_iter()
                    .map(|t| t.into_trade(&symbol))
                    .collect();
                Ok::<_, MarketDataError>((trades, page.next_page_token))
            }
        })
        .try_filter(move |trade| future::ready(trade.at < end))
        .boxed()
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Turns a page fetcher into a flat item stream. Pages are only requested as
/// the consumer pulls; an empty or missing token ends the sequence.
fn paginate<T, F, Fut>(fetch: F) -> MarketStream<T>
where
    T: Send + 'static,
    F: FnMut(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(Vec<T>, Option<String>), MarketDataError>> + Send + 'static,
{
    stream::try_unfold((fetch, Cursor::Start), |(mut fetch, cursor)| async move {
        let token = match cursor {
            Cursor::Done => return Ok::<_, MarketDataError>(None),
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };
        let (items, next) = match fetch(token).await {
            Ok(page) => page,
            Err(e) => return Err(e),
        };
        let cursor = match next {
            Some(token) if !token.is_empty() => Cursor::Next(token),
            _ => Cursor::Done,
        };
        let page = stream::iter(items.into_iter().map(Ok::<T, MarketDataError>));
        Ok(Some((page, (fetch, cursor))))
    })
    .try_flatten()
    .boxed()
}
