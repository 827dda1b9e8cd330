use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::data::filters::FiltersPatch;
use crate::data::store::{HistoricMeta, SessionStore};
use crate::error::FilterError;
use crate::events::Event;
use crate::services::replay::HistoricRunner;
use crate::shutdown::Shutdown;

pub struct AppState {
    pub store: Arc<SessionStore>,
    /// Present only in historic mode
    pub runner: Option<HistoricRunner>,
}

/// Errors returned to HTTP clients as `{"error": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

impl From<FilterError> for ApiError {
    fn from(e: FilterError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/state", get(get_state))
        .route("/api/filters", get(get_filters).post(update_filters))
        .route("/api/historic/run", post(run_historic))
        .route("/api/audio/{file}", get(get_audio))
        .route("/api/events", get(stream_events))
        .with_state(state)
}

/// Serves the API until `shutdown` fires.
pub async fn serve(state: Arc<AppState>, addr: &str, shutdown: Shutdown) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 [API] listening on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health() -> &'static str {
    "ok"
}

async fn get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Some(runner) = &state.runner {
        runner.refresh_range(Utc::now());
    }
    Json(state.store.snapshot())
}

async fn get_filters(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "filters": state.store.filters(),
        "version": state.store.filters_version(),
    }))
}

async fn update_filters(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<FiltersPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let filters = state.store.update_filters(&patch)?;
    Ok(Json(json!({
        "filters": filters,
        "version": state.store.filters_version(),
    })))
}

#[derive(Deserialize)]
struct RunParams {
    date: String,
}

/// Parses `YYYY-MM-DD` and checks it against the selectable range.
pub fn validate_replay_date(raw: &str, meta: &HistoricMeta) -> Result<NaiveDate, ApiError> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("invalid date '{}', expected YYYY-MM-DD", raw)))?;
    if let Some(max) = meta.max_date {
        if date > max {
            return Err(ApiError::BadRequest(format!("{} is in the future (latest {})", date, max)));
        }
    }
    if let Some(min) = meta.min_date {
        if date < min {
            return Err(ApiError::BadRequest(format!("{} is before the earliest replayable date {}", date, min)));
        }
    }
    Ok(date)
}

async fn run_historic(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunParams>,
) -> Result<impl IntoResponse, ApiError> {
    let runner = state
        .runner
        .as_ref()
        .ok_or_else(|| ApiError::Conflict("historic replays are only available in historic mode".into()))?;
    let meta = runner.refresh_range(Utc::now());
    let date = validate_replay_date(&params.date, &meta)?;
    runner.request(date);
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "started", "date": date }))))
}

async fn get_audio(State(state): State<Arc<AppState>>, Path(file): Path<String>) -> Result<Response, ApiError> {
    let id = file.split('.').next().unwrap_or_default();
    let clip = state
        .store
        .get_audio(id)
        .ok_or_else(|| ApiError::NotFound(format!("no audio clip {}", id)))?;
    Ok(([(header::CONTENT_TYPE, clip.content_type)], clip.bytes).into_response())
}

async fn stream_events(State(state): State<Arc<AppState>>) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    Sse::new(event_stream(state.store.bus().subscribe())).keep_alive(KeepAlive::default())
}

/// Forwards bus events as SSE `log` messages. Lagging subscribers skip ahead.
fn event_stream(rx: broadcast::Receiver<Event>) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(data) => return Some((Ok(SseEvent::default().event("log").data(data)), rx)),
                    Err(e) => warn!("[API] failed to encode event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => warn!("[API] SSE subscriber lagged, skipped {} events", skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
