use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rust_orb::api::{self, AppState};
use rust_orb::config::{load_watchlist, AlpacaCredentials, AppConfig};
use rust_orb::constants::EVENT_BUS_CAPACITY;
use rust_orb::market::alpaca::AlpacaHistorical;
use rust_orb::market::ws::AlpacaStream;
use rust_orb::market::HistoricalData;
use rust_orb::shutdown;
use rust_orb::speech::OpenAiSpeech;
use rust_orb::{EventBus, HistoricRunner, Mode, SessionEngine, SessionStore};

#[derive(Parser, Debug)]
#[command(name = "rust_orb", about = "Opening-range / VWAP session engine")]
struct Cli {
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[arg(long, default_value = "watchlist.yaml")]
    watchlist: PathBuf,

    /// Replay past sessions instead of trading today's live stream
    #[arg(long)]
    historic: bool,

    /// First date to replay (YYYY-MM-DD); defaults to today
    #[arg(long, requires = "historic")]
    date: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    // Setup Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("🚀 Starting Rust ORB...");

    // Load Configuration
    let config = Arc::new(AppConfig::load(&cli.config)?);
    let watchlist = load_watchlist(&cli.watchlist)?;
    let credentials = AlpacaCredentials::from_env()?;
    let hours = config.market_hours()?;
    let mode = if cli.historic { Mode::Historic } else { Mode::Realtime };
    info!(
        "📋 Loaded {} symbols, mode {:?}, timezone {}",
        watchlist.len(),
        mode,
        hours.tz.name()
    );

    let store = Arc::new(SessionStore::new(
        mode,
        hours.tz,
        config.filters,
        config.ui.max_events,
        EventBus::new(EVENT_BUS_CAPACITY),
    ));
    store.set_watchlist(&watchlist);

    let history: Arc<dyn HistoricalData> = Arc::new(AlpacaHistorical::new(&config.alpaca, credentials.clone()));
    let mut engine = SessionEngine::new(Arc::clone(&config), Arc::clone(&store), history)?;
    if mode == Mode::Realtime {
        match OpenAiSpeech::from_env(&config.speech) {
            Some(speech) => engine = engine.with_speech(Arc::new(speech)),
            None => info!("🔇 [SPEECH] OPENAI_API_KEY not set; narration disabled"),
        }
    }

    let (trigger, shutdown) = shutdown::channel();
    let mut tasks = Vec::new();

    // Historic mode: replays run on request, latest wins
    let runner = if cli.historic {
        let (runner, handle) = HistoricRunner::spawn(engine.clone(), shutdown.clone());
        let date = cli.date.unwrap_or_else(|| Utc::now().with_timezone(&hours.tz).date_naive());
        runner.request(date);
        tasks.push(handle);
        Some(runner)
    } else {
        let stream = AlpacaStream::new(&config.alpaca, credentials);
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            match engine.run_live(&stream, &shutdown).await {
                Ok(()) => info!("🏁 [SESSION] live session finished"),
                Err(e) => error!("❌ [SESSION] live session aborted: {}", e),
            }
        }));
        None
    };

    // Start API Server
    let app_state = Arc::new(AppState { store: Arc::clone(&store), runner });
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let api_shutdown = shutdown.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = api::serve(app_state, &addr, api_shutdown).await {
            error!("❌ [API] server error: {}", e);
        }
    }));

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutdown requested");
    trigger.trigger();
    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}
