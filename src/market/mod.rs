pub mod alpaca;
pub mod memory;
pub mod traits;
pub mod types;
pub mod ws;

pub use traits::{HistoricalData, MarketDataStream, MarketStream, StreamHandle};
pub use types::{Channel, MarketMessage, MinuteBar, TradePrint};
