pub mod filters;
pub mod session;
pub mod store;
pub mod ticker;

pub use filters::{FiltersPatch, RuntimeFilters};
pub use session::{Mode, Phase, SessionClock};
pub use store::{SessionStore, Snapshot};
pub use ticker::{ExitReason, Position, PositionExit, TickerState, TickerStatus};

#[cfg(test)]
mod session_tests;
