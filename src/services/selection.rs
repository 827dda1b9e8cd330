use tracing::info;

use crate::data::filters::RuntimeFilters;
use crate::data::store::SessionStore;
use crate::data::ticker::TickerState;

/// Symbols whose opening range passes the range and volume bounds, sorted.
///
/// `filters` is a single committed bundle, so every symbol is judged against the
/// same thresholds.
pub fn select_candidates<'a>(
    states: impl IntoIterator<Item = &'a TickerState>,
    filters: &RuntimeFilters,
) -> Vec<String> {
    let mut candidates: Vec<String> = states
        .into_iter()
        .filter(|t| match t.opening.range_pct() {
            Some(range_pct) => filters.range_pct_ok(range_pct) && filters.volume_ok(t.opening.volume),
            None => false,
        })
        .map(|t| t.symbol.clone())
        .collect();
    candidates.sort();
    candidates
}

/// Runs selection over the watchlist and commits the tracked set.
pub fn run_selection(store: &SessionStore) -> Vec<String> {
    let filters = store.filters();
    let watchlist = store.watchlist();
    let states: Vec<TickerState> = store
        .ticker_states()
        .into_iter()
        .filter(|t| watchlist.is_empty() || watchlist.contains(&t.symbol))
        .collect();

    let candidates = select_candidates(&states, &filters);
    info!(
        "[SELECTION] {} of {} symbols passed open_5m filters",
        candidates.len(),
        states.len()
    );
    store.replace_tracked(candidates.clone());
    candidates
}
