//! Unit tests for the per-trade decision path: VWAP, cross arming, entry and exits.

#[cfg(test)]
mod decision_tests {
    use crate::data::ticker::{ExitReason, OpeningRange, Position, TickerState, TickerStatus};
    use crate::services::decision::{apply_trade, DecisionContext, TradeOutcome};
    use crate::services::position::{self, RiskParams};
    use crate::test_support::{clock, filters, ny, trade};

    fn ctx() -> DecisionContext {
        DecisionContext {
            clock: clock(),
            filters: filters(),
            risk: RiskParams { take_profit_pct: 0.05, stop_loss_pct: 0.02 },
        }
    }

    fn selected(symbol: &str) -> TickerState {
        let mut state = TickerState::new(symbol);
        state.selected = true;
        state.status = TickerStatus::Tracking;
        state.opening = OpeningRange {
            open: 10.0,
            open_estimated: false,
            baseline_bar_start: Some(ny(9, 30, 0)),
            high: 10.5,
            low: 9.8,
            volume: 225_000.0,
            bars: 5,
        };
        state.hist_avg_volume = Some(150_000.0);
        state.today_pct = Some(150.0);
        state
    }

    /// Dip below VWAP then reclaim it before selection, which arms the symbol.
    fn arm(state: &mut TickerState, ctx: &DecisionContext) {
        apply_trade(state, &trade("AAA", ny(9, 31, 0), 20.0, 100.0), ctx);
        apply_trade(state, &trade("AAA", ny(9, 32, 0), 19.0, 100.0), ctx);
        let outcome = apply_trade(state, &trade("AAA", ny(9, 33, 0), 20.0, 200.0), ctx);
        assert_eq!(outcome, TradeOutcome::Updated { armed: true });
    }

    // ============= VWAP Tests =============

    #[test]
    fn test_vwap_is_cumulative() {
        let ctx = ctx();
        let mut state = selected("AAA");
        apply_trade(&mut state, &trade("AAA", ny(9, 31, 0), 20.0, 100.0), &ctx);
        apply_trade(&mut state, &trade("AAA", ny(9, 32, 0), 19.0, 100.0), &ctx);
        assert!((state.vwap.vwap().unwrap() - 19.5).abs() < 1e-9);
        assert_eq!(state.vwap.prev_price, 20.0);
        assert_eq!(state.vwap.prev_vwap, 20.0);
    }

    #[test]
    fn test_rejects_untracked_and_invalid_prints() {
        let ctx = ctx();
        let mut state = TickerState::new("AAA");
        assert_eq!(apply_trade(&mut state, &trade("AAA", ny(9, 36, 0), 20.0, 1.0), &ctx), TradeOutcome::Rejected);

        let mut state = selected("AAA");
        assert_eq!(apply_trade(&mut state, &trade("AAA", ny(9, 36, 0), 0.0, 1.0), &ctx), TradeOutcome::Rejected);
        assert_eq!(apply_trade(&mut state, &trade("AAA", ny(9, 36, 0), 20.0, 0.0), &ctx), TradeOutcome::Rejected);
        assert_eq!(apply_trade(&mut state, &trade("AAA", ny(9, 29, 59), 20.0, 1.0), &ctx), TradeOutcome::Rejected);
        assert_eq!(apply_trade(&mut state, &trade("AAA", ny(11, 5, 1), 20.0, 1.0), &ctx), TradeOutcome::Rejected);
        assert_eq!(state.vwap.cum_volume, 0.0);
    }

    #[test]
    fn test_out_of_order_trade_is_rejected() {
        let ctx = ctx();
        let mut state = selected("AAA");
        apply_trade(&mut state, &trade("AAA", ny(9, 40, 0), 20.0, 100.0), &ctx);
        let outcome = apply_trade(&mut state, &trade("AAA", ny(9, 39, 0), 30.0, 100.0), &ctx);
        assert_eq!(outcome, TradeOutcome::Rejected);
        assert_eq!(state.vwap.last_price, 20.0);
    }

    // ============= Cross Tests =============

    #[test]
    fn test_cross_arms_only_once() {
        let ctx = ctx();
        let mut state = selected("AAA");
        arm(&mut state, &ctx);
        assert_eq!(state.cross.first_at, Some(ny(9, 33, 0)));
        assert_eq!(state.cross.first_price, Some(20.0));

        apply_trade(&mut state, &trade("AAA", ny(9, 33, 30), 18.0, 1000.0), &ctx);
        let outcome = apply_trade(&mut state, &trade("AAA", ny(9, 34, 0), 25.0, 1000.0), &ctx);
        assert_eq!(outcome, TradeOutcome::Updated { armed: false });
        assert_eq!(state.cross.first_at, Some(ny(9, 33, 0)));
    }

    #[test]
    fn test_cross_in_first_minute_does_not_arm() {
        let ctx = ctx();
        let mut state = selected("AAA");
        apply_trade(&mut state, &trade("AAA", ny(9, 30, 10), 20.0, 100.0), &ctx);
        apply_trade(&mut state, &trade("AAA", ny(9, 30, 20), 19.0, 100.0), &ctx);
        apply_trade(&mut state, &trade("AAA", ny(9, 30, 30), 20.0, 200.0), &ctx);
        assert!(!state.cross.seen_in_window);
    }

    #[test]
    fn test_cross_after_cutoff_does_not_arm() {
        let ctx = ctx();
        let mut state = selected("AAA");
        apply_trade(&mut state, &trade("AAA", ny(9, 43, 0), 20.0, 100.0), &ctx);
        apply_trade(&mut state, &trade("AAA", ny(9, 43, 10), 19.0, 100.0), &ctx);
        apply_trade(&mut state, &trade("AAA", ny(9, 43, 20), 20.0, 200.0), &ctx);
        assert!(!state.cross.seen_in_window);
    }

    // ============= Entry Tests =============

    #[test]
    fn test_entry_sets_take_profit_and_stop() {
        let ctx = ctx();
        let mut state = selected("AAA");
        arm(&mut state, &ctx);

        let outcome = apply_trade(&mut state, &trade("AAA", ny(9, 35, 0), 20.0, 100.0), &ctx);
        match outcome {
            TradeOutcome::Entered { price, take_profit, stop, .. } => {
                assert_eq!(price, 20.0);
                assert!((take_profit - 21.0).abs() < 1e-9);
                assert!((stop - 19.6).abs() < 1e-9);
            }
            other => panic!("expected entry, got {:?}", other),
        }
        assert_eq!(state.status, TickerStatus::Long);
        assert_eq!(state.position.as_ref().unwrap().entry_minutes(), 5.0);
    }

    #[test]
    fn test_no_entry_before_selection() {
        let ctx = ctx();
        let mut state = selected("AAA");
        arm(&mut state, &ctx);
        let outcome = apply_trade(&mut state, &trade("AAA", ny(9, 34, 59), 20.0, 100.0), &ctx);
        assert_eq!(outcome, TradeOutcome::Updated { armed: false });
        assert!(!state.has_position());
    }

    #[test]
    fn test_no_entry_without_cross() {
        let ctx = ctx();
        let mut state = selected("AAA");
        let outcome = apply_trade(&mut state, &trade("AAA", ny(9, 36, 0), 20.0, 100.0), &ctx);
        assert_eq!(outcome, TradeOutcome::Updated { armed: false });
        assert!(!state.has_position());
    }

    #[test]
    fn test_no_entry_below_vwap() {
        let ctx = ctx();
        let mut state = selected("AAA");
        arm(&mut state, &ctx);
        let outcome = apply_trade(&mut state, &trade("AAA", ny(9, 36, 0), 19.0, 10_000.0), &ctx);
        assert!(!matches!(outcome, TradeOutcome::Entered { .. }));
    }

    #[test]
    fn test_entry_minute_upper_bound_has_tolerance() {
        let mut ctx = ctx();
        ctx.filters.entry_max_after_open = 6;

        let mut late = selected("AAA");
        arm(&mut late, &ctx);
        let outcome = apply_trade(&mut late, &trade("AAA", ny(9, 37, 0), 20.0, 100.0), &ctx);
        assert!(!matches!(outcome, TradeOutcome::Entered { .. }));

        let mut on_time = selected("AAA");
        arm(&mut on_time, &ctx);
        let outcome = apply_trade(&mut on_time, &trade("AAA", ny(9, 36, 59), 20.0, 100.0), &ctx);
        assert!(matches!(outcome, TradeOutcome::Entered { .. }));
    }

    #[test]
    fn test_missing_history_counts_as_zero_today_pct() {
        let mut ctx = ctx();
        ctx.filters.open_5m_today_pct_min = 50.0;

        let mut state = selected("AAA");
        state.today_pct = None;
        arm(&mut state, &ctx);
        apply_trade(&mut state, &trade("AAA", ny(9, 35, 0), 20.0, 100.0), &ctx);
        assert!(!state.has_position());
    }

    #[test]
    fn test_filter_change_applies_to_next_trade() {
        let mut strict = ctx();
        strict.filters.entry_price_max = 15.0;
        let mut state = selected("AAA");
        arm(&mut state, &strict);

        apply_trade(&mut state, &trade("AAA", ny(9, 35, 0), 20.0, 100.0), &strict);
        assert!(!state.has_position());

        let outcome = apply_trade(&mut state, &trade("AAA", ny(9, 35, 1), 20.0, 100.0), &ctx());
        assert!(matches!(outcome, TradeOutcome::Entered { .. }));
    }

    #[test]
    fn test_no_entry_at_or_after_force_exit() {
        let mut ctx = ctx();
        ctx.clock.vwap_cutoff = ctx.clock.force_exit + chrono::Duration::minutes(1);
        ctx.filters.entry_max_after_open = 200;
        let mut state = selected("AAA");
        arm(&mut state, &ctx);

        let outcome = apply_trade(&mut state, &trade("AAA", ny(11, 0, 0), 20.0, 100.0), &ctx);
        assert_eq!(outcome, TradeOutcome::Updated { armed: false });
        assert!(!state.has_position());
        assert_eq!(state.vwap.last_price, 20.0);
    }

    // ============= Exit Tests =============

    #[test]
    fn test_take_profit_then_nothing() {
        let ctx = ctx();
        let mut state = selected("AAA");
        arm(&mut state, &ctx);
        apply_trade(&mut state, &trade("AAA", ny(9, 35, 0), 20.0, 100.0), &ctx);
        apply_trade(&mut state, &trade("AAA", ny(9, 36, 0), 20.5, 100.0), &ctx);

        let outcome = apply_trade(&mut state, &trade("AAA", ny(9, 37, 0), 21.0, 100.0), &ctx);
        assert_eq!(
            outcome,
            TradeOutcome::Exited { reason: ExitReason::Profit, price: 21.0, at: ny(9, 37, 0), entry_price: 20.0 }
        );
        assert_eq!(state.status, TickerStatus::Profit);

        // No re-entry and no second exit once closed.
        apply_trade(&mut state, &trade("AAA", ny(9, 38, 0), 18.0, 1000.0), &ctx);
        let outcome = apply_trade(&mut state, &trade("AAA", ny(9, 39, 0), 30.0, 1000.0), &ctx);
        assert_eq!(outcome, TradeOutcome::Updated { armed: false });
        assert_eq!(state.exit.as_ref().unwrap().price, 21.0);
        assert_eq!(state.position.as_ref().unwrap().max_price, 21.0);
        assert_eq!(state.vwap.last_price, 30.0);
    }

    #[test]
    fn test_stop_loss() {
        let ctx = ctx();
        let mut state = selected("AAA");
        arm(&mut state, &ctx);
        apply_trade(&mut state, &trade("AAA", ny(9, 35, 0), 20.0, 100.0), &ctx);

        let outcome = apply_trade(&mut state, &trade("AAA", ny(9, 40, 0), 19.5, 100.0), &ctx);
        assert!(matches!(outcome, TradeOutcome::Exited { reason: ExitReason::Stop, .. }));
        assert_eq!(state.status, TickerStatus::Stop);
        assert_eq!(state.position.as_ref().unwrap().min_price, 19.5);
    }

    #[test]
    fn test_take_profit_wins_tie() {
        // TP below the stop so a single price satisfies both.
        let pos = Position::open(20.0, ny(9, 35, 0), 5.0, -0.05, 0.02);
        assert_eq!(position::exit_signal(&pos, 19.5), Some(ExitReason::Profit));
    }

    #[test]
    fn test_open_never_replaces_a_position() {
        let clock = clock();
        let risk = RiskParams { take_profit_pct: 0.05, stop_loss_pct: 0.02 };
        let mut state = selected("AAA");
        assert!(position::open(&mut state, 20.0, ny(9, 35, 0), &clock, risk));
        assert!(!position::open(&mut state, 25.0, ny(9, 36, 0), &clock, risk));
        assert_eq!(state.position.as_ref().unwrap().entry_price(), 20.0);
    }

    #[test]
    fn test_time_exit_uses_last_price_or_entry() {
        let clock = clock();
        let risk = RiskParams { take_profit_pct: 0.05, stop_loss_pct: 0.02 };

        let mut idle = selected("AAA");
        position::open(&mut idle, 20.0, ny(9, 35, 0), &clock, risk);
        let exit = position::time_exit(&mut idle, clock.force_exit, &clock).unwrap();
        assert_eq!(exit.price, 20.0);
        assert_eq!(exit.reason, ExitReason::TimeExit);
        assert_eq!(idle.status, TickerStatus::TimeExit);

        let ctx = ctx();
        let mut active = selected("BBB");
        arm(&mut active, &ctx);
        apply_trade(&mut active, &trade("BBB", ny(9, 35, 0), 20.0, 100.0), &ctx);
        apply_trade(&mut active, &trade("BBB", ny(10, 30, 0), 20.4, 100.0), &ctx);
        let exit = position::time_exit(&mut active, clock.force_exit, &clock).unwrap();
        assert_eq!(exit.price, 20.4);

        assert!(position::time_exit(&mut active, clock.force_exit, &clock).is_none());
    }
}
