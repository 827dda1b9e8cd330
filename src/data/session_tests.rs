//! Unit tests for session timing.

#[cfg(test)]
mod session_tests {
    use crate::data::session::{resolve_replay_end, resolve_trading_date, Phase, SessionClock};
    use crate::test_support::{clock, hours, ny};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    #[test]
    fn test_clock_instants_in_utc() {
        let c = clock();
        assert_eq!(c.open, Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap());
        assert_eq!(c.selection, ny(9, 35, 0));
        assert_eq!(c.vwap_cutoff, ny(9, 43, 0));
        assert_eq!(c.force_exit, ny(11, 0, 0));
    }

    #[test]
    fn test_clock_follows_dst() {
        let summer = SessionClock::for_date(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(), &hours()).unwrap();
        assert_eq!(summer.open, Utc.with_ymd_and_hms(2024, 7, 1, 13, 30, 0).unwrap());
    }

    #[test]
    fn test_windows() {
        let c = clock();
        assert!(c.in_opening_window(ny(9, 30, 0)));
        assert!(c.in_opening_window(ny(9, 34, 0)));
        assert!(!c.in_opening_window(ny(9, 35, 0)));
        assert!(!c.in_opening_window(ny(9, 29, 0)));

        assert!(!c.in_arming_window(ny(9, 30, 59)));
        assert!(c.in_arming_window(ny(9, 31, 0)));
        assert!(c.in_arming_window(ny(9, 42, 59)));
        assert!(!c.in_arming_window(ny(9, 43, 0)));

        assert_eq!(c.trade_acceptance_end(), ny(11, 5, 0));
        assert!((c.minutes_after_open(ny(9, 40, 30)) - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::WaitingOpen < Phase::CollectingOpen5m);
        assert!(Phase::CollectingOpen5m < Phase::Selecting);
        assert!(Phase::Selecting < Phase::TrackingTicks);
        assert!(Phase::TrackingTicks < Phase::Closed);
        assert_eq!(serde_json::to_string(&Phase::Selecting).unwrap(), "\"selecting_0935\"");
    }

    // ============= Replay Bound Tests =============

    #[test]
    fn test_replay_end_is_now_before_force_exit() {
        let c = clock();
        for now in [ny(9, 36, 0), ny(10, 15, 30), ny(10, 59, 59)] {
            let (end, truncated) = resolve_replay_end(&c, now);
            assert_eq!(end, now);
            assert!(truncated);
        }
    }

    #[test]
    fn test_replay_end_is_force_exit_for_past_days() {
        let c = clock();
        let (end, truncated) = resolve_replay_end(&c, c.force_exit + Duration::days(3));
        assert_eq!(end, c.force_exit);
        assert!(!truncated);
    }

    #[test]
    fn test_weekend_resolves_to_friday() {
        let sat = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let sun = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let fri = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();

        assert_eq!(resolve_trading_date(sat).0, fri);
        assert_eq!(resolve_trading_date(sun).0, fri);
        assert!(resolve_trading_date(sun).1.is_some());
        assert_eq!(resolve_trading_date(fri), (fri, None));
    }

    #[test]
    fn test_phase_labels_match_wire_names() {
        for phase in [
            Phase::WaitingOpen,
            Phase::CollectingOpen5m,
            Phase::Selecting,
            Phase::TrackingTicks,
            Phase::Closed,
        ] {
            assert_eq!(serde_json::to_string(&phase).unwrap(), format!("\"{}\"", phase.as_str()));
        }
    }
}
