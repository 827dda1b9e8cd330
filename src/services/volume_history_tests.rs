//! Unit tests for historical volume normalization.

#[cfg(test)]
mod volume_history_tests {
    use crate::config::HistoryConfig;
    use crate::error::HistoryError;
    use crate::market::memory::MemoryFeed;
    use crate::market::{HistoricalData, MinuteBar};
    use crate::services::volume_history::{average_open_volume, normalize, today_pct};
    use crate::shutdown::Shutdown;
    use crate::test_support::{bar, day, hours};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use std::sync::Arc;

    /// One open bar on `date` at 09:30 New York.
    fn open_bar(symbol: &str, date: NaiveDate, volume: f64) -> MinuteBar {
        let start = chrono_tz::America::New_York
            .from_local_datetime(&date.and_hms_opt(9, 30, 0).unwrap())
            .unwrap()
            .with_timezone(&Utc);
        bar(symbol, start, 10.0, 10.1, 9.9, volume)
    }

    fn config(sessions: usize, lookback: u32) -> HistoryConfig {
        HistoryConfig { open5m_lookback_sessions: sessions, max_calendar_lookback_days: lookback, max_workers: 2 }
    }

    #[test]
    fn test_today_pct_example() {
        assert_eq!(today_pct(225_000.0, 150_000.0), Some(150.0));
        assert_eq!(today_pct(225_000.0, 0.0), None);
    }

    #[tokio::test]
    async fn test_average_skips_days_without_data() {
        // Friday, Thursday and Wednesday before the Monday test day.
        let today = day();
        let feed = MemoryFeed::new(
            vec![
                open_bar("AAA", today - Duration::days(3), 100_000.0),
                open_bar("AAA", today - Duration::days(4), 150_000.0),
                open_bar("AAA", today - Duration::days(5), 200_000.0),
                open_bar("AAA", today, 999_999.0),
            ],
            vec![],
        );

        let baseline = average_open_volume(&feed, "AAA", today, &hours(), &config(3, 10), &Shutdown::never())
            .await
            .unwrap();
        assert_eq!(baseline.sessions, 3);
        assert_eq!(baseline.average, 150_000.0);
    }

    #[tokio::test]
    async fn test_average_stops_at_session_count() {
        let today = day();
        let feed = MemoryFeed::new(
            vec![
                open_bar("AAA", today - Duration::days(3), 100.0),
                open_bar("AAA", today - Duration::days(4), 300.0),
                open_bar("AAA", today - Duration::days(5), 10_000.0),
            ],
            vec![],
        );
        let baseline = average_open_volume(&feed, "AAA", today, &hours(), &config(2, 10), &Shutdown::never())
            .await
            .unwrap();
        assert_eq!(baseline.average, 200.0);
    }

    #[tokio::test]
    async fn test_no_history_within_lookback() {
        let today = day();
        let feed = MemoryFeed::new(vec![open_bar("AAA", today - Duration::days(20), 100.0)], vec![]);
        let err = average_open_volume(&feed, "AAA", today, &hours(), &config(3, 10), &Shutdown::never())
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::NoHistory { lookback_days: 10 }));
    }

    #[tokio::test]
    async fn test_failed_queries_are_reported() {
        let feed = MemoryFeed::default().with_failing_symbol("AAA");
        let err = average_open_volume(&feed, "AAA", day(), &hours(), &config(3, 10), &Shutdown::never())
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::QueryFailed { lookback_days: 10, .. }));
        assert!(err.to_string().contains("simulated failure"));
    }

    #[tokio::test]
    async fn test_normalize_isolates_failures() {
        let today = day();
        let feed = MemoryFeed::new(vec![open_bar("AAA", today - Duration::days(3), 100.0)], vec![])
            .with_failing_symbol("BBB");
        let history: Arc<dyn HistoricalData> = Arc::new(feed);

        let mut results = normalize(
            history,
            vec!["AAA".to_string(), "BBB".to_string()],
            today,
            hours(),
            config(3, 5),
            2,
            &Shutdown::never(),
        )
        .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.as_ref().unwrap().average, 100.0);
        assert!(results[1].1.is_err());
    }
}
