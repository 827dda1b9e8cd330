//! Unit tests for operator events.

#[cfg(test)]
mod events_tests {
    use crate::events::*;
    use chrono::{TimeZone, Utc};

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 13, 36, 5).unwrap()
    }

    // ============= Construction Tests =============

    #[test]
    fn test_event_defaults() {
        let event = Event::system(at(), chrono_tz::America::New_York, "Selection complete");

        assert_eq!(event.kind, EventKind::System);
        assert_eq!(event.level, EventLevel::Info);
        assert!(event.symbol.is_none());
        assert!(event.audio_id.is_none());
        assert!(!event.id.is_empty());
        // EDT in July
        assert_eq!(event.time_local, "09:36:05");
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = Event::system(at(), chrono_tz::UTC, "a");
        let b = Event::system(at(), chrono_tz::UTC, "a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_event_builders() {
        let event = Event::new(at(), chrono_tz::UTC, EventKind::Buy, "BUY AAPL")
            .with_symbol("AAPL")
            .with_level(EventLevel::Signal)
            .with_audio(Some("clip-1".to_string()));

        assert_eq!(event.symbol.as_deref(), Some("AAPL"));
        assert_eq!(event.level, EventLevel::Signal);
        assert_eq!(event.audio_id.as_deref(), Some("clip-1"));

        let warned = Event::system(at(), chrono_tz::UTC, "careful").warn();
        assert_eq!(warned.level, EventLevel::Warn);
    }

    // ============= Serialization Tests =============

    #[test]
    fn test_event_json_shape() {
        let event = Event::new(at(), chrono_tz::UTC, EventKind::TimeExit, "Time exit. MSFT").with_symbol("MSFT");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "TIME_EXIT");
        assert_eq!(json["level"], "info");
        assert_eq!(json["symbol"], "MSFT");
        assert_eq!(json["time_local"], "13:36:05");
        assert!(json.get("audio_id").is_none());
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(serde_json::to_string(&EventKind::SessionClose).unwrap(), "\"SESSION_CLOSE\"");
        assert_eq!(serde_json::to_string(&EventKind::Stop).unwrap(), "\"STOP\"");
        assert_eq!(serde_json::to_string(&EventKind::Phase).unwrap(), "\"PHASE\"");
        assert_eq!(serde_json::to_string(&EventLevel::Signal).unwrap(), "\"signal\"");
    }

    #[test]
    fn test_event_roundtrip() {
        let event = Event::new(at(), chrono_tz::UTC, EventKind::Profit, "PROFIT! NVDA").with_symbol("NVDA");
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, EventKind::Profit);
        assert_eq!(back.message, "PROFIT! NVDA");
        assert_eq!(back.at, at());
    }
}
