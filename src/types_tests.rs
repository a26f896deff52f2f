//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_serialization() {
        assert_eq!(serde_json::to_string(&Side::Yes).unwrap(), "\"YES\"");
        assert_eq!(serde_json::to_string(&Side::No).unwrap(), "\"NO\"");
    }

    #[test]
    fn test_side_deserialization() {
        let yes: Side = serde_json::from_str("\"YES\"").unwrap();
        let no: Side = serde_json::from_str("\"NO\"").unwrap();
        assert_eq!(yes, Side::Yes);
        assert_eq!(no, Side::No);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Yes.opposite(), Side::No);
        assert_eq!(Side::No.opposite(), Side::Yes);
    }

    #[test]
    fn test_bracket_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&BracketKind::AtLeast).unwrap(),
            "\"AT_LEAST\""
        );
        assert_eq!(
            serde_json::to_string(&BracketKind::AtMost).unwrap(),
            "\"AT_MOST\""
        );
        assert_eq!(
            serde_json::to_string(&BracketKind::Exact).unwrap(),
            "\"EXACT\""
        );
    }

    #[test]
    fn test_close_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&CloseReason::EarlyResolution).unwrap(),
            "\"EARLY_RESOLUTION\""
        );
        assert_eq!(
            serde_json::to_string(&CloseReason::StopProximity).unwrap(),
            "\"STOP_PROXIMITY\""
        );
        assert_eq!(
            serde_json::to_string(&CloseReason::StopEdgeFlip).unwrap(),
            "\"STOP_EDGE_FLIP\""
        );
        assert_eq!(
            serde_json::to_string(&CloseReason::Settlement).unwrap(),
            "\"SETTLEMENT\""
        );
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::EarlyResolution.to_string(), "EARLY_RESOLUTION");
        assert_eq!(CloseReason::StopEdgeFlip.to_string(), "STOP_EDGE_FLIP");
    }

    #[test]
    fn test_observation_yes_price() {
        let obs = create_test_observation(dec!(0.65), dec!(0.35));
        assert_eq!(obs.yes_price(), Some(dec!(0.65)));
    }

    #[test]
    fn test_observation_no_price() {
        let obs = create_test_observation(dec!(0.65), dec!(0.35));
        assert_eq!(obs.no_price(), Some(dec!(0.35)));
    }

    #[test]
    fn test_observation_empty_prices() {
        let mut obs = create_test_observation(dec!(0.65), dec!(0.35));
        obs.outcome_prices.clear();
        assert_eq!(obs.yes_price(), None);
        assert_eq!(obs.no_price(), None);
    }

    #[test]
    fn test_observation_date_key() {
        let obs = create_test_observation(dec!(0.5), dec!(0.5));
        assert_eq!(obs.date_key(), "2026-03-03");
    }

    #[test]
    fn test_date_key_for_formatting() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        assert_eq!(date_key_for(ts), "2026-01-09");
    }

    #[test]
    fn test_hours_until_resolution() {
        let obs = create_test_observation(dec!(0.5), dec!(0.5));
        let now = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();
        let hours = obs.hours_until_resolution(now);
        assert!((hours - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_hours_until_resolution_past_end() {
        let obs = create_test_observation(dec!(0.5), dec!(0.5));
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap();
        assert!(obs.hours_until_resolution(now) < 0.0);
    }

    #[test]
    fn test_position_entry_price_by_side() {
        let mut position = create_test_position(Side::Yes);
        assert_eq!(position.entry_price(), dec!(0.25));
        position.side = Side::No;
        assert_eq!(position.entry_price(), dec!(0.75));
    }

    #[test]
    fn test_position_entry_prices_complementary() {
        let position = create_test_position(Side::Yes);
        assert_eq!(
            position.entry_price_yes + position.entry_price_no,
            Decimal::ONE
        );
    }

    #[test]
    fn test_position_roundtrip_preserves_close_fields() {
        let mut position = create_test_position(Side::No);
        position.open = false;
        position.close_reason = Some(CloseReason::StopProximity);
        position.realized_pnl = Some(dec!(-0.05));
        let json = serde_json::to_string(&position).unwrap();
        let back: Position = serde_json::from_str(&json).unwrap();
        assert!(!back.open);
        assert_eq!(back.close_reason, Some(CloseReason::StopProximity));
        assert_eq!(back.realized_pnl, Some(dec!(-0.05)));
    }

    #[test]
    fn test_position_deserializes_without_optional_fields() {
        // Older store files predate the exit/close fields.
        let json = r#"{
            "market_id": "m1",
            "date_key": "2026-03-03",
            "side": "YES",
            "bracket": {"kind": "EXACT", "value": 8.0},
            "entry_price_yes": "0.25",
            "entry_price_no": "0.75",
            "size": "1",
            "model_probability": 0.31,
            "edge": 0.06,
            "opened_at": "2026-03-02T15:01:00Z",
            "cycle_id": "c-1",
            "open": true
        }"#;
        let position: Position = serde_json::from_str(json).unwrap();
        assert!(position.open);
        assert_eq!(position.closed_at, None);
        assert_eq!(position.exit_price_yes, None);
        assert_eq!(position.close_reason, None);
        assert_eq!(position.realized_pnl, None);
    }

    // Helper functions
    fn create_test_observation(yes: Decimal, no: Decimal) -> Observation {
        Observation {
            market_id: "test-market".to_string(),
            question: "Will the high in NYC on March 3 be 8 degrees?".to_string(),
            outcome_prices: vec![yes, no],
            end_date: Utc.with_ymd_and_hms(2026, 3, 3, 22, 0, 0).unwrap(),
            volume: dec!(10000),
            liquidity: dec!(5000),
            closed: false,
            resolved_outcome: None,
        }
    }

    fn create_test_position(side: Side) -> Position {
        Position {
            market_id: "test-market".to_string(),
            date_key: "2026-03-03".to_string(),
            side,
            bracket: ParsedBracket {
                kind: BracketKind::Exact,
                value: 8.0,
            },
            entry_price_yes: dec!(0.25),
            entry_price_no: dec!(0.75),
            size: dec!(1),
            model_probability: 0.31,
            edge: 0.06,
            opened_at: Utc.with_ymd_and_hms(2026, 3, 2, 15, 1, 0).unwrap(),
            cycle_id: "cycle-1".to_string(),
            open: true,
            closed_at: None,
            exit_price_yes: None,
            exit_price_no: None,
            close_reason: None,
            realized_pnl: None,
        }
    }
}
