//! Tests for the probability model

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::types::{BracketKind, ParsedBracket};

    fn bracket(kind: BracketKind, value: f64) -> ParsedBracket {
        ParsedBracket { kind, value }
    }

    #[test]
    fn test_sigma_zero_for_negative_horizon() {
        assert_eq!(standard_deviation(-0.001), 0.0);
        assert_eq!(standard_deviation(-5.0), 0.0);
        assert_eq!(standard_deviation(-100.0), 0.0);
    }

    #[test]
    fn test_sigma_step_boundaries() {
        assert_eq!(standard_deviation(0.0), 0.8);
        assert_eq!(standard_deviation(6.0), 0.8);
        assert_eq!(standard_deviation(6.1), 1.1);
        assert_eq!(standard_deviation(12.0), 1.1);
        assert_eq!(standard_deviation(22.0), 1.5);
        assert_eq!(standard_deviation(24.0), 1.5);
        assert_eq!(standard_deviation(48.0), 2.1);
        assert_eq!(standard_deviation(72.0), 2.6);
        assert_eq!(standard_deviation(73.0), 3.2);
        assert_eq!(standard_deviation(500.0), 3.2);
    }

    #[test]
    fn test_sigma_monotone_non_decreasing() {
        let mut prev = standard_deviation(-1.0);
        let mut h = 0.0;
        while h <= 100.0 {
            let sigma = standard_deviation(h);
            assert!(sigma >= prev, "sigma decreased at {} hours", h);
            prev = sigma;
            h += 0.5;
        }
    }

    #[test]
    fn test_normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-6);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 1e-3);
        assert!(normal_cdf(5.0) > 0.9999);
        assert!(normal_cdf(-5.0) < 0.0001);
    }

    #[test]
    fn test_normal_cdf_symmetry() {
        for x in [0.1, 0.5, 1.0, 2.3] {
            let total = normal_cdf(x) + normal_cdf(-x);
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bracket_probability_non_finite_forecast() {
        assert_eq!(
            bracket_probability(f64::NAN, 22.0, Some(7.5), Some(8.5)),
            0.0
        );
        assert_eq!(
            bracket_probability(f64::INFINITY, 22.0, Some(7.5), None),
            0.0
        );
    }

    #[test]
    fn test_bracket_probability_inverted_bounds() {
        assert_eq!(bracket_probability(8.2, 22.0, Some(9.0), Some(7.0)), 0.0);
        assert_eq!(bracket_probability(8.2, 22.0, Some(8.0), Some(8.0)), 0.0);
    }

    #[test]
    fn test_bracket_probability_deterministic_when_resolved() {
        // Negative horizon gives sigma 0: point mass at the forecast.
        assert_eq!(bracket_probability(8.2, -1.0, Some(7.5), Some(8.5)), 1.0);
        assert_eq!(bracket_probability(8.2, -1.0, Some(8.5), Some(9.5)), 0.0);
        assert_eq!(bracket_probability(8.2, -1.0, None, Some(8.5)), 1.0);
        assert_eq!(bracket_probability(8.2, -1.0, Some(8.5), None), 0.0);
        // Interval is (lower, upper]: the upper endpoint is included,
        // the lower is not.
        assert_eq!(bracket_probability(8.5, -1.0, Some(7.5), Some(8.5)), 1.0);
        assert_eq!(bracket_probability(8.5, -1.0, Some(8.5), Some(9.5)), 0.0);
    }

    #[test]
    fn test_bracket_probability_monotone_in_upper_bound() {
        let narrow = bracket_probability(8.2, 22.0, Some(7.5), Some(8.5));
        let wide = bracket_probability(8.2, 22.0, Some(7.5), Some(9.5));
        assert!(wide >= narrow);
    }

    #[test]
    fn test_bracket_probability_monotone_in_lower_bound() {
        let high_lower = bracket_probability(8.2, 22.0, Some(7.5), Some(9.5));
        let low_lower = bracket_probability(8.2, 22.0, Some(6.5), Some(9.5));
        assert!(low_lower >= high_lower);
    }

    #[test]
    fn test_bracket_probability_halves_sum_to_one() {
        let below = bracket_probability(8.2, 22.0, None, Some(8.5));
        let above = bracket_probability(8.2, 22.0, Some(8.5), None);
        assert!((below + above - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_market_probability_padding() {
        let at_least = market_probability(8.2, 22.0, &bracket(BracketKind::AtLeast, 9.0));
        assert!((at_least - bracket_probability(8.2, 22.0, Some(8.5), None)).abs() < 1e-12);

        let at_most = market_probability(8.2, 22.0, &bracket(BracketKind::AtMost, 3.0));
        assert!((at_most - bracket_probability(8.2, 22.0, None, Some(3.5))).abs() < 1e-12);

        let exact = market_probability(8.2, 22.0, &bracket(BracketKind::Exact, 8.0));
        assert!((exact - bracket_probability(8.2, 22.0, Some(7.5), Some(8.5))).abs() < 1e-12);
    }

    #[test]
    fn test_complete_ladder_sums_to_one() {
        // AT_MOST(0), EXACT(1..=9), AT_LEAST(10) tile the whole line.
        let forecast = 8.2;
        let hours = 22.0;
        let mut total = market_probability(forecast, hours, &bracket(BracketKind::AtMost, 0.0));
        for v in 1..=9 {
            total += market_probability(forecast, hours, &bracket(BracketKind::Exact, v as f64));
        }
        total += market_probability(forecast, hours, &bracket(BracketKind::AtLeast, 10.0));
        assert!((total - 1.0).abs() < 1e-3, "ladder sum {} != 1", total);
    }

    #[test]
    fn test_scenario_forecast_8_2_at_22_hours() {
        // sigma(22h) = 1.5
        let exact_8 = market_probability(8.2, 22.0, &bracket(BracketKind::Exact, 8.0));
        assert!((exact_8 - 0.26).abs() < 0.02, "EXACT(8) = {}", exact_8);

        let at_most_3 = market_probability(8.2, 22.0, &bracket(BracketKind::AtMost, 3.0));
        assert!(at_most_3 < 0.01, "AT_MOST(3) = {}", at_most_3);

        let at_least_9 = market_probability(8.2, 22.0, &bracket(BracketKind::AtLeast, 9.0));
        assert!((at_least_9 - 0.42).abs() < 0.02, "AT_LEAST(9) = {}", at_least_9);
    }

    #[test]
    fn test_time_compression() {
        assert_eq!(time_compression(0.0), 1.0);
        assert_eq!(time_compression(-3.0), 1.0);
        assert_eq!(time_compression(3.0), 1.0);
        assert_eq!(time_compression(6.0), 1.0);
        assert_eq!(time_compression(12.0), 0.5);
        assert!((time_compression(22.0) - 6.0 / 22.0).abs() < 1e-12);
    }

    #[test]
    fn test_analyze_edge_equal_inputs_hold() {
        for p in [0.0, 0.1, 0.25, 0.5, 0.75, 0.9999] {
            for hours in [None, Some(3.0), Some(22.0)] {
                let analysis = analyze_edge(p, p, hours);
                assert_eq!(analysis.edge, 0.0);
                assert_eq!(analysis.effective_edge, 0.0);
                assert_eq!(analysis.signal, EdgeSignal::Hold);
            }
        }
    }

    #[test]
    fn test_analyze_edge_buy_and_sell() {
        let buy = analyze_edge(0.40, 0.25, None);
        assert_eq!(buy.edge, 0.15);
        assert_eq!(buy.effective_edge, 0.15);
        assert_eq!(buy.signal, EdgeSignal::Buy);

        let sell = analyze_edge(0.25, 0.40, None);
        assert_eq!(sell.edge, -0.15);
        assert_eq!(sell.signal, EdgeSignal::Sell);
    }

    #[test]
    fn test_analyze_edge_compression_dampens_signal() {
        // 0.15 raw edge at 24h compresses to 0.0375: below threshold.
        let analysis = analyze_edge(0.40, 0.25, Some(24.0));
        assert_eq!(analysis.edge, 0.15);
        assert_eq!(analysis.effective_edge, 0.0375);
        assert_eq!(analysis.signal, EdgeSignal::Hold);

        // Inside the reference horizon the same edge fires.
        let near = analyze_edge(0.40, 0.25, Some(3.0));
        assert_eq!(near.effective_edge, 0.15);
        assert_eq!(near.signal, EdgeSignal::Buy);
    }

    #[test]
    fn test_analyze_edge_threshold_is_exclusive() {
        let at_threshold = analyze_edge(0.55, 0.50, None);
        assert_eq!(at_threshold.effective_edge, 0.05);
        assert_eq!(at_threshold.signal, EdgeSignal::Hold);

        let above = analyze_edge(0.5501, 0.50, None);
        assert_eq!(above.signal, EdgeSignal::Buy);

        let below = analyze_edge(0.45, 0.5001, None);
        assert_eq!(below.signal, EdgeSignal::Sell);
    }

    #[test]
    fn test_analyze_edge_rounds_to_four_places() {
        let analysis = analyze_edge(1.0 / 3.0, 0.0, None);
        assert_eq!(analysis.edge, 0.3333);
    }

    #[test]
    fn test_edge_signal_display() {
        assert_eq!(EdgeSignal::Buy.to_string(), "BUY");
        assert_eq!(EdgeSignal::Sell.to_string(), "SELL");
        assert_eq!(EdgeSignal::Hold.to_string(), "HOLD");
    }
}
