//! Randomized invariants for sizing, trailing stops, allocation caps, and
//! total-risk admission.

use atlas_core::config::{PortfolioConfig, RiskConfig};
use atlas_core::{IndicatorSnapshot, Position, PositionSide, Signal, SignalDirection};
use atlas_risk::portfolio::PortfolioManager;
use atlas_risk::sizer;
use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

fn decimal(value: f64) -> Decimal {
    atlas_core::numeric::dec(value)
}

fn long_position(entry: Decimal, quantity: Decimal, stop: Decimal) -> Position {
    Position::new(
        "TEST".to_string(),
        PositionSide::Long,
        entry,
        quantity,
        10,
        stop,
        Utc::now(),
    )
}

proptest! {
    /// The stop distance is exactly `stop_multiplier * ATR`, and the loss at
    /// that stop equals `risk_per_trade * balance` whenever neither the
    /// minimum order size nor the margin cap constrains the quantity.
    #[test]
    fn sizing_risks_exactly_the_configured_fraction(
        balance in 1_000.0f64..1_000_000.0,
        entry in 10.0f64..100_000.0,
        atr in 0.5f64..2_000.0,
    ) {
        let config = RiskConfig::default();
        let balance = decimal(balance).round_dp(2);
        let entry = decimal(entry).round_dp(2);
        let atr = decimal(atr).round_dp(2);

        let sizing = sizer::size(&config, balance, entry, atr).unwrap();

        prop_assert_eq!(sizing.stop_distance, decimal(config.stop_loss_atr_multiplier) * atr);

        let risk_amount = balance * decimal(config.risk_per_trade);
        let raw_quantity = risk_amount / sizing.stop_distance;
        let unconstrained = raw_quantity >= decimal(config.min_order_size)
            && sizing.quantity * entry / Decimal::from(config.leverage) <= balance
            && raw_quantity.round_dp(8) == sizing.quantity;

        if unconstrained {
            // Loss at the stop differs from the target only by quantity
            // rounding at 8 decimal places.
            let loss_at_stop = sizing.quantity * sizing.stop_distance;
            let tolerance = sizing.stop_distance * dec!(0.00000001);
            prop_assert!((loss_at_stop - risk_amount).abs() <= tolerance,
                "loss {} vs target {}", loss_at_stop, risk_amount);
        }

        // The margin cap always holds, constrained or not.
        prop_assert!(sizing.margin_required <= balance);
    }

    /// Trailing stops never regress, whatever the price path does.
    #[test]
    fn trailing_stop_is_monotonic_for_longs(
        prices in prop::collection::vec(1.0f64..100_000.0, 1..60),
        atr in 0.5f64..500.0,
    ) {
        let config = RiskConfig::default();
        let atr = decimal(atr);
        let entry = dec!(50_000);
        let mut position = long_position(entry, dec!(0.1), entry - decimal(2.0) * atr);

        for price in prices {
            let previous = position.trailing_stop;
            let updated = sizer::trailing_stop(&config, &position, decimal(price), atr).unwrap();
            prop_assert!(updated >= previous, "stop regressed: {} -> {}", previous, updated);
            position.trailing_stop = updated;
        }
    }

    #[test]
    fn trailing_stop_is_monotonic_for_shorts(
        prices in prop::collection::vec(1.0f64..100_000.0, 1..60),
        atr in 0.5f64..500.0,
    ) {
        let config = RiskConfig::default();
        let atr = decimal(atr);
        let entry = dec!(50_000);
        let mut position = long_position(entry, dec!(0.1), entry + decimal(2.0) * atr);
        position.side = PositionSide::Short;

        for price in prices {
            let previous = position.trailing_stop;
            let updated = sizer::trailing_stop(&config, &position, decimal(price), atr).unwrap();
            prop_assert!(updated <= previous, "stop regressed: {} -> {}", previous, updated);
            position.trailing_stop = updated;
        }
    }

    /// For a pair with |correlation| above the threshold, the combined
    /// allocation never exceeds the correlated-exposure cap, whatever the
    /// confidences are.
    #[test]
    fn correlated_pair_allocation_never_exceeds_cap(
        confidence_a in 0.05f64..1.0,
        confidence_b in 0.05f64..1.0,
        balance in 1_000.0f64..1_000_000.0,
    ) {
        let config = PortfolioConfig {
            symbols: vec!["AAAUSDT".to_string(), "BBBUSDT".to_string()],
            ..PortfolioConfig::default()
        };
        let max_exposure = decimal(config.correlation_max_exposure);
        let mut portfolio = PortfolioManager::new(config);

        // Identical return histories: correlation 1.0.
        let mut price = 100.0;
        let closes: Vec<Decimal> = (0..40)
            .map(|i| {
                price *= if i % 2 == 0 { 1.01 } else { 0.995 };
                decimal(price)
            })
            .collect();
        portfolio.update_price_history("AAAUSDT", &closes);
        portfolio.update_price_history("BBBUSDT", &closes);
        portfolio.rebuild_correlations();

        let balance = decimal(balance).round_dp(2);
        let mut signals = HashMap::new();
        for (symbol, confidence) in [("AAAUSDT", confidence_a), ("BBBUSDT", confidence_b)] {
            signals.insert(symbol.to_string(), Signal::new(
                symbol.to_string(),
                SignalDirection::LongEntry,
                dec!(100),
                Utc::now(),
                confidence,
                IndicatorSnapshot::default(),
            ));
        }

        let allocations = portfolio.allocate(&signals, balance);
        let combined = allocations["AAAUSDT"] + allocations["BBBUSDT"];
        let cap = balance * max_exposure;
        // Decimal division rounding can leave the combined value a hair over.
        prop_assert!(combined <= cap + dec!(0.0001),
            "combined {} exceeds cap {}", combined, cap);
    }

    /// Whatever the order candidates arrive in, admitting through
    /// `can_admit` keeps total portfolio risk within the budget.
    #[test]
    fn admission_keeps_total_risk_bounded(
        seeds in prop::collection::vec((10.0f64..10_000.0, 0.001f64..0.05), 1..12),
        balance in 5_000.0f64..500_000.0,
    ) {
        let symbols: Vec<String> = (0..seeds.len())
            .map(|i| format!("SYM{i}USDT"))
            .collect();
        let config = PortfolioConfig {
            symbols: symbols.clone(),
            max_symbols: symbols.len(),
            ..PortfolioConfig::default()
        };
        let max_total_risk = config.max_total_risk;
        let mut portfolio = PortfolioManager::new(config);
        let balance = decimal(balance).round_dp(2);

        for (i, (entry, risk_fraction)) in seeds.iter().enumerate() {
            // A candidate engineered to risk `risk_fraction` of balance.
            let entry = decimal(*entry).round_dp(4);
            let stop_distance = entry * dec!(0.02);
            let quantity = (balance * decimal(*risk_fraction) / stop_distance).round_dp(8);
            let mut candidate = long_position(entry, quantity, entry - stop_distance);
            candidate.symbol = symbols[i].clone();

            if portfolio.can_admit(&symbols[i], &candidate, balance).is_admitted() {
                portfolio.record_position(&candidate);
            }

            let total = portfolio.total_risk(balance);
            prop_assert!(total <= max_total_risk + 1e-9,
                "total risk {} exceeds budget {}", total, max_total_risk);
        }
    }
}
