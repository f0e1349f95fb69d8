//! Portfolio-level admission control and capital allocation.
//!
//! Tracks per-symbol exposure and a rolling correlation matrix over daily
//! returns. Admission decisions are typed outcomes checked *before* the risk
//! manager constructs a position, never exceptions raised after the fact.

use atlas_core::config::PortfolioConfig;
use atlas_core::numeric::dec;
use atlas_core::{Position, Signal};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(String),
}

impl Admission {
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Derived portfolio statistics, recomputed on demand.
#[derive(Debug, Clone)]
pub struct PortfolioMetrics {
    /// Balance plus unrealized PnL across observed positions.
    pub total_value: Decimal,
    /// Realized plus unrealized PnL.
    pub total_pnl: Decimal,
    pub per_symbol_pnl: HashMap<String, Decimal>,
    /// Fraction of balance lost if every open position stops out.
    pub total_risk: f64,
    /// Open positions over the symbol universe size.
    pub diversification_ratio: f64,
}

pub struct PortfolioManager {
    config: PortfolioConfig,
    symbols: Vec<String>,
    /// Observer copies of open positions, keyed by symbol. The risk manager
    /// owns the authoritative positions.
    observed: HashMap<String, Position>,
    correlations: HashMap<(String, String), f64>,
    realized_pnl: HashMap<String, Decimal>,
    returns: HashMap<String, Vec<f64>>,
    last_rebalance: Option<DateTime<Utc>>,
}

impl PortfolioManager {
    #[must_use]
    pub fn new(config: PortfolioConfig) -> Self {
        let symbols: Vec<String> = config
            .symbols
            .iter()
            .take(config.max_symbols)
            .cloned()
            .collect();
        tracing::info!(symbols = ?symbols, "portfolio manager initialized");
        let realized_pnl = symbols.iter().map(|s| (s.clone(), Decimal::ZERO)).collect();
        Self {
            config,
            symbols,
            observed: HashMap::new(),
            correlations: HashMap::new(),
            realized_pnl,
            returns: HashMap::new(),
            last_rebalance: None,
        }
    }

    #[must_use]
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Replaces the stored daily-close history for `symbol` with the returns
    /// derived from `closes`, keeping the most recent observations.
    pub fn update_price_history(&mut self, symbol: &str, closes: &[Decimal]) {
        let mut returns: Vec<f64> = closes
            .windows(2)
            .filter_map(|pair| {
                if pair[0].is_zero() {
                    None
                } else {
                    ((pair[1] - pair[0]) / pair[0]).to_f64()
                }
            })
            .collect();
        let lookback = self.config.correlation_lookback;
        if returns.len() > lookback {
            returns.drain(..returns.len() - lookback);
        }
        self.returns.insert(symbol.to_string(), returns);
    }

    fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
        let n = xs.len().min(ys.len());
        if n < 2 {
            return 0.0;
        }
        let xs = &xs[xs.len() - n..];
        let ys = &ys[ys.len() - n..];

        #[allow(clippy::cast_precision_loss)]
        let len = n as f64;
        let mean_x = xs.iter().sum::<f64>() / len;
        let mean_y = ys.iter().sum::<f64>() / len;

        let mut cov = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for i in 0..n {
            let dx = xs[i] - mean_x;
            let dy = ys[i] - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }

        let denominator = (var_x * var_y).sqrt();
        if denominator <= f64::EPSILON {
            return 0.0;
        }
        let correlation = cov / denominator;
        // Zero variance or numeric trouble collapses to uncorrelated.
        if correlation.is_nan() {
            0.0
        } else {
            correlation
        }
    }

    /// Recomputes the pairwise Pearson correlation matrix from the stored
    /// return histories.
    pub fn rebuild_correlations(&mut self) {
        self.correlations.clear();
        for (i, a) in self.symbols.iter().enumerate() {
            for b in &self.symbols[i + 1..] {
                let correlation = match (self.returns.get(a), self.returns.get(b)) {
                    (Some(ra), Some(rb)) => Self::pearson(ra, rb),
                    _ => 0.0,
                };
                self.correlations
                    .insert((a.clone(), b.clone()), correlation);
                self.correlations
                    .insert((b.clone(), a.clone()), correlation);
            }
        }
        tracing::debug!(
            pairs = self.correlations.len(),
            "correlation matrix rebuilt"
        );
    }

    #[must_use]
    pub fn correlation(&self, a: &str, b: &str) -> f64 {
        self.correlations
            .get(&(a.to_string(), b.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Confidence-proportional capital allocation with a per-symbol cap and
    /// iterative shrinking of correlated pairs. Converges because every
    /// adjustment only shrinks allocations.
    #[must_use]
    pub fn allocate(
        &self,
        signals: &HashMap<String, Signal>,
        balance: Decimal,
    ) -> HashMap<String, Decimal> {
        let mut allocations: HashMap<String, Decimal> = self
            .symbols
            .iter()
            .map(|s| (s.clone(), Decimal::ZERO))
            .collect();

        let valid: Vec<(&String, &Signal)> = signals
            .iter()
            .filter(|(symbol, signal)| {
                self.symbols.contains(symbol) && signal.confidence > 0.0
            })
            .collect();
        if valid.is_empty() {
            return allocations;
        }

        let total_confidence: f64 = valid.iter().map(|(_, s)| s.confidence).sum();
        let max_single = balance * dec(self.config.max_single_allocation);

        for (symbol, signal) in &valid {
            let share = dec(signal.confidence / total_confidence);
            let allocation = (balance * share).min(max_single);
            allocations.insert((*symbol).clone(), allocation);
        }

        self.apply_correlation_limits(&mut allocations, balance);

        let total: Decimal = allocations.values().copied().sum();
        if total > balance && total > Decimal::ZERO {
            let scale = balance / total;
            for allocation in allocations.values_mut() {
                *allocation *= scale;
            }
        }
        allocations
    }

    /// Shrinks any pair whose |correlation| exceeds the threshold until the
    /// combined allocation fits inside the correlated-exposure cap. Bounded
    /// iteration: each pass only ever reduces allocations.
    fn apply_correlation_limits(
        &self,
        allocations: &mut HashMap<String, Decimal>,
        balance: Decimal,
    ) {
        let max_exposure = balance * dec(self.config.correlation_max_exposure);

        for _ in 0..10 {
            let mut adjusted = false;
            for (i, a) in self.symbols.iter().enumerate() {
                for b in &self.symbols[i + 1..] {
                    let alloc_a = allocations.get(a).copied().unwrap_or_default();
                    let alloc_b = allocations.get(b).copied().unwrap_or_default();
                    if alloc_a.is_zero() || alloc_b.is_zero() {
                        continue;
                    }
                    if self.correlation(a, b).abs() <= self.config.correlation_threshold {
                        continue;
                    }

                    let combined = alloc_a + alloc_b;
                    if combined > max_exposure {
                        let scale = max_exposure / combined;
                        allocations.insert(a.clone(), alloc_a * scale);
                        allocations.insert(b.clone(), alloc_b * scale);
                        adjusted = true;
                        tracing::info!(
                            pair = %format!("{a}/{b}"),
                            combined = %combined,
                            cap = %max_exposure,
                            "correlated exposure reduced"
                        );
                    }
                }
            }
            if !adjusted {
                break;
            }
        }
    }

    /// Total balance-at-stop risk across the observed positions, optionally
    /// with `candidate` included in place of its symbol's current position.
    fn simulated_risk(&self, candidate: Option<&Position>, balance: Decimal) -> f64 {
        if balance <= Decimal::ZERO {
            return 0.0;
        }
        let mut total = Decimal::ZERO;
        let candidate_symbol = candidate.map(|p| p.symbol.as_str());

        for position in self
            .observed
            .values()
            .filter(|p| Some(p.symbol.as_str()) != candidate_symbol)
            .chain(candidate)
        {
            if position.entry_price.is_zero() {
                continue;
            }
            let risk =
                position.stop_distance() / position.entry_price * position.notional();
            total += risk;
        }
        (total / balance).to_f64().unwrap_or(0.0)
    }

    /// Whether the prospective position fits inside the total-risk budget.
    /// Must be consulted before the risk manager stores the position.
    #[must_use]
    pub fn can_admit(
        &self,
        symbol: &str,
        candidate: &Position,
        balance: Decimal,
    ) -> Admission {
        if !self.symbols.iter().any(|s| s == symbol) {
            return Admission::Rejected(format!("{symbol} is not in the portfolio universe"));
        }
        let risk = self.simulated_risk(Some(candidate), balance);
        if risk > self.config.max_total_risk {
            tracing::warn!(
                symbol,
                projected_risk = %format!("{:.4}", risk),
                max_risk = self.config.max_total_risk,
                "admission rejected: total risk budget exceeded"
            );
            return Admission::Rejected(format!(
                "projected portfolio risk {risk:.4} exceeds limit {}",
                self.config.max_total_risk
            ));
        }
        Admission::Admitted
    }

    /// Records (or refreshes) the observer copy of an open position.
    pub fn record_position(&mut self, position: &Position) {
        self.observed
            .insert(position.symbol.clone(), position.clone());
    }

    /// Drops the observer copy when a position closes.
    pub fn release_position(&mut self, symbol: &str) {
        self.observed.remove(symbol);
    }

    /// Accumulates realized PnL for a symbol.
    pub fn record_pnl(&mut self, symbol: &str, pnl: Decimal) {
        *self
            .realized_pnl
            .entry(symbol.to_string())
            .or_insert(Decimal::ZERO) += pnl;
    }

    #[must_use]
    pub fn total_risk(&self, balance: Decimal) -> f64 {
        self.simulated_risk(None, balance)
    }

    /// Recomputes portfolio metrics from current positions and balance.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn metrics(&self, balance: Decimal) -> PortfolioMetrics {
        let unrealized: Decimal = self.observed.values().map(|p| p.unrealized_pnl).sum();
        let realized: Decimal = self.realized_pnl.values().copied().sum();

        PortfolioMetrics {
            total_value: balance + unrealized,
            total_pnl: realized + unrealized,
            per_symbol_pnl: self.realized_pnl.clone(),
            total_risk: self.total_risk(balance),
            diversification_ratio: if self.symbols.is_empty() {
                0.0
            } else {
                self.observed.len() as f64 / self.symbols.len() as f64
            },
        }
    }

    /// Interval-gated reallocation; `None` when the interval has not
    /// elapsed.
    pub fn rebalance(
        &mut self,
        signals: &HashMap<String, Signal>,
        balance: Decimal,
        now: DateTime<Utc>,
    ) -> Option<HashMap<String, Decimal>> {
        let due = self.last_rebalance.map_or(true, |last| {
            now - last >= Duration::seconds(self.config.rebalance_interval_secs)
        });
        if !due {
            tracing::debug!("rebalance interval not reached");
            return None;
        }
        tracing::info!("rebalancing portfolio allocations");
        self.last_rebalance = Some(now);
        Some(self.allocate(signals, balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::{IndicatorSnapshot, PositionSide, SignalDirection};
    use rust_decimal_macros::dec;

    fn config(symbols: &[&str]) -> PortfolioConfig {
        PortfolioConfig {
            symbols: symbols.iter().map(|s| (*s).to_string()).collect(),
            ..PortfolioConfig::default()
        }
    }

    fn signal(symbol: &str, confidence: f64) -> Signal {
        Signal::new(
            symbol.to_string(),
            SignalDirection::LongEntry,
            dec!(50000),
            Utc::now(),
            confidence,
            IndicatorSnapshot::default(),
        )
    }

    fn position(symbol: &str, entry: Decimal, quantity: Decimal, stop: Decimal) -> Position {
        Position::new(
            symbol.to_string(),
            PositionSide::Long,
            entry,
            quantity,
            10,
            stop,
            Utc::now(),
        )
    }

    fn correlated_closes(seed: &[f64]) -> Vec<Decimal> {
        let mut price = 100.0;
        let mut closes = vec![Decimal::try_from(price).unwrap()];
        for step in seed {
            price *= 1.0 + step;
            closes.push(Decimal::try_from(price).unwrap());
        }
        closes
    }

    #[test]
    fn identical_histories_are_perfectly_correlated() {
        let mut portfolio = PortfolioManager::new(config(&["BTCUSDT", "ETHUSDT"]));
        let steps: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 0.01 } else { -0.005 }).collect();
        portfolio.update_price_history("BTCUSDT", &correlated_closes(&steps));
        portfolio.update_price_history("ETHUSDT", &correlated_closes(&steps));
        portfolio.rebuild_correlations();

        assert!((portfolio.correlation("BTCUSDT", "ETHUSDT") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_variance_collapses_to_zero() {
        let mut portfolio = PortfolioManager::new(config(&["BTCUSDT", "ETHUSDT"]));
        let flat = vec![dec!(100); 40];
        let steps: Vec<f64> = (0..40).map(|i| if i % 3 == 0 { 0.02 } else { -0.01 }).collect();
        portfolio.update_price_history("BTCUSDT", &flat);
        portfolio.update_price_history("ETHUSDT", &correlated_closes(&steps));
        portfolio.rebuild_correlations();

        assert!(portfolio.correlation("BTCUSDT", "ETHUSDT").abs() < f64::EPSILON);
    }

    #[test]
    fn allocation_is_confidence_proportional_and_capped() {
        let portfolio = PortfolioManager::new(config(&["BTCUSDT", "ETHUSDT"]));
        let mut signals = HashMap::new();
        signals.insert("BTCUSDT".to_string(), signal("BTCUSDT", 0.9));
        signals.insert("ETHUSDT".to_string(), signal("ETHUSDT", 0.3));

        let allocations = portfolio.allocate(&signals, dec!(10000));
        let btc = allocations["BTCUSDT"];
        let eth = allocations["ETHUSDT"];

        // 0.9 / 1.2 = 75% uncapped, capped to the 40% single-symbol maximum.
        assert_eq!(btc, dec!(4000));
        assert_eq!(eth, dec!(2500));
    }

    #[test]
    fn correlated_pair_respects_combined_cap() {
        let mut portfolio = PortfolioManager::new(config(&["BTCUSDT", "ETHUSDT"]));
        let steps: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 0.015 } else { -0.008 }).collect();
        portfolio.update_price_history("BTCUSDT", &correlated_closes(&steps));
        portfolio.update_price_history("ETHUSDT", &correlated_closes(&steps));
        portfolio.rebuild_correlations();

        let mut signals = HashMap::new();
        signals.insert("BTCUSDT".to_string(), signal("BTCUSDT", 0.9));
        signals.insert("ETHUSDT".to_string(), signal("ETHUSDT", 0.9));

        let balance = dec!(10000);
        let allocations = portfolio.allocate(&signals, balance);
        let combined = allocations["BTCUSDT"] + allocations["ETHUSDT"];
        assert!(combined <= dec!(5000), "combined {combined} exceeds cap");
    }

    #[test]
    fn admission_respects_total_risk_budget() {
        let mut cfg = config(&["BTCUSDT", "ETHUSDT"]);
        cfg.max_total_risk = 0.05;
        let mut portfolio = PortfolioManager::new(cfg);

        // Existing position risks 3% of a 10k balance.
        let existing = position("BTCUSDT", dec!(50000), dec!(0.01), dec!(20000));
        portfolio.record_position(&existing);

        // Candidate adds another 3%: rejected.
        let candidate = position("ETHUSDT", dec!(3000), dec!(0.5), dec!(2400));
        let admission = portfolio.can_admit("ETHUSDT", &candidate, dec!(10000));
        assert!(!admission.is_admitted());

        // A small candidate fits.
        let candidate = position("ETHUSDT", dec!(3000), dec!(0.1), dec!(2900));
        let admission = portfolio.can_admit("ETHUSDT", &candidate, dec!(10000));
        assert!(admission.is_admitted());
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let portfolio = PortfolioManager::new(config(&["BTCUSDT"]));
        let candidate = position("DOGEUSDT", dec!(1), dec!(10), dec!(0.9));
        assert!(!portfolio
            .can_admit("DOGEUSDT", &candidate, dec!(10000))
            .is_admitted());
    }

    #[test]
    fn release_and_pnl_tracking_feed_metrics() {
        let mut portfolio = PortfolioManager::new(config(&["BTCUSDT", "ETHUSDT"]));
        let mut pos = position("BTCUSDT", dec!(50000), dec!(0.1), dec!(49000));
        pos.unrealized_pnl = dec!(50);
        portfolio.record_position(&pos);

        let metrics = portfolio.metrics(dec!(10000));
        assert_eq!(metrics.total_value, dec!(10050));
        assert!((metrics.diversification_ratio - 0.5).abs() < f64::EPSILON);

        portfolio.release_position("BTCUSDT");
        portfolio.record_pnl("BTCUSDT", dec!(120));
        let metrics = portfolio.metrics(dec!(10120));
        assert_eq!(metrics.total_pnl, dec!(120));
        assert!(metrics.total_risk.abs() < f64::EPSILON);
    }

    #[test]
    fn rebalance_is_interval_gated() {
        let mut portfolio = PortfolioManager::new(config(&["BTCUSDT"]));
        let signals = HashMap::new();
        let now = Utc::now();

        assert!(portfolio.rebalance(&signals, dec!(10000), now).is_some());
        assert!(portfolio
            .rebalance(&signals, dec!(10000), now + Duration::hours(1))
            .is_none());
        assert!(portfolio
            .rebalance(&signals, dec!(10000), now + Duration::hours(7))
            .is_some());
    }

    #[test]
    fn universe_is_bounded_by_max_symbols() {
        let mut cfg = config(&["A", "B", "C", "D", "E", "F", "G"]);
        cfg.max_symbols = 5;
        let portfolio = PortfolioManager::new(cfg);
        assert_eq!(portfolio.symbols().len(), 5);
    }
}
