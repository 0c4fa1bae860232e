use agent_core::{Agent, Policy, PriceOracle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::BehaviorMetrics;
use crate::percentile::percentile_rank;

/// Deviation of one agent from its cohort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationReport {
    /// Mean of `|percentile - 50|` over the metrics, in `[0, 50]`.
    pub deviation_pct: f64,
    pub metrics: BehaviorMetrics,
    pub percentiles: BehaviorMetrics,
    pub cohort_size: usize,
}

/// Mean absolute distance of the percentiles from the median.
pub fn deviation_from_percentiles(percentiles: &[f64]) -> f64 {
    if percentiles.is_empty() {
        return 0.0;
    }
    percentiles.iter().map(|p| (p - 50.0).abs()).sum::<f64>() / percentiles.len() as f64
}

/// Rank `agent` against `cohort` on every behavioral metric.
pub fn deviation_report(
    agent: &Agent,
    cohort: &[&Agent],
    user_policy: &Policy,
    prices: &dyn PriceOracle,
    now: DateTime<Utc>,
) -> DeviationReport {
    let cohort_metrics: Vec<BehaviorMetrics> = cohort
        .iter()
        .map(|a| BehaviorMetrics::measure(a, user_policy, prices, now))
        .collect();
    let mine = BehaviorMetrics::measure(agent, user_policy, prices, now);

    let rank = |pick: fn(&BehaviorMetrics) -> f64| {
        let values: Vec<f64> = cohort_metrics.iter().map(pick).collect();
        percentile_rank(&values, pick(&mine))
    };
    let percentiles = BehaviorMetrics {
        riskness: rank(|m| m.riskness),
        trades_per_day: rank(|m| m.trades_per_day),
        position_size_pct: rank(|m| m.position_size_pct),
    };
    let deviation_pct = deviation_from_percentiles(&percentiles.as_array());

    tracing::debug!(
        "Deviation for {}: {:.1}% (cohort of {})",
        agent.id,
        deviation_pct,
        cohort.len()
    );

    DeviationReport {
        deviation_pct,
        metrics: mine,
        percentiles,
        cohort_size: cohort.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::cohort_for_agent;
    use agent_core::{PolicyOverrides, PriceMap, TradeRecord, TradeSide};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn agent(risk: f64, trades: usize) -> Agent {
        let mut a = Agent::new("Peer", "", now() - Duration::days(10), dec!(1000));
        a.policy = PolicyOverrides {
            risk: Some(risk),
            ..Default::default()
        };
        for i in 0..trades {
            a.portfolio.trades.push(TradeRecord {
                ts: Some(now() - Duration::hours(i as i64 + 1)),
                side: TradeSide::Buy,
                asset: "ethereum".into(),
                qty: dec!(0.01),
                price: dec!(2500),
                cash: dec!(25),
                source: None,
            });
        }
        a
    }

    #[test]
    fn middle_agent_sits_at_median() {
        let agents = vec![agent(10.0, 0), agent(25.0, 2), agent(40.0, 4)];
        let cohort = cohort_for_agent(&agents, &agents[1]);
        let report = deviation_report(&agents[1], &cohort, &Policy::default(), &PriceMap::new(), now());
        assert_relative_eq!(report.percentiles.riskness, 50.0);
        assert_relative_eq!(report.percentiles.trades_per_day, 50.0);
        assert_eq!(report.cohort_size, 3);
    }

    #[test]
    fn extreme_agent_approaches_fifty() {
        let agents = vec![agent(10.0, 1), agent(25.0, 2), agent(90.0, 6)];
        let cohort = cohort_for_agent(&agents, &agents[2]);
        let report = deviation_report(&agents[2], &cohort, &Policy::default(), &PriceMap::new(), now());
        assert_relative_eq!(report.percentiles.riskness, 100.0);
        assert_relative_eq!(report.percentiles.trades_per_day, 100.0);
        assert!(report.deviation_pct > 30.0 && report.deviation_pct <= 50.0);
    }

    #[test]
    fn zero_only_at_median() {
        assert_eq!(deviation_from_percentiles(&[50.0, 50.0, 50.0]), 0.0);
        assert!(deviation_from_percentiles(&[50.0, 50.0, 50.1]) > 0.0);
        assert!(deviation_from_percentiles(&[49.9, 50.0, 50.0]) > 0.0);
    }

    #[test]
    fn moving_away_from_median_never_decreases_deviation() {
        let mut prev = deviation_from_percentiles(&[50.0, 30.0, 70.0]);
        for step in 1..=50 {
            let p = 50.0 + step as f64;
            let next = deviation_from_percentiles(&[p, 30.0, 70.0]);
            assert!(next >= prev);
            prev = next;
        }
        let mut prev = deviation_from_percentiles(&[50.0, 30.0, 70.0]);
        for step in 1..=50 {
            let p = 50.0 - step as f64;
            let next = deviation_from_percentiles(&[p, 30.0, 70.0]);
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn single_agent_is_neutral() {
        let agents = vec![agent(80.0, 5)];
        let cohort = cohort_for_agent(&agents, &agents[0]);
        let report = deviation_report(&agents[0], &cohort, &Policy::default(), &PriceMap::new(), now());
        assert_eq!(report.deviation_pct, 0.0);
    }
}
