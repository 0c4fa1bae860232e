use agent_core::{Agent, Policy, PriceOracle};
use chrono::{DateTime, Duration, Utc};
use portfolio_manager::portfolio_value;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Look-back used for trade frequency, in days.
pub const TRADES_PER_DAY_WINDOW: i64 = 30;

/// Recent trades considered for average position size.
const POSITION_SIZE_SAMPLE: usize = 60;

/// Behavioral metrics compared across a cohort.
///
/// The same shape carries per-metric percentiles in a `DeviationReport`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorMetrics {
    /// Policy risk, 0-100.
    pub riskness: f64,
    pub trades_per_day: f64,
    /// Average trade cash as a percent of current portfolio value.
    pub position_size_pct: f64,
}

impl BehaviorMetrics {
    pub fn measure(
        agent: &Agent,
        user_policy: &Policy,
        prices: &dyn PriceOracle,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            riskness: riskness(agent, user_policy),
            trades_per_day: trades_per_day(agent, now),
            position_size_pct: avg_position_size_pct(agent, prices),
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.riskness, self.trades_per_day, self.position_size_pct]
    }
}

fn riskness(agent: &Agent, user_policy: &Policy) -> f64 {
    agent.policy.risk.unwrap_or(user_policy.risk)
}

/// Trades per day over the last 30 days.
///
/// Trades without a timestamp always count. When no trade carries a
/// timestamp the rate is the trade count over the agent's age, with the age
/// held between 1 and 30 days.
fn trades_per_day(agent: &Agent, now: DateTime<Utc>) -> f64 {
    let trades = &agent.portfolio.trades;
    if trades.is_empty() {
        return 0.0;
    }

    let cutoff = now - Duration::days(TRADES_PER_DAY_WINDOW);
    let mut has_ts = false;
    let recent = trades
        .iter()
        .filter(|t| match t.ts {
            Some(ts) => {
                has_ts = true;
                ts >= cutoff
            }
            None => true,
        })
        .count();

    if has_ts {
        return recent as f64 / TRADES_PER_DAY_WINDOW as f64;
    }

    let created = agent.created_at.unwrap_or(now);
    let age_days = ((now - created).num_seconds() as f64 / 86_400.0).clamp(1.0, 30.0);
    trades.len() as f64 / age_days
}

fn avg_position_size_pct(agent: &Agent, prices: &dyn PriceOracle) -> f64 {
    let trades = &agent.portfolio.trades;
    if trades.is_empty() {
        return 0.0;
    }
    let value = portfolio_value(&agent.portfolio, prices).to_f64().unwrap_or(0.0);
    if value <= 1e-9 {
        return 0.0;
    }

    let sizes: Vec<f64> = trades
        .iter()
        .take(POSITION_SIZE_SAMPLE)
        .filter(|t| t.cash > Decimal::ZERO)
        .map(|t| t.cash.to_f64().unwrap_or(0.0) / value * 100.0)
        .collect();
    if sizes.is_empty() {
        return 0.0;
    }
    sizes.iter().sum::<f64>() / sizes.len() as f64
}
