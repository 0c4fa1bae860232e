use agent_core::{Agent, PriceOracle, ValueSnapshot};
use chrono::{Duration, NaiveDate};
use portfolio_manager::portfolio_value;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{AgentIdentity, LeaderboardRow, Viewer, Window};
use crate::performance_tracker::{value_at, PerformanceTracker};

/// Upper bound on the number of periods a streak walks back.
pub const MAX_STREAK: u32 = 200;

/// Round a profit to cents, half away from zero. Scores are built from this value.
pub fn round_profit(profit: Decimal) -> Decimal {
    profit.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `profit * 100 + streak`, where `profit` must already be rounded.
pub fn score(rounded_profit: Decimal, streak: u32) -> Decimal {
    rounded_profit * Decimal::ONE_HUNDRED + Decimal::from(streak)
}

/// Consecutive strictly profitable periods of `window` length ending today.
///
/// The period ending today is valued at `current`; earlier period ends use
/// the stored history. Stops at the first period without a baseline or
/// without a gain.
pub fn streak_for_window(
    history: &[ValueSnapshot],
    current: Decimal,
    window: Window,
    today: NaiveDate,
) -> u32 {
    if history.is_empty() {
        return 0;
    }
    let step = Duration::days(window.days());
    let mut end = today;
    let mut streak = 0;

    while streak < MAX_STREAK {
        let start = end - step;
        let Some(base) = value_at(history, start) else {
            break;
        };
        let end_value = if end == today {
            current
        } else {
            match value_at(history, end) {
                Some(v) => v,
                None => break,
            }
        };
        if end_value - base > Decimal::ZERO {
            streak += 1;
            end = start;
        } else {
            break;
        }
    }
    streak
}

/// Score every agent for one window, best first.
///
/// Reads history and current valuations only; no snapshots are written.
pub fn leaderboard_rows(
    agents: &[Agent],
    prices: &dyn PriceOracle,
    window: Window,
    viewer: Viewer,
    today: NaiveDate,
) -> Vec<LeaderboardRow> {
    let mut rows: Vec<LeaderboardRow> = agents
        .iter()
        .map(|agent| {
            let value = portfolio_value(&agent.portfolio, prices);
            let raw = PerformanceTracker::new(&agent.value_history)
                .returns_for_window(window, value, today)
                .profit;
            let profit = round_profit(raw);
            let streak = streak_for_window(&agent.value_history, value, window, today);

            let identity = viewer.is_privileged().then(|| AgentIdentity {
                agent_id: agent.id.clone(),
                agent: agent.label(),
                value,
                category: agent.category.clone(),
            });

            LeaderboardRow {
                bot_id: agent.bot_id.clone(),
                score: score(profit, streak),
                profit,
                streak,
                identity,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.score.cmp(&a.score));
    tracing::debug!("Scored {} agents for the {} leaderboard", rows.len(), window);
    rows
}
