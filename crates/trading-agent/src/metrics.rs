use agent_core::{AutonomyMode, EngineError, PriceOracle, UserState};
use analytics::{PerformanceTracker, WindowReturn, WindowReturns};
use chrono::{DateTime, Utc};
use portfolio_manager::{portfolio_value, trade_totals, TradeTotals};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::trust::agent_deviation;

pub const VOLATILITY_WINDOW_DAYS: i64 = 30;

/// Comparable performance and activity figures for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub value_usdc: Decimal,
    pub since_inception: WindowReturn,
    pub windows: WindowReturns,
    pub max_drawdown_pct: f64,
    pub volatility_proxy_pct: f64,
    pub deviation_pct: f64,
    pub runs_total: usize,
    pub runs_executed: usize,
    pub runs_queued: usize,
    pub approvals_pending: usize,
    pub trades: TradeTotals,
    pub mode: AutonomyMode,
    pub strategy: String,
}

impl AgentMetrics {
    pub fn compute(
        user: &UserState,
        agent_id: &str,
        prices: &dyn PriceOracle,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let agent = user.agent(agent_id)?;
        let deviation = agent_deviation(user, agent_id, prices, now)?;
        let today = now.date_naive();
        let value = portfolio_value(&agent.portfolio, prices);
        let tracker = PerformanceTracker::new(&agent.value_history);

        Ok(Self {
            value_usdc: value,
            since_inception: tracker.since_inception(value),
            windows: tracker.returns_windows(value, today),
            max_drawdown_pct: tracker.max_drawdown_pct(),
            volatility_proxy_pct: tracker.volatility_proxy(today, VOLATILITY_WINDOW_DAYS),
            deviation_pct: deviation.deviation_pct,
            runs_total: agent.runs.len(),
            runs_executed: agent.runs.iter().filter(|r| r.executed()).count(),
            runs_queued: agent.runs.iter().filter(|r| r.queued()).count(),
            approvals_pending: agent.pending_approvals().count(),
            trades: trade_totals(&agent.portfolio.trades),
            mode: agent.mode,
            strategy: agent.strategy.name.clone(),
        })
    }

    /// Emit the figures as one structured log line.
    pub fn log_metrics(&self, agent_id: &str) {
        tracing::info!(
            agent_id,
            value = %self.value_usdc.round_dp(2),
            profit = %self.since_inception.profit.round_dp(2),
            return_pct = format!("{:.2}%", self.since_inception.return_pct),
            max_drawdown = format!("{:.2}%", self.max_drawdown_pct),
            volatility = format!("{:.2}%", self.volatility_proxy_pct),
            deviation = format!("{:.1}%", self.deviation_pct),
            runs = self.runs_total,
            executed = self.runs_executed,
            queued = self.runs_queued,
            pending = self.approvals_pending,
            trades = self.trades.total,
            "Agent metrics summary"
        );
    }
}

/// One rounded row of the agents overview table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRow {
    pub agent_id: String,
    pub label: String,
    pub mode: AutonomyMode,
    pub strategy: String,
    pub value_usdc: Decimal,
    pub profit_usdc: Decimal,
    pub return_pct: f64,
    pub dd_pct: f64,
    pub vol_pct: f64,
    pub deviation_pct: f64,
    pub pending: usize,
    pub runs: usize,
    pub trades: usize,
}

fn round_to(x: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (x * factor).round() / factor
}

pub fn agents_table(
    user: &UserState,
    prices: &dyn PriceOracle,
    now: DateTime<Utc>,
) -> Result<Vec<AgentRow>, EngineError> {
    user.agents
        .iter()
        .map(|agent| {
            let m = AgentMetrics::compute(user, &agent.id, prices, now)?;
            Ok(AgentRow {
                agent_id: agent.id.clone(),
                label: agent.label(),
                mode: m.mode,
                strategy: m.strategy,
                value_usdc: m.value_usdc.round_dp(2),
                profit_usdc: m.since_inception.profit.round_dp(2),
                return_pct: round_to(m.since_inception.return_pct, 2),
                dd_pct: round_to(m.max_drawdown_pct, 2),
                vol_pct: round_to(m.volatility_proxy_pct, 2),
                deviation_pct: round_to(m.deviation_pct, 1),
                pending: m.approvals_pending,
                runs: m.runs_total,
                trades: m.trades.total,
            })
        })
        .collect()
}
