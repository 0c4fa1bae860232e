use agent_core::{Agent, EngineError, PriceOracle, TrustSignals, UserState};
use chrono::{DateTime, Utc};
use crowd_deviation::{cohort_for_agent, deviation_report, DeviationReport};

/// Combine the raw inputs into a read-only trust snapshot.
pub fn trust_signals(agent: &Agent, crowd_score: f64, deviation_pct: f64) -> TrustSignals {
    TrustSignals {
        crowd_score,
        verified_receipts: agent.verified_receipts(),
        deviation_pct,
        safety_ok: agent.safety.is_ok(),
    }
}

/// Deviation of one agent against its cohort within the user's agents.
pub fn agent_deviation(
    user: &UserState,
    agent_id: &str,
    prices: &dyn PriceOracle,
    now: DateTime<Utc>,
) -> Result<DeviationReport, EngineError> {
    let agent = user.agent(agent_id)?;
    let cohort = cohort_for_agent(&user.agents, agent);
    Ok(deviation_report(agent, &cohort, &user.policy, prices, now))
}

/// Trust snapshot plus the deviation report it was built from.
pub fn assess(
    user: &UserState,
    agent_id: &str,
    prices: &dyn PriceOracle,
    now: DateTime<Utc>,
) -> Result<(TrustSignals, DeviationReport), EngineError> {
    let deviation = agent_deviation(user, agent_id, prices, now)?;
    let agent = user.agent(agent_id)?;
    let signals = trust_signals(agent, user.crowd_score, deviation.deviation_pct);
    Ok((signals, deviation))
}
