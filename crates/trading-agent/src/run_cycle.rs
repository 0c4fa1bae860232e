use agent_core::{
    AgentEvent, AuditEntry, AuditKind, AuditSink, AutonomyMode, Decision, EngineError,
    PriceOracle, Proposal, ProposalAction, ProposalSummary, RandomSource, RunReport, Severity,
    TradeGateInputs, UserState,
};
use analytics::upsert_snapshot;
use chrono::{DateTime, Utc};
use portfolio_manager::{apply_trade, portfolio_value, trades_today, TradeOrder};
use risk_manager::SafetyMonitor;
use serde_json::json;

use crate::autonomy::{can_auto_execute, resolve_effective, TradeGate};
use crate::config::EngineConfig;
use crate::proposal::{short_id, ProposalGenerator};
use crate::trust::assess;

/// Collaborators handed to one cycle.
pub struct CycleContext<'a> {
    pub now: DateTime<Utc>,
    pub prices: &'a dyn PriceOracle,
    pub rng: &'a mut dyn RandomSource,
    pub audit: &'a mut dyn AuditSink,
}

/// One orchestrated pass for an agent: resolve autonomy, draft a proposal,
/// execute or queue it, snapshot the value, run the safety monitor.
///
/// Policy rejections end up in the report's decision. The only errors are
/// unknown agent ids and an empty watchlist.
pub fn run_cycle(
    user: &mut UserState,
    agent_id: &str,
    reason: &str,
    ctx: &mut CycleContext<'_>,
    config: &EngineConfig,
) -> Result<RunReport, EngineError> {
    let now = ctx.now;
    let (signals, deviation) = assess(user, agent_id, ctx.prices, now)?;
    let (requested, unlock) = {
        let agent = user.agent(agent_id)?;
        (agent.mode, agent.autonomy.unlock_auto_plus)
    };
    let autonomy = resolve_effective(requested, &unlock, &signals);

    tracing::info!(
        "Cycle for agent {}: requested={} effective={} ({}) dev={:.1}%",
        agent_id,
        autonomy.requested,
        autonomy.effective,
        autonomy.note,
        deviation.deviation_pct
    );

    let mut proposal_summary = None;
    let mut trade_gate = None;

    let decision = if autonomy.effective == AutonomyMode::Off {
        Decision::skipped("Autonomy OFF")
    } else {
        let proposal = ProposalGenerator::new(&config.watchlist).draft(
            user,
            agent_id,
            deviation.deviation_pct,
            now,
            ctx.rng,
            ctx.audit,
        )?;
        proposal_summary = Some(ProposalSummary::from(&proposal));

        match proposal.action.clone() {
            ProposalAction::Trade { asset, side, qty } => {
                let agent = user.agent_mut(agent_id)?;
                let price = ctx.prices.price_or_zero(&asset);
                let notional = qty * price;
                let today = trades_today(&agent.portfolio.trades, now);
                let gate = can_auto_execute(&TradeGate {
                    settings: &agent.autonomy,
                    effective: autonomy.effective,
                    price,
                    notional,
                    trades_today: today,
                    constraints: proposal.constraints,
                });
                trade_gate = Some(TradeGateInputs {
                    price,
                    notional_usdc: notional,
                    trades_today: today,
                    caps: agent.autonomy.caps_for(autonomy.effective),
                    constraints: proposal.constraints,
                });

                if gate.allowed() {
                    let order = TradeOrder::new(side, asset.clone(), qty, price);
                    match apply_trade(&mut agent.portfolio, &order, now) {
                        Ok(fill) => {
                            tracing::info!(
                                "Auto executed {} {} qty={} notional={} for agent {}",
                                side,
                                asset,
                                qty,
                                fill.notional,
                                agent_id
                            );
                            agent.push_event(AgentEvent::new(
                                now,
                                "trade",
                                &format!("AUTO {} {}", side, asset),
                                &format!("qty={} notional=${:.2}", qty, fill.notional),
                                Severity::Success,
                            ));
                            ctx.audit.record(
                                AuditEntry::new(
                                    now,
                                    AuditKind::AutoExec,
                                    agent_id,
                                    format!(
                                        "Auto executed trade {} {} qty={} notional={:.2}",
                                        side, asset, qty, fill.notional
                                    ),
                                )
                                .severity(Severity::Success)
                                .proposal(proposal.id.clone())
                                .meta(json!({ "price": price, "cash_after": fill.cash_after })),
                            );
                            Decision::executed(format!("Auto: {}", gate.reason()))
                        }
                        Err(rejection) => {
                            let why = format!("Auto failed: {}", rejection);
                            queue(user, agent_id, proposal, &why, now)?;
                            Decision::queued(why)
                        }
                    }
                } else {
                    queue(user, agent_id, proposal, gate.reason(), now)?;
                    Decision::queued(gate.reason())
                }
            }
            ProposalAction::Payment { .. } | ProposalAction::Copy { .. } => {
                let title = proposal.title.clone();
                queue(user, agent_id, proposal, &title, now)?;
                Decision::queued("Non-trade actions require approval")
            }
        }
    };

    let agent = user.agent_mut(agent_id)?;
    let value = portfolio_value(&agent.portfolio, ctx.prices);
    upsert_snapshot(&mut agent.value_history, now.date_naive(), value);

    let safety_exit = if config.safety_check_each_cycle {
        SafetyMonitor::new(ctx.prices)
            .check(agent, now, ctx.audit)
            .exit()
            .cloned()
    } else {
        None
    };
    let value_after = portfolio_value(&agent.portfolio, ctx.prices);

    let report = RunReport {
        id: format!("run_{}_{}", now.format("%Y%m%d"), short_id()),
        ts: now,
        reason: reason.to_string(),
        agent_id: agent_id.to_string(),
        autonomy,
        signals,
        proposal: proposal_summary,
        trade_gate,
        decision,
        value_after,
        safety_exit,
    };

    tracing::debug!(
        "Run {} for agent {}: {:?} ({})",
        report.id,
        agent_id,
        report.decision.status,
        report.decision.reason
    );
    agent.push_run(report.clone());
    Ok(report)
}

/// Put a proposal on the agent's approval queue and note it on the timeline.
pub(crate) fn queue(
    user: &mut UserState,
    agent_id: &str,
    proposal: Proposal,
    details: &str,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let agent = user.agent_mut(agent_id)?;
    tracing::info!(
        "Queued {} proposal {} for agent {}: {}",
        proposal.kind().as_str(),
        proposal.id,
        agent_id,
        details
    );
    agent.push_event(AgentEvent::new(
        now,
        "run",
        &format!("Queued {} for approval", proposal.kind().as_str()),
        details,
        Severity::Info,
    ));
    agent.enqueue_approval(proposal);
    Ok(())
}
