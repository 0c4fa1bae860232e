use agent_core::{
    AgentEvent, AuditEntry, AuditKind, EngineError, Proposal, ProposalAction, ProposalStatus,
    Severity, UserState,
};
use portfolio_manager::{apply_trade, TradeFill, TradeOrder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::copying::{apply_copy, CopyOutcome};
use crate::payments::authorize_payment;
use crate::proposal::ProposalGenerator;
use crate::run_cycle::{queue, CycleContext};
use crate::trust::agent_deviation;

/// What approving a proposal actually did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Resolution {
    Traded { fill: TradeFill },
    TradeFailed { reason: String },
    Copied { outcome: CopyOutcome },
    /// Authorized by the payment policy; confirmed by the caller's payment flow.
    AwaitingPayment,
    PaymentDenied { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub proposal: Proposal,
    pub resolution: Resolution,
}

/// Remove a queued proposal and carry it out.
pub fn approve_proposal(
    user: &mut UserState,
    agent_id: &str,
    proposal_id: &str,
    ctx: &mut CycleContext<'_>,
) -> Result<Approval, EngineError> {
    let now = ctx.now;
    let mut proposal = user
        .agent_mut(agent_id)?
        .take_approval(proposal_id)
        .ok_or_else(|| EngineError::UnknownProposal(proposal_id.to_string()))?;
    proposal.status = ProposalStatus::Approved;

    let resolution = match &proposal.action {
        ProposalAction::Trade { asset, side, qty } => {
            let price = ctx.prices.price_or_zero(asset);
            let agent = user.agent_mut(agent_id)?;
            if price.is_zero() {
                Resolution::TradeFailed {
                    reason: "Missing live price".to_string(),
                }
            } else {
                let order = TradeOrder::new(*side, asset.clone(), *qty, price);
                match apply_trade(&mut agent.portfolio, &order, now) {
                    Ok(fill) => {
                        proposal.status = ProposalStatus::Executed;
                        Resolution::Traded { fill }
                    }
                    Err(e) => Resolution::TradeFailed {
                        reason: e.to_string(),
                    },
                }
            }
        }
        ProposalAction::Copy {
            mode,
            source_agent_id,
        } => {
            let outcome = apply_copy(
                user,
                agent_id,
                source_agent_id.as_deref(),
                *mode,
                now,
                ctx.prices,
                ctx.audit,
            )?;
            if outcome.applied {
                proposal.status = ProposalStatus::Executed;
            }
            Resolution::Copied { outcome }
        }
        ProposalAction::Payment { amount_usdc, .. } => {
            let policy = user.policy_for(user.agent(agent_id)?);
            let crowd_score = user.crowd_score;
            match authorize_payment(&policy, crowd_score, &mut user.payments, *amount_usdc, now) {
                Ok(_) => Resolution::AwaitingPayment,
                Err(denial) => Resolution::PaymentDenied {
                    reason: denial.to_string(),
                },
            }
        }
    };

    let (severity, details) = match &resolution {
        Resolution::Traded { fill } => (
            Severity::Success,
            format!("notional=${:.2} cash=${:.2}", fill.notional, fill.cash_after),
        ),
        Resolution::TradeFailed { reason } => (Severity::Warning, reason.clone()),
        Resolution::Copied { outcome } => (
            if outcome.applied {
                Severity::Success
            } else {
                Severity::Warning
            },
            outcome.message.clone(),
        ),
        Resolution::AwaitingPayment => (Severity::Info, "Awaiting payment confirmation".to_string()),
        Resolution::PaymentDenied { reason } => (Severity::Warning, reason.clone()),
    };

    tracing::info!(
        "Approved proposal {} for agent {}: {}",
        proposal.id,
        agent_id,
        details
    );
    ctx.audit.record(
        AuditEntry::new(
            now,
            AuditKind::Approve,
            agent_id,
            format!("Approved {}: {}", proposal.title, details),
        )
        .severity(severity)
        .proposal(proposal.id.clone())
        .meta(json!({ "kind": proposal.kind(), "status": proposal.status })),
    );
    user.agent_mut(agent_id)?.push_event(AgentEvent::new(
        now,
        "approval",
        &format!("Approved: {}", proposal.title),
        &details,
        severity,
    ));

    Ok(Approval {
        proposal,
        resolution,
    })
}

/// Remove a queued proposal without acting on it.
pub fn reject_proposal(
    user: &mut UserState,
    agent_id: &str,
    proposal_id: &str,
    ctx: &mut CycleContext<'_>,
) -> Result<Proposal, EngineError> {
    let agent = user.agent_mut(agent_id)?;
    let mut proposal = agent
        .take_approval(proposal_id)
        .ok_or_else(|| EngineError::UnknownProposal(proposal_id.to_string()))?;
    proposal.status = ProposalStatus::Rejected;

    tracing::info!("Rejected proposal {} for agent {}", proposal.id, agent_id);
    agent.push_event(AgentEvent::new(
        ctx.now,
        "approval",
        &format!("Rejected: {}", proposal.title),
        "",
        Severity::Info,
    ));
    ctx.audit.record(
        AuditEntry::new(
            ctx.now,
            AuditKind::Reject,
            agent_id,
            format!("Rejected {}", proposal.title),
        )
        .proposal(proposal.id.clone()),
    );

    Ok(proposal)
}

/// Draft a proposal and queue it for approval without running a cycle.
pub fn propose_only(
    user: &mut UserState,
    agent_id: &str,
    watchlist: &[String],
    ctx: &mut CycleContext<'_>,
) -> Result<Proposal, EngineError> {
    let deviation = agent_deviation(user, agent_id, ctx.prices, ctx.now)?;
    let proposal = ProposalGenerator::new(watchlist).draft(
        user,
        agent_id,
        deviation.deviation_pct,
        ctx.now,
        ctx.rng,
        ctx.audit,
    )?;
    let title = proposal.title.clone();
    queue(user, agent_id, proposal.clone(), &title, ctx.now)?;
    Ok(proposal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{AuditLog, AutonomyMode, PriceMap, ProposalKind, ScriptedRandom};
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 15, 30, 0).unwrap()
    }

    fn watchlist() -> Vec<String> {
        vec!["solana".into()]
    }

    fn prices() -> PriceMap {
        let mut p = PriceMap::new();
        p.insert("solana".into(), dec!(100));
        p
    }

    fn queued(user: &mut UserState, id: &str, draws: &[f64], audit: &mut AuditLog) -> Proposal {
        let prices = prices();
        let mut rng = ScriptedRandom::new(draws.iter().copied());
        let mut ctx = CycleContext {
            now: now(),
            prices: &prices,
            rng: &mut rng,
            audit,
        };
        propose_only(user, id, &watchlist(), &mut ctx).unwrap()
    }

    #[test]
    fn propose_only_enqueues_once() {
        let mut user = UserState::new(now(), dec!(1000));
        let id = user.agents[0].id.clone();
        let mut audit = AuditLog::new();

        let p = queued(&mut user, &id, &[0.5, 0.0, 0.0], &mut audit);

        let agent = user.agent(&id).unwrap();
        assert_eq!(agent.approvals.len(), 1);
        assert_eq!(agent.approvals[0].id, p.id);
        assert!(agent.runs.is_empty());
        assert_eq!(audit.len(), 1);
    }

    #[test]
    fn approving_trade_applies_at_oracle_price() {
        let mut user = UserState::new(now(), dec!(1000));
        user.agents[0].mode = AutonomyMode::Assist;
        let id = user.agents[0].id.clone();
        let mut audit = AuditLog::new();
        let p = queued(&mut user, &id, &[0.5, 0.0, 0.0], &mut audit);

        let prices = prices();
        let mut rng = ScriptedRandom::new(Vec::new());
        let mut ctx = CycleContext {
            now: now(),
            prices: &prices,
            rng: &mut rng,
            audit: &mut audit,
        };
        let approval = approve_proposal(&mut user, &id, &p.id, &mut ctx).unwrap();

        assert_eq!(approval.proposal.status, ProposalStatus::Executed);
        match approval.resolution {
            Resolution::Traded { fill } => assert_eq!(fill.notional, dec!(2.25)),
            other => panic!("expected trade, got {other:?}"),
        }
        let agent = user.agent(&id).unwrap();
        assert!(agent.approvals.is_empty());
        assert_eq!(agent.portfolio.cash_usdc, dec!(997.75));
        assert_eq!(audit.entries()[0].kind, AuditKind::Approve);
        assert_eq!(audit.for_proposal(&p.id).count(), 2);
    }

    #[test]
    fn approving_failed_trade_leaves_portfolio() {
        let mut user = UserState::new(now(), dec!(1000));
        let id = user.agents[0].id.clone();
        let mut audit = AuditLog::new();
        // SELL with nothing held
        let p = queued(&mut user, &id, &[0.5, 0.0, 0.9], &mut audit);

        let prices = prices();
        let mut rng = ScriptedRandom::new(Vec::new());
        let mut ctx = CycleContext {
            now: now(),
            prices: &prices,
            rng: &mut rng,
            audit: &mut audit,
        };
        let approval = approve_proposal(&mut user, &id, &p.id, &mut ctx).unwrap();

        assert_eq!(
            approval.resolution,
            Resolution::TradeFailed {
                reason: "Insufficient position for SELL".into()
            }
        );
        assert_eq!(approval.proposal.status, ProposalStatus::Approved);
        assert_eq!(user.agent(&id).unwrap().portfolio.cash_usdc, dec!(1000));
    }

    #[test]
    fn approving_payment_hands_back_to_caller() {
        let mut user = UserState::new(now(), dec!(1000));
        let id = user.agents[0].id.clone();
        let mut audit = AuditLog::new();
        let p = queued(&mut user, &id, &[0.99], &mut audit);
        assert_eq!(p.kind(), ProposalKind::Payment);

        let prices = prices();
        let mut rng = ScriptedRandom::new(Vec::new());
        let mut ctx = CycleContext {
            now: now(),
            prices: &prices,
            rng: &mut rng,
            audit: &mut audit,
        };
        let approval = approve_proposal(&mut user, &id, &p.id, &mut ctx).unwrap();

        assert_eq!(approval.resolution, Resolution::AwaitingPayment);
        assert_eq!(user.agent(&id).unwrap().portfolio.cash_usdc, dec!(1000));
    }

    #[test]
    fn approving_payment_over_cap_is_denied() {
        let mut user = UserState::new(now(), dec!(1000));
        user.agents[0].policy.risk = Some(100.0);
        let id = user.agents[0].id.clone();
        let mut audit = AuditLog::new();
        let p = queued(&mut user, &id, &[0.99], &mut audit);

        let prices = prices();
        let mut rng = ScriptedRandom::new(Vec::new());
        let mut ctx = CycleContext {
            now: now(),
            prices: &prices,
            rng: &mut rng,
            audit: &mut audit,
        };
        let approval = approve_proposal(&mut user, &id, &p.id, &mut ctx).unwrap();

        // 0.15 against the default 0.10 cap at crowd score 50
        assert_eq!(
            approval.resolution,
            Resolution::PaymentDenied {
                reason: "Policy: max per tx is $0.10.".into()
            }
        );
        assert_eq!(approval.proposal.status, ProposalStatus::Approved);
        assert!(user.payments.total_usdc.is_zero());
        assert_eq!(audit.entries()[0].kind, AuditKind::Approve);
        assert_eq!(audit.entries()[0].severity, Severity::Warning);
    }

    #[test]
    fn second_payment_waits_for_cooldown() {
        let mut user = UserState::new(now(), dec!(1000));
        let id = user.agents[0].id.clone();
        let mut audit = AuditLog::new();
        let first = queued(&mut user, &id, &[0.99], &mut audit);
        let second = queued(&mut user, &id, &[0.99], &mut audit);

        let prices = prices();
        let mut rng = ScriptedRandom::new(Vec::new());
        let mut ctx = CycleContext {
            now: now(),
            prices: &prices,
            rng: &mut rng,
            audit: &mut audit,
        };
        let ok = approve_proposal(&mut user, &id, &first.id, &mut ctx).unwrap();
        let blocked = approve_proposal(&mut user, &id, &second.id, &mut ctx).unwrap();

        assert_eq!(ok.resolution, Resolution::AwaitingPayment);
        assert_eq!(
            blocked.resolution,
            Resolution::PaymentDenied {
                reason: "Policy: Please wait 15s.".into()
            }
        );
        assert_eq!(user.payments.total_usdc, dec!(0.08));
    }

    #[test]
    fn approving_copy_from_deleted_source_is_refused() {
        let mut user = UserState::new(now(), dec!(1000));
        let source = user.agents[0].id.clone();
        let id = user.create_agent("Follower", "", now(), dec!(1000));
        let mut audit = AuditLog::new();
        let p = queued(&mut user, &id, &[0.0, 0.0, 0.5], &mut audit);
        user.delete_agent(&source, now(), dec!(1000)).unwrap();

        let prices = prices();
        let mut rng = ScriptedRandom::new(Vec::new());
        let mut ctx = CycleContext {
            now: now(),
            prices: &prices,
            rng: &mut rng,
            audit: &mut audit,
        };
        let approval = approve_proposal(&mut user, &id, &p.id, &mut ctx).unwrap();

        match approval.resolution {
            Resolution::Copied { outcome } => {
                assert!(!outcome.applied);
                assert_eq!(outcome.message, "Source agent no longer exists.");
            }
            other => panic!("expected copy, got {other:?}"),
        }
        assert_eq!(approval.proposal.status, ProposalStatus::Approved);
        let agent = user.agent(&id).unwrap();
        assert!(agent.approvals.is_empty());
        assert_eq!(agent.events[0].title, format!("Approved: {}", p.title));
        assert_eq!(audit.entries()[0].kind, AuditKind::Approve);
    }

    #[test]
    fn approving_copy_applies_settings() {
        let mut user = UserState::new(now(), dec!(1000));
        user.agents[0].policy.risk = Some(80.0);
        let id = user.create_agent("Follower", "", now(), dec!(1000));
        let mut audit = AuditLog::new();
        // copy branch, only other agent, crowd 50 with r=0.5 -> copy settings
        let p = queued(&mut user, &id, &[0.0, 0.0, 0.5], &mut audit);

        let prices = prices();
        let mut rng = ScriptedRandom::new(Vec::new());
        let mut ctx = CycleContext {
            now: now(),
            prices: &prices,
            rng: &mut rng,
            audit: &mut audit,
        };
        let approval = approve_proposal(&mut user, &id, &p.id, &mut ctx).unwrap();

        match approval.resolution {
            Resolution::Copied { outcome } => assert!(outcome.applied),
            other => panic!("expected copy, got {other:?}"),
        }
        assert_eq!(user.agent(&id).unwrap().policy.risk, Some(80.0));
    }

    #[test]
    fn reject_removes_and_audits() {
        let mut user = UserState::new(now(), dec!(1000));
        let id = user.agents[0].id.clone();
        let mut audit = AuditLog::new();
        let p = queued(&mut user, &id, &[0.99], &mut audit);

        let prices = prices();
        let mut rng = ScriptedRandom::new(Vec::new());
        let mut ctx = CycleContext {
            now: now(),
            prices: &prices,
            rng: &mut rng,
            audit: &mut audit,
        };
        let rejected = reject_proposal(&mut user, &id, &p.id, &mut ctx).unwrap();
        assert_eq!(rejected.status, ProposalStatus::Rejected);
        assert!(user.agent(&id).unwrap().approvals.is_empty());

        let again = reject_proposal(&mut user, &id, &p.id, &mut ctx);
        assert_eq!(again.unwrap_err(), EngineError::UnknownProposal(p.id.clone()));
        assert_eq!(audit.entries()[0].kind, AuditKind::Reject);
    }
}
