use agent_core::{
    AuditEntry, AuditKind, AuditSink, CopyMode, DeviationConstraint, EngineError, Proposal,
    ProposalAction, ProposalStatus, RandomSource, TradeSide, UserState,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde_json::json;

pub const P_TRADE: f64 = 0.55;
pub const PAYMENT_RECIPIENT: &str = "treasury";

/// Branch probabilities for one draft. Always sums to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchOdds {
    pub copy: f64,
    pub trade: f64,
    pub payment: f64,
}

impl BranchOdds {
    /// Higher deviation pushes the agent toward copying the crowd.
    pub fn for_deviation(deviation_pct: f64) -> Self {
        let copy = 0.15 + ((deviation_pct - 10.0) / 60.0).max(0.0).min(0.35);
        Self {
            copy,
            trade: P_TRADE,
            payment: 1.0 - copy - P_TRADE,
        }
    }
}

fn risk_fraction(risk: f64) -> Decimal {
    Decimal::from_f64(risk).unwrap_or(Decimal::ZERO) / Decimal::ONE_HUNDRED
}

/// `0.01 + risk/100 * 0.05`, 4 decimals.
pub fn trade_qty(risk: f64) -> Decimal {
    (dec!(0.01) + risk_fraction(risk) * dec!(0.05))
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// `0.05 + risk/100 * 0.10`, 2 decimals.
pub fn payment_amount(risk: f64) -> Decimal {
    (dec!(0.05) + risk_fraction(risk) * dec!(0.10))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Copy mode heuristic. Low crowd scores lean on settings, high scores on
/// mirroring trades.
pub fn pick_copy_mode(crowd_score: f64, r: f64) -> CopyMode {
    if crowd_score < 45.0 {
        if r < 0.55 {
            CopyMode::CopySettings
        } else {
            CopyMode::CopyStrategy
        }
    } else if crowd_score > 65.0 {
        if r < 0.55 {
            CopyMode::MirrorTrades
        } else {
            CopyMode::CopyStrategy
        }
    } else if r < 0.40 {
        CopyMode::MirrorTrades
    } else if r < 0.70 {
        CopyMode::CopySettings
    } else {
        CopyMode::CopyStrategy
    }
}

pub(crate) fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}

/// Drafts one candidate action per call. Drafts are audit-logged here and
/// enqueued by the caller.
pub struct ProposalGenerator<'a> {
    watchlist: &'a [String],
}

impl<'a> ProposalGenerator<'a> {
    pub fn new(watchlist: &'a [String]) -> Self {
        Self { watchlist }
    }

    pub fn draft(
        &self,
        user: &UserState,
        agent_id: &str,
        deviation_pct: f64,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
        audit: &mut dyn AuditSink,
    ) -> Result<Proposal, EngineError> {
        let agent = user.agent(agent_id)?;
        let policy = user.policy_for(agent);
        let constraints = DeviationConstraint {
            deviation_pct,
            max_deviation_pct: policy.max_deviation_pct,
        };
        let odds = BranchOdds::for_deviation(deviation_pct);
        let r = rng.next_unit();

        let (title, action, message, meta) = if r < odds.copy {
            let others: Vec<&str> = user
                .agents
                .iter()
                .filter(|a| a.id != agent_id)
                .map(|a| a.id.as_str())
                .collect();
            let source = if others.is_empty() {
                None
            } else {
                Some(others[rng.pick_index(others.len())].to_string())
            };
            let mode = pick_copy_mode(user.crowd_score, rng.next_unit());
            (
                format!("Copy from crowd ({})", mode.label()),
                ProposalAction::Copy {
                    mode,
                    source_agent_id: source.clone(),
                },
                format!(
                    "Agent proposed COPY ({}) dev={:.1}% max={:.1}%",
                    mode.label(),
                    deviation_pct,
                    policy.max_deviation_pct
                ),
                json!({ "mode": mode, "source_agent_id": source }),
            )
        } else if r < odds.copy + odds.trade {
            let asset = self
                .watchlist
                .get(rng.pick_index(self.watchlist.len()))
                .cloned()
                .ok_or_else(|| EngineError::InvalidData("empty watchlist".to_string()))?;
            let side = [TradeSide::Buy, TradeSide::Sell][rng.pick_index(2)];
            let qty = trade_qty(policy.risk);
            (
                format!("{} {} {}", side, qty, asset),
                ProposalAction::Trade {
                    asset: asset.clone(),
                    side,
                    qty,
                },
                format!(
                    "Agent proposed TRADE {} {} qty={} dev={:.1}% max={:.1}%",
                    side, asset, qty, deviation_pct, policy.max_deviation_pct
                ),
                json!({ "asset": asset, "side": side, "qty": qty }),
            )
        } else {
            let amount = payment_amount(policy.risk);
            (
                format!("Pay {} USDC (requires confirmation)", amount),
                ProposalAction::Payment {
                    amount_usdc: amount,
                    to: PAYMENT_RECIPIENT.to_string(),
                },
                format!(
                    "Agent proposed PAYMENT amt={} dev={:.1}% max={:.1}%",
                    amount, deviation_pct, policy.max_deviation_pct
                ),
                json!({ "amount_usdc": amount, "to": PAYMENT_RECIPIENT }),
            )
        };

        let proposal = Proposal {
            id: format!("appr_{}", short_id()),
            ts: now,
            agent_id: agent_id.to_string(),
            title,
            action,
            status: ProposalStatus::Pending,
            constraints,
        };

        tracing::debug!(
            "Drafted {} proposal {} for agent {} (r={:.3})",
            proposal.kind().as_str(),
            proposal.id,
            agent_id,
            r
        );
        audit.record(
            AuditEntry::new(now, AuditKind::Proposal, agent_id, message)
                .proposal(proposal.id.clone())
                .meta(meta),
        );

        Ok(proposal)
    }
}
