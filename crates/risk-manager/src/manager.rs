use agent_core::{
    Agent, AgentEvent, AuditEntry, AuditKind, AuditSink, PriceOracle, SafetyExit, SafetyState,
    Severity, ValueSnapshot,
};
use analytics::{upsert_snapshot, value_at};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use portfolio_manager::{liquidate, portfolio_value};
use rust_decimal::prelude::*;
use serde_json::json;

use crate::models::*;

/// Evaluates exit triggers for one agent and force-liquidates when one fires.
pub struct SafetyMonitor<'a> {
    prices: &'a dyn PriceOracle,
}

impl<'a> SafetyMonitor<'a> {
    pub fn new(prices: &'a dyn PriceOracle) -> Self {
        Self { prices }
    }

    /// Run every safety check for `agent`, exiting on the first trigger.
    pub fn check(
        &self,
        agent: &mut Agent,
        now: DateTime<Utc>,
        audit: &mut dyn AuditSink,
    ) -> SafetyCheck {
        let value = portfolio_value(&agent.portfolio, self.prices);

        if !agent.safety.enabled {
            return SafetyCheck {
                outcome: SafetyOutcome::Disabled,
                value,
                peak_value: agent.safety.peak_value,
                drawdown_pct: 0.0,
            };
        }

        let drawdown_pct = update_peak(&mut agent.safety, value);
        let peak_value = agent.safety.peak_value;
        let trigger = first_trigger(
            &agent.safety,
            &agent.value_history,
            value,
            drawdown_pct,
            now.date_naive(),
        );

        let outcome = match trigger {
            Some(trigger) => {
                let exit = self.exit(agent, &trigger.reason(), now, audit);
                SafetyOutcome::Exited { trigger, exit }
            }
            None => SafetyOutcome::Clear,
        };

        SafetyCheck {
            outcome,
            value,
            peak_value,
            drawdown_pct,
        }
    }

    /// Liquidate every position into cash and record the exit.
    pub fn exit(
        &self,
        agent: &mut Agent,
        reason: &str,
        now: DateTime<Utc>,
        audit: &mut dyn AuditSink,
    ) -> SafetyExit {
        let value_at_exit = portfolio_value(&agent.portfolio, self.prices);
        let liquidation = liquidate(&mut agent.portfolio, self.prices);
        let cash = agent.portfolio.cash_usdc;

        let exit = SafetyExit {
            ts: now,
            reason: reason.to_string(),
            value_at_exit,
            assets_sold: liquidation.assets_sold,
        };

        agent.safety.panic = false;
        agent.safety.peak_value = Some(cash);
        agent.safety.last_exit = Some(exit.clone());
        upsert_snapshot(&mut agent.value_history, now.date_naive(), cash);

        tracing::warn!(
            "Safety exit for agent {}: {} (sold {} assets, value {})",
            agent.id,
            reason,
            liquidation.assets_sold,
            value_at_exit
        );

        audit.record(
            AuditEntry::new(
                now,
                AuditKind::SafetyExit,
                agent.id.clone(),
                format!("Safety exit: {}", reason),
            )
            .severity(Severity::Warning)
            .meta(json!({
                "value_at_exit": value_at_exit,
                "assets_sold": liquidation.assets_sold,
                "unpriced": liquidation.unpriced,
            })),
        );
        agent.push_event(AgentEvent::new(
            now,
            "safety",
            "Safety exit",
            &format!(
                "{} Sold {} assets into USDC.",
                reason, liquidation.assets_sold
            ),
            Severity::Danger,
        ));

        exit
    }
}

/// Raise the remembered peak if `value` exceeds it and return the current
/// drawdown from that peak in percent.
fn update_peak(safety: &mut SafetyState, value: Decimal) -> f64 {
    let peak = match safety.peak_value {
        Some(peak) if peak >= value => peak,
        _ => {
            safety.peak_value = Some(value);
            value
        }
    };
    if peak <= Decimal::ZERO {
        return 0.0;
    }
    ((peak - value) / peak * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0)
}

fn first_trigger(
    safety: &SafetyState,
    history: &[ValueSnapshot],
    value: Decimal,
    drawdown_pct: f64,
    today: NaiveDate,
) -> Option<SafetyTrigger> {
    if safety.panic {
        return Some(SafetyTrigger::Panic);
    }
    if safety.fraud_alert {
        return Some(SafetyTrigger::FraudAlert);
    }

    let limit = safety.max_daily_loss_usdc;
    if limit > Decimal::ZERO {
        if let Some(base) = value_at(history, today - Duration::days(1)) {
            let loss = base - value;
            if loss >= limit {
                return Some(SafetyTrigger::DailyLoss { loss, limit });
            }
        }
    }

    let limit_pct = safety.max_drawdown_pct;
    if limit_pct > 0.0 && drawdown_pct >= limit_pct {
        return Some(SafetyTrigger::Drawdown {
            drawdown_pct,
            limit_pct,
        });
    }

    None
}

/// Request a liquidation on the next safety check.
pub fn trigger_panic(agent: &mut Agent) {
    tracing::info!("Panic requested for agent {}", agent.id);
    agent.safety.panic = true;
}

pub fn set_fraud_alert(agent: &mut Agent, on: bool) {
    tracing::info!("Fraud alert for agent {} set to {}", agent.id, on);
    agent.safety.fraud_alert = on;
}

pub fn set_safety_enabled(agent: &mut Agent, on: bool) {
    tracing::info!("Safety exits for agent {} set to {}", agent.id, on);
    agent.safety.enabled = on;
}
