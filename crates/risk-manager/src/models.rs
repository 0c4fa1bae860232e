use agent_core::SafetyExit;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The condition that forced an exit. Checked in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum SafetyTrigger {
    Panic,
    FraudAlert,
    DailyLoss { loss: Decimal, limit: Decimal },
    Drawdown { drawdown_pct: f64, limit_pct: f64 },
}

impl SafetyTrigger {
    pub fn reason(&self) -> String {
        match self {
            SafetyTrigger::Panic => "Panic sell".to_string(),
            SafetyTrigger::FraudAlert => "Fraud alert".to_string(),
            SafetyTrigger::DailyLoss { loss, limit } => {
                format!("Auto safety exit (daily loss ${:.2} ≥ ${:.2})", loss, limit)
            }
            SafetyTrigger::Drawdown {
                drawdown_pct,
                limit_pct,
            } => format!(
                "Auto safety exit (drawdown {:.1}% ≥ {:.1}%)",
                drawdown_pct, limit_pct
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SafetyOutcome {
    /// Safety exits are switched off for this agent.
    Disabled,
    Clear,
    Exited {
        trigger: SafetyTrigger,
        exit: SafetyExit,
    },
}

/// Result of one safety evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub outcome: SafetyOutcome,
    pub value: Decimal,
    pub peak_value: Option<Decimal>,
    pub drawdown_pct: f64,
}

impl SafetyCheck {
    pub fn exit(&self) -> Option<&SafetyExit> {
        match &self.outcome {
            SafetyOutcome::Exited { exit, .. } => Some(exit),
            _ => None,
        }
    }

    pub fn fired(&self) -> bool {
        self.exit().is_some()
    }
}
