use agent_core::{
    AutonomyMode, AutonomyResolution, AutonomySettings, DeviationConstraint, TrustSignals,
    UnlockThresholds,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Map the requested level to the level trust signals allow.
pub fn resolve_effective(
    requested: AutonomyMode,
    unlock: &UnlockThresholds,
    signals: &TrustSignals,
) -> AutonomyResolution {
    let (effective, note) = match requested {
        AutonomyMode::Off => (AutonomyMode::Off, "Autonomy is OFF"),
        AutonomyMode::AutoPlus => {
            if !signals.safety_ok {
                (AutonomyMode::Assist, "Safety state requires approval")
            } else if signals.verified_receipts < unlock.min_verified_receipts {
                (AutonomyMode::Auto, "AUTO+ locked: needs verified receipt")
            } else if signals.crowd_score < unlock.min_crowd_score {
                (AutonomyMode::Auto, "AUTO+ locked: crowd score too low")
            } else if signals.deviation_pct > unlock.max_deviation_pct {
                (AutonomyMode::Assist, "AUTO+ locked: deviation too high")
            } else {
                (AutonomyMode::AutoPlus, "AUTO+ unlocked")
            }
        }
        AutonomyMode::Auto => {
            if signals.safety_ok {
                (AutonomyMode::Auto, "AUTO enabled")
            } else {
                (AutonomyMode::Assist, "Safety state requires approval")
            }
        }
        AutonomyMode::Assist => (AutonomyMode::Assist, "Approval-first"),
    };

    AutonomyResolution {
        requested,
        effective,
        note: note.to_string(),
    }
}

/// Why a trade proposal may or may not run without approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoGate {
    WithinCaps,
    ApprovalMode,
    DailyLimitReached,
    NotionalCapExceeded,
    DeviationBlocked,
    MissingPrice,
}

impl AutoGate {
    pub fn allowed(&self) -> bool {
        matches!(self, AutoGate::WithinCaps)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            AutoGate::WithinCaps => "Within auto caps",
            AutoGate::ApprovalMode => "Approval mode",
            AutoGate::DailyLimitReached => "Daily auto-trade limit reached",
            AutoGate::NotionalCapExceeded => "Trade exceeds auto notional cap",
            AutoGate::DeviationBlocked => "Policy/deviation constraint blocked auto",
            AutoGate::MissingPrice => "Missing live price",
        }
    }
}

/// Inputs to the auto-execution gate for one trade proposal.
#[derive(Debug, Clone, Copy)]
pub struct TradeGate<'a> {
    pub settings: &'a AutonomySettings,
    pub effective: AutonomyMode,
    pub price: Decimal,
    pub notional: Decimal,
    pub trades_today: u32,
    pub constraints: DeviationConstraint,
}

/// Evaluate the gates in order: autonomy level, daily count, notional cap,
/// deviation constraint, live price.
pub fn can_auto_execute(gate: &TradeGate<'_>) -> AutoGate {
    let Some(caps) = gate.settings.caps_for(gate.effective) else {
        if gate.price <= Decimal::ZERO {
            return AutoGate::MissingPrice;
        }
        return AutoGate::ApprovalMode;
    };
    if gate.trades_today >= caps.max_trades_per_day {
        return AutoGate::DailyLimitReached;
    }
    if gate.notional > caps.max_notional_usdc {
        return AutoGate::NotionalCapExceeded;
    }
    if !gate.constraints.holds() {
        return AutoGate::DeviationBlocked;
    }
    if gate.price <= Decimal::ZERO {
        return AutoGate::MissingPrice;
    }
    AutoGate::WithinCaps
}
