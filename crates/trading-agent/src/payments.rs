use agent_core::{PaymentLedger, Policy};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use thiserror::Error;

/// Payment limits after the crowd-score adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaymentLimits {
    pub max_per_tx_usdc: Decimal,
    pub daily_cap_usdc: Decimal,
    pub cooldown_s: u64,
}

/// Why a payment was not authorized.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaymentDenial {
    #[error("Amount must be > 0.")]
    NonPositive,

    #[error("Policy: max per tx is ${cap:.2}.")]
    PerTxCap { cap: Decimal },

    #[error("Policy: daily cap is ${cap:.2} (today: ${today:.2}).")]
    DailyCap { cap: Decimal, today: Decimal },

    #[error("Policy: Please wait {wait_s}s.")]
    Cooldown { wait_s: i64 },
}

/// `0.8 + 0.4 * score/100`, so crowd score 0 -> 0.8, 50 -> 1.0, 100 -> 1.2.
pub fn crowd_multiplier(crowd_score: f64) -> Decimal {
    let s = Decimal::from_f64(crowd_score.clamp(0.0, 100.0)).unwrap_or(dec!(50));
    (dec!(0.8) + dec!(0.4) * s / Decimal::ONE_HUNDRED).clamp(dec!(0.8), dec!(1.2))
}

pub fn effective_limits(policy: &Policy, crowd_score: f64) -> PaymentLimits {
    let boost = crowd_multiplier(crowd_score);
    PaymentLimits {
        max_per_tx_usdc: (policy.max_per_tx_usdc.max(Decimal::ZERO) * boost).round_dp(6),
        daily_cap_usdc: (policy.daily_cap_usdc.max(Decimal::ZERO) * boost).round_dp(6),
        cooldown_s: policy.cooldown_s,
    }
}

/// Check `amount` against the per-transaction cap, the daily total and the
/// cooldown. A zero cap disables that check. Commits to `ledger` on success.
pub fn authorize_payment(
    policy: &Policy,
    crowd_score: f64,
    ledger: &mut PaymentLedger,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<PaymentLimits, PaymentDenial> {
    if amount <= Decimal::ZERO {
        return Err(PaymentDenial::NonPositive);
    }
    let limits = effective_limits(policy, crowd_score);

    if limits.max_per_tx_usdc > Decimal::ZERO && amount > limits.max_per_tx_usdc {
        return Err(PaymentDenial::PerTxCap {
            cap: limits.max_per_tx_usdc,
        });
    }

    let today = ledger.total_on(now.date_naive());
    if limits.daily_cap_usdc > Decimal::ZERO && today + amount > limits.daily_cap_usdc {
        return Err(PaymentDenial::DailyCap {
            cap: limits.daily_cap_usdc,
            today,
        });
    }

    if let Some(last) = ledger.last_at {
        let elapsed = (now - last).num_seconds();
        let cooldown = limits.cooldown_s as i64;
        if cooldown > 0 && elapsed < cooldown {
            return Err(PaymentDenial::Cooldown {
                wait_s: cooldown - elapsed,
            });
        }
    }

    ledger.commit(amount, now);
    tracing::debug!(
        "Authorized payment {} USDC (today {} of {})",
        amount,
        ledger.total_usdc,
        limits.daily_cap_usdc
    );
    Ok(limits)
}
