use agent_core::{
    AgentEvent, AuditEntry, AuditKind, AuditSink, CopyMode, EngineError, PriceOracle, Severity,
    UserState,
};
use chrono::{DateTime, Utc};
use portfolio_manager::{apply_trade, TradeOrder, TradeRejection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyOutcome {
    pub mode: CopyMode,
    pub applied: bool,
    pub message: String,
}

impl CopyOutcome {
    fn applied(mode: CopyMode, message: &str) -> Self {
        Self {
            mode,
            applied: true,
            message: message.to_string(),
        }
    }

    fn refused(mode: CopyMode, message: &str) -> Self {
        Self {
            mode,
            applied: false,
            message: message.to_string(),
        }
    }
}

/// Copy rules, strategy or the latest trade from `source_id` onto `dest_id`.
///
/// Refusals (no source or a deleted one, nothing to mirror, insufficient
/// funds) come back as an outcome with `applied == false`. Only an unknown
/// destination is an error.
pub fn apply_copy(
    user: &mut UserState,
    dest_id: &str,
    source_id: Option<&str>,
    mode: CopyMode,
    now: DateTime<Utc>,
    prices: &dyn PriceOracle,
    audit: &mut dyn AuditSink,
) -> Result<CopyOutcome, EngineError> {
    user.agent(dest_id)?;
    let source = match source_id {
        Some(id) if id != dest_id => match user.agent(id) {
            Ok(source) => source.clone(),
            Err(_) => {
                return Ok(record(
                    user,
                    dest_id,
                    None,
                    CopyOutcome::refused(mode, "Source agent no longer exists."),
                    now,
                    audit,
                ))
            }
        },
        _ => {
            return Ok(record(
                user,
                dest_id,
                None,
                CopyOutcome::refused(mode, "No source agent to copy from."),
                now,
                audit,
            ))
        }
    };

    let dest = user.agent_mut(dest_id)?;
    let outcome = match mode {
        CopyMode::CopySettings => {
            dest.policy = source.policy.clone();
            dest.push_event(AgentEvent::new(
                now,
                "copy",
                "Copied rules/settings",
                &format!("mode=copy_settings from {}", source.bot_id),
                Severity::Success,
            ));
            CopyOutcome::applied(mode, "Copied settings.")
        }
        CopyMode::CopyStrategy => {
            dest.strategy.name = source.strategy.name.clone();
            dest.strategy.params = source.strategy.params.clone();
            dest.strategy.copied_from = Some(source.bot_id.clone());
            dest.push_event(AgentEvent::new(
                now,
                "copy",
                "Copied strategy/model",
                &format!("mode=copy_strategy from {}", source.bot_id),
                Severity::Success,
            ));
            CopyOutcome::applied(mode, "Copied strategy.")
        }
        CopyMode::MirrorTrades => match source.portfolio.trades.first() {
            None => CopyOutcome::refused(mode, "Source agent has no trades to mirror."),
            Some(last) => {
                let price = prices
                    .price(&last.asset)
                    .filter(|p| *p > Decimal::ZERO)
                    .unwrap_or(last.price);
                if price <= Decimal::ZERO {
                    CopyOutcome::refused(mode, "No price available to mirror trade.")
                } else {
                    let order = TradeOrder::new(last.side, last.asset.clone(), last.qty, price)
                        .mirrored_from(source.bot_id.clone());
                    match apply_trade(&mut dest.portfolio, &order, now) {
                        Ok(_) => {
                            dest.push_event(AgentEvent::new(
                                now,
                                "copy",
                                "Mirrored trade",
                                &format!("{} {} from {}", last.side, last.asset, source.bot_id),
                                Severity::Success,
                            ));
                            CopyOutcome::applied(mode, "Mirrored latest trade.")
                        }
                        Err(TradeRejection::InsufficientCash { .. }) => {
                            CopyOutcome::refused(mode, "Not enough cash to mirror BUY trade.")
                        }
                        Err(TradeRejection::InsufficientPosition { .. }) => {
                            CopyOutcome::refused(mode, "Not enough position to mirror SELL trade.")
                        }
                        Err(e) => CopyOutcome::refused(mode, &e.to_string()),
                    }
                }
            }
        },
    };

    Ok(record(user, dest_id, Some(source.bot_id.as_str()), outcome, now, audit))
}

fn record(
    user: &mut UserState,
    dest_id: &str,
    source_bot_id: Option<&str>,
    outcome: CopyOutcome,
    now: DateTime<Utc>,
    audit: &mut dyn AuditSink,
) -> CopyOutcome {
    if outcome.applied {
        tracing::info!("Agent {} {} ({})", dest_id, outcome.message, outcome.mode.label());
    } else {
        tracing::warn!("Copy for agent {} not applied: {}", dest_id, outcome.message);
        if let Ok(dest) = user.agent_mut(dest_id) {
            dest.push_event(AgentEvent::new(
                now,
                "copy",
                "Copy not applied",
                &outcome.message,
                Severity::Warning,
            ));
        }
    }

    audit.record(
        AuditEntry::new(
            now,
            AuditKind::Copy,
            dest_id,
            format!("Copy {}: {}", outcome.mode.label(), outcome.message),
        )
        .severity(if outcome.applied {
            Severity::Success
        } else {
            Severity::Warning
        })
        .meta(json!({ "mode": outcome.mode, "source": source_bot_id })),
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{AuditLog, PolicyOverrides, PriceMap, TradeRecord, TradeSide};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
    }

    /// Returns (user, dest id, source id).
    fn pair() -> (UserState, String, String) {
        let mut user = UserState::new(now(), dec!(1000));
        let dest = user.agents[0].id.clone();
        let source = user.create_agent("Leader", "", now(), dec!(1000));
        (user, dest, source)
    }

    fn last_trade(side: TradeSide, qty: Decimal, price: Decimal) -> TradeRecord {
        TradeRecord {
            ts: Some(now()),
            side,
            asset: "ethereum".into(),
            qty,
            price,
            cash: qty * price,
            source: None,
        }
    }

    #[test]
    fn copy_settings_replaces_overrides() {
        let (mut user, dest, source) = pair();
        user.agent_mut(&source).unwrap().policy = PolicyOverrides {
            risk: Some(70.0),
            max_deviation_pct: Some(35.0),
            ..Default::default()
        };
        let mut audit = AuditLog::new();

        let out = apply_copy(
            &mut user,
            &dest,
            Some(&source),
            CopyMode::CopySettings,
            now(),
            &PriceMap::new(),
            &mut audit,
        )
        .unwrap();

        assert!(out.applied);
        assert_eq!(out.message, "Copied settings.");
        let d = user.agent(&dest).unwrap();
        assert_eq!(d.policy.risk, Some(70.0));
        assert_eq!(user.policy_for(d).max_deviation_pct, 35.0);
        assert_eq!(d.events[0].title, "Copied rules/settings");
        assert_eq!(audit.entries()[0].kind, AuditKind::Copy);
    }

    #[test]
    fn copy_strategy_records_source_bot() {
        let (mut user, dest, source) = pair();
        user.agent_mut(&source).unwrap().strategy.name = "Momentum".into();
        let bot = user.agent(&source).unwrap().bot_id.clone();
        let mut audit = AuditLog::new();

        apply_copy(
            &mut user,
            &dest,
            Some(&source),
            CopyMode::CopyStrategy,
            now(),
            &PriceMap::new(),
            &mut audit,
        )
        .unwrap();

        let d = user.agent(&dest).unwrap();
        assert_eq!(d.strategy.name, "Momentum");
        assert_eq!(d.strategy.copied_from.as_deref(), Some(bot.as_str()));
    }

    #[test]
    fn mirror_uses_oracle_price_and_tags_source() {
        let (mut user, dest, source) = pair();
        user.agent_mut(&source)
            .unwrap()
            .portfolio
            .push_trade(last_trade(TradeSide::Buy, dec!(0.1), dec!(2000)));
        let bot = user.agent(&source).unwrap().bot_id.clone();
        let mut prices = PriceMap::new();
        prices.insert("ethereum".into(), dec!(3000));
        let mut audit = AuditLog::new();

        let out = apply_copy(
            &mut user,
            &dest,
            Some(&source),
            CopyMode::MirrorTrades,
            now(),
            &prices,
            &mut audit,
        )
        .unwrap();

        assert!(out.applied);
        let d = user.agent(&dest).unwrap();
        assert_eq!(d.portfolio.cash_usdc, dec!(700));
        assert_eq!(d.portfolio.position("ethereum"), dec!(0.1));
        assert_eq!(d.portfolio.trades[0].source.as_deref(), Some(bot.as_str()));
    }

    #[test]
    fn mirror_falls_back_to_trade_price() {
        let (mut user, dest, source) = pair();
        user.agent_mut(&source)
            .unwrap()
            .portfolio
            .push_trade(last_trade(TradeSide::Buy, dec!(0.1), dec!(2000)));
        let mut audit = AuditLog::new();

        apply_copy(
            &mut user,
            &dest,
            Some(&source),
            CopyMode::MirrorTrades,
            now(),
            &PriceMap::new(),
            &mut audit,
        )
        .unwrap();

        assert_eq!(user.agent(&dest).unwrap().portfolio.cash_usdc, dec!(800));
    }

    #[test]
    fn mirror_refusals_leave_portfolio_untouched() {
        let (mut user, dest, source) = pair();
        let mut audit = AuditLog::new();
        let prices = PriceMap::new();

        let out = apply_copy(&mut user, &dest, Some(source.as_str()), CopyMode::MirrorTrades, now(), &prices, &mut audit)
            .unwrap();
        assert!(!out.applied);
        assert_eq!(out.message, "Source agent has no trades to mirror.");

        user.agent_mut(&source)
            .unwrap()
            .portfolio
            .push_trade(last_trade(TradeSide::Sell, dec!(1), dec!(50)));
        let out = apply_copy(&mut user, &dest, Some(source.as_str()), CopyMode::MirrorTrades, now(), &prices, &mut audit)
            .unwrap();
        assert_eq!(out.message, "Not enough position to mirror SELL trade.");

        user.agent_mut(&source)
            .unwrap()
            .portfolio
            .push_trade(last_trade(TradeSide::Buy, dec!(1), dec!(5000)));
        let out = apply_copy(&mut user, &dest, Some(source.as_str()), CopyMode::MirrorTrades, now(), &prices, &mut audit)
            .unwrap();
        assert_eq!(out.message, "Not enough cash to mirror BUY trade.");

        user.agent_mut(&source)
            .unwrap()
            .portfolio
            .push_trade(last_trade(TradeSide::Buy, dec!(1), Decimal::ZERO));
        let out = apply_copy(&mut user, &dest, Some(source.as_str()), CopyMode::MirrorTrades, now(), &prices, &mut audit)
            .unwrap();
        assert!(!out.applied);

        let d = user.agent(&dest).unwrap();
        assert_eq!(d.portfolio.cash_usdc, dec!(1000));
        assert!(d.portfolio.trades.is_empty());
        assert_eq!(audit.len(), 4);
    }

    #[test]
    fn missing_source_is_refused_and_unknown_dest_errors() {
        let (mut user, dest, _) = pair();
        let mut audit = AuditLog::new();
        let prices = PriceMap::new();

        let out = apply_copy(&mut user, &dest, None, CopyMode::CopySettings, now(), &prices, &mut audit)
            .unwrap();
        assert!(!out.applied);

        let out = apply_copy(&mut user, &dest, Some(&dest.clone()), CopyMode::CopySettings, now(), &prices, &mut audit)
            .unwrap();
        assert!(!out.applied);

        assert!(apply_copy(&mut user, "ghost", None, CopyMode::CopySettings, now(), &prices, &mut audit).is_err());
    }

    #[test]
    fn deleted_source_is_refused() {
        let (mut user, dest, source) = pair();
        user.delete_agent(&source, now(), dec!(1000)).unwrap();
        let mut audit = AuditLog::new();
        let prices = PriceMap::new();

        let out = apply_copy(&mut user, &dest, Some(source.as_str()), CopyMode::MirrorTrades, now(), &prices, &mut audit)
            .unwrap();

        assert!(!out.applied);
        assert_eq!(out.message, "Source agent no longer exists.");
        let d = user.agent(&dest).unwrap();
        assert_eq!(d.events[0].title, "Copy not applied");
        assert_eq!(audit.entries()[0].kind, AuditKind::Copy);
    }
}
