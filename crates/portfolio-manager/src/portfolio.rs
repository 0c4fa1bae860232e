use std::collections::BTreeMap;

use agent_core::{Portfolio, PriceOracle, TradeRecord, TradeSide, POSITION_EPSILON};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::*;

/// Cash plus every position marked at the oracle price (missing quotes count as zero).
pub fn portfolio_value(portfolio: &Portfolio, prices: &dyn PriceOracle) -> Decimal {
    let held: Decimal = portfolio
        .positions
        .iter()
        .filter(|(_, q)| q.abs() >= POSITION_EPSILON)
        .map(|(asset, q)| *q * prices.price_or_zero(asset))
        .sum();
    portfolio.cash_usdc + held
}

/// Market value per held asset.
pub fn position_values(portfolio: &Portfolio, prices: &dyn PriceOracle) -> BTreeMap<String, Decimal> {
    portfolio
        .positions
        .iter()
        .filter(|(_, q)| q.abs() >= POSITION_EPSILON)
        .map(|(asset, q)| (asset.clone(), *q * prices.price_or_zero(asset)))
        .collect()
}

/// Apply a practice trade atomically.
///
/// Every check runs before anything is written, so a rejected order leaves
/// cash, positions and the trade log exactly as they were.
pub fn apply_trade(
    portfolio: &mut Portfolio,
    order: &TradeOrder,
    ts: DateTime<Utc>,
) -> Result<TradeFill, TradeRejection> {
    if order.qty <= Decimal::ZERO || order.price <= Decimal::ZERO || order.asset.trim().is_empty() {
        return Err(TradeRejection::InvalidParameters);
    }

    let notional = order.notional();
    let held = portfolio.position(&order.asset);

    match order.side {
        TradeSide::Buy => {
            if portfolio.cash_usdc < notional {
                return Err(TradeRejection::InsufficientCash {
                    needed: notional,
                    available: portfolio.cash_usdc,
                });
            }
            portfolio.cash_usdc -= notional;
            portfolio.positions.insert(order.asset.clone(), held + order.qty);
        }
        TradeSide::Sell => {
            if held < order.qty {
                return Err(TradeRejection::InsufficientPosition {
                    needed: order.qty,
                    held,
                });
            }
            portfolio.cash_usdc += notional;
            portfolio.positions.insert(order.asset.clone(), held - order.qty);
        }
    }
    portfolio.prune_dust();

    let trade = TradeRecord {
        ts: Some(ts),
        side: order.side,
        asset: order.asset.clone(),
        qty: order.qty,
        price: order.price,
        cash: notional,
        source: order.source.clone(),
    };
    portfolio.push_trade(trade.clone());

    tracing::debug!(
        "Applied {} {} {} @ {} (cash now {})",
        order.side,
        order.qty,
        order.asset,
        order.price,
        portfolio.cash_usdc
    );

    Ok(TradeFill {
        trade,
        notional,
        cash_after: portfolio.cash_usdc,
    })
}

/// Close every non-zero position into cash at current prices.
///
/// Positions without a quote are still closed; they are reported in
/// `unpriced` and add nothing to cash.
pub fn liquidate(portfolio: &mut Portfolio, prices: &dyn PriceOracle) -> Liquidation {
    let mut out = Liquidation::default();

    for (asset, qty) in std::mem::take(&mut portfolio.positions) {
        if qty.abs() < POSITION_EPSILON {
            continue;
        }
        match prices.price(&asset) {
            Some(px) => {
                let proceeds = qty * px;
                portfolio.cash_usdc += proceeds;
                out.proceeds += proceeds;
            }
            None => {
                tracing::warn!("No price for {} during liquidation, closed at zero", asset);
                out.unpriced.push(asset);
            }
        }
        out.assets_sold += 1;
    }

    out
}
