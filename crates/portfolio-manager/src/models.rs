use agent_core::{TradeRecord, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request to buy or sell at a fixed price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOrder {
    pub side: TradeSide,
    pub asset: String,
    pub qty: Decimal,
    pub price: Decimal,
    /// Bot id of the agent this order mirrors, if any.
    #[serde(default)]
    pub source: Option<String>,
}

impl TradeOrder {
    pub fn new(side: TradeSide, asset: impl Into<String>, qty: Decimal, price: Decimal) -> Self {
        Self {
            side,
            asset: asset.into(),
            qty,
            price,
            source: None,
        }
    }

    pub fn mirrored_from(mut self, bot_id: impl Into<String>) -> Self {
        self.source = Some(bot_id.into());
        self
    }

    pub fn notional(&self) -> Decimal {
        self.qty * self.price
    }
}

/// A trade that was fully applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    pub trade: TradeRecord,
    pub notional: Decimal,
    pub cash_after: Decimal,
}

/// Why a trade was not applied. The portfolio is left untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeRejection {
    #[error("Invalid trade parameters")]
    InvalidParameters,

    #[error("Insufficient cash for BUY")]
    InsufficientCash { needed: Decimal, available: Decimal },

    #[error("Insufficient position for SELL")]
    InsufficientPosition { needed: Decimal, held: Decimal },
}

/// Outcome of closing every position into cash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Liquidation {
    pub assets_sold: usize,
    pub proceeds: Decimal,
    /// Assets closed without a quote; they contributed nothing to cash.
    pub unpriced: Vec<String>,
}
