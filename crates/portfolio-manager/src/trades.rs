use agent_core::{TradeRecord, TradeSide};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Trades stamped on `date` (UTC). Untimestamped trades never match.
pub fn trades_on(trades: &[TradeRecord], date: NaiveDate) -> impl Iterator<Item = &TradeRecord> {
    trades
        .iter()
        .filter(move |t| t.ts.map(|ts| ts.date_naive() == date).unwrap_or(false))
}

/// Number of trades executed on the same UTC date as `now`.
pub fn trades_today(trades: &[TradeRecord], now: DateTime<Utc>) -> u32 {
    trades_on(trades, now.date_naive()).count() as u32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTotals {
    pub total: usize,
    pub buys: usize,
    pub sells: usize,
}

pub fn trade_totals(trades: &[TradeRecord]) -> TradeTotals {
    trades.iter().fold(TradeTotals::default(), |mut acc, t| {
        acc.total += 1;
        match t.side {
            TradeSide::Buy => acc.buys += 1,
            TradeSide::Sell => acc.sells += 1,
        }
        acc
    })
}
