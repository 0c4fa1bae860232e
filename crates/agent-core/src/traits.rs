use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;

use crate::AuditEntry;

/// Spot price lookup for assets held or traded by agents.
///
/// Implementations must fail closed: an unknown asset or a non-positive
/// quote is reported as `None`, which callers treat as a price of zero.
pub trait PriceOracle {
    fn price(&self, asset: &str) -> Option<Decimal>;

    /// Price for `asset`, or zero when unavailable.
    fn price_or_zero(&self, asset: &str) -> Decimal {
        self.price(asset)
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Asset id -> spot price in USDC.
pub type PriceMap = HashMap<String, Decimal>;

impl PriceOracle for HashMap<String, Decimal> {
    fn price(&self, asset: &str) -> Option<Decimal> {
        self.get(asset).copied().filter(|p| *p > Decimal::ZERO)
    }
}

impl PriceOracle for BTreeMap<String, Decimal> {
    fn price(&self, asset: &str) -> Option<Decimal> {
        self.get(asset).copied().filter(|p| *p > Decimal::ZERO)
    }
}

/// Destination for structured audit entries (proposals, approvals, exits).
pub trait AuditSink {
    fn record(&mut self, entry: AuditEntry);
}

/// Source of the random draws used when drafting proposals.
pub trait RandomSource {
    /// Uniform draw in `[0, 1)`.
    fn next_unit(&mut self) -> f64;

    /// Uniform index in `0..len`. Returns 0 when `len` is 0.
    fn pick_index(&mut self, len: usize) -> usize;
}
