pub mod models;
pub mod portfolio;
pub mod shared_math;
pub mod trades;

pub use models::*;
pub use portfolio::{apply_trade, liquidate, portfolio_value, position_values};
pub use trades::{trade_totals, trades_on, trades_today, TradeTotals};
