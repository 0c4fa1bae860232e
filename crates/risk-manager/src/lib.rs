pub mod manager;
pub mod models;

pub use manager::{set_fraud_alert, set_safety_enabled, trigger_panic, SafetyMonitor};
pub use models::*;
