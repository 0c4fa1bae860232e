//! Crowd Deviation
//!
//! Compares an agent's behavior against its peer cohort. Each behavioral
//! metric is turned into a midrank percentile, and the distances from the
//! median are averaged into one deviation score.

pub mod cohort;
pub mod deviation;
pub mod metrics;
pub mod percentile;

pub use cohort::{cohort_for_agent, MIN_COHORT_SIZE};
pub use deviation::{deviation_from_percentiles, deviation_report, DeviationReport};
pub use metrics::{BehaviorMetrics, TRADES_PER_DAY_WINDOW};
pub use percentile::percentile_rank;
