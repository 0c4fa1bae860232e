pub mod leaderboard;
pub mod models;
pub mod performance_tracker;

pub use leaderboard::{leaderboard_rows, round_profit, score, streak_for_window};
pub use models::*;
pub use performance_tracker::{upsert_snapshot, value_at, PerformanceTracker};
