use agent_core::{ValueSnapshot, VALUE_HISTORY_LIMIT};
use chrono::{Duration, NaiveDate};
use portfolio_manager::shared_math;
use rust_decimal::prelude::*;

use crate::models::{Window, WindowReturn, WindowReturns};

/// Number of trailing points used when the volatility window is too sparse.
const VOLATILITY_FALLBACK_POINTS: usize = 15;

/// Write `value` as the snapshot for `date`, replacing any entry for that date.
///
/// History stays newest-first and bounded at [`VALUE_HISTORY_LIMIT`].
pub fn upsert_snapshot(history: &mut Vec<ValueSnapshot>, date: NaiveDate, value: Decimal) {
    if let Some(existing) = history.iter_mut().find(|s| s.date == date) {
        existing.value = value;
        return;
    }
    let idx = history
        .iter()
        .position(|s| s.date < date)
        .unwrap_or(history.len());
    history.insert(idx, ValueSnapshot { date, value });
    history.truncate(VALUE_HISTORY_LIMIT);
}

/// Value of the most recent snapshot on or before `target`.
pub fn value_at(history: &[ValueSnapshot], target: NaiveDate) -> Option<Decimal> {
    history
        .iter()
        .filter(|s| s.date <= target)
        .max_by_key(|s| s.date)
        .map(|s| s.value)
}

fn window_return(base: Decimal, current: Decimal) -> WindowReturn {
    let profit = current - base;
    let return_pct = if base.is_zero() {
        0.0
    } else {
        (profit / base * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
    };
    WindowReturn { profit, return_pct }
}

/// Read-only view over one agent's value history.
pub struct PerformanceTracker<'a> {
    history: &'a [ValueSnapshot],
}

impl<'a> PerformanceTracker<'a> {
    pub fn new(history: &'a [ValueSnapshot]) -> Self {
        Self { history }
    }

    pub fn value_at(&self, target: NaiveDate) -> Option<Decimal> {
        value_at(self.history, target)
    }

    /// Oldest stored snapshot value.
    pub fn oldest_value(&self) -> Option<Decimal> {
        self.history.iter().min_by_key(|s| s.date).map(|s| s.value)
    }

    /// Profit and return against the value `window` days before `today`.
    ///
    /// Sparse history falls back to the oldest known value, and an empty
    /// history to the current value itself.
    pub fn returns_for_window(&self, window: Window, current: Decimal, today: NaiveDate) -> WindowReturn {
        let base_date = today - Duration::days(window.days());
        let base = self
            .value_at(base_date)
            .or_else(|| self.oldest_value())
            .unwrap_or(current);
        window_return(base, current)
    }

    pub fn returns_windows(&self, current: Decimal, today: NaiveDate) -> WindowReturns {
        WindowReturns {
            daily: self.returns_for_window(Window::Daily, current, today),
            weekly: self.returns_for_window(Window::Weekly, current, today),
            monthly: self.returns_for_window(Window::Monthly, current, today),
            yearly: self.returns_for_window(Window::Yearly, current, today),
        }
    }

    /// Profit and return against the oldest stored snapshot.
    pub fn since_inception(&self, current: Decimal) -> WindowReturn {
        match self.oldest_value() {
            Some(base) => window_return(base, current),
            None => WindowReturn {
                profit: Decimal::ZERO,
                return_pct: 0.0,
            },
        }
    }

    /// Chronological (oldest-first) series as floats.
    fn series(&self) -> Vec<(NaiveDate, f64)> {
        let mut out: Vec<(NaiveDate, f64)> = self
            .history
            .iter()
            .map(|s| (s.date, s.value.to_f64().unwrap_or(0.0)))
            .collect();
        out.sort_by_key(|(d, _)| *d);
        out
    }

    /// Worst peak-to-trough drop in percent across the full history.
    pub fn max_drawdown_pct(&self) -> f64 {
        let values: Vec<f64> = self.series().into_iter().map(|(_, v)| v).collect();
        shared_math::max_drawdown_pct(&values)
    }

    /// Sample standard deviation of day-over-day percent changes.
    ///
    /// A dispersion proxy over consecutive snapshots, not an annualized
    /// volatility. Uses snapshots inside the window, or the last 15 points
    /// when fewer than three fall inside it. Returns 0 below two changes.
    pub fn volatility_proxy(&self, today: NaiveDate, window_days: i64) -> f64 {
        let series = self.series();
        if series.len() < 3 {
            return 0.0;
        }
        let cutoff = today - Duration::days(window_days);
        let mut points: Vec<f64> = series
            .iter()
            .filter(|(d, _)| *d >= cutoff)
            .map(|(_, v)| *v)
            .collect();
        if points.len() < 3 {
            let start = series.len().saturating_sub(VOLATILITY_FALLBACK_POINTS);
            points = series[start..].iter().map(|(_, v)| *v).collect();
        }
        let changes = shared_math::pct_changes(&points);
        shared_math::sample_std_dev(&changes).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn snap(d: u32, v: Decimal) -> ValueSnapshot {
        ValueSnapshot { date: day(d), value: v }
    }

    #[test]
    fn upsert_twice_keeps_one_entry_with_second_value() {
        let mut hist = vec![snap(18, dec!(1000))];
        upsert_snapshot(&mut hist, day(19), dec!(1010));
        upsert_snapshot(&mut hist, day(19), dec!(990));
        assert_eq!(hist.len(), 2);
        assert_eq!(hist[0], snap(19, dec!(990)));
        assert_eq!(hist[1], snap(18, dec!(1000)));
    }

    #[test]
    fn upsert_keeps_newest_first_for_backfill() {
        let mut hist = vec![snap(19, dec!(3)), snap(10, dec!(1))];
        upsert_snapshot(&mut hist, day(15), dec!(2));
        let dates: Vec<_> = hist.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![day(19), day(15), day(10)]);
    }

    #[test]
    fn upsert_is_bounded() {
        let mut hist = Vec::new();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for i in 0..(VALUE_HISTORY_LIMIT as i64 + 20) {
            upsert_snapshot(&mut hist, start + Duration::days(i), dec!(1));
        }
        assert_eq!(hist.len(), VALUE_HISTORY_LIMIT);
        assert!(hist[0].date > hist[1].date);
    }

    #[test]
    fn value_at_picks_latest_on_or_before() {
        let hist = vec![snap(19, dec!(3)), snap(15, dec!(2)), snap(10, dec!(1))];
        assert_eq!(value_at(&hist, day(16)), Some(dec!(2)));
        assert_eq!(value_at(&hist, day(15)), Some(dec!(2)));
        assert_eq!(value_at(&hist, day(9)), None);
        assert_eq!(value_at(&[], day(9)), None);
    }

    #[test]
    fn window_falls_back_to_oldest_snapshot() {
        let hist = vec![snap(19, dec!(110)), snap(17, dec!(100))];
        let t = PerformanceTracker::new(&hist);
        let weekly = t.returns_for_window(Window::Weekly, dec!(120), day(19));
        assert_eq!(weekly.profit, dec!(20));
        assert_relative_eq!(weekly.return_pct, 20.0, epsilon = 1e-9);

        let daily = t.returns_for_window(Window::Daily, dec!(120), day(19));
        assert_eq!(daily.profit, dec!(20));
    }

    #[test]
    fn zero_baseline_gives_zero_return() {
        let hist = vec![snap(10, dec!(0))];
        let r = PerformanceTracker::new(&hist).returns_for_window(Window::Daily, dec!(50), day(19));
        assert_eq!(r.profit, dec!(50));
        assert_eq!(r.return_pct, 0.0);
    }

    #[test]
    fn since_inception_uses_oldest() {
        let hist = vec![snap(19, dec!(130)), snap(1, dec!(100))];
        let r = PerformanceTracker::new(&hist).since_inception(dec!(150));
        assert_eq!(r.profit, dec!(50));
        assert_relative_eq!(r.return_pct, 50.0, epsilon = 1e-9);
        assert_eq!(PerformanceTracker::new(&[]).since_inception(dec!(5)).profit, dec!(0));
    }

    #[test]
    fn max_drawdown_over_history() {
        let hist = vec![
            snap(4, dec!(90)),
            snap(3, dec!(80)),
            snap(2, dec!(120)),
            snap(1, dec!(100)),
        ];
        let dd = PerformanceTracker::new(&hist).max_drawdown_pct();
        assert_relative_eq!(dd, 100.0 / 3.0, epsilon = 1e-9);
        assert_eq!(PerformanceTracker::new(&hist[..1]).max_drawdown_pct(), 0.0);
    }

    /// The volatility figure is a proxy: plain sample deviation of the
    /// snapshot-to-snapshot percent changes, with no annualization factor.
    #[test]
    fn volatility_is_unannualized_proxy() {
        let hist = vec![
            snap(19, dec!(99)),
            snap(18, dec!(110)),
            snap(17, dec!(100)),
        ];
        let vol = PerformanceTracker::new(&hist).volatility_proxy(day(19), 30);
        // changes: +10%, -10%; sample sd = sqrt(200)
        assert_relative_eq!(vol, 200.0_f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn volatility_needs_three_points() {
        let hist = vec![snap(19, dec!(99)), snap(18, dec!(110))];
        assert_eq!(PerformanceTracker::new(&hist).volatility_proxy(day(19), 30), 0.0);
    }

    #[test]
    fn volatility_falls_back_to_recent_points_when_window_sparse() {
        let hist = vec![
            snap(3, dec!(121)),
            snap(2, dec!(110)),
            snap(1, dec!(100)),
        ];
        let today = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let vol = PerformanceTracker::new(&hist).volatility_proxy(today, 30);
        // +10%, +10%: no dispersion
        assert_relative_eq!(vol, 0.0, epsilon = 1e-9);
    }
}
