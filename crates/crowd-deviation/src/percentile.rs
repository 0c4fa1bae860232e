/// Midrank percentile of `x` within `values`, in `[0, 100]`.
///
/// `rank = below + (equal - 1) / 2` when `x` occurs in `values`, else
/// `below`; the percentile is `rank / (n - 1) * 100`. A cohort of one or
/// none carries no signal and yields 50.
pub fn percentile_rank(values: &[f64], x: f64) -> f64 {
    let n = values.len();
    if n <= 1 {
        return 50.0;
    }
    let below = values.iter().filter(|v| **v < x).count() as f64;
    let equal = values.iter().filter(|v| **v == x).count() as f64;
    let rank = if equal > 0.0 {
        below + (equal - 1.0) / 2.0
    } else {
        below
    };
    (rank / (n as f64 - 1.0) * 100.0).clamp(0.0, 100.0)
}
