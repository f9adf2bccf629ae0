// =============================================================================
// Moving-average recurrences
// =============================================================================
//
// Pure functions of (previous average, new sample) or (window) so each
// recurrence can be tested on its own and folded over any stream.
//
//   SMA      = (x_1 + ... + x_n) / n
//   mean     = x_1 + ((x_1 - x_1) + ... + (x_n - x_1)) / n
//   Wilder   = (prev * (n - 1) + x) / n
//   σ (pop.) = sqrt(Σ (x_i - SMA)^2 / n)
// =============================================================================

/// Sum of `values` divided by `period`.
///
/// `period` is passed separately (rather than using the number of values)
/// because RSI seeding divides an accumulated sum by the configured period.
pub fn simple_moving_average<I>(values: I, period: usize) -> f64
where
    I: IntoIterator<Item = f64>,
{
    values.into_iter().sum::<f64>() / period as f64
}

/// Arithmetic mean of `window`, anchored on its first element.
///
/// A constant window returns that value bit for bit, which a plain
/// `sum / n` does not for closes such as 1.1.  Empty windows yield 0.
pub fn window_mean(window: &[f64]) -> f64 {
    let Some(&anchor) = window.first() else {
        return 0.0;
    };
    let offset = window.iter().map(|x| x - anchor).sum::<f64>() / window.len() as f64;
    anchor + offset
}

/// One step of Wilder's smoothing with factor `1 / period`.
pub fn wilders_moving_average(period: usize, sample: f64, prev_average: f64) -> f64 {
    let period_f = period as f64;
    (prev_average * (period_f - 1.0) + sample) / period_f
}

/// Population standard deviation of `window` around `mean`.
pub fn population_std_dev(window: &[f64], mean: f64) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / window.len() as f64;
    variance.sqrt()
}
