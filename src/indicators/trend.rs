// =============================================================================
// Trend — linear regression slope of a smoothed price series, in pips
// =============================================================================
//
// A trend SMA series is regressed against its index (least squares); the
// resulting per-bar slope is converted to pips by dividing by `pip_size`.
// Direction is "up"/"down" once the per-bar pip move clears `threshold_pips`,
// otherwise "flat".
// =============================================================================

use crate::types::TrendReading;

/// Ordinary least squares slope of `values` against `0..values.len()`.
/// `None` if fewer than 2 points or the fit is degenerate.
fn linear_regression_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n_f;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n {
        let dx = xs[i] - x_mean;
        num += dx * (values[i] - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        return None;
    }
    let slope = num / den;
    slope.is_finite().then_some(slope)
}

/// Compute a trend reading from a window of the trend-SMA series.
///
/// `sma_series` should be the trailing `trend_window` non-NaN values of the
/// configured trend SMA, oldest first. Returns `ready: false` until the
/// window is full.
pub fn calculate_trend(sma_series: &[f64], trend_window: usize, pip_size: f64, threshold_pips: f64) -> TrendReading {
    if trend_window == 0 || sma_series.len() < trend_window || pip_size <= 0.0 {
        let mut reading = TrendReading::not_ready();
        reading.window = trend_window;
        return reading;
    }
    let window = &sma_series[sma_series.len() - trend_window..];
    let Some(slope) = linear_regression_slope(window) else {
        let mut reading = TrendReading::not_ready();
        reading.window = trend_window;
        return reading;
    };

    let slope_pips = slope / pip_size;
    let direction = if slope_pips >= threshold_pips {
        "up"
    } else if slope_pips <= -threshold_pips {
        "down"
    } else {
        "flat"
    };

    TrendReading {
        method: "regression",
        window: trend_window,
        slope: Some(slope),
        slope_pips: Some(slope_pips),
        direction: direction.to_string(),
        ready: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_series_is_trend_up() {
        let series: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 0.05).collect();
        let trend = calculate_trend(&series, 21, 0.01, 1.5);
        assert!(trend.ready);
        assert_eq!(trend.direction, "up");
        assert!(trend.slope_pips.unwrap() > 0.0);
    }

    #[test]
    fn falling_series_is_trend_down() {
        let series: Vec<f64> = (0..30).map(|i| 100.0 - i as f64 * 0.05).collect();
        let trend = calculate_trend(&series, 21, 0.01, 1.5);
        assert!(trend.ready);
        assert_eq!(trend.direction, "down");
        assert!(trend.slope_pips.unwrap() < 0.0);
    }

    #[test]
    fn flat_series_is_flat() {
        let series = vec![100.0; 30];
        let trend = calculate_trend(&series, 21, 0.01, 1.5);
        assert!(trend.ready);
        assert_eq!(trend.direction, "flat");
    }

    #[test]
    fn insufficient_window_is_not_ready() {
        let series = vec![100.0; 10];
        let trend = calculate_trend(&series, 21, 0.01, 1.5);
        assert!(!trend.ready);
    }
}
