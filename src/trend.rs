//! Rolling trend statistics over a player's chronological snap series.
//!
//! Pure arithmetic: no fetching, no persistence. Input is ordered oldest
//! first; the windows look at the tail.

use crate::types::TrendSummary;

/// Ordinary-least-squares slope of `values` against a 1-based index.
/// Returns 0.0 for fewer than two points or a degenerate denominator.
pub fn slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
    for (i, &y) in values.iter().enumerate() {
        let x = (i + 1) as f64;
        sx += x;
        sy += y;
        sxx += x * x;
        sxy += x * y;
    }
    let den = n * sxx - sx * sx;
    if den == 0.0 {
        return 0.0;
    }
    (n * sxy - sx * sy) / den
}

/// Compute the trend summary for one player-season series (oldest first):
/// most recent value, 3- and 5-game OLS slopes, and the short-window change
/// (`last - avg(two points preceding last)`). Windows that don't have enough
/// points yield 0.
pub fn trend(values: &[f64]) -> TrendSummary {
    let n = values.len();
    if n == 0 {
        return TrendSummary::default();
    }

    let last = values[n - 1];
    let mut summary = TrendSummary { last, ..Default::default() };

    if n >= 3 {
        summary.slope3 = slope(&values[n - 3..]);
        let base = (values[n - 3] + values[n - 2]) / 2.0;
        summary.change3 = last - base;
    }
    if n >= 5 {
        summary.slope5 = slope(&values[n - 5..]);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_empty_series() {
        let t = trend(&[]);
        assert_eq!(t, TrendSummary::default());
    }

    #[test]
    fn test_single_point() {
        let t = trend(&[42.0]);
        assert!((t.last - 42.0).abs() < EPS);
        assert_eq!(t.slope3, 0.0);
        assert_eq!(t.slope5, 0.0);
        assert_eq!(t.change3, 0.0);
    }

    #[test]
    fn test_two_points_no_windows() {
        let t = trend(&[10.0, 20.0]);
        assert!((t.last - 20.0).abs() < EPS);
        // Neither the 3- nor 5-point window exists yet
        assert_eq!(t.slope3, 0.0);
        assert_eq!(t.change3, 0.0);
    }

    #[test]
    fn test_slope_of_arithmetic_series() {
        // y = 5x + 3 has slope exactly 5 over any window
        let values: Vec<f64> = (1..=8).map(|x| 5.0 * x as f64 + 3.0).collect();
        assert!((slope(&values) - 5.0).abs() < EPS);
        let t = trend(&values);
        assert!((t.slope3 - 5.0).abs() < EPS);
        assert!((t.slope5 - 5.0).abs() < EPS);
    }

    #[test]
    fn test_slope_degenerate() {
        assert_eq!(slope(&[]), 0.0);
        assert_eq!(slope(&[7.0]), 0.0);
        // Constant series: slope 0
        assert!((slope(&[4.0, 4.0, 4.0])).abs() < EPS);
    }

    #[test]
    fn test_change3_window() {
        // last = 90, preceding two in the 3-window are 50 and 70 -> avg 60
        let t = trend(&[10.0, 50.0, 70.0, 90.0]);
        assert!((t.change3 - 30.0).abs() < EPS);
    }

    #[test]
    fn test_five_point_window_uses_tail() {
        // Tail of 5 is flat even though earlier values ramp
        let values = [10.0, 30.0, 55.0, 55.0, 55.0, 55.0, 55.0];
        let t = trend(&values);
        assert!(t.slope5.abs() < EPS);
        assert!(t.slope3.abs() < EPS);
        assert!((t.last - 55.0).abs() < EPS);
    }

    #[test]
    fn test_declining_series_negative_slope() {
        let t = trend(&[80.0, 70.0, 60.0, 50.0, 40.0]);
        assert!(t.slope3 < 0.0);
        assert!(t.slope5 < 0.0);
        assert!((t.slope5 + 10.0).abs() < EPS);
        assert!((t.change3 + 15.0).abs() < EPS);
    }
}
