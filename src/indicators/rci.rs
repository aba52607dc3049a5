// =============================================================================
// Rank Correlation Index (RCI)
// =============================================================================
//
// RCI measures how consistently price has been trending by correlating the
// rank of each close (most recent first) against the rank of time (oldest
// first). A perfectly rising series gives +100, a perfectly falling series
// gives -100.
//
//   RCI = 100 * (1 - 6 * sum(d_i^2) / (n * (n^2 - 1)))
//
// where `d_i` is the difference between the time-rank and the price-rank of
// the i-th observation in the window.
// =============================================================================

/// Compute RCI over the last `period` closes. `None` if `period < 2` or there
/// is not yet a full window.
pub fn calculate_rci(closes: &[f64], period: usize) -> Option<f64> {
    if period < 2 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];

    // Time rank: oldest = 1, most recent = period (ascending).
    // Price rank: lowest close = 1 (ascending), so the two rankings agree
    // (d=0 throughout) on a monotonically rising series and give +100.
    let mut price_order: Vec<usize> = (0..period).collect();
    price_order.sort_by(|&a, &b| window[a].partial_cmp(&window[b]).unwrap());

    let mut price_rank = vec![0.0_f64; period];
    let mut i = 0;
    while i < period {
        let mut j = i;
        while j + 1 < period && window[price_order[j + 1]] == window[price_order[i]] {
            j += 1;
        }
        let avg_rank = ((i + 1)..=(j + 1)).map(|r| r as f64).sum::<f64>() / (j - i + 1) as f64;
        for k in i..=j {
            price_rank[price_order[k]] = avg_rank;
        }
        i = j + 1;
    }

    let sum_d2: f64 = (0..period)
        .map(|idx| {
            let time_rank = (idx + 1) as f64;
            let d = time_rank - price_rank[idx];
            d * d
        })
        .sum();

    let n = period as f64;
    let rci = 100.0 * (1.0 - (6.0 * sum_d2) / (n * (n * n - 1.0)));
    rci.is_finite().then_some(rci)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfectly_rising_series_is_100() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let rci = calculate_rci(&closes, 10).unwrap();
        assert!((rci - 100.0).abs() < 1e-9, "expected 100.0, got {rci}");
    }

    #[test]
    fn perfectly_falling_series_is_minus_100() {
        let closes: Vec<f64> = (1..=20).rev().map(|x| x as f64).collect();
        let rci = calculate_rci(&closes, 10).unwrap();
        assert!((rci + 100.0).abs() < 1e-9, "expected -100.0, got {rci}");
    }

    #[test]
    fn flat_series_has_rci_defined_via_tie_averaging() {
        let closes = vec![100.0; 15];
        let rci = calculate_rci(&closes, 10).unwrap();
        assert!(rci.is_finite());
    }

    #[test]
    fn insufficient_data_returns_none() {
        assert!(calculate_rci(&[1.0, 2.0], 10).is_none());
    }

    #[test]
    fn period_below_two_returns_none() {
        assert!(calculate_rci(&[1.0, 2.0, 3.0], 1).is_none());
    }

    #[test]
    fn rci_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
        ];
        let rci = calculate_rci(&closes, 9).unwrap();
        assert!((-100.0..=100.0).contains(&rci));
    }
}
