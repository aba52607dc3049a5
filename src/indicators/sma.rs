// =============================================================================
// Simple Moving Average
// =============================================================================

/// Mean of the last `period` values in `closes`. `None` if `period` is zero
/// or there is not yet a full window.
pub fn calculate_sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let sum: f64 = window.iter().sum();
    let sma = sum / period as f64;
    sma.is_finite().then_some(sma)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_basic() {
        let closes = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(calculate_sma(&closes, 5), Some(3.0));
    }

    #[test]
    fn sma_uses_most_recent_window() {
        let closes = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(calculate_sma(&closes, 3), Some(5.0));
    }

    #[test]
    fn sma_insufficient_data() {
        assert_eq!(calculate_sma(&[1.0, 2.0], 5), None);
    }

    #[test]
    fn sma_zero_period() {
        assert_eq!(calculate_sma(&[1.0, 2.0, 3.0], 0), None);
    }
}
