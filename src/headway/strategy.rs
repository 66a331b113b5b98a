//! Decay strategies for headway corrections.
//!
//! A strategy turns the distance `k` (1 = the trip adjacent to the
//! deviating pair) into the fraction of the deviation that trip absorbs.
//!
//! | Strategy | Weight |
//! |----------|--------|
//! | Exponential smoothing | `s × (1 − s)^(k−1)` |
//! | Linear decay | `s × (1 − (k−1)/horizon)` |

use crate::models::CorrectionStrategy;

/// Weight of a correction at distance `k` from the deviating pair.
pub trait DecayStrategy {
    /// Fraction of the deviation applied at distance `k` (1-based).
    fn weight(&self, k: usize, horizon: usize, strength: f64) -> f64;

    /// Strategy name for logs.
    fn name(&self) -> &'static str;
}

impl DecayStrategy for CorrectionStrategy {
    fn weight(&self, k: usize, horizon: usize, strength: f64) -> f64 {
        if k == 0 || k > horizon {
            return 0.0;
        }
        let distance = (k - 1) as f64;
        match self {
            Self::ExponentialSmoothing => strength * (1.0 - strength).powf(distance),
            Self::LinearDecay => strength * (1.0 - distance / horizon as f64),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::ExponentialSmoothing => "exponential-smoothing",
            Self::LinearDecay => "linear-decay",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_weights() {
        let s = CorrectionStrategy::ExponentialSmoothing;
        assert!((s.weight(1, 3, 0.5) - 0.5).abs() < 1e-12);
        assert!((s.weight(2, 3, 0.5) - 0.25).abs() < 1e-12);
        assert!((s.weight(3, 3, 0.5) - 0.125).abs() < 1e-12);
        assert_eq!(s.weight(4, 3, 0.5), 0.0);
        assert_eq!(s.weight(0, 3, 0.5), 0.0);
    }

    #[test]
    fn test_linear_weights() {
        let s = CorrectionStrategy::LinearDecay;
        assert!((s.weight(1, 4, 0.8) - 0.8).abs() < 1e-12);
        assert!((s.weight(3, 4, 0.8) - 0.4).abs() < 1e-12);
        assert_eq!(s.name(), "linear-decay");
    }

    #[test]
    fn test_weights_decrease_with_distance() {
        for s in [CorrectionStrategy::ExponentialSmoothing, CorrectionStrategy::LinearDecay] {
            for k in 1..5 {
                assert!(s.weight(k, 5, 0.6) >= s.weight(k + 1, 5, 0.6));
            }
        }
    }
}
