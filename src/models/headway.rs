//! Headway correction configuration and results.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Minutes, Schedule};

/// Which trips around a deviating pair may be shifted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrectionDirection {
    /// Shift trips from the trailing trip onward.
    Forward,
    /// Shift trips from the leading trip backward.
    Backward,
    /// Shift both sides at half strength.
    #[default]
    Bidirectional,
}

/// How correction strength decays with distance from the deviating pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrectionStrategy {
    /// `strength × (1 − strength)^(k−1)`.
    #[default]
    ExponentialSmoothing,
    /// `strength × (1 − (k−1)/horizon)`.
    LinearDecay,
}

/// Headway correction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadwayCorrectionConfig {
    /// Whether the correction phase runs.
    pub enabled: bool,
    /// Decay strategy.
    pub strategy: CorrectionStrategy,
    /// Target headway; each pair's original headway when absent.
    pub target_headway: Option<Minutes>,
    /// Largest shift applied to one trip (minutes).
    pub max_deviation_threshold: Minutes,
    /// Number of trips on each side of a pair that may be shifted.
    pub correction_horizon: usize,
    /// Correction strength in (0, 1].
    pub correction_strength: f64,
    /// Eligible side(s).
    pub correction_direction: CorrectionDirection,
}

impl Default for HeadwayCorrectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CorrectionStrategy::default(),
            target_headway: None,
            max_deviation_threshold: 5,
            correction_horizon: 3,
            correction_strength: 0.5,
            correction_direction: CorrectionDirection::default(),
        }
    }
}

impl HeadwayCorrectionConfig {
    /// Enables or disables correction.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the decay strategy.
    pub fn with_strategy(mut self, strategy: CorrectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets a fixed target headway.
    pub fn with_target_headway(mut self, minutes: Minutes) -> Self {
        self.target_headway = Some(minutes);
        self
    }

    /// Sets the per-trip shift cap.
    pub fn with_max_deviation_threshold(mut self, minutes: Minutes) -> Self {
        self.max_deviation_threshold = minutes;
        self
    }

    /// Sets the correction horizon.
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.correction_horizon = horizon;
        self
    }

    /// Sets the correction strength.
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.correction_strength = strength;
        self
    }

    /// Sets the eligible side(s).
    pub fn with_direction(mut self, direction: CorrectionDirection) -> Self {
        self.correction_direction = direction;
        self
    }
}

/// Headway deviation of one consecutive trip pair in route order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadwayDeviation {
    /// Earlier trip of the pair.
    pub leading_trip: u32,
    /// Later trip of the pair.
    pub trailing_trip: u32,
    /// Actual headway (minutes).
    pub actual: Minutes,
    /// Target headway (minutes).
    pub target: Minutes,
}

impl HeadwayDeviation {
    /// `actual − target`. Positive means the pair is too far apart.
    pub fn deviation(&self) -> Minutes {
        self.actual - self.target
    }

    /// Minutes of deviation beyond `tolerance`.
    pub fn excess(&self, tolerance: Minutes) -> Minutes {
        (self.deviation().abs() - tolerance).max(0)
    }
}

/// Why a correction was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionSkip {
    /// The trip carries a made connection.
    Protected,
    /// The trip's net deviation would exceed its cap.
    DeviationCap,
    /// The schedule-wide shift cap is used up.
    ScheduleShiftCap,
    /// The shift would reorder trips.
    TripOrder,
    /// A layover would fall below the floor.
    RecoveryFloor,
    /// A layover would grow above the ceiling.
    RecoveryCeiling,
}

impl fmt::Display for CorrectionSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Protected => "trip carries a made connection",
            Self::DeviationCap => "trip deviation cap reached",
            Self::ScheduleShiftCap => "schedule shift cap reached",
            Self::TripOrder => "shift would reorder trips",
            Self::RecoveryFloor => "recovery would fall below minimum",
            Self::RecoveryCeiling => "recovery would exceed maximum",
        };
        f.write_str(s)
    }
}

/// A proposed correction of one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadwayCorrection {
    /// Shifted trip.
    pub trip_number: u32,
    /// Proposed shift (minutes).
    pub shift: Minutes,
    /// Whether the shift was applied.
    pub applied: bool,
    /// Why the shift was skipped.
    pub skip_reason: Option<CorrectionSkip>,
    /// Pair `(leading, trailing)` the correction addresses.
    pub source_pair: (u32, u32),
}

/// Output of the headway correction phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    /// Corrected schedule.
    pub schedule: Schedule,
    /// Every proposed correction.
    pub corrections: Vec<HeadwayCorrection>,
    /// Deviations beyond tolerance remaining after correction.
    pub residual_deviations: Vec<HeadwayDeviation>,
    /// `1 − min(1, mean |deviation| / mean target)`; 1.0 is perfectly regular.
    pub regularity_score: f64,
    /// Schedule-wide shift used, including the engine's.
    pub schedule_shift_used: Minutes,
    /// Skipped corrections, in words.
    pub warnings: Vec<String>,
}

impl CorrectionResult {
    /// Number of applied corrections.
    pub fn applied_count(&self) -> usize {
        self.corrections.iter().filter(|c| c.applied).count()
    }

    /// Number of skipped corrections.
    pub fn skipped_count(&self) -> usize {
        self.corrections.len() - self.applied_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviation_excess() {
        let d = HeadwayDeviation {
            leading_trip: 1,
            trailing_trip: 2,
            actual: 24,
            target: 20,
        };
        assert_eq!(d.deviation(), 4);
        assert_eq!(d.excess(2), 2);
        assert_eq!(d.excess(5), 0);
    }

    #[test]
    fn test_config_defaults_from_json() {
        let cfg: HeadwayCorrectionConfig =
            serde_json::from_str(r#"{"strategy": "LinearDecay", "target_headway": 15}"#).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.strategy, CorrectionStrategy::LinearDecay);
        assert_eq!(cfg.target_headway, Some(15));
        assert_eq!(cfg.correction_direction, CorrectionDirection::Bidirectional);
    }
}
