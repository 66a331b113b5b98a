//! Post-pass headway correction.

use std::collections::BTreeSet;

use super::strategy::DecayStrategy;
use super::{measure_deviations, regularity_score};
use crate::engine::{check_shift, ShiftViolation};
use crate::models::{
    CorrectionDirection, CorrectionResult, CorrectionSkip, HeadwayCorrection,
    HeadwayCorrectionConfig, HeadwayDeviation, Minutes, OptimizationConstraints, Schedule,
};

/// Input of the correction phase.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionRequest<'a> {
    /// Working schedule after the engine.
    pub schedule: &'a Schedule,
    /// Pair deviations measured by the engine.
    pub deviations: &'a [HeadwayDeviation],
    /// Trips carrying a made connection.
    pub protected: &'a BTreeSet<u32>,
    /// Schedule-wide shift already used.
    pub schedule_shift_used: Minutes,
}

/// Smooths headway deviations beyond tolerance.
///
/// Pairs are visited in the order given. Each pair's headway is re-measured
/// on the schedule as corrected so far, so a pair fixed by an earlier
/// correction is left alone. Skipped shifts are warnings, never errors.
/// No recovery is borrowed in this phase.
#[tracing::instrument(level = "debug", skip_all, fields(schedule = %request.schedule.id, strategy = strategy.name()))]
pub fn correct_headways(
    request: CorrectionRequest<'_>,
    config: &HeadwayCorrectionConfig,
    constraints: &OptimizationConstraints,
    strategy: &impl DecayStrategy,
) -> CorrectionResult {
    let mut schedule = request.schedule.clone();
    let mut used = request.schedule_shift_used;
    let mut corrections = Vec::new();
    let mut warnings = Vec::new();

    if config.enabled {
        let order = schedule.route_order();
        let tolerance = constraints.headway_tolerance;
        for deviation in request.deviations {
            let Some(dev) = live_deviation(&schedule, deviation) else {
                continue;
            };
            if dev.abs() <= tolerance {
                continue;
            }
            let Some(lead_idx) = order.iter().position(|&t| t == deviation.leading_trip) else {
                continue;
            };
            let pair = (deviation.leading_trip, deviation.trailing_trip);

            for (trip_number, shift) in proposals(&order, lead_idx, dev, config, strategy) {
                let mut correction = HeadwayCorrection {
                    trip_number,
                    shift,
                    applied: false,
                    skip_reason: None,
                    source_pair: pair,
                };
                match admit(&schedule, trip_number, shift, request.protected, constraints, used) {
                    Ok(()) => {
                        schedule.apply_shift(trip_number, shift, &[]);
                        used += shift.abs();
                        correction.applied = true;
                    }
                    Err(skip) => {
                        tracing::debug!(trip = trip_number, shift, %skip, "headway correction skipped");
                        warnings.push(format!(
                            "Headway correction of {shift:+} min for trip {trip_number} skipped: {skip}"
                        ));
                        correction.skip_reason = Some(skip);
                    }
                }
                corrections.push(correction);
            }
        }
    }

    let all = measure_deviations(&schedule, config.target_headway);
    let regularity = regularity_score(&all);
    let residual_deviations: Vec<HeadwayDeviation> = all
        .into_iter()
        .filter(|d| d.excess(constraints.headway_tolerance) > 0)
        .collect();

    let result = CorrectionResult {
        schedule,
        corrections,
        residual_deviations,
        regularity_score: regularity,
        schedule_shift_used: used,
        warnings,
    };
    tracing::debug!(
        applied = result.applied_count(),
        skipped = result.skipped_count(),
        residual = result.residual_deviations.len(),
        regularity = result.regularity_score,
        "headway correction finished"
    );
    result
}

/// Current `actual − target` of a pair.
fn live_deviation(schedule: &Schedule, deviation: &HeadwayDeviation) -> Option<Minutes> {
    let lead = schedule.trip(deviation.leading_trip)?.first_departure()?;
    let trail = schedule.trip(deviation.trailing_trip)?.first_departure()?;
    Some(trail - lead - deviation.target)
}

/// Shifts for the trips around the pair starting at `lead_idx`.
///
/// A positive deviation pulls trailing trips earlier and pushes leading
/// trips later; a negative one does the opposite. Trailing trips come first.
fn proposals(
    order: &[u32],
    lead_idx: usize,
    deviation: Minutes,
    config: &HeadwayCorrectionConfig,
    strategy: &impl DecayStrategy,
) -> Vec<(u32, Minutes)> {
    let (forward, backward, scale) = match config.correction_direction {
        CorrectionDirection::Forward => (true, false, 1.0),
        CorrectionDirection::Backward => (false, true, 1.0),
        CorrectionDirection::Bidirectional => (true, true, 0.5),
    };
    let horizon = config.correction_horizon;
    let cap = config.max_deviation_threshold.max(0);
    let amount = |k: usize| -> Minutes {
        let w = strategy.weight(k, horizon, config.correction_strength) * scale;
        let raw = (f64::from(deviation) * w).round() as Minutes;
        raw.clamp(-cap, cap)
    };

    let mut out = Vec::new();
    if forward {
        for k in 1..=horizon {
            let Some(&trip) = order.get(lead_idx + k) else {
                break;
            };
            let shift = -amount(k);
            if shift != 0 {
                out.push((trip, shift));
            }
        }
    }
    if backward {
        for k in 1..=horizon.min(lead_idx + 1) {
            let trip = order[lead_idx + 1 - k];
            let shift = amount(k);
            if shift != 0 {
                out.push((trip, shift));
            }
        }
    }
    out
}

fn admit(
    schedule: &Schedule,
    trip_number: u32,
    shift: Minutes,
    protected: &BTreeSet<u32>,
    constraints: &OptimizationConstraints,
    used: Minutes,
) -> Result<(), CorrectionSkip> {
    if protected.contains(&trip_number) {
        return Err(CorrectionSkip::Protected);
    }
    let check = check_shift(schedule, trip_number, shift, constraints, used).map_err(|v| match v {
        ShiftViolation::DeviationCap { .. } => CorrectionSkip::DeviationCap,
        ShiftViolation::ScheduleShiftCap { .. } => CorrectionSkip::ScheduleShiftCap,
        ShiftViolation::TripOrder => CorrectionSkip::TripOrder,
        ShiftViolation::RecoveryCeiling { .. } => CorrectionSkip::RecoveryCeiling,
    })?;
    if check.shortfalls.is_empty() {
        Ok(())
    } else {
        Err(CorrectionSkip::RecoveryFloor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CorrectionStrategy, Trip};

    fn make_schedule(departures: &[Minutes]) -> Schedule {
        departures
            .iter()
            .enumerate()
            .fold(Schedule::new("S", "R"), |s, (i, &d)| {
                s.with_trip(Trip::new(i as u32 + 1, i as u32 + 1).with_stop("A", d, d))
            })
    }

    fn forward(horizon: usize, strength: f64) -> HeadwayCorrectionConfig {
        HeadwayCorrectionConfig::default()
            .with_target_headway(15)
            .with_direction(CorrectionDirection::Forward)
            .with_horizon(horizon)
            .with_strength(strength)
            .with_max_deviation_threshold(10)
    }

    fn correct(
        schedule: &Schedule,
        protected: &BTreeSet<u32>,
        used: Minutes,
        config: &HeadwayCorrectionConfig,
        constraints: &OptimizationConstraints,
    ) -> CorrectionResult {
        let deviations = measure_deviations(schedule, config.target_headway);
        let request = CorrectionRequest {
            schedule,
            deviations: &deviations,
            protected,
            schedule_shift_used: used,
        };
        correct_headways(request, config, constraints, &config.strategy)
    }

    fn delayed_second_trip() -> Schedule {
        let mut s = make_schedule(&[600, 615, 630, 645]);
        s.apply_shift(2, 8, &[]);
        s
    }

    #[test]
    fn test_forward_correction_restores_spacing() {
        let s = delayed_second_trip();
        let result = correct(&s, &BTreeSet::new(), 8, &forward(1, 1.0), &OptimizationConstraints::default());

        assert_eq!(result.applied_count(), 1);
        assert_eq!(result.corrections[0].trip_number, 2);
        assert_eq!(result.corrections[0].shift, -8);
        assert_eq!(result.corrections[0].source_pair, (1, 2));
        assert_eq!(result.schedule.trip(2).unwrap().first_departure(), Some(615));
        assert!(result.residual_deviations.is_empty());
        assert_eq!(result.regularity_score, 1.0);
        assert_eq!(result.schedule_shift_used, 16);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_shift_clamped_to_threshold() {
        let s = delayed_second_trip();
        let config = forward(1, 1.0).with_max_deviation_threshold(5);
        let result = correct(&s, &BTreeSet::new(), 8, &config, &OptimizationConstraints::default());
        assert_eq!(result.corrections[0].shift, -5);
        assert!(result.corrections.iter().all(|c| c.shift.abs() <= 5));
    }

    #[test]
    fn test_protected_trip_is_skipped() {
        let s = delayed_second_trip();
        let protected = BTreeSet::from([2]);
        let result = correct(&s, &protected, 8, &forward(1, 1.0), &OptimizationConstraints::default());

        assert_eq!(result.corrections[0].trip_number, 2);
        assert!(!result.corrections[0].applied);
        assert_eq!(result.corrections[0].skip_reason, Some(CorrectionSkip::Protected));
        assert_eq!(result.schedule.trip(2).unwrap().first_departure(), Some(623));
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_bidirectional_splits_correction() {
        let s = delayed_second_trip();
        let config = forward(1, 1.0).with_direction(CorrectionDirection::Bidirectional);
        let result = correct(&s, &BTreeSet::new(), 8, &config, &OptimizationConstraints::default());

        let first: Vec<(u32, Minutes, bool)> = result
            .corrections
            .iter()
            .take(2)
            .map(|c| (c.trip_number, c.shift, c.applied))
            .collect();
        assert_eq!(first, vec![(2, -4, true), (1, 4, true)]);
    }

    #[test]
    fn test_recovery_floor_blocks_correction() {
        let s = Schedule::new("S", "R")
            .with_trip(Trip::new(1, 1).with_stop("A", 600, 600))
            .with_trip(Trip::new(2, 2).with_stop("A", 609, 609).with_recovery("T", 2))
            .with_trip(Trip::new(3, 3).with_stop("A", 630, 630));
        let config = forward(1, 1.0);
        let result = correct(&s, &BTreeSet::new(), 0, &config, &OptimizationConstraints::default());

        assert_eq!(result.corrections[0].trip_number, 2);
        assert_eq!(result.corrections[0].shift, 6);
        assert_eq!(result.corrections[0].skip_reason, Some(CorrectionSkip::RecoveryFloor));
        assert_eq!(result.schedule.trip(2).unwrap().total_recovery(), 2);
    }

    #[test]
    fn test_deviation_cap_blocks_correction() {
        let s = make_schedule(&[600, 625, 640]);
        let constraints = OptimizationConstraints::default().with_max_trip_deviation(3);
        let result = correct(&s, &BTreeSet::new(), 0, &forward(1, 1.0), &constraints);
        assert_eq!(result.corrections[0].skip_reason, Some(CorrectionSkip::DeviationCap));
        assert_eq!(result.applied_count(), 0);
        assert!(!result.residual_deviations.is_empty());
    }

    #[test]
    fn test_within_tolerance_is_untouched() {
        let s = make_schedule(&[600, 616, 630]);
        let result = correct(&s, &BTreeSet::new(), 0, &forward(3, 0.5), &OptimizationConstraints::default());
        assert!(result.corrections.is_empty());
        assert_eq!(result.schedule, s);
    }

    #[test]
    fn test_disabled_returns_schedule_unchanged() {
        let s = delayed_second_trip();
        let config = forward(1, 1.0).with_enabled(false);
        let result = correct(&s, &BTreeSet::new(), 8, &config, &OptimizationConstraints::default());
        assert!(result.corrections.is_empty());
        assert_eq!(result.schedule, s);
        assert_eq!(result.schedule_shift_used, 8);
        assert_eq!(result.residual_deviations.len(), 2);
    }

    #[test]
    fn test_linear_decay_horizon() {
        let s = make_schedule(&[600, 630, 645, 660, 675]);
        let config = forward(3, 1.0).with_strategy(CorrectionStrategy::LinearDecay);
        let result = correct(&s, &BTreeSet::new(), 0, &config, &OptimizationConstraints::default());
        let shifts: Vec<(u32, Minutes)> = result
            .corrections
            .iter()
            .take(3)
            .map(|c| (c.trip_number, c.shift))
            .collect();
        // deviation 15, weights 1, 2/3, 1/3, clamped to 10
        assert_eq!(shifts, vec![(2, -10), (3, -10), (4, -5)]);
    }
}
