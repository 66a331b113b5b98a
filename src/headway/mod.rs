//! Headway measurement and correction.
//!
//! Headway is the spacing between consecutive trips in route order,
//! measured on first departures. The target for a pair is the configured
//! headway or, when none is set, the pair's original spacing.
//!
//! # Regularity
//! `1 − min(1, mean |actual − target| / mean target)` over every pair, so
//! 1.0 is perfectly regular and 0.0 means deviations as large as the
//! headway itself.

mod corrector;
mod strategy;

pub use corrector::{correct_headways, CorrectionRequest};
pub use strategy::DecayStrategy;

use crate::models::{HeadwayDeviation, Minutes, Schedule};

/// Headway of every consecutive pair in route order.
pub fn measure_deviations(schedule: &Schedule, target_headway: Option<Minutes>) -> Vec<HeadwayDeviation> {
    let order = schedule.route_order();
    order
        .windows(2)
        .filter_map(|pair| {
            let leading = schedule.trip(pair[0])?;
            let trailing = schedule.trip(pair[1])?;
            let actual = trailing.first_departure()? - leading.first_departure()?;
            let target = match target_headway {
                Some(t) => t,
                None => trailing.original_first_departure()? - leading.original_first_departure()?,
            };
            Some(HeadwayDeviation {
                leading_trip: pair[0],
                trailing_trip: pair[1],
                actual,
                target,
            })
        })
        .collect()
}

/// Regularity score in `[0, 1]` of a set of pair deviations.
pub fn regularity_score(deviations: &[HeadwayDeviation]) -> f64 {
    if deviations.is_empty() {
        return 1.0;
    }
    let n = deviations.len() as f64;
    let mean_dev = deviations.iter().map(|d| d.deviation().abs() as f64).sum::<f64>() / n;
    let mean_target = deviations.iter().map(|d| d.target as f64).sum::<f64>() / n;
    if mean_target <= 0.0 {
        return if mean_dev == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - (mean_dev / mean_target).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Trip;

    fn make_schedule(departures: &[Minutes]) -> Schedule {
        departures
            .iter()
            .enumerate()
            .fold(Schedule::new("S", "R"), |s, (i, &d)| {
                s.with_trip(Trip::new(i as u32 + 1, i as u32 + 1).with_stop("A", d, d))
            })
    }

    #[test]
    fn test_measure_against_original() {
        let mut s = make_schedule(&[600, 615, 630]);
        assert!(measure_deviations(&s, None).iter().all(|d| d.deviation() == 0));
        s.apply_shift(2, 4, &[]);
        let devs = measure_deviations(&s, None);
        assert_eq!(devs[0].deviation(), 4);
        assert_eq!(devs[1].deviation(), -4);
    }

    #[test]
    fn test_measure_against_fixed_target() {
        let s = make_schedule(&[600, 612, 630]);
        let devs = measure_deviations(&s, Some(15));
        assert_eq!(devs.len(), 2);
        assert_eq!((devs[0].actual, devs[0].deviation()), (12, -3));
        assert_eq!((devs[1].actual, devs[1].deviation()), (18, 3));
    }

    #[test]
    fn test_regularity_score() {
        let s = make_schedule(&[600, 612, 630]);
        let score = regularity_score(&measure_deviations(&s, Some(15)));
        assert!((score - 0.8).abs() < 1e-12);
        assert_eq!(regularity_score(&[]), 1.0);
        let perfect = make_schedule(&[600, 615, 630]);
        assert_eq!(regularity_score(&measure_deviations(&perfect, Some(15))), 1.0);
    }
}
