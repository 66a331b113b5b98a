//! Connection window classification.
//!
//! Pure analysis of the gap between a trip and an external service. Nothing
//! in this module mutates state, so results can be cached by schedule id
//! and input fingerprint.
//!
//! # Classification
//!
//! | Gap | Class |
//! |-----|-------|
//! | `< 0` | Missed |
//! | `> missed_threshold` | Missed |
//! | inside `ideal` | Ideal |
//! | inside `partial` | Partial |
//! | otherwise | Missed |
//!
//! Bands are inclusive; a gap on a shared boundary takes the better class.
//!
//! # Example
//!
//! ```
//! use connection_optimizer::models::{ConnectionType, ConnectionWindow, WindowClass};
//! use connection_optimizer::windows::classify;
//!
//! let window = ConnectionWindow::default_for(ConnectionType::GoTrain);
//! assert_eq!(classify(5, &window), WindowClass::Ideal);
//! assert_eq!(classify(12, &window), WindowClass::Partial);
//! assert_eq!(classify(-1, &window), WindowClass::Missed);
//! ```

mod analysis;

pub use analysis::{analyze_opportunities, serving_trips, AnalyzedOpportunity, TripGap};
pub(crate) use analysis::{best_gap, trip_gaps};

use crate::models::{
    ConnectionOpportunity, ConnectionWindow, Minutes, TransferDirection, Trip, WindowBand,
    WindowClass,
};

/// Classifies a gap against a window.
pub fn classify(gap: Minutes, window: &ConnectionWindow) -> WindowClass {
    if gap < 0 || gap > window.missed_threshold {
        WindowClass::Missed
    } else if window.ideal.contains(gap) {
        WindowClass::Ideal
    } else if window.partial.contains(gap) {
        WindowClass::Partial
    } else {
        WindowClass::Missed
    }
}

/// Gap between a trip and an opportunity at the opportunity's location.
///
/// `None` when the trip has no time at the location. Saturates at the
/// bounds of [`Minutes`].
pub fn gap_for(trip: &Trip, opportunity: &ConnectionOpportunity) -> Option<Minutes> {
    match opportunity.transfer {
        TransferDirection::ToService => trip
            .arrival_at(&opportunity.location_id)
            .map(|arrival| opportunity.target_time.saturating_sub(arrival)),
        TransferDirection::FromService => trip
            .departure_at(&opportunity.location_id)
            .map(|departure| departure.saturating_sub(opportunity.target_time)),
    }
}

/// Band of gaps that classify at least as well as `class`.
///
/// The nominal band clipped to `[0, missed_threshold]`. `None` for
/// [`WindowClass::Missed`] or when clipping leaves nothing.
pub fn effective_band(window: &ConnectionWindow, class: WindowClass) -> Option<WindowBand> {
    let band = window.band_for(class)?;
    let clipped = WindowBand::new(band.min.max(0), band.max.min(window.missed_threshold));
    (clipped.min <= clipped.max).then_some(clipped)
}

/// Smallest signed trip shift that moves `gap` into the opportunity's
/// target band.
///
/// Zero when the gap already qualifies. `None` when the target class has no
/// band. Positive shifts delay the trip.
pub fn required_shift(
    gap: Minutes,
    opportunity: &ConnectionOpportunity,
    window: &ConnectionWindow,
) -> Option<Minutes> {
    let band = effective_band(window, opportunity.window_hint)?;
    let distance = band.distance(gap);
    Some(match opportunity.transfer {
        // Delaying the trip grows a departure gap.
        TransferDirection::FromService => distance,
        // Delaying the trip shrinks an arrival gap.
        TransferDirection::ToService => distance.saturating_neg(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionType;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn go_window() -> ConnectionWindow {
        ConnectionWindow::default_for(ConnectionType::GoTrain)
    }

    #[test]
    fn test_classify_bands() {
        let w = go_window();
        assert_eq!(classify(-1, &w), WindowClass::Missed);
        assert_eq!(classify(0, &w), WindowClass::Missed);
        assert_eq!(classify(2, &w), WindowClass::Partial);
        assert_eq!(classify(5, &w), WindowClass::Ideal);
        assert_eq!(classify(10, &w), WindowClass::Ideal);
        assert_eq!(classify(11, &w), WindowClass::Partial);
        assert_eq!(classify(15, &w), WindowClass::Partial);
        assert_eq!(classify(16, &w), WindowClass::Missed);
        assert_eq!(classify(25, &w), WindowClass::Missed);
    }

    #[test]
    fn test_threshold_overrides_partial_band() {
        let w = ConnectionWindow::new(WindowBand::new(2, 4), WindowBand::new(0, 20), 6);
        assert_eq!(classify(6, &w), WindowClass::Partial);
        assert_eq!(classify(7, &w), WindowClass::Missed);
        assert_eq!(
            effective_band(&w, WindowClass::Partial),
            Some(WindowBand::new(0, 6))
        );
    }

    #[test]
    fn test_gap_for_directions() {
        let trip = Trip::new(1, 1).with_stop("STN", 478, 480);
        let from = ConnectionOpportunity::new("G", ConnectionType::GoTrain, "STN", 477);
        assert_eq!(gap_for(&trip, &from), Some(3));
        let to = ConnectionOpportunity::new("B", ConnectionType::SchoolBell, "STN", 490);
        assert_eq!(gap_for(&trip, &to), Some(12));
        let elsewhere = ConnectionOpportunity::new("X", ConnectionType::GoTrain, "ZZZ", 477);
        assert_eq!(gap_for(&trip, &elsewhere), None);
    }

    #[test]
    fn test_extreme_times_saturate() {
        let trip = Trip::new(1, 1).with_stop("STN", 480, 480);
        let from = ConnectionOpportunity::new("G", ConnectionType::GoTrain, "STN", Minutes::MIN);
        assert_eq!(gap_for(&trip, &from), Some(Minutes::MAX));
        let to = from.clone().with_transfer(TransferDirection::ToService);
        assert_eq!(gap_for(&trip, &to), Some(Minutes::MIN));

        let w = go_window();
        assert_eq!(required_shift(Minutes::MAX, &to, &w), Some(Minutes::MAX - 10));
        assert_eq!(required_shift(Minutes::MIN, &from, &w), Some(Minutes::MAX));
    }

    #[test]
    fn test_required_shift_signs() {
        let w = go_window();
        let from = ConnectionOpportunity::new("G", ConnectionType::GoTrain, "STN", 0);
        assert_eq!(required_shift(3, &from, &w), Some(2));
        assert_eq!(required_shift(14, &from, &w), Some(-4));
        assert_eq!(required_shift(7, &from, &w), Some(0));

        let to = from.clone().with_transfer(TransferDirection::ToService);
        assert_eq!(required_shift(3, &to, &w), Some(-2));
        assert_eq!(required_shift(14, &to, &w), Some(4));

        let partial = from.with_window_hint(WindowClass::Partial);
        assert_eq!(required_shift(1, &partial, &w), Some(1));
        let missed = partial.with_window_hint(WindowClass::Missed);
        assert_eq!(required_shift(1, &missed, &w), None);
    }

    #[test]
    fn test_classify_monotonic_beyond_ideal_max() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let ideal_min = rng.random_range(0..10);
            let ideal_max = ideal_min + rng.random_range(0..10);
            let partial_min = rng.random_range(0..=ideal_min);
            let partial_max = ideal_max + rng.random_range(0..10);
            let threshold = ideal_max + rng.random_range(0..20);
            let w = ConnectionWindow::new(
                WindowBand::new(ideal_min, ideal_max),
                WindowBand::new(partial_min, partial_max),
                threshold,
            );
            assert!(w.is_consistent());
            let mut previous = classify(ideal_max, &w);
            for gap in ideal_max + 1..threshold + 5 {
                let class = classify(gap, &w);
                assert!(class >= previous, "gap {gap} improved from {previous} to {class}");
                previous = class;
            }
        }
    }

    #[test]
    fn test_shift_lands_in_target_band() {
        let mut rng = StdRng::seed_from_u64(11);
        let w = go_window();
        for _ in 0..300 {
            let gap = rng.random_range(-30..40);
            let transfer = if rng.random_bool(0.5) {
                TransferDirection::ToService
            } else {
                TransferDirection::FromService
            };
            let opp = ConnectionOpportunity::new("G", ConnectionType::GoTrain, "A", 0)
                .with_transfer(transfer);
            let Some(shift) = required_shift(gap, &opp, &w) else {
                panic!("ideal target always has a band");
            };
            let new_gap = match transfer {
                TransferDirection::FromService => gap + shift,
                TransferDirection::ToService => gap - shift,
            };
            assert_eq!(classify(new_gap, &w), WindowClass::Ideal);
        }
    }
}
