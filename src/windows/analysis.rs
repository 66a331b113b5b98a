//! Opportunity analysis against a schedule.

use serde::{Deserialize, Serialize};

use super::{classify, effective_band, gap_for};
use crate::models::{
    ConnectionOpportunity, ConnectionWindow, ConnectionWindows, Minutes, Schedule, WindowClass,
};

/// Achieved gap of one trip for one opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripGap {
    /// Serving trip.
    pub trip_number: u32,
    /// Achieved gap (minutes).
    pub gap: Minutes,
    /// Class of the gap.
    pub class: WindowClass,
}

/// An opportunity annotated against a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedOpportunity {
    /// The requested opportunity.
    pub opportunity: ConnectionOpportunity,
    /// Window resolved for its connection type.
    pub window: ConnectionWindow,
    /// Whether the external service runs on the schedule's day type.
    pub operating: bool,
    /// Gap and class of every serving trip, in trip-number order.
    pub trip_gaps: Vec<TripGap>,
    /// Best serving trip.
    pub best: Option<TripGap>,
}

impl AnalyzedOpportunity {
    /// Whether the best serving trip already reaches the target class.
    pub fn is_met(&self) -> bool {
        self.best
            .is_some_and(|b| b.class.meets(self.opportunity.window_hint))
    }
}

/// Trips able to serve an opportunity, in trip-number order.
///
/// The listed affected trips that exist and have a time at the location, or
/// every trip with a time at the location when none are listed.
pub fn serving_trips(schedule: &Schedule, opportunity: &ConnectionOpportunity) -> Vec<u32> {
    let mut trips: Vec<u32> = schedule
        .trips
        .iter()
        .filter(|t| t.serves(&opportunity.location_id))
        .filter(|t| {
            opportunity.affected_trips.is_empty()
                || opportunity.affected_trips.contains(&t.trip_number)
        })
        .map(|t| t.trip_number)
        .collect();
    trips.sort_unstable();
    trips.dedup();
    trips
}

/// Picks the best gap: better class, then closer to the target band, then
/// lower trip number.
pub(crate) fn best_gap(
    gaps: &[TripGap],
    window: &ConnectionWindow,
    target: WindowClass,
) -> Option<TripGap> {
    let band = effective_band(window, target).or_else(|| effective_band(window, WindowClass::Partial));
    gaps.iter()
        .min_by_key(|g| {
            let distance = band.map_or(0, |b| b.distance(g.gap).abs());
            (g.class, distance, g.trip_number)
        })
        .copied()
}

/// Gaps and classes of the serving trips of an opportunity.
pub(crate) fn trip_gaps(
    schedule: &Schedule,
    opportunity: &ConnectionOpportunity,
    window: &ConnectionWindow,
) -> Vec<TripGap> {
    serving_trips(schedule, opportunity)
        .into_iter()
        .filter_map(|n| {
            let trip = schedule.trip(n)?;
            let gap = gap_for(trip, opportunity)?;
            Some(TripGap {
                trip_number: n,
                gap,
                class: classify(gap, window),
            })
        })
        .collect()
}

/// Annotates each requested opportunity against the schedule.
///
/// Output order matches input order.
pub fn analyze_opportunities(
    schedule: &Schedule,
    opportunities: &[ConnectionOpportunity],
    windows: &ConnectionWindows,
) -> Vec<AnalyzedOpportunity> {
    opportunities
        .iter()
        .map(|opp| {
            let window = windows.get(opp.connection_type);
            let gaps = trip_gaps(schedule, opp, &window);
            let best = best_gap(&gaps, &window, opp.window_hint);
            AnalyzedOpportunity {
                opportunity: opp.clone(),
                window,
                operating: opp.operates_on(schedule.day_type),
                trip_gaps: gaps,
                best,
            }
        })
        .collect()
}
