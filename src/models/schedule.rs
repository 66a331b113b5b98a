//! Schedule, trip, and time point models.
//!
//! A schedule is the draft timetable for one route, direction, and day type.
//! Trips carry per-time-point arrival, departure, and recovery times plus a
//! snapshot of the times they were constructed with, so that every shift the
//! optimizer applies can be diffed or rolled back.
//!
//! # Time Model
//! All times are whole minutes relative to the service-day origin (t=0 is
//! the start of the service day, usually midnight). Values past 1440 are
//! legal for after-midnight service.
//!
//! # Recovery Model
//! A trip's recovery is the layover it holds at its terminal time point.
//! Delaying a trip by `d` shrinks its own layover by `d` and lengthens the
//! layover of the preceding trip in the same block by `d`; advancing it does
//! the opposite. Trips without recovery entries hold no tracked layover.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::Loan;

/// Whole minutes since the service-day origin (or a signed duration).
pub type Minutes = i32;

/// Travel direction of the route pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Toward the route's principal destination.
    #[default]
    Outbound,
    /// Back toward the route's origin.
    Inbound,
}

/// Service day type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayType {
    /// Monday through Friday service.
    #[default]
    Weekday,
    /// Saturday service.
    Saturday,
    /// Sunday and holiday service.
    Sunday,
}

/// A scheduled stop (time point) along the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    /// Unique time point identifier.
    pub id: String,
    /// Human-readable stop name.
    pub name: String,
    /// Position along the route (0-based).
    pub sequence: u32,
}

impl TimePoint {
    /// Creates a time point.
    pub fn new(id: impl Into<String>, sequence: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            sequence,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// The three time maps of a trip, keyed by time point id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripTimes {
    /// Arrival time at each time point.
    pub arrivals: BTreeMap<String, Minutes>,
    /// Departure time from each time point.
    pub departures: BTreeMap<String, Minutes>,
    /// Scheduled recovery (layover) minutes at each time point.
    pub recovery: BTreeMap<String, Minutes>,
}

/// A single bus trip within a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Trip number, unique within the schedule.
    pub trip_number: u32,
    /// Block (vehicle duty) this trip belongs to.
    pub block_number: u32,
    /// Current times.
    pub times: TripTimes,
    /// Service band label (travel-time profile).
    pub service_band: String,
    /// Times as constructed, before any optimization.
    pub original: TripTimes,
}

/// A change in recovery minutes caused by shifting a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryImpact {
    /// Trip whose layover changes.
    pub trip_number: u32,
    /// Time point where the layover is held.
    pub stop_id: String,
    /// Signed change in minutes (negative consumes recovery).
    pub change: Minutes,
}

impl Trip {
    /// Creates a trip with no times.
    pub fn new(trip_number: u32, block_number: u32) -> Self {
        Self {
            trip_number,
            block_number,
            times: TripTimes::default(),
            service_band: String::new(),
            original: TripTimes::default(),
        }
    }

    /// Adds a stop with arrival and departure times.
    ///
    /// Builder methods define the trip as constructed, so they write both the
    /// current times and the original snapshot.
    pub fn with_stop(mut self, time_point_id: impl Into<String>, arrival: Minutes, departure: Minutes) -> Self {
        let id = time_point_id.into();
        self.times.arrivals.insert(id.clone(), arrival);
        self.times.departures.insert(id.clone(), departure);
        self.original.arrivals.insert(id.clone(), arrival);
        self.original.departures.insert(id, departure);
        self
    }

    /// Adds scheduled recovery at a time point.
    pub fn with_recovery(mut self, time_point_id: impl Into<String>, minutes: Minutes) -> Self {
        let id = time_point_id.into();
        self.times.recovery.insert(id.clone(), minutes);
        self.original.recovery.insert(id, minutes);
        self
    }

    /// Sets the service band label.
    pub fn with_service_band(mut self, band: impl Into<String>) -> Self {
        self.service_band = band.into();
        self
    }

    /// Arrival at a time point, falling back to the departure.
    pub fn arrival_at(&self, time_point_id: &str) -> Option<Minutes> {
        self.times
            .arrivals
            .get(time_point_id)
            .or_else(|| self.times.departures.get(time_point_id))
            .copied()
    }

    /// Departure from a time point, falling back to the arrival.
    pub fn departure_at(&self, time_point_id: &str) -> Option<Minutes> {
        self.times
            .departures
            .get(time_point_id)
            .or_else(|| self.times.arrivals.get(time_point_id))
            .copied()
    }

    /// Whether the trip has a time at the given time point.
    pub fn serves(&self, time_point_id: &str) -> bool {
        self.times.arrivals.contains_key(time_point_id)
            || self.times.departures.contains_key(time_point_id)
    }

    /// Earliest departure of the trip (current times).
    pub fn first_departure(&self) -> Option<Minutes> {
        first_time(&self.times)
    }

    /// Earliest departure of the trip as constructed.
    pub fn original_first_departure(&self) -> Option<Minutes> {
        first_time(&self.original)
    }

    /// Net shift of the trip against its original snapshot (minutes).
    pub fn deviation(&self) -> Minutes {
        match (self.first_departure(), self.original_first_departure()) {
            (Some(now), Some(then)) => now - then,
            _ => 0,
        }
    }

    /// Total scheduled recovery across all time points.
    pub fn total_recovery(&self) -> Minutes {
        self.times.recovery.values().sum()
    }

    /// Time point where the trip holds its layover.
    ///
    /// The recovery entry at the latest-timed stop (untimed entries last).
    /// `None` for trips without recovery entries; their layover is not
    /// tracked and shifting them moves no recovery.
    pub fn layover_stop(&self) -> Option<String> {
        latest_stop(self, self.times.recovery.keys())
            .or_else(|| self.times.recovery.keys().next_back().cloned())
    }

    /// Shifts every arrival and departure by `delta` minutes.
    pub fn shift(&mut self, delta: Minutes) {
        for t in self.times.arrivals.values_mut() {
            *t += delta;
        }
        for t in self.times.departures.values_mut() {
            *t += delta;
        }
    }

    /// Changes the recovery held at a time point.
    pub fn adjust_recovery(&mut self, time_point_id: &str, change: Minutes) {
        *self
            .times
            .recovery
            .entry(time_point_id.to_string())
            .or_insert(0) += change;
    }

    /// Restores the original times.
    pub fn restore_original(&mut self) {
        self.times = self.original.clone();
    }

    /// Whether the current times differ from the original snapshot.
    pub fn is_modified(&self) -> bool {
        self.times != self.original
    }
}

fn latest_stop<'a>(trip: &Trip, ids: impl Iterator<Item = &'a String>) -> Option<String> {
    ids.filter_map(|id| trip.arrival_at(id).map(|t| (t, id)))
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
        .map(|(_, id)| id.clone())
}

fn first_time(times: &TripTimes) -> Option<Minutes> {
    times
        .departures
        .values()
        .min()
        .or_else(|| times.arrivals.values().min())
        .copied()
}

/// A draft schedule for one route, direction, and day type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Schedule identifier (used as a cache key).
    pub id: String,
    /// Route identifier.
    pub route_id: String,
    /// Route display name.
    pub route_name: String,
    /// Travel direction.
    pub direction: Direction,
    /// Day type the schedule operates on.
    pub day_type: DayType,
    /// Ordered time points of the route.
    pub time_points: Vec<TimePoint>,
    /// Trips of the schedule.
    pub trips: Vec<Trip>,
}

impl Schedule {
    /// Creates an empty schedule.
    pub fn new(id: impl Into<String>, route_id: impl Into<String>) -> Self {
        let route_id = route_id.into();
        Self {
            id: id.into(),
            route_name: route_id.clone(),
            route_id,
            ..Default::default()
        }
    }

    /// Sets the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the day type.
    pub fn with_day_type(mut self, day_type: DayType) -> Self {
        self.day_type = day_type;
        self
    }

    /// Appends a time point.
    pub fn with_time_point(mut self, time_point: TimePoint) -> Self {
        self.time_points.push(time_point);
        self
    }

    /// Appends a trip.
    pub fn with_trip(mut self, trip: Trip) -> Self {
        self.trips.push(trip);
        self
    }

    /// Number of trips.
    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    /// Whether the schedule has no trips.
    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    /// Finds a trip by number.
    pub fn trip(&self, trip_number: u32) -> Option<&Trip> {
        self.trips.iter().find(|t| t.trip_number == trip_number)
    }

    /// Finds a trip by number (mutable).
    pub fn trip_mut(&mut self, trip_number: u32) -> Option<&mut Trip> {
        self.trips.iter_mut().find(|t| t.trip_number == trip_number)
    }

    /// Whether a time point exists on the route.
    pub fn has_time_point(&self, time_point_id: &str) -> bool {
        self.time_points.iter().any(|tp| tp.id == time_point_id)
    }

    /// Trip numbers in route order (original first departure, then number).
    ///
    /// Ordering is defined on the original snapshot so it is stable while
    /// trips are being shifted.
    pub fn route_order(&self) -> Vec<u32> {
        let mut keyed: Vec<(Minutes, u32)> = self
            .trips
            .iter()
            .filter_map(|t| t.original_first_departure().map(|d| (d, t.trip_number)))
            .collect();
        keyed.sort_unstable();
        keyed.into_iter().map(|(_, n)| n).collect()
    }

    /// Trip numbers of one block in operating order.
    pub fn block_order(&self, block_number: u32) -> Vec<u32> {
        let mut keyed: Vec<(Minutes, u32)> = self
            .trips
            .iter()
            .filter(|t| t.block_number == block_number)
            .filter_map(|t| t.original_first_departure().map(|d| (d, t.trip_number)))
            .collect();
        keyed.sort_unstable();
        keyed.into_iter().map(|(_, n)| n).collect()
    }

    /// The trip operated immediately before `trip_number` in its block.
    pub fn previous_in_block(&self, trip_number: u32) -> Option<u32> {
        let trip = self.trip(trip_number)?;
        let order = self.block_order(trip.block_number);
        let pos = order.iter().position(|&n| n == trip_number)?;
        pos.checked_sub(1).map(|p| order[p])
    }

    /// Recovery changes caused by shifting `trip_number` by `delta`.
    ///
    /// The shifted trip's own layover changes by `-delta`; the preceding trip
    /// in the block changes by `+delta`.
    pub fn recovery_impacts(&self, trip_number: u32, delta: Minutes) -> Vec<RecoveryImpact> {
        let mut impacts = Vec::new();
        if delta == 0 {
            return impacts;
        }
        if let Some(stop) = self.trip(trip_number).and_then(Trip::layover_stop) {
            impacts.push(RecoveryImpact {
                trip_number,
                stop_id: stop,
                change: -delta,
            });
        }
        if let Some(prev) = self.previous_in_block(trip_number) {
            if let Some(stop) = self.trip(prev).and_then(Trip::layover_stop) {
                impacts.push(RecoveryImpact {
                    trip_number: prev,
                    stop_id: stop,
                    change: delta,
                });
            }
        }
        impacts
    }

    /// Whether shifting `trip_number` by `delta` keeps route and block order.
    ///
    /// The shifted first departure must stay within the current first
    /// departures of its route neighbors and block neighbors (ties allowed).
    pub fn preserves_order(&self, trip_number: u32, delta: Minutes) -> bool {
        let Some(trip) = self.trip(trip_number) else {
            return false;
        };
        let Some(shifted) = trip.first_departure().map(|d| d + delta) else {
            return false;
        };
        let within = |order: &[u32]| -> bool {
            let Some(pos) = order.iter().position(|&n| n == trip_number) else {
                return true;
            };
            let before = pos
                .checked_sub(1)
                .and_then(|p| self.trip(order[p]))
                .and_then(Trip::first_departure);
            let after = order
                .get(pos + 1)
                .and_then(|&n| self.trip(n))
                .and_then(Trip::first_departure);
            before.map_or(true, |b| shifted >= b) && after.map_or(true, |a| shifted <= a)
        };
        within(&self.route_order()) && within(&self.block_order(trip.block_number))
    }

    /// Shifts a trip, applies the resulting recovery changes, and credits
    /// any borrowed recovery to the trips that took the loans.
    ///
    /// Returns the recovery impacts that were applied. Unknown trips are
    /// left untouched and produce no impacts.
    pub fn apply_shift(&mut self, trip_number: u32, delta: Minutes, loans: &[Loan]) -> Vec<RecoveryImpact> {
        if self.trip(trip_number).is_none() {
            return Vec::new();
        }
        let impacts = self.recovery_impacts(trip_number, delta);
        if let Some(trip) = self.trip_mut(trip_number) {
            trip.shift(delta);
        }
        for impact in &impacts {
            if let Some(t) = self.trip_mut(impact.trip_number) {
                t.adjust_recovery(&impact.stop_id, impact.change);
            }
        }
        for loan in loans {
            if let Some(t) = self.trip_mut(loan.trip_number) {
                t.adjust_recovery(&loan.stop_id, loan.minutes);
            }
        }
        impacts
    }

    /// Distinct block numbers in ascending order.
    pub fn blocks(&self) -> Vec<u32> {
        let mut seen = HashSet::new();
        let mut blocks: Vec<u32> = self
            .trips
            .iter()
            .map(|t| t.block_number)
            .filter(|b| seen.insert(*b))
            .collect();
        blocks.sort_unstable();
        blocks
    }

    /// Rough heap footprint in bytes, for memory budgeting.
    pub fn estimated_size_bytes(&self) -> usize {
        let per_entry = std::mem::size_of::<(String, Minutes)>() + 16;
        let trips: usize = self
            .trips
            .iter()
            .map(|t| {
                let entries = t.times.arrivals.len()
                    + t.times.departures.len()
                    + t.times.recovery.len();
                std::mem::size_of::<Trip>() + 2 * entries * per_entry
            })
            .sum();
        std::mem::size_of::<Self>()
            + trips
            + self.time_points.len() * (std::mem::size_of::<TimePoint>() + 16)
    }
}
