//! Schedule invariants.
//!
//! [`check_shift`] gates a single proposed shift; [`check_state`] verifies a
//! whole state against its input schedule and can be run after every move
//! (see [`OptimizationState::replay`](super::OptimizationState::replay)).
//!
//! | Invariant | Condition |
//! |-----------|-----------|
//! | Borrow cap | `Σ borrowed ≤ Σ available × ratio`, per stop and globally |
//! | Recovery floor | recovery ≥ `min(min_recovery_time, original)` |
//! | Trip deviation | `|net shift| ≤ max_trip_deviation` |
//! | Schedule shift | `Σ |shifts| ≤ max_schedule_shift` |
//! | Structure | same trips, same blocks, route and block order kept |

use std::fmt;

use super::OptimizationState;
use crate::models::{Minutes, OptimizationConstraints, RecoveryBank, RecoveryImpact, Schedule};

/// Why a proposed shift breaks a hard limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShiftViolation {
    /// Net trip shift over the cap.
    DeviationCap { required: Minutes, allowed: Minutes },
    /// Schedule-wide shift over the cap.
    ScheduleShiftCap { required: Minutes, remaining: Minutes },
    /// Trip would overtake a neighbor.
    TripOrder,
    /// A layover would grow above the ceiling.
    RecoveryCeiling { trip_number: u32, resulting: Minutes },
}

/// A layover that would fall below the floor; the move needs to borrow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryShortfall {
    /// Trip whose layover falls short.
    pub trip_number: u32,
    /// Stop where the layover is held.
    pub stop_id: String,
    /// Recovery after the move.
    pub after: Minutes,
    /// Minutes needed to reach the floor.
    pub shortfall: Minutes,
}

/// Effects of a shift that passed the hard limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftCheck {
    /// Recovery changes the shift causes.
    pub impacts: Vec<RecoveryImpact>,
    /// Layovers that must be funded by borrowing.
    pub shortfalls: Vec<RecoveryShortfall>,
}

/// Checks a shift against the caps, ordering, and recovery bounds.
///
/// Recovery shortfalls are not violations here; the caller decides whether
/// they can be borrowed.
pub fn check_shift(
    schedule: &Schedule,
    trip_number: u32,
    delta: Minutes,
    constraints: &OptimizationConstraints,
    schedule_shift_used: Minutes,
) -> Result<ShiftCheck, ShiftViolation> {
    let deviation = schedule.trip(trip_number).map_or(0, |t| t.deviation());
    let required = deviation.saturating_add(delta);
    if required.saturating_abs() > constraints.max_trip_deviation {
        return Err(ShiftViolation::DeviationCap {
            required,
            allowed: constraints.max_trip_deviation,
        });
    }

    let remaining = constraints.max_schedule_shift.saturating_sub(schedule_shift_used);
    if delta.saturating_abs() > remaining {
        return Err(ShiftViolation::ScheduleShiftCap {
            required: delta.saturating_abs(),
            remaining: remaining.max(0),
        });
    }

    if !schedule.preserves_order(trip_number, delta) {
        return Err(ShiftViolation::TripOrder);
    }

    let impacts = schedule.recovery_impacts(trip_number, delta);
    let mut shortfalls = Vec::new();
    for impact in &impacts {
        let before = schedule.trip(impact.trip_number).map_or(0, |t| t.total_recovery());
        let after = before + impact.change;
        if impact.change > 0 && after > constraints.max_recovery_time {
            return Err(ShiftViolation::RecoveryCeiling {
                trip_number: impact.trip_number,
                resulting: after,
            });
        }
        if impact.change < 0 && after < constraints.min_recovery_time {
            shortfalls.push(RecoveryShortfall {
                trip_number: impact.trip_number,
                stop_id: impact.stop_id.clone(),
                after,
                shortfall: constraints.min_recovery_time - after,
            });
        }
    }

    Ok(ShiftCheck {
        impacts,
        shortfalls,
    })
}

/// A broken state invariant.
#[derive(Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    /// Ledger exceeds a ratio cap.
    BorrowCap { borrowed: Minutes, available: Minutes },
    /// Trip recovery below the floor it started at or above.
    RecoveryFloor { trip_number: u32, recovery: Minutes },
    /// Net trip shift over the cap.
    TripDeviation { trip_number: u32, deviation: Minutes },
    /// Schedule-wide shift over the cap.
    ScheduleShift { used: Minutes },
    /// Trip set or block membership changed.
    Structure { trip_number: u32 },
    /// Trips out of route or block order.
    Order { leading: u32, trailing: u32 },
    /// An applied move lowered the score.
    ScoreDecrease { before: f64, after: f64 },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BorrowCap { borrowed, available } => {
                write!(f, "borrowed {borrowed} of {available} available exceeds cap")
            }
            Self::RecoveryFloor { trip_number, recovery } => {
                write!(f, "trip {trip_number} recovery {recovery} below floor")
            }
            Self::TripDeviation { trip_number, deviation } => {
                write!(f, "trip {trip_number} shifted {deviation} min")
            }
            Self::ScheduleShift { used } => write!(f, "schedule shifted {used} min in total"),
            Self::Structure { trip_number } => write!(f, "trip {trip_number} changed block or vanished"),
            Self::Order { leading, trailing } => {
                write!(f, "trip {trailing} departs before trip {leading}")
            }
            Self::ScoreDecrease { before, after } => {
                write!(f, "score fell from {before:.3} to {after:.3}")
            }
        }
    }
}

/// Checks a working schedule against its input schedule.
pub fn check_schedule(
    original: &Schedule,
    current: &Schedule,
    constraints: &OptimizationConstraints,
    schedule_shift_used: Minutes,
) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    if current.trip_count() != original.trip_count() {
        violations.push(InvariantViolation::Structure { trip_number: 0 });
    }
    for trip in &original.trips {
        let Some(now) = current.trip(trip.trip_number) else {
            violations.push(InvariantViolation::Structure {
                trip_number: trip.trip_number,
            });
            continue;
        };
        if now.block_number != trip.block_number {
            violations.push(InvariantViolation::Structure {
                trip_number: trip.trip_number,
            });
        }
        let deviation = now.deviation();
        if deviation.abs() > constraints.max_trip_deviation {
            violations.push(InvariantViolation::TripDeviation {
                trip_number: trip.trip_number,
                deviation,
            });
        }
        let floor = constraints.min_recovery_time.min(trip.total_recovery());
        if now.total_recovery() < floor {
            violations.push(InvariantViolation::RecoveryFloor {
                trip_number: trip.trip_number,
                recovery: now.total_recovery(),
            });
        }
    }

    let net: Minutes = current.trips.iter().map(|t| t.deviation().abs()).sum();
    if schedule_shift_used > constraints.max_schedule_shift || net > constraints.max_schedule_shift {
        violations.push(InvariantViolation::ScheduleShift {
            used: schedule_shift_used.max(net),
        });
    }

    let mut orders = vec![current.route_order()];
    orders.extend(current.blocks().into_iter().map(|b| current.block_order(b)));
    for order in orders {
        for pair in order.windows(2) {
            let lead = current.trip(pair[0]).and_then(|t| t.first_departure());
            let trail = current.trip(pair[1]).and_then(|t| t.first_departure());
            if let (Some(a), Some(b)) = (lead, trail) {
                if b < a {
                    violations.push(InvariantViolation::Order {
                        leading: pair[0],
                        trailing: pair[1],
                    });
                }
            }
        }
    }

    violations
}

/// Checks a state and the ledger backing it.
pub fn check_state(
    original: &Schedule,
    state: &OptimizationState,
    constraints: &OptimizationConstraints,
    bank: &RecoveryBank,
) -> Result<(), Vec<InvariantViolation>> {
    let mut violations = check_schedule(original, &state.schedule, constraints, state.schedule_shift_used);
    if !bank.within_caps() {
        violations.push(InvariantViolation::BorrowCap {
            borrowed: bank.total_borrowed_recovery,
            available: bank.total_available_recovery,
        });
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Trip;

    fn make_schedule() -> Schedule {
        Schedule::new("S", "R")
            .with_trip(
                Trip::new(1, 7)
                    .with_stop("A", 600, 600)
                    .with_stop("B", 620, 620)
                    .with_recovery("B", 6),
            )
            .with_trip(
                Trip::new(2, 7)
                    .with_stop("A", 630, 630)
                    .with_stop("B", 650, 650)
                    .with_recovery("B", 3),
            )
    }

    #[test]
    fn test_check_shift_caps() {
        let s = make_schedule();
        let c = OptimizationConstraints::default().with_max_trip_deviation(5);
        assert_eq!(
            check_shift(&s, 2, 6, &c, 0),
            Err(ShiftViolation::DeviationCap { required: 6, allowed: 5 })
        );
        assert_eq!(
            check_shift(&s, 2, 3, &c, 58),
            Err(ShiftViolation::ScheduleShiftCap { required: 3, remaining: 2 })
        );
        assert_eq!(check_shift(&s, 2, -5, &c, 0).map(|_| ()), Ok(()));
    }

    #[test]
    fn test_check_shift_extreme_delta_hits_cap() {
        let s = make_schedule();
        let c = OptimizationConstraints::default();
        assert_eq!(
            check_shift(&s, 2, Minutes::MIN, &c, 0),
            Err(ShiftViolation::DeviationCap { required: Minutes::MIN, allowed: 10 })
        );
        assert!(matches!(
            check_shift(&s, 2, Minutes::MAX, &c, 0),
            Err(ShiftViolation::DeviationCap { .. })
        ));
    }

    #[test]
    fn test_check_shift_order() {
        let s = make_schedule();
        let c = OptimizationConstraints::default().with_max_trip_deviation(60);
        assert_eq!(check_shift(&s, 2, -31, &c, 0), Err(ShiftViolation::TripOrder));
    }

    #[test]
    fn test_check_shift_reports_shortfall() {
        let s = make_schedule();
        let c = OptimizationConstraints::default();
        // Delaying trip 2 by 4 leaves it 3 - 4 = -1; floor 2.
        let check = check_shift(&s, 2, 4, &c, 0).unwrap();
        assert_eq!(check.shortfalls.len(), 1);
        assert_eq!(check.shortfalls[0].shortfall, 3);
        assert_eq!(check.shortfalls[0].stop_id, "B");
        // Advancing trip 2 by 4 shrinks trip 1 from 6 to 2: exactly the floor.
        assert!(check_shift(&s, 2, -4, &c, 0).unwrap().shortfalls.is_empty());
    }

    #[test]
    fn test_check_shift_ceiling() {
        let s = make_schedule();
        let c = OptimizationConstraints::default().with_recovery_range(2, 8);
        assert_eq!(
            check_shift(&s, 2, 3, &c, 0),
            Err(ShiftViolation::RecoveryCeiling { trip_number: 1, resulting: 9 })
        );
    }

    #[test]
    fn test_check_schedule_detects_violations() {
        let original = make_schedule();
        let c = OptimizationConstraints::default().with_max_trip_deviation(5);
        assert!(check_schedule(&original, &original, &c, 0).is_empty());

        let mut moved = original.clone();
        moved.apply_shift(2, -8, &[]);
        let v = check_schedule(&original, &moved, &c, 8);
        assert!(v.iter().any(|x| matches!(x, InvariantViolation::TripDeviation { trip_number: 2, .. })));
        // Trip 1 shrank from 6 to -2.
        assert!(v.iter().any(|x| matches!(x, InvariantViolation::RecoveryFloor { trip_number: 1, .. })));

        let mut reordered = original.clone();
        reordered.trip_mut(2).unwrap().shift(-40);
        let v = check_schedule(&original, &reordered, &c.with_max_trip_deviation(60), 40);
        assert!(v.iter().any(|x| matches!(x, InvariantViolation::Order { .. })));
    }
}
