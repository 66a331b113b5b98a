//! Timing moves and their outcomes.
//!
//! A move shifts one trip by a signed number of minutes on behalf of one
//! connection opportunity. Moves are recorded once (applied or rejected)
//! and never modified afterwards, so the lists form an audit trail.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DayType, Minutes};
use crate::error::BorrowError;

/// Recovery credit borrowed from a stop ledger for one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Stop whose ledger lent the minutes.
    pub stop_id: String,
    /// Trip credited with the minutes.
    pub trip_number: u32,
    /// Borrowed minutes (positive).
    pub minutes: Minutes,
}

impl Loan {
    /// Creates a loan record.
    pub fn new(stop_id: impl Into<String>, trip_number: u32, minutes: Minutes) -> Self {
        Self {
            stop_id: stop_id.into(),
            trip_number,
            minutes,
        }
    }
}

/// A timing adjustment to a single trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    /// Shifted trip.
    pub trip_number: u32,
    /// Signed shift (positive = later).
    pub delta: Minutes,
    /// Connection the move targets.
    pub connection_id: String,
    /// Change in total score caused by the move.
    pub score_delta: f64,
    /// Recovery borrowed to keep layovers above the floor.
    pub loans: Vec<Loan>,
}

impl Move {
    /// Creates a move with no loans.
    pub fn new(trip_number: u32, delta: Minutes, connection_id: impl Into<String>, score_delta: f64) -> Self {
        Self {
            trip_number,
            delta,
            connection_id: connection_id.into(),
            score_delta,
            loans: Vec::new(),
        }
    }

    /// Total borrowed minutes.
    pub fn borrowed_minutes(&self) -> Minutes {
        self.loans.iter().map(|l| l.minutes).sum()
    }
}

/// A candidate move that was not applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedMove {
    /// The candidate as evaluated.
    pub candidate: Move,
    /// Why it was not applied.
    pub reason: FailureReason,
}

/// Why a move was rejected or a connection could not be made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The external service does not run on the schedule's day type.
    NotOperating {
        /// Schedule day type.
        day_type: DayType,
    },
    /// No trip in the schedule serves the connection location.
    NoServingTrip {
        /// Connection location.
        location_id: String,
    },
    /// The trip's net shift would exceed the per-trip cap.
    DeviationCap {
        /// Net shift the move would produce.
        required: Minutes,
        /// Configured cap.
        allowed: Minutes,
    },
    /// The schedule-wide shift would exceed its cap.
    ScheduleShiftCap {
        /// Shift requested by the move.
        required: Minutes,
        /// Shift still available.
        remaining: Minutes,
    },
    /// The move would reorder trips within the route or block.
    TripOrder {
        /// Trip that would overtake a neighbor.
        trip_number: u32,
    },
    /// A layover would fall below the floor and borrowing is disabled.
    RecoveryFloor {
        /// Trip whose layover falls short.
        trip_number: u32,
        /// Missing minutes.
        shortfall: Minutes,
    },
    /// A layover would grow above the recovery ceiling.
    RecoveryCeiling {
        /// Trip whose layover grows.
        trip_number: u32,
        /// Recovery after the move.
        resulting: Minutes,
    },
    /// The recovery bank refused the loan.
    BorrowRefused(BorrowError),
    /// The move would lower the total score.
    ScoreDecrease {
        /// Score change the move would cause.
        score_delta: f64,
    },
    /// The search terminated before the connection was attempted.
    NotAttempted,
    /// The connection was met earlier but a later adjustment broke it.
    Lost,
}

impl FailureReason {
    /// Whether applying other moves first could make the same move succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TripOrder { .. }
                | Self::RecoveryFloor { .. }
                | Self::RecoveryCeiling { .. }
                | Self::BorrowRefused(_)
                | Self::ScoreDecrease { .. }
        )
    }

    /// Short machine-friendly category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotOperating { .. } => "not_operating",
            Self::NoServingTrip { .. } => "no_serving_trip",
            Self::DeviationCap { .. } => "deviation_cap",
            Self::ScheduleShiftCap { .. } => "schedule_shift_cap",
            Self::TripOrder { .. } => "trip_order",
            Self::RecoveryFloor { .. } | Self::RecoveryCeiling { .. } => "recovery",
            Self::BorrowRefused(_) => "borrowing",
            Self::ScoreDecrease { .. } => "score_decrease",
            Self::NotAttempted => "not_attempted",
            Self::Lost => "lost",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOperating { day_type } => {
                write!(f, "connection does not operate on {day_type:?}")
            }
            Self::NoServingTrip { location_id } => {
                write!(f, "no trip serves location '{location_id}'")
            }
            Self::DeviationCap { required, allowed } => write!(
                f,
                "required shift of {required} min exceeds max trip deviation of {allowed} min"
            ),
            Self::ScheduleShiftCap { required, remaining } => write!(
                f,
                "shift of {required} min exceeds remaining schedule shift of {remaining} min"
            ),
            Self::TripOrder { trip_number } => {
                write!(f, "trip {trip_number} would overtake a neighboring trip")
            }
            Self::RecoveryFloor {
                trip_number,
                shortfall,
            } => write!(
                f,
                "trip {trip_number} would fall {shortfall} min below minimum recovery"
            ),
            Self::RecoveryCeiling {
                trip_number,
                resulting,
            } => write!(
                f,
                "trip {trip_number} recovery would grow to {resulting} min, above maximum"
            ),
            Self::BorrowRefused(err) => write!(f, "recovery borrowing refused: {err}"),
            Self::ScoreDecrease { score_delta } => {
                write!(f, "move would lower the score by {:.3}", -score_delta)
            }
            Self::NotAttempted => f.write_str("search terminated before the connection was attempted"),
            Self::Lost => f.write_str("connection was broken by a later adjustment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_borrowed_minutes() {
        let mut m = Move::new(1, 4, "C1", 1.0);
        assert_eq!(m.borrowed_minutes(), 0);
        m.loans.push(Loan::new("A", 1, 2));
        m.loans.push(Loan::new("B", 0, 1));
        assert_eq!(m.borrowed_minutes(), 3);
    }

    #[test]
    fn test_deviation_cap_message() {
        let r = FailureReason::DeviationCap {
            required: 15,
            allowed: 10,
        };
        let msg = r.to_string();
        assert!(msg.contains("max trip deviation"));
        assert!(msg.contains("15"));
        assert!(!r.is_retryable());
        assert_eq!(r.category(), "deviation_cap");
    }

    #[test]
    fn test_retryable_reasons() {
        assert!(FailureReason::ScoreDecrease { score_delta: -1.0 }.is_retryable());
        assert!(FailureReason::BorrowRefused(BorrowError::Disabled).is_retryable());
        assert!(!FailureReason::NotAttempted.is_retryable());
    }
}
