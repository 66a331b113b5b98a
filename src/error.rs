//! Error types.
//!
//! Only validation failures and concurrent runs reject a request before work
//! starts. Per-opportunity infeasibility is reported through
//! [`FailureReason`](crate::models::FailureReason) and never aborts a run;
//! internal phase failures are sanitized before they reach the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Minutes, OptimizationPhase};
use crate::validation::ValidationError;

/// Error returned in place of a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizationError {
    /// The request failed validation.
    #[error("Invalid optimization request: {}", summarize(.0))]
    Validation(Vec<ValidationError>),
    /// Another run holds the service.
    #[error("Optimization already in progress")]
    ConcurrentRun,
    /// A phase failed; the message carries no internal state.
    #[error("{0}")]
    Unexpected(String),
}

impl OptimizationError {
    /// Sanitized error for a failed phase.
    pub fn unexpected(phase: OptimizationPhase) -> Self {
        Self::Unexpected(format!("Optimization failed during {phase}"))
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Reason the recovery bank refused a loan.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BorrowError {
    /// Borrowing is disabled for the run.
    #[error("borrowing is disabled")]
    Disabled,
    /// The stop holds no account.
    #[error("no recovery account at stop '{stop_id}'")]
    UnknownStop {
        /// Requested stop.
        stop_id: String,
    },
    /// The requested amount is not positive.
    #[error("invalid borrow amount {amount}")]
    InvalidAmount {
        /// Requested amount.
        amount: Minutes,
    },
    /// The stop's ratio cap would be exceeded.
    #[error("stop '{stop_id}' can lend {headroom} min, {requested} requested")]
    StopCapExceeded {
        /// Requested stop.
        stop_id: String,
        /// Requested amount.
        requested: Minutes,
        /// Amount the stop can still lend.
        headroom: Minutes,
    },
    /// The global ratio cap would be exceeded.
    #[error("global borrowing cap allows {headroom} min, {requested} requested")]
    RatioCapExceeded {
        /// Requested amount.
        requested: Minutes,
        /// Amount the pool can still lend.
        headroom: Minutes,
    },
    /// The loan would not lift the trip to the recovery floor.
    #[error("trip {trip_number} would keep {resulting} min of recovery, minimum is {minimum}")]
    FloorViolation {
        /// Borrowing trip.
        trip_number: u32,
        /// Recovery after the move and the loan.
        resulting: Minutes,
        /// Recovery floor.
        minimum: Minutes,
    },
    /// The trip has no outstanding loan at the stop to repay.
    #[error("trip {trip_number} owes nothing at stop '{stop_id}'")]
    NoOutstandingLoan {
        /// Stop of the repayment.
        stop_id: String,
        /// Repaying trip.
        trip_number: u32,
    },
}

/// Internal failure of a phase. Never shown to callers verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhaseError {
    /// Ledger totals drifted from the accounts beyond tolerance.
    #[error("ledger drift of {drift} min after reconciliation")]
    LedgerDrift {
        /// Absolute drift in minutes.
        drift: Minutes,
    },
    /// A state invariant failed.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationErrorKind;

    #[test]
    fn test_concurrent_run_message() {
        assert_eq!(
            OptimizationError::ConcurrentRun.to_string(),
            "Optimization already in progress"
        );
    }

    #[test]
    fn test_unexpected_is_sanitized() {
        let e = OptimizationError::unexpected(OptimizationPhase::Optimizing);
        assert_eq!(e.to_string(), "Optimization failed during connection optimization");
    }

    #[test]
    fn test_validation_summary() {
        let e = OptimizationError::Validation(vec![
            ValidationError::new(ValidationErrorKind::EmptySchedule, "Schedule has no trips"),
            ValidationError::new(ValidationErrorKind::NoOpportunities, "No connection opportunities"),
        ]);
        let msg = e.to_string();
        assert!(msg.contains("Schedule has no trips; No connection opportunities"));
    }

    #[test]
    fn test_borrow_error_display() {
        let e = BorrowError::StopCapExceeded {
            stop_id: "A".into(),
            requested: 4,
            headroom: 1,
        };
        assert_eq!(e.to_string(), "stop 'A' can lend 1 min, 4 requested");
    }
}
