//! Optimization result, statistics, and progress types.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{
    ConnectionType, FailureReason, HeadwayCorrection, Minutes, Move, RecoveryBank, Schedule,
    WindowClass,
};

/// Phase of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptimizationPhase {
    /// Request validation.
    Validating,
    /// Opportunity analysis.
    Analyzing,
    /// Recovery bank initialization.
    InitializingBank,
    /// Connection search.
    Optimizing,
    /// Headway correction.
    CorrectingHeadways,
    /// Statistics and recommendations.
    Compiling,
    /// Run finished.
    Complete,
}

impl OptimizationPhase {
    /// Progress percent range `(start, end)` the phase occupies.
    pub fn percent_range(self) -> (f64, f64) {
        match self {
            Self::Validating => (0.0, 5.0),
            Self::Analyzing => (5.0, 15.0),
            Self::InitializingBank => (15.0, 20.0),
            Self::Optimizing => (20.0, 85.0),
            Self::CorrectingHeadways => (85.0, 95.0),
            Self::Compiling => (95.0, 100.0),
            Self::Complete => (100.0, 100.0),
        }
    }
}

impl fmt::Display for OptimizationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validating => "validation",
            Self::Analyzing => "opportunity analysis",
            Self::InitializingBank => "recovery bank initialization",
            Self::Optimizing => "connection optimization",
            Self::CorrectingHeadways => "headway correction",
            Self::Compiling => "result compilation",
            Self::Complete => "completion",
        };
        f.write_str(s)
    }
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Every opportunity was resolved.
    Exhausted,
    /// Score improvement stalled.
    Converged,
    /// Iteration cap reached.
    MaxIterations,
    /// Score reached the early-termination fraction of the maximum.
    EarlyTermination,
    /// Cancellation was requested.
    Cancelled,
    /// Wall-clock budget exceeded.
    TimeBudget,
}

/// Progress snapshot delivered to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationProgress {
    /// Percent complete (0-100, non-decreasing within a run).
    pub progress: f64,
    /// Current phase.
    pub phase: OptimizationPhase,
    /// Score of the working schedule.
    pub current_score: f64,
    /// Best score seen so far.
    pub best_score: f64,
    /// Opportunities currently connected.
    pub connections_made: usize,
    /// Remaining time estimate, when one can be made.
    pub estimated_time_remaining_ms: Option<u64>,
    /// Estimated memory in use (MB).
    pub memory_usage_mb: f64,
    /// Whether cancellation is still honored.
    pub can_cancel: bool,
}

/// A connection made by the optimized schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOutcome {
    /// Opportunity id.
    pub opportunity_id: String,
    /// Connection type.
    pub connection_type: ConnectionType,
    /// Transfer location.
    pub location_id: String,
    /// Trip that makes the connection.
    pub trip_number: u32,
    /// Achieved gap (minutes).
    pub gap: Minutes,
    /// Achieved class.
    pub class: WindowClass,
    /// Opportunity priority.
    pub priority: u8,
}

/// A connection the optimized schedule does not make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedConnection {
    /// Opportunity id.
    pub opportunity_id: String,
    /// Connection type.
    pub connection_type: ConnectionType,
    /// Opportunity priority.
    pub priority: u8,
    /// Why it failed.
    pub reason: FailureReason,
    /// Closest achieved gap, if any trip serves the location.
    pub best_gap: Option<Minutes>,
}

/// Run counters and derived rates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStatistics {
    /// Opportunities in the request.
    pub total_opportunities: usize,
    /// Opportunities connected.
    pub successful_connections: usize,
    /// Opportunities not connected.
    pub failed_connections: usize,
    /// `successful / total` (0..=1).
    pub success_rate: f64,
    /// Mean gap of made connections (minutes).
    pub average_connection_time: f64,
    /// Fraction of the recovery pool lent out (0..=1).
    pub recovery_utilization: f64,
    /// Fraction of trips within every hard constraint (0..=1).
    pub constraint_compliance_rate: f64,
    /// Headway regularity (0..=1).
    pub headway_regularity: f64,
    /// Search iterations.
    pub iterations: usize,
    /// Applied moves.
    pub moves_applied: usize,
    /// Rejected candidates.
    pub moves_rejected: usize,
    /// Applied headway corrections.
    pub corrections_applied: usize,
    /// Skipped headway corrections.
    pub corrections_skipped: usize,
    /// Analysis cache hits so far.
    pub cache_hits: u64,
    /// Analysis cache misses so far.
    pub cache_misses: u64,
    /// Wall-clock duration of the run (ms).
    pub optimization_time_ms: u64,
    /// Duration of each phase (ms).
    pub phase_timings_ms: Vec<(OptimizationPhase, u64)>,
}

/// Resource and quality percentages of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Elapsed time as a percent of the time budget.
    pub time_used_percent: f64,
    /// Peak estimated memory as a percent of the memory budget.
    pub memory_used_percent: f64,
    /// Peak estimated memory (MB).
    pub peak_memory_mb: f64,
    /// Final score as a percent of the theoretical maximum.
    pub score_percent: f64,
    /// Score gain over the initial schedule, as a percent of the maximum.
    pub improvement_percent: f64,
}

/// Outcome of an optimization run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Whether the run produced a usable schedule.
    pub success: bool,
    /// Best-effort optimized schedule.
    pub optimized_schedule: Option<Schedule>,
    /// Score of the optimized schedule.
    pub final_score: f64,
    /// Connections made.
    pub successful_connections: Vec<ConnectionOutcome>,
    /// Connections not made.
    pub failed_connections: Vec<FailedConnection>,
    /// Moves applied by the search, in order.
    pub applied_moves: Vec<Move>,
    /// Ledger state at the end of the search.
    pub final_recovery_state: Option<RecoveryBank>,
    /// Headway corrections, applied and skipped.
    pub headway_corrections: Vec<HeadwayCorrection>,
    /// Counters and rates.
    pub statistics: OptimizationStatistics,
    /// Budget and quality percentages.
    pub performance: PerformanceReport,
    /// Suggestions derived from the statistics.
    pub recommendations: Vec<String>,
    /// Non-fatal issues.
    pub warnings: Vec<String>,
    /// Error message when `success` is false.
    pub error: Option<String>,
    /// Why the search stopped.
    pub termination: Option<TerminationReason>,
}

impl OptimizationResult {
    /// A failed result carrying only an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ranges_are_contiguous() {
        let phases = [
            OptimizationPhase::Validating,
            OptimizationPhase::Analyzing,
            OptimizationPhase::InitializingBank,
            OptimizationPhase::Optimizing,
            OptimizationPhase::CorrectingHeadways,
            OptimizationPhase::Compiling,
            OptimizationPhase::Complete,
        ];
        for pair in phases.windows(2) {
            assert_eq!(pair[0].percent_range().1, pair[1].percent_range().0);
        }
    }

    #[test]
    fn test_failure_result() {
        let r = OptimizationResult::failure("boom");
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(r.optimized_schedule.is_none());
    }
}
