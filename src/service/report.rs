//! Result compilation: connection outcomes, statistics, recommendations.

use std::collections::BTreeMap;

use crate::engine::{EngineOutcome, OptimizationState, Resolution};
use crate::models::{
    ConnectionOutcome, CorrectionResult, FailedConnection, FailureReason, OptimizationConstraints,
    OptimizationStatistics, PerformanceReport, Schedule, TerminationReason,
};
use crate::windows::{best_gap, trip_gaps, AnalyzedOpportunity};

/// Recovery utilization above which a recommendation is issued.
const HIGH_UTILIZATION: f64 = 0.8;

/// Successful and failed connections, in request order.
pub fn connection_outcomes(
    analyzed: &[AnalyzedOpportunity],
    state: &OptimizationState,
    schedule: &Schedule,
) -> (Vec<ConnectionOutcome>, Vec<FailedConnection>) {
    let mut made = Vec::new();
    let mut failed = Vec::new();
    for a in analyzed {
        let opp = &a.opportunity;
        match state.resolutions.get(&opp.id) {
            Some(Resolution::Connected {
                trip_number,
                gap,
                class,
            }) => made.push(ConnectionOutcome {
                opportunity_id: opp.id.clone(),
                connection_type: opp.connection_type,
                location_id: opp.location_id.clone(),
                trip_number: *trip_number,
                gap: *gap,
                class: *class,
                priority: opp.priority,
            }),
            other => {
                let reason = match other {
                    Some(Resolution::Failed(reason)) => reason.clone(),
                    _ => FailureReason::NotAttempted,
                };
                let gaps = trip_gaps(schedule, opp, &a.window);
                failed.push(FailedConnection {
                    opportunity_id: opp.id.clone(),
                    connection_type: opp.connection_type,
                    priority: opp.priority,
                    reason,
                    best_gap: best_gap(&gaps, &a.window, opp.window_hint).map(|g| g.gap),
                });
            }
        }
    }
    (made, failed)
}

/// Fraction of trips within the recovery floor and deviation cap.
pub fn constraint_compliance(schedule: &Schedule, constraints: &OptimizationConstraints) -> f64 {
    if schedule.trips.is_empty() {
        return 1.0;
    }
    let compliant = schedule
        .trips
        .iter()
        .filter(|t| {
            t.total_recovery() >= constraints.min_recovery_time
                && t.deviation().abs() <= constraints.max_trip_deviation
        })
        .count();
    compliant as f64 / schedule.trips.len() as f64
}

/// Run counters and rates. Timings, cache counters, and utilization are
/// filled in by the caller.
pub fn statistics(
    made: &[ConnectionOutcome],
    failed: &[FailedConnection],
    outcome: &EngineOutcome,
    correction: Option<&CorrectionResult>,
    final_schedule: &Schedule,
    constraints: &OptimizationConstraints,
) -> OptimizationStatistics {
    let total = made.len() + failed.len();
    let success_rate = if total == 0 {
        0.0
    } else {
        made.len() as f64 / total as f64
    };
    let average_connection_time = if made.is_empty() {
        0.0
    } else {
        made.iter().map(|c| f64::from(c.gap)).sum::<f64>() / made.len() as f64
    };
    let headway_regularity = match correction {
        Some(c) => c.regularity_score,
        None => crate::headway::regularity_score(&outcome.state.headway_deviations),
    };

    OptimizationStatistics {
        total_opportunities: total,
        successful_connections: made.len(),
        failed_connections: failed.len(),
        success_rate,
        average_connection_time,
        constraint_compliance_rate: constraint_compliance(final_schedule, constraints),
        headway_regularity,
        iterations: outcome.iterations,
        moves_applied: outcome.state.applied_moves.len(),
        moves_rejected: outcome.state.rejected_moves.len(),
        corrections_applied: correction.map_or(0, CorrectionResult::applied_count),
        corrections_skipped: correction.map_or(0, CorrectionResult::skipped_count),
        ..OptimizationStatistics::default()
    }
}

/// Score side of the performance report.
pub fn score_percentages(final_score: f64, initial_score: f64, max_score: f64) -> (f64, f64) {
    let score_percent = if max_score > 0.0 {
        100.0 * final_score / max_score
    } else {
        0.0
    };
    let improvement_percent = if initial_score > 0.0 {
        100.0 * (final_score - initial_score) / initial_score
    } else if final_score > 0.0 {
        100.0
    } else {
        0.0
    };
    (score_percent, improvement_percent)
}

/// Fills the score fields of `report`.
pub fn with_scores(mut report: PerformanceReport, final_score: f64, initial_score: f64, max_score: f64) -> PerformanceReport {
    let (score_percent, improvement_percent) = score_percentages(final_score, initial_score, max_score);
    report.score_percent = score_percent;
    report.improvement_percent = improvement_percent;
    report
}

/// Human-readable suggestions for the schedule planner.
pub fn recommendations(
    stats: &OptimizationStatistics,
    failed: &[FailedConnection],
    correction: Option<&CorrectionResult>,
    termination: TerminationReason,
    constraints: &OptimizationConstraints,
) -> Vec<String> {
    let mut out = Vec::new();

    let mut by_category: BTreeMap<&'static str, usize> = BTreeMap::new();
    for f in failed {
        *by_category.entry(f.reason.category()).or_insert(0) += 1;
    }
    let count = |category: &str| by_category.get(category).copied().unwrap_or(0);

    if stats.total_opportunities > 0 && stats.success_rate < 0.5 {
        out.push(format!(
            "Only {:.0}% of connections were made; review connection windows and target times",
            stats.success_rate * 100.0
        ));
    }
    let n = count("deviation_cap");
    if n > 0 {
        out.push(format!(
            "{n} connection(s) need more than the {} min trip deviation cap; consider raising max_trip_deviation",
            constraints.max_trip_deviation
        ));
    }
    let n = count("schedule_shift_cap");
    if n > 0 {
        out.push(format!(
            "{n} connection(s) were blocked by the {} min schedule shift cap; consider raising max_schedule_shift",
            constraints.max_schedule_shift
        ));
    }
    let n = count("recovery") + count("borrowing");
    if n > 0 {
        out.push(format!(
            "{n} connection(s) were blocked by recovery limits; add layover time at shared stops or raise max_borrowing_ratio"
        ));
    }
    let n = count("no_serving_trip");
    if n > 0 {
        out.push(format!("{n} connection(s) have no trip serving their location"));
    }
    if stats.recovery_utilization > HIGH_UTILIZATION {
        out.push(format!(
            "Recovery bank is {:.0}% utilized; the schedule has little slack left to absorb delays",
            stats.recovery_utilization * 100.0
        ));
    }
    if let Some(c) = correction {
        if !c.residual_deviations.is_empty() {
            out.push(format!(
                "{} headway pair(s) remain outside the {} min tolerance",
                c.residual_deviations.len(),
                constraints.headway_tolerance
            ));
        }
    }
    if termination == TerminationReason::TimeBudget {
        out.push("Optimization stopped at its time budget; raise max_optimization_time_ms for a complete search".into());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BorrowError;
    use crate::models::{ConnectionType, Trip};

    fn failed(reason: FailureReason) -> FailedConnection {
        FailedConnection {
            opportunity_id: "X".into(),
            connection_type: ConnectionType::BusRoute,
            priority: 5,
            reason,
            best_gap: None,
        }
    }

    #[test]
    fn test_score_percentages() {
        assert_eq!(score_percentages(5.0, 2.5, 10.0), (50.0, 100.0));
        assert_eq!(score_percentages(0.0, 0.0, 0.0), (0.0, 0.0));
        assert_eq!(score_percentages(3.0, 0.0, 6.0), (50.0, 100.0));
    }

    #[test]
    fn test_compliance_counts_floor_and_cap() {
        let mut s = Schedule::new("S", "R")
            .with_trip(Trip::new(1, 1).with_stop("A", 0, 0).with_recovery("A", 5))
            .with_trip(Trip::new(2, 2).with_stop("A", 30, 30).with_recovery("A", 1));
        let c = OptimizationConstraints::default();
        assert_eq!(constraint_compliance(&s, &c), 0.5);
        s.apply_shift(1, 20, &[]);
        assert_eq!(constraint_compliance(&s, &c), 0.0);
    }

    #[test]
    fn test_recommendations_by_category() {
        let stats = OptimizationStatistics {
            total_opportunities: 4,
            successful_connections: 1,
            failed_connections: 3,
            success_rate: 0.25,
            recovery_utilization: 0.9,
            ..Default::default()
        };
        let fails = vec![
            failed(FailureReason::DeviationCap { required: 15, allowed: 10 }),
            failed(FailureReason::BorrowRefused(BorrowError::Disabled)),
            failed(FailureReason::RecoveryFloor { trip_number: 1, shortfall: 2 }),
        ];
        let recs = recommendations(
            &stats,
            &fails,
            None,
            TerminationReason::TimeBudget,
            &OptimizationConstraints::default(),
        );
        assert!(recs.iter().any(|r| r.starts_with("Only 25%")));
        assert!(recs.iter().any(|r| r.contains("max_trip_deviation")));
        assert!(recs.iter().any(|r| r.starts_with("2 connection(s) were blocked by recovery")));
        assert!(recs.iter().any(|r| r.contains("90% utilized")));
        assert!(recs.iter().any(|r| r.contains("time budget")));
    }

    #[test]
    fn test_no_recommendations_for_clean_run() {
        let stats = OptimizationStatistics {
            total_opportunities: 2,
            successful_connections: 2,
            success_rate: 1.0,
            ..Default::default()
        };
        let recs = recommendations(
            &stats,
            &[],
            None,
            TerminationReason::Exhausted,
            &OptimizationConstraints::default(),
        );
        assert!(recs.is_empty());
    }
}
