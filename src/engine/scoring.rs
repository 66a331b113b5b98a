//! Schedule scoring and scoring backends.
//!
//! # Score
//!
//! ```text
//! score = Σ weight(type) × priority × value(best class)
//!       − 0.05 × Σ max(0, |headway deviation| − tolerance)
//! ```
//!
//! Only opportunities that operate on the schedule's day type and have a
//! serving trip contribute. Class values are ideal 1.0, partial 0.5,
//! missed 0.0.
//!
//! Candidate batches are scored through a [`ScoringBackend`]. Scoring is a
//! pure function of the schedule, so every backend returns identical
//! results and the search does not depend on which one runs.

use rayon::prelude::*;

use crate::headway::measure_deviations;
use crate::models::{Minutes, OptimizationConstraints, Schedule};
use crate::windows::{best_gap, trip_gaps, AnalyzedOpportunity};

/// Penalty per minute of headway deviation beyond tolerance.
pub const HEADWAY_PENALTY_PER_MINUTE: f64 = 0.05;

/// Score components of a schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    /// Weighted connection value.
    pub connection_score: f64,
    /// Headway penalty (non-negative).
    pub headway_penalty: f64,
}

impl ScoreBreakdown {
    /// `connection_score − headway_penalty`.
    pub fn total(&self) -> f64 {
        self.connection_score - self.headway_penalty
    }
}

/// Inputs shared by every score evaluation of a run.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    /// Analyzed opportunities of the run.
    pub opportunities: &'a [AnalyzedOpportunity],
    /// Constraints (weights and headway tolerance).
    pub constraints: &'a OptimizationConstraints,
    /// Target headway; original spacing when absent.
    pub target_headway: Option<Minutes>,
}

impl<'a> ScoringContext<'a> {
    /// Context over a run's opportunities.
    pub fn new(
        opportunities: &'a [AnalyzedOpportunity],
        constraints: &'a OptimizationConstraints,
        target_headway: Option<Minutes>,
    ) -> Self {
        Self {
            opportunities,
            constraints,
            target_headway,
        }
    }

    fn contributes(a: &AnalyzedOpportunity) -> bool {
        a.operating && !a.trip_gaps.is_empty()
    }

    fn weight(&self, a: &AnalyzedOpportunity) -> f64 {
        self.constraints
            .priority_weights
            .weight(a.opportunity.connection_type)
            * f64::from(a.opportunity.priority)
    }

    /// Scores a schedule.
    pub fn evaluate(&self, schedule: &Schedule) -> ScoreBreakdown {
        let connection_score = self
            .opportunities
            .iter()
            .filter(|a| Self::contributes(a))
            .map(|a| {
                let gaps = trip_gaps(schedule, &a.opportunity, &a.window);
                let value = best_gap(&gaps, &a.window, a.opportunity.window_hint)
                    .map_or(0.0, |g| g.class.value());
                self.weight(a) * value
            })
            .sum();

        let tolerance = self.constraints.headway_tolerance;
        let excess: Minutes = measure_deviations(schedule, self.target_headway)
            .iter()
            .map(|d| d.excess(tolerance))
            .sum();

        ScoreBreakdown {
            connection_score,
            headway_penalty: f64::from(excess) * HEADWAY_PENALTY_PER_MINUTE,
        }
    }

    /// Score if every contributing opportunity were ideal and headways
    /// were within tolerance.
    pub fn max_score(&self) -> f64 {
        self.opportunities
            .iter()
            .filter(|a| Self::contributes(a))
            .map(|a| self.weight(a))
            .sum()
    }
}

/// A shift to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Shifted trip.
    pub trip_number: u32,
    /// Signed shift.
    pub delta: Minutes,
}

/// Scores a batch of candidate shifts against a base schedule.
pub trait ScoringBackend: Send + Sync {
    /// Total score after each candidate, in input order.
    fn score_batch(&self, ctx: &ScoringContext<'_>, base: &Schedule, candidates: &[Candidate]) -> Vec<f64>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

fn score_candidate(ctx: &ScoringContext<'_>, base: &Schedule, candidate: &Candidate) -> f64 {
    let mut schedule = base.clone();
    schedule.apply_shift(candidate.trip_number, candidate.delta, &[]);
    ctx.evaluate(&schedule).total()
}

/// Scores candidates one after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineScoring;

impl ScoringBackend for InlineScoring {
    fn score_batch(&self, ctx: &ScoringContext<'_>, base: &Schedule, candidates: &[Candidate]) -> Vec<f64> {
        candidates
            .iter()
            .map(|c| score_candidate(ctx, base, c))
            .collect()
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Scores candidates on the rayon pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelScoring;

impl ScoringBackend for ParallelScoring {
    fn score_batch(&self, ctx: &ScoringContext<'_>, base: &Schedule, candidates: &[Candidate]) -> Vec<f64> {
        candidates
            .par_iter()
            .map(|c| score_candidate(ctx, base, c))
            .collect()
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}
