//! Connection optimization engine.
//!
//! A greedy search over single-trip time shifts. Each accepted move is
//! applied to an owned working copy of the schedule; the input schedule is
//! never touched.
//!
//! # Modules
//!
//! | Module | Role |
//! |--------|------|
//! | `optimizer` | Search loop, stop conditions, finalization |
//! | `scoring` | Schedule score and candidate scoring backends |
//! | `ordering` | Opportunity and candidate ordering |
//! | `invariants` | Per-move feasibility and whole-state checks |
//! | `state` | Working schedule and audit trail |
//! | `control` | Cancellation and time limits |
//!
//! # Stop conditions
//!
//! Checked before each iteration, first match wins: cancellation, time
//! budget, queue exhausted, iteration cap, score within the early
//! termination threshold of the maximum, convergence.
//!
//! # Reference
//! Ahuja, Ergun, Orlin, Punnen (2002), "A survey of very large-scale
//! neighborhood search techniques"

mod control;
mod invariants;
mod optimizer;
mod ordering;
mod scoring;
mod state;

pub use control::{CancellationToken, SearchControl, TerminationCheck, TimeLimit};
pub use invariants::{
    check_schedule, check_shift, check_state, InvariantViolation, RecoveryShortfall, ShiftCheck,
    ShiftViolation,
};
pub use optimizer::{
    EngineConfig, EngineOutcome, EngineProgress, EngineStatus, OptimizationEngine,
    ACCEPT_EPSILON, MAX_PASSES,
};
pub use ordering::{opportunity_order, rank_candidates, ScoredCandidate};
pub use scoring::{
    Candidate, InlineScoring, ParallelScoring, ScoreBreakdown, ScoringBackend, ScoringContext,
    HEADWAY_PENALTY_PER_MINUTE,
};
pub use state::{OptimizationState, Resolution};
