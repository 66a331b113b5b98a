//! Feasibility-gated greedy search over trip-timing moves.
//!
//! # Algorithm
//!
//! 1. Resolve opportunities that cannot be served (not operating, no
//!    serving trip) as failed.
//! 2. Take the next opportunity in priority order. If a serving trip already
//!    reaches the target class, it is connected.
//! 3. Otherwise propose one candidate per serving trip: the smallest shift
//!    that moves its gap into the target band. Score the batch.
//! 4. Try candidates best-first. The first one that passes every hard limit,
//!    can fund any recovery shortfall from the bank, and does not lower the
//!    score is applied. Every other tried candidate is recorded as rejected.
//! 5. Repeat until a stop condition holds; finalize every opportunity
//!    against the working schedule.
//!
//! Because no applied move lowers the score, the final state is also the
//! best state of the run.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::control::{SearchControl, TerminationCheck};
use super::invariants::{check_shift, ShiftViolation};
use super::ordering::{opportunity_order, rank_candidates, ScoredCandidate};
use super::scoring::{Candidate, InlineScoring, ParallelScoring, ScoringBackend, ScoringContext};
use super::state::{OptimizationState, Resolution};
use crate::headway::measure_deviations;
use crate::models::{
    ConnectionWindow, FailureReason, Loan, Minutes, Move, OptimizationConstraints,
    OptimizationOptions, OptimizationRequest, Schedule, TerminationReason, WindowClass,
};
use crate::recovery::{BorrowRequest, RecoveryBankService};
use crate::windows::{best_gap, required_shift, trip_gaps, AnalyzedOpportunity, TripGap};

/// Passes over retryable failures when progressive optimization is on.
pub const MAX_PASSES: usize = 3;

/// Score deltas at or above `-ACCEPT_EPSILON` count as non-decreasing.
pub const ACCEPT_EPSILON: f64 = 1e-9;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    /// No run in progress.
    #[default]
    Idle,
    /// A run is in progress.
    Running,
    /// The last run stopped on its own (exhausted, converged, capped).
    Converged,
    /// The last run was cancelled.
    Cancelled,
    /// The last run hit its time budget.
    BudgetExceeded,
}

impl EngineStatus {
    fn after(termination: TerminationReason) -> Self {
        match termination {
            TerminationReason::Cancelled => Self::Cancelled,
            TerminationReason::TimeBudget => Self::BudgetExceeded,
            TerminationReason::Exhausted
            | TerminationReason::Converged
            | TerminationReason::MaxIterations
            | TerminationReason::EarlyTermination => Self::Converged,
        }
    }
}

/// Configuration of one engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Hard limits and weights.
    pub constraints: OptimizationConstraints,
    /// Search options.
    pub options: OptimizationOptions,
    /// Headway target for the score penalty; original spacing when absent.
    pub target_headway: Option<Minutes>,
}

impl EngineConfig {
    /// Settings with no headway target.
    pub fn new(constraints: OptimizationConstraints, options: OptimizationOptions) -> Self {
        Self {
            constraints,
            options,
            target_headway: None,
        }
    }

    /// Sets the headway target of the score penalty.
    pub fn with_target_headway(mut self, minutes: Minutes) -> Self {
        self.target_headway = Some(minutes);
        self
    }

    /// Engine settings of a request.
    pub fn from_request(request: &OptimizationRequest) -> Self {
        Self {
            constraints: request.constraints,
            options: request.options.clone(),
            target_headway: request.headway_correction.target_headway,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(OptimizationConstraints::default(), OptimizationOptions::default())
    }
}

/// Progress of a run, reported at iteration boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineProgress {
    /// Iterations so far.
    pub iteration: usize,
    /// Opportunities with a resolution.
    pub resolved: usize,
    /// Opportunities in the run.
    pub total: usize,
    /// Percent of opportunities resolved (non-decreasing).
    pub percent: f64,
    /// Score of the working schedule.
    pub current_score: f64,
    /// Best score so far.
    pub best_score: f64,
    /// Connected opportunities.
    pub connections_made: usize,
}

/// Result of an engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutcome {
    /// Final (and best) state.
    pub state: OptimizationState,
    /// Score of the input schedule.
    pub initial_score: f64,
    /// Theoretical maximum score.
    pub max_score: f64,
    /// Why the search stopped.
    pub termination: TerminationReason,
    /// Iterations performed.
    pub iterations: usize,
    /// Passes performed.
    pub passes: usize,
}

/// Greedy connection optimizer.
///
/// # Example
///
/// ```
/// use connection_optimizer::engine::{EngineConfig, OptimizationEngine, SearchControl};
/// use connection_optimizer::models::{
///     ConnectionOpportunity, ConnectionType, ConnectionWindows, OptimizationConstraints,
///     RecoveryBankConfig, Schedule, Trip,
/// };
/// use connection_optimizer::recovery::RecoveryBankService;
/// use connection_optimizer::windows::analyze_opportunities;
///
/// let schedule = Schedule::new("S1", "R1").with_trip(
///     Trip::new(1, 1).with_stop("STN", 480, 480).with_stop("END", 500, 500).with_recovery("END", 8),
/// );
/// let opps = vec![ConnectionOpportunity::new("GO-1", ConnectionType::GoTrain, "STN", 477)];
/// let analyzed = analyze_opportunities(&schedule, &opps, &ConnectionWindows::new());
///
/// let config = EngineConfig::default();
/// let mut bank = RecoveryBankService::new();
/// bank.initialize(&schedule, &RecoveryBankConfig::default(), &config.constraints);
///
/// let mut engine = OptimizationEngine::new();
/// let outcome = engine.optimize_connections(
///     &schedule, &analyzed, &config, &mut bank, &SearchControl::unbounded(), &mut |_| {},
/// );
/// assert_eq!(outcome.state.applied_moves.len(), 1);
/// assert_eq!(outcome.state.applied_moves[0].delta, 2);
/// ```
pub struct OptimizationEngine {
    backend: Box<dyn ScoringBackend>,
    status: EngineStatus,
    current: Option<OptimizationState>,
    best: Option<OptimizationState>,
}

impl OptimizationEngine {
    /// Engine with inline scoring.
    pub fn new() -> Self {
        Self::with_backend(InlineScoring)
    }

    /// Engine with a custom scoring backend.
    pub fn with_backend(backend: impl ScoringBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            status: EngineStatus::Idle,
            current: None,
            best: None,
        }
    }

    /// Engine with the backend selected by `options`.
    pub fn for_options(options: &OptimizationOptions) -> Self {
        if options.enable_parallel_processing {
            Self::with_backend(ParallelScoring)
        } else {
            Self::new()
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> EngineStatus {
        self.status
    }

    /// Name of the scoring backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// State at the end of the last run.
    pub fn current_state(&self) -> Option<&OptimizationState> {
        self.current.as_ref()
    }

    /// Best state of the last run.
    pub fn best_state(&self) -> Option<&OptimizationState> {
        self.best.as_ref()
    }

    /// Returns to `Idle` and drops the last run's states.
    pub fn reset(&mut self) {
        self.status = EngineStatus::Idle;
        self.current = None;
        self.best = None;
    }

    /// Runs the search over an owned copy of `schedule`.
    #[tracing::instrument(level = "debug", skip_all, fields(schedule = %schedule.id, opportunities = opportunities.len()))]
    pub fn optimize_connections(
        &mut self,
        schedule: &Schedule,
        opportunities: &[AnalyzedOpportunity],
        config: &EngineConfig,
        bank: &mut RecoveryBankService,
        control: &SearchControl,
        on_progress: &mut dyn FnMut(&EngineProgress),
    ) -> EngineOutcome {
        self.status = EngineStatus::Running;
        self.current = None;
        self.best = None;

        let ctx = ScoringContext::new(opportunities, &config.constraints, config.target_headway);
        let initial_score = ctx.evaluate(schedule).total();
        let max_score = ctx.max_score();
        let threshold = config.constraints.performance.early_termination_threshold;
        let mut state = OptimizationState::new(schedule.clone(), initial_score);

        let mut queue = VecDeque::new();
        for idx in opportunity_order(opportunities) {
            let a = &opportunities[idx];
            let up_front = if !a.operating {
                Some(FailureReason::NotOperating {
                    day_type: schedule.day_type,
                })
            } else if a.trip_gaps.is_empty() {
                Some(FailureReason::NoServingTrip {
                    location_id: a.opportunity.location_id.clone(),
                })
            } else {
                None
            };
            match up_front {
                Some(reason) => {
                    tracing::debug!(opportunity = %a.opportunity.id, %reason, "opportunity unservable");
                    state
                        .resolutions
                        .insert(a.opportunity.id.clone(), Resolution::Failed(reason));
                }
                None => queue.push_back(idx),
            }
        }

        let total = opportunities.len();
        let mut retry = Vec::new();
        let mut pass = 1;
        let mut pass_start_moves = 0;
        let mut iterations = 0;
        let mut stagnant = 0;
        let mut last_percent = 0.0_f64;

        let termination = loop {
            if let Some(reason) = control.should_terminate() {
                break reason;
            }
            if queue.is_empty() {
                let progressed = state.applied_moves.len() > pass_start_moves;
                if config.options.enable_progressive_optimization
                    && pass < MAX_PASSES
                    && progressed
                    && !retry.is_empty()
                {
                    pass += 1;
                    pass_start_moves = state.applied_moves.len();
                    tracing::debug!(pass, retries = retry.len(), "starting progressive pass");
                    queue.extend(retry.drain(..));
                    continue;
                }
                break TerminationReason::Exhausted;
            }
            if iterations >= config.options.max_iterations {
                break TerminationReason::MaxIterations;
            }
            if max_score > 0.0 && state.score >= threshold * max_score - ACCEPT_EPSILON {
                break TerminationReason::EarlyTermination;
            }
            if config.options.convergence_patience > 0 && stagnant >= config.options.convergence_patience {
                break TerminationReason::Converged;
            }
            let Some(idx) = queue.pop_front() else {
                continue;
            };

            iterations += 1;
            let analyzed = &opportunities[idx];
            let before = state.score;
            let (resolution, attempted) = self.resolve(&mut state, analyzed, &ctx, config, bank);
            if let Resolution::Failed(reason) = &resolution {
                if reason.is_retryable() {
                    retry.push(idx);
                }
            }
            state
                .resolutions
                .insert(analyzed.opportunity.id.clone(), resolution);

            if attempted {
                if state.score - before < config.options.convergence_threshold {
                    stagnant += 1;
                } else {
                    stagnant = 0;
                }
            }

            let resolved = state.resolutions.len();
            let percent = if total == 0 {
                100.0
            } else {
                (100.0 * resolved as f64 / total as f64).max(last_percent)
            };
            last_percent = percent;
            on_progress(&EngineProgress {
                iteration: iterations,
                resolved,
                total,
                percent,
                current_score: state.score,
                best_score: state.score,
                connections_made: state.connections_made(),
            });
        };

        finalize(&mut state, opportunities, config.target_headway);
        self.status = EngineStatus::after(termination);
        tracing::debug!(
            ?termination,
            iterations,
            passes = pass,
            applied = state.applied_moves.len(),
            rejected = state.rejected_moves.len(),
            score = state.score,
            "search finished"
        );

        self.current = Some(state.clone());
        self.best = Some(state.clone());
        EngineOutcome {
            state,
            initial_score,
            max_score,
            termination,
            iterations,
            passes: pass,
        }
    }

    /// Resolves one opportunity. The flag is true when candidates were tried.
    fn resolve(
        &self,
        state: &mut OptimizationState,
        analyzed: &AnalyzedOpportunity,
        ctx: &ScoringContext<'_>,
        config: &EngineConfig,
        bank: &mut RecoveryBankService,
    ) -> (Resolution, bool) {
        let opp = &analyzed.opportunity;
        let window = &analyzed.window;
        let gaps = trip_gaps(&state.schedule, opp, window);
        if let Some(met) = connection(&gaps, window, opp.window_hint) {
            return (met, false);
        }

        let candidates: Vec<Candidate> = gaps
            .iter()
            .filter_map(|g| {
                let delta = required_shift(g.gap, opp, window)?;
                (delta != 0).then_some(Candidate {
                    trip_number: g.trip_number,
                    delta,
                })
            })
            .collect();
        if candidates.is_empty() {
            return (
                Resolution::Failed(FailureReason::NoServingTrip {
                    location_id: opp.location_id.clone(),
                }),
                false,
            );
        }

        let scores = self.backend.score_batch(ctx, &state.schedule, &candidates);
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .zip(scores)
            .map(|(c, score)| ScoredCandidate {
                trip_number: c.trip_number,
                delta: c.delta,
                score_delta: score - state.score,
            })
            .collect();
        rank_candidates(&mut scored);

        let mut first_reason = None;
        for cand in scored {
            let mut mv = Move::new(cand.trip_number, cand.delta, opp.id.clone(), cand.score_delta);
            match fund_move(state, &mv, config, bank) {
                Ok(loans) => {
                    mv.loans = loans;
                    tracing::trace!(
                        opportunity = %opp.id,
                        trip = mv.trip_number,
                        delta = mv.delta,
                        score_delta = mv.score_delta,
                        borrowed = mv.borrowed_minutes(),
                        "move applied"
                    );
                    state.apply(mv);
                    let gaps = trip_gaps(&state.schedule, opp, window);
                    let resolution = connection(&gaps, window, opp.window_hint)
                        .unwrap_or(Resolution::Failed(FailureReason::Lost));
                    return (resolution, true);
                }
                Err(reason) => {
                    tracing::trace!(
                        opportunity = %opp.id,
                        trip = mv.trip_number,
                        delta = mv.delta,
                        %reason,
                        "move rejected"
                    );
                    first_reason.get_or_insert_with(|| reason.clone());
                    state.reject(mv, reason);
                }
            }
        }

        let reason = first_reason.unwrap_or(FailureReason::NotAttempted);
        (Resolution::Failed(reason), true)
    }
}

impl Default for OptimizationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OptimizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizationEngine")
            .field("backend", &self.backend.name())
            .field("status", &self.status)
            .finish()
    }
}

/// Connected resolution for the best gap, if it reaches `target`.
fn connection(gaps: &[TripGap], window: &ConnectionWindow, target: WindowClass) -> Option<Resolution> {
    best_gap(gaps, window, target)
        .filter(|g| g.class.meets(target))
        .map(|g| Resolution::Connected {
            trip_number: g.trip_number,
            gap: g.gap,
            class: g.class,
        })
}

fn shift_reason(violation: ShiftViolation, trip_number: u32) -> FailureReason {
    match violation {
        ShiftViolation::DeviationCap { required, allowed } => {
            FailureReason::DeviationCap { required, allowed }
        }
        ShiftViolation::ScheduleShiftCap {
            required,
            remaining,
        } => FailureReason::ScheduleShiftCap {
            required,
            remaining,
        },
        ShiftViolation::TripOrder => FailureReason::TripOrder { trip_number },
        ShiftViolation::RecoveryCeiling {
            trip_number,
            resulting,
        } => FailureReason::RecoveryCeiling {
            trip_number,
            resulting,
        },
    }
}

/// Checks a candidate and borrows its recovery shortfall.
///
/// Loans are taken only once every check has passed; if a later loan of the
/// same move fails, earlier ones are repaid.
fn fund_move(
    state: &OptimizationState,
    mv: &Move,
    config: &EngineConfig,
    bank: &mut RecoveryBankService,
) -> Result<Vec<Loan>, FailureReason> {
    let check = check_shift(
        &state.schedule,
        mv.trip_number,
        mv.delta,
        &config.constraints,
        state.schedule_shift_used,
    )
    .map_err(|v| shift_reason(v, mv.trip_number))?;

    let requests: Vec<BorrowRequest> = check
        .shortfalls
        .iter()
        .map(|s| BorrowRequest::new(s.stop_id.clone(), s.trip_number, s.shortfall, s.after))
        .collect();
    if let Some(first) = check.shortfalls.first() {
        if !bank.bank().allow_borrowing {
            return Err(FailureReason::RecoveryFloor {
                trip_number: first.trip_number,
                shortfall: first.shortfall,
            });
        }
    }
    for request in &requests {
        bank.check_borrow(request).map_err(FailureReason::BorrowRefused)?;
    }

    if mv.score_delta < -ACCEPT_EPSILON {
        return Err(FailureReason::ScoreDecrease {
            score_delta: mv.score_delta,
        });
    }

    let mut loans = Vec::with_capacity(requests.len());
    for request in &requests {
        match bank.borrow(request) {
            Ok(loan) => loans.push(loan),
            Err(err) => {
                for loan in &loans {
                    if let Err(repay_err) = bank.repay(&loan.stop_id, loan.trip_number, loan.minutes) {
                        tracing::warn!(%repay_err, "rollback of partial loan failed");
                    }
                }
                return Err(FailureReason::BorrowRefused(err));
            }
        }
    }
    Ok(loans)
}

/// Resolves every opportunity against the final working schedule.
fn finalize(state: &mut OptimizationState, opportunities: &[AnalyzedOpportunity], target_headway: Option<Minutes>) {
    for a in opportunities {
        if !a.operating || a.trip_gaps.is_empty() {
            continue;
        }
        let gaps = trip_gaps(&state.schedule, &a.opportunity, &a.window);
        let now = connection(&gaps, &a.window, a.opportunity.window_hint);
        let resolution = match (now, state.resolutions.get(&a.opportunity.id)) {
            (Some(connected), _) => connected,
            (None, Some(Resolution::Connected { .. })) => Resolution::Failed(FailureReason::Lost),
            (None, Some(Resolution::Failed(reason))) => Resolution::Failed(reason.clone()),
            (None, None) => Resolution::Failed(FailureReason::NotAttempted),
        };
        state.resolutions.insert(a.opportunity.id.clone(), resolution);
    }
    state.headway_deviations = measure_deviations(&state.schedule, target_headway);
}
