//! Phase sequencing for one optimization run.
//!
//! | Phase | Progress | Work |
//! |-------|----------|------|
//! | Validating | 0–5% | hard checks abort, soft checks become warnings |
//! | Analyzing | 5–15% | window analysis through the LRU cache |
//! | InitializingBank | 15–20% | recovery ledger from scheduled layovers |
//! | Optimizing | 20–85% | greedy search under time budget and cancellation |
//! | CorrectingHeadways | 85–95% | post-pass smoothing (skipped when disabled or cancelled) |
//! | Compiling | 95–100% | outcomes, statistics, recommendations |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::cache::{AnalysisKey, ResultCache, DEFAULT_CACHE_CAPACITY};
use super::monitor::{estimate_memory_mb, PerformanceMonitor};
use super::report;
use crate::engine::{
    check_schedule, check_state, CancellationToken, EngineConfig, OptimizationEngine, ScoringContext,
    SearchControl,
};
use crate::error::{OptimizationError, PhaseError};
use crate::headway::{correct_headways, CorrectionRequest};
use crate::models::{
    OptimizationPhase, OptimizationProgress, OptimizationRequest, OptimizationResult,
    PerformanceReport, Schedule, TerminationReason,
};
use crate::recovery::RecoveryBankService;
use crate::validation::{collect_warnings, validate_request};
use crate::windows::{analyze_opportunities, AnalyzedOpportunity};

/// Ledger drift (minutes) tolerated after reconciliation.
pub const LEDGER_DRIFT_TOLERANCE: i32 = 0;

type AnalysisCache = ResultCache<AnalysisKey, Arc<Vec<AnalyzedOpportunity>>>;

/// Releases the running flag on drop.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Forwards progress with a non-decreasing percent.
struct ProgressReporter<'a> {
    callback: &'a mut dyn FnMut(&OptimizationProgress),
    last: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Scores {
    current: f64,
    best: f64,
    connections: usize,
}

impl<'a> ProgressReporter<'a> {
    fn new(callback: &'a mut dyn FnMut(&OptimizationProgress)) -> Self {
        Self { callback, last: 0.0 }
    }

    fn report(&mut self, phase: OptimizationPhase, fraction: f64, scores: Scores, monitor: &PerformanceMonitor) {
        let (lo, hi) = phase.percent_range();
        let percent = (lo + (hi - lo) * fraction.clamp(0.0, 1.0)).max(self.last);
        self.last = percent;
        (self.callback)(&OptimizationProgress {
            progress: percent,
            phase,
            current_score: scores.current,
            best_score: scores.best,
            connections_made: scores.connections,
            estimated_time_remaining_ms: monitor.estimate_remaining_ms(percent),
            memory_usage_mb: monitor.current_memory_mb(),
            can_cancel: !matches!(phase, OptimizationPhase::Compiling | OptimizationPhase::Complete),
        });
    }
}

/// Accumulates per-phase wall-clock timings.
struct PhaseClock {
    phase: OptimizationPhase,
    started: Instant,
    timings: Vec<(OptimizationPhase, u64)>,
}

impl PhaseClock {
    fn new() -> Self {
        Self {
            phase: OptimizationPhase::Validating,
            started: Instant::now(),
            timings: Vec::new(),
        }
    }

    fn enter(&mut self, phase: OptimizationPhase) {
        let ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.timings.push((self.phase, ms));
        self.phase = phase;
        self.started = Instant::now();
        tracing::debug!(%phase, "entering phase");
    }
}

/// Entry point of the connection optimizer.
///
/// One run at a time: a second call while a run is in progress (from another
/// thread or from inside the progress callback) returns at once with
/// `success: false`.
///
/// # Example
///
/// ```
/// use connection_optimizer::models::{
///     ConnectionOpportunity, ConnectionType, OptimizationRequest, Schedule, Trip,
/// };
/// use connection_optimizer::service::ConnectionOptimizationService;
///
/// let schedule = Schedule::new("S1", "R1").with_trip(
///     Trip::new(1, 1).with_stop("STN", 480, 480).with_stop("END", 500, 500).with_recovery("END", 8),
/// );
/// let request = OptimizationRequest::new(
///     schedule,
///     vec![ConnectionOpportunity::new("GO-1", ConnectionType::GoTrain, "STN", 477)],
/// );
///
/// let service = ConnectionOptimizationService::new();
/// let result = service.optimize_schedule_connections(&request, &mut |_| {});
/// assert!(result.success);
/// assert_eq!(result.successful_connections.len(), 1);
/// assert_eq!(result.applied_moves[0].delta, 2);
/// ```
#[derive(Debug)]
pub struct ConnectionOptimizationService {
    running: AtomicBool,
    cancel: CancellationToken,
    cache: Mutex<AnalysisCache>,
}

impl ConnectionOptimizationService {
    /// Service with the default cache capacity.
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Service whose analysis cache holds at most `capacity` entries.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            cache: Mutex::new(ResultCache::new(capacity)),
        }
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Requests cancellation of the current run.
    ///
    /// `false` when nothing is running or cancellation was already requested.
    pub fn cancel_optimization(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        let first = self.cancel.cancel();
        if first {
            tracing::info!("optimization cancellation requested");
        }
        first
    }

    /// `(hits, misses)` of the analysis cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        let cache = self.cache.lock();
        (cache.hits(), cache.misses())
    }

    /// Drops every cached analysis.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Runs every phase and compiles the result.
    ///
    /// Never panics on bad input and never returns an error type: failures
    /// are reported through `success`, `error`, and `warnings`.
    #[tracing::instrument(level = "info", skip_all, fields(schedule = %request.schedule.id))]
    pub fn optimize_schedule_connections(
        &self,
        request: &OptimizationRequest,
        on_progress: &mut dyn FnMut(&OptimizationProgress),
    ) -> OptimizationResult {
        let Some(_guard) = RunGuard::try_acquire(&self.running) else {
            tracing::warn!("optimization request rejected, another run is in progress");
            return OptimizationResult::failure(OptimizationError::ConcurrentRun.to_string());
        };
        self.cancel.reset();
        self.run(request, on_progress)
    }

    fn run(
        &self,
        request: &OptimizationRequest,
        on_progress: &mut dyn FnMut(&OptimizationProgress),
    ) -> OptimizationResult {
        let mut monitor = PerformanceMonitor::start(request.constraints.performance);
        let mut reporter = ProgressReporter::new(on_progress);
        let mut clock = PhaseClock::new();

        // Validating
        reporter.report(OptimizationPhase::Validating, 0.0, Scores::default(), &monitor);
        if let Err(errors) = validate_request(request) {
            tracing::warn!(errors = errors.len(), "optimization request failed validation");
            return OptimizationResult::failure(OptimizationError::Validation(errors).to_string());
        }
        let mut warnings = collect_warnings(request);
        for warning in &warnings {
            tracing::warn!(%warning, "request warning");
        }

        // Analyzing
        clock.enter(OptimizationPhase::Analyzing);
        reporter.report(OptimizationPhase::Analyzing, 0.0, Scores::default(), &monitor);
        let analyzed = self.analyze(request);

        // InitializingBank
        clock.enter(OptimizationPhase::InitializingBank);
        reporter.report(OptimizationPhase::InitializingBank, 0.0, Scores::default(), &monitor);
        let mut bank = RecoveryBankService::new();
        bank.initialize(&request.schedule, &request.recovery_bank_config, &request.constraints);
        monitor.record_memory(estimate_memory_mb(&request.schedule, analyzed.len(), 0));

        // Optimizing
        clock.enter(OptimizationPhase::Optimizing);
        let config = EngineConfig::from_request(request);
        let control = SearchControl::unbounded()
            .with_cancellation(self.cancel.clone())
            .with_time_limit(monitor.time_limit());
        let mut engine = OptimizationEngine::for_options(&request.options);
        tracing::debug!(backend = engine.backend_name(), "starting engine");
        let outcome = {
            let monitor = &monitor;
            let reporter = &mut reporter;
            engine.optimize_connections(
                &request.schedule,
                &analyzed,
                &config,
                &mut bank,
                &control,
                &mut |p| {
                    let scores = Scores {
                        current: p.current_score,
                        best: p.best_score,
                        connections: p.connections_made,
                    };
                    reporter.report(OptimizationPhase::Optimizing, p.percent / 100.0, scores, monitor);
                },
            )
        };
        monitor.record_memory(estimate_memory_mb(
            &request.schedule,
            analyzed.len(),
            outcome.state.applied_moves.len() + outcome.state.rejected_moves.len(),
        ));

        if let Err(violations) = check_state(&request.schedule, &outcome.state, &request.constraints, bank.bank()) {
            let detail = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return phase_failure(OptimizationPhase::Optimizing, PhaseError::Invariant(detail), &request.schedule);
        }
        let ledger = bank.reconcile();
        if ledger.drift.abs() > LEDGER_DRIFT_TOLERANCE || !ledger.within_caps {
            return phase_failure(
                OptimizationPhase::Optimizing,
                PhaseError::LedgerDrift { drift: ledger.drift },
                &request.schedule,
            );
        }

        match outcome.termination {
            TerminationReason::Cancelled => {
                warnings.push("Optimization cancelled; returning the best schedule found so far".into());
            }
            TerminationReason::TimeBudget => {
                tracing::warn!(
                    budget_ms = request.constraints.performance.max_optimization_time_ms,
                    "time budget exceeded"
                );
                warnings.push(format!(
                    "Time budget of {} ms exceeded; returning the best schedule found so far",
                    request.constraints.performance.max_optimization_time_ms
                ));
            }
            _ => {}
        }

        // CorrectingHeadways
        clock.enter(OptimizationPhase::CorrectingHeadways);
        let scores = Scores {
            current: outcome.state.score,
            best: outcome.state.score,
            connections: outcome.state.connections_made(),
        };
        reporter.report(OptimizationPhase::CorrectingHeadways, 0.0, scores, &monitor);
        let correction = if request.headway_correction.enabled
            && outcome.termination != TerminationReason::Cancelled
        {
            let protected = outcome.state.protected_trips();
            let correction = correct_headways(
                CorrectionRequest {
                    schedule: &outcome.state.schedule,
                    deviations: &outcome.state.headway_deviations,
                    protected: &protected,
                    schedule_shift_used: outcome.state.schedule_shift_used,
                },
                &request.headway_correction,
                &request.constraints,
                &request.headway_correction.strategy,
            );
            let violations = check_schedule(
                &request.schedule,
                &correction.schedule,
                &request.constraints,
                correction.schedule_shift_used,
            );
            if !violations.is_empty() {
                let detail = violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                return phase_failure(
                    OptimizationPhase::CorrectingHeadways,
                    PhaseError::Invariant(detail),
                    &outcome.state.schedule,
                );
            }
            Some(correction)
        } else {
            None
        };

        // Compiling
        clock.enter(OptimizationPhase::Compiling);
        reporter.report(OptimizationPhase::Compiling, 0.0, scores, &monitor);
        let final_schedule: Schedule = match &correction {
            Some(c) => c.schedule.clone(),
            None => outcome.state.schedule.clone(),
        };
        let final_score = ScoringContext::new(&analyzed, &request.constraints, config.target_headway)
            .evaluate(&final_schedule)
            .total();

        let (made, failed) = report::connection_outcomes(&analyzed, &outcome.state, &final_schedule);
        let mut statistics = report::statistics(
            &made,
            &failed,
            &outcome,
            correction.as_ref(),
            &final_schedule,
            &request.constraints,
        );
        statistics.recovery_utilization = bank.utilization();
        (statistics.cache_hits, statistics.cache_misses) = self.cache_stats();

        if monitor.memory_exceeded() {
            tracing::warn!(peak_mb = monitor.peak_memory_mb(), "memory budget exceeded");
            warnings.push(format!(
                "Estimated memory of {:.1} MB exceeds the {:.1} MB budget",
                monitor.peak_memory_mb(),
                request.constraints.performance.max_memory_usage_mb
            ));
        }
        if let Some(c) = &correction {
            warnings.extend(c.warnings.iter().cloned());
        }

        let recommendations = report::recommendations(
            &statistics,
            &failed,
            correction.as_ref(),
            outcome.termination,
            &request.constraints,
        );
        clock.enter(OptimizationPhase::Complete);
        statistics.optimization_time_ms = monitor.elapsed_ms();
        statistics.phase_timings_ms = clock.timings;

        let performance = report::with_scores(
            PerformanceReport {
                time_used_percent: monitor.time_used_percent(),
                memory_used_percent: monitor.memory_used_percent(),
                peak_memory_mb: monitor.peak_memory_mb(),
                ..PerformanceReport::default()
            },
            final_score,
            outcome.initial_score,
            outcome.max_score,
        );

        tracing::info!(
            successful = statistics.successful_connections,
            failed = statistics.failed_connections,
            moves = statistics.moves_applied,
            final_score,
            elapsed_ms = statistics.optimization_time_ms,
            termination = ?outcome.termination,
            "connection optimization complete"
        );
        let final_scores = Scores {
            current: final_score,
            best: final_score,
            connections: made.len(),
        };
        reporter.report(OptimizationPhase::Complete, 1.0, final_scores, &monitor);

        OptimizationResult {
            success: true,
            optimized_schedule: Some(final_schedule),
            final_score,
            successful_connections: made,
            failed_connections: failed,
            applied_moves: outcome.state.applied_moves,
            final_recovery_state: Some(bank.bank().clone()),
            headway_corrections: correction.map(|c| c.corrections).unwrap_or_default(),
            statistics,
            performance,
            recommendations,
            warnings,
            error: None,
            termination: Some(outcome.termination),
        }
    }

    fn analyze(&self, request: &OptimizationRequest) -> Arc<Vec<AnalyzedOpportunity>> {
        let key = match AnalysisKey::new(
            &request.schedule,
            &request.connection_opportunities,
            &request.connection_windows,
        ) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::warn!(%err, "analysis is not cacheable");
                None
            }
        };
        if let Some(key) = &key {
            if let Some(hit) = self.cache.lock().get(key) {
                tracing::debug!(fingerprint = key.fingerprint, "analysis cache hit");
                return hit;
            }
        }
        let analyzed = Arc::new(analyze_opportunities(
            &request.schedule,
            &request.connection_opportunities,
            &request.connection_windows,
        ));
        if let Some(key) = key {
            self.cache.lock().insert(key, Arc::clone(&analyzed));
        }
        analyzed
    }
}

impl Default for ConnectionOptimizationService {
    fn default() -> Self {
        Self::new()
    }
}

/// Sanitized failure carrying a schedule that satisfies every invariant.
fn phase_failure(phase: OptimizationPhase, err: PhaseError, schedule: &Schedule) -> OptimizationResult {
    tracing::error!(%phase, error = %err, "optimization phase failed");
    OptimizationResult {
        optimized_schedule: Some(schedule.clone()),
        ..OptimizationResult::failure(OptimizationError::unexpected(phase).to_string())
    }
}
