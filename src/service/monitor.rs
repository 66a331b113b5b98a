//! Time and memory budget tracking for one run.
//!
//! Memory is an estimate from the sizes of the run's data structures; no
//! allocator is queried.

use std::time::{Duration, Instant};

use crate::engine::TimeLimit;
use crate::models::{PerformanceBudget, Schedule};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_OPPORTUNITY: usize = 512;
const BYTES_PER_MOVE: usize = 160;

/// Tracks elapsed time and estimated memory against a budget.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    started: Instant,
    budget: PerformanceBudget,
    current_memory_mb: f64,
    peak_memory_mb: f64,
}

impl PerformanceMonitor {
    /// Starts the clock.
    pub fn start(budget: PerformanceBudget) -> Self {
        Self {
            started: Instant::now(),
            budget,
            current_memory_mb: 0.0,
            peak_memory_mb: 0.0,
        }
    }

    /// Time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed whole milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Wall-clock limit ending at the budget deadline.
    pub fn time_limit(&self) -> TimeLimit {
        TimeLimit::starting_at(
            self.started,
            Duration::from_millis(self.budget.max_optimization_time_ms),
        )
    }

    /// Whether the time budget is spent.
    pub fn time_exceeded(&self) -> bool {
        self.time_limit().expired()
    }

    /// Share of the time budget used, in percent.
    pub fn time_used_percent(&self) -> f64 {
        if self.budget.max_optimization_time_ms == 0 {
            return 100.0;
        }
        100.0 * self.elapsed().as_secs_f64() * 1000.0 / self.budget.max_optimization_time_ms as f64
    }

    /// Remaining time extrapolated from `percent` done.
    pub fn estimate_remaining_ms(&self, percent: f64) -> Option<u64> {
        if percent <= 0.0 || percent >= 100.0 {
            return None;
        }
        let elapsed = self.elapsed().as_secs_f64() * 1000.0;
        Some((elapsed * (100.0 - percent) / percent).round() as u64)
    }

    /// Records an estimate of current memory use.
    pub fn record_memory(&mut self, mb: f64) {
        self.current_memory_mb = mb;
        self.peak_memory_mb = self.peak_memory_mb.max(mb);
    }

    /// Last recorded estimate.
    pub fn current_memory_mb(&self) -> f64 {
        self.current_memory_mb
    }

    /// Largest recorded estimate.
    pub fn peak_memory_mb(&self) -> f64 {
        self.peak_memory_mb
    }

    /// Whether the peak estimate is over the memory budget.
    pub fn memory_exceeded(&self) -> bool {
        self.peak_memory_mb > self.budget.max_memory_usage_mb
    }

    /// Peak estimate as a percent of the memory budget.
    pub fn memory_used_percent(&self) -> f64 {
        if self.budget.max_memory_usage_mb <= 0.0 {
            return 100.0;
        }
        100.0 * self.peak_memory_mb / self.budget.max_memory_usage_mb
    }
}

/// Estimated footprint of a run: input and working schedules, analyzed
/// opportunities, and the move log.
pub fn estimate_memory_mb(schedule: &Schedule, opportunities: usize, moves: usize) -> f64 {
    let bytes = 2 * schedule.estimated_size_bytes()
        + opportunities * BYTES_PER_OPPORTUNITY
        + moves * BYTES_PER_MOVE;
    bytes as f64 / BYTES_PER_MB
}
