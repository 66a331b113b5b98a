//! Optimization constraints and performance budget.
//!
//! Hard limits every optimized schedule must respect, plus the per-type
//! weights used when scoring connections.
//!
//! | Constraint | Meaning |
//! |------------|---------|
//! | `max_trip_deviation` | Largest net shift of a single trip |
//! | `max_schedule_shift` | Sum of absolute shifts across the schedule |
//! | `min_recovery_time` | Floor on every trip's layover |
//! | `max_recovery_time` | Ceiling on layovers grown by a move |
//! | `headway_tolerance` | Headway deviation tolerated before penalty/correction |

use serde::{Deserialize, Serialize};

use super::{ConnectionType, Minutes};

/// Wall-clock, memory, and quality budget of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceBudget {
    /// Wall-clock budget (ms). Exceeding it terminates the search early.
    pub max_optimization_time_ms: u64,
    /// Estimated memory budget (MB). Exceeding it only warns.
    pub max_memory_usage_mb: f64,
    /// Fraction (0..=1) of the theoretical maximum score at which the
    /// search stops early.
    pub early_termination_threshold: f64,
}

impl Default for PerformanceBudget {
    fn default() -> Self {
        Self {
            max_optimization_time_ms: 30_000,
            max_memory_usage_mb: 256.0,
            early_termination_threshold: 0.95,
        }
    }
}

/// Score weight per connection type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPriorityWeights {
    /// Weight of bus-route connections.
    pub bus_route: f64,
    /// Weight of commuter-train connections.
    pub go_train: f64,
    /// Weight of school-bell connections.
    pub school_bell: f64,
}

impl Default for ConnectionPriorityWeights {
    fn default() -> Self {
        Self {
            bus_route: 0.8,
            go_train: 1.0,
            school_bell: 1.0,
        }
    }
}

impl ConnectionPriorityWeights {
    /// Weight for a connection type.
    pub fn weight(&self, connection_type: ConnectionType) -> f64 {
        match connection_type {
            ConnectionType::BusRoute => self.bus_route,
            ConnectionType::GoTrain => self.go_train,
            ConnectionType::SchoolBell => self.school_bell,
        }
    }
}

/// Hard constraints of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConstraints {
    /// Largest net shift of one trip (minutes).
    pub max_trip_deviation: Minutes,
    /// Largest sum of absolute shifts across the schedule (minutes).
    pub max_schedule_shift: Minutes,
    /// Minimum recovery every trip must keep (minutes).
    pub min_recovery_time: Minutes,
    /// Maximum recovery a move may grow a layover to (minutes).
    pub max_recovery_time: Minutes,
    /// Headway deviation tolerated without penalty (minutes).
    pub headway_tolerance: Minutes,
    /// Score weight per connection type.
    pub priority_weights: ConnectionPriorityWeights,
    /// Time, memory, and quality budget.
    pub performance: PerformanceBudget,
}

impl Default for OptimizationConstraints {
    fn default() -> Self {
        Self {
            max_trip_deviation: 10,
            max_schedule_shift: 60,
            min_recovery_time: 2,
            max_recovery_time: 30,
            headway_tolerance: 2,
            priority_weights: ConnectionPriorityWeights::default(),
            performance: PerformanceBudget::default(),
        }
    }
}

impl OptimizationConstraints {
    /// Sets the maximum trip deviation.
    pub fn with_max_trip_deviation(mut self, minutes: Minutes) -> Self {
        self.max_trip_deviation = minutes;
        self
    }

    /// Sets the maximum schedule-wide shift.
    pub fn with_max_schedule_shift(mut self, minutes: Minutes) -> Self {
        self.max_schedule_shift = minutes;
        self
    }

    /// Sets the recovery floor and ceiling.
    pub fn with_recovery_range(mut self, min: Minutes, max: Minutes) -> Self {
        self.min_recovery_time = min;
        self.max_recovery_time = max;
        self
    }

    /// Sets the headway tolerance.
    pub fn with_headway_tolerance(mut self, minutes: Minutes) -> Self {
        self.headway_tolerance = minutes;
        self
    }

    /// Sets the performance budget.
    pub fn with_performance(mut self, performance: PerformanceBudget) -> Self {
        self.performance = performance;
        self
    }

    /// Sets the connection weights.
    pub fn with_priority_weights(mut self, weights: ConnectionPriorityWeights) -> Self {
        self.priority_weights = weights;
        self
    }
}
