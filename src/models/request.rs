//! Optimization request and search options.

use serde::{Deserialize, Serialize};

use super::{
    ConnectionOpportunity, ConnectionWindows, HeadwayCorrectionConfig, OptimizationConstraints,
    RecoveryBankConfig, Schedule,
};

/// Search options of the optimization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationOptions {
    /// Iteration cap of the search.
    pub max_iterations: usize,
    /// Improvement below which an iteration counts as stagnant.
    pub convergence_threshold: f64,
    /// Consecutive stagnant iterations before convergence.
    pub convergence_patience: usize,
    /// Retry retryable failures after a pass (up to 3 passes).
    pub enable_progressive_optimization: bool,
    /// Score candidate batches on the rayon pool.
    pub enable_parallel_processing: bool,
}

impl Default for OptimizationOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            convergence_threshold: 0.001,
            convergence_patience: 25,
            enable_progressive_optimization: true,
            enable_parallel_processing: false,
        }
    }
}

impl OptimizationOptions {
    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    /// Sets the convergence threshold and patience.
    pub fn with_convergence(mut self, threshold: f64, patience: usize) -> Self {
        self.convergence_threshold = threshold;
        self.convergence_patience = patience;
        self
    }

    /// Enables or disables progressive retries.
    pub fn with_progressive(mut self, enabled: bool) -> Self {
        self.enable_progressive_optimization = enabled;
        self
    }

    /// Enables or disables parallel scoring.
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.enable_parallel_processing = enabled;
        self
    }
}

/// Everything one optimization run needs.
///
/// Only `schedule` and `connection_opportunities` are required when
/// deserializing; every other section falls back to its defaults.
///
/// ```
/// use connection_optimizer::models::OptimizationRequest;
///
/// let json = r#"{
///     "schedule": {"id": "S1", "route_id": "R1", "route_name": "Main",
///                  "direction": "Outbound", "day_type": "Weekday",
///                  "time_points": [], "trips": []},
///     "connection_opportunities": [],
///     "constraints": {"max_trip_deviation": 6}
/// }"#;
/// let request = OptimizationRequest::from_json(json).unwrap();
/// assert_eq!(request.constraints.max_trip_deviation, 6);
/// assert!(request.recovery_bank_config.allow_borrowing);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    /// Draft schedule (read-only for the run).
    pub schedule: Schedule,
    /// Connections to optimize for.
    pub connection_opportunities: Vec<ConnectionOpportunity>,
    /// Window thresholds per connection type.
    #[serde(default)]
    pub connection_windows: ConnectionWindows,
    /// Hard constraints and budget.
    #[serde(default)]
    pub constraints: OptimizationConstraints,
    /// Recovery bank settings.
    #[serde(default)]
    pub recovery_bank_config: RecoveryBankConfig,
    /// Headway correction settings.
    #[serde(default)]
    pub headway_correction: HeadwayCorrectionConfig,
    /// Search options.
    #[serde(default)]
    pub options: OptimizationOptions,
}

impl OptimizationRequest {
    /// Creates a request with default configuration.
    pub fn new(schedule: Schedule, connection_opportunities: Vec<ConnectionOpportunity>) -> Self {
        Self {
            schedule,
            connection_opportunities,
            connection_windows: ConnectionWindows::default(),
            constraints: OptimizationConstraints::default(),
            recovery_bank_config: RecoveryBankConfig::default(),
            headway_correction: HeadwayCorrectionConfig::default(),
            options: OptimizationOptions::default(),
        }
    }

    /// Parses a request from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the connection windows.
    pub fn with_windows(mut self, windows: ConnectionWindows) -> Self {
        self.connection_windows = windows;
        self
    }

    /// Sets the constraints.
    pub fn with_constraints(mut self, constraints: OptimizationConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Sets the recovery bank configuration.
    pub fn with_recovery_bank_config(mut self, config: RecoveryBankConfig) -> Self {
        self.recovery_bank_config = config;
        self
    }

    /// Sets the headway correction configuration.
    pub fn with_headway_correction(mut self, config: HeadwayCorrectionConfig) -> Self {
        self.headway_correction = config;
        self
    }

    /// Sets the search options.
    pub fn with_options(mut self, options: OptimizationOptions) -> Self {
        self.options = options;
        self
    }
}
