//! Orchestration of a full optimization run.
//!
//! [`ConnectionOptimizationService`] is an explicit context object: it owns
//! the analysis cache, the cancellation token, and the running guard. There
//! is no global state; create one service per independent caller.

mod cache;
mod monitor;
mod orchestrator;
mod report;

pub use cache::{AnalysisKey, ResultCache, DEFAULT_CACHE_CAPACITY};
pub use monitor::{estimate_memory_mb, PerformanceMonitor};
pub use orchestrator::{ConnectionOptimizationService, LEDGER_DRIFT_TOLERANCE};
pub use report::{constraint_compliance, recommendations, score_percentages};
