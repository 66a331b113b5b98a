//! Transit connection domain models.
//!
//! Provides the data types shared by every optimization phase: the draft
//! schedule, the connections it should make, the hard constraints, and the
//! request/result pair of a run.
//!
//! # Domain Mappings
//!
//! | Model | Transit meaning |
//! |-------|-----------------|
//! | Schedule | Draft timetable of one route, direction, and day type |
//! | Trip | One vehicle run within a block |
//! | ConnectionOpportunity | External service to meet at a time point |
//! | RecoveryBank | Ledger of lendable layover slack |
//! | Move | A timing shift of one trip |

mod connection;
mod constraints;
mod headway;
mod moves;
mod recovery;
mod request;
mod result;
mod schedule;

pub use connection::{
    ConnectionOpportunity, ConnectionType, ConnectionWindow, ConnectionWindows, TransferDirection,
    WindowBand, WindowClass,
};
pub use constraints::{ConnectionPriorityWeights, OptimizationConstraints, PerformanceBudget};
pub use headway::{
    CorrectionDirection, CorrectionResult, CorrectionSkip, CorrectionStrategy, HeadwayCorrection,
    HeadwayCorrectionConfig, HeadwayDeviation,
};
pub use moves::{FailureReason, Loan, Move, RejectedMove};
pub use recovery::{RecoveryAccount, RecoveryBank, RecoveryBankConfig, StopRecoveryConfig};
pub use request::{OptimizationOptions, OptimizationRequest};
pub use result::{
    ConnectionOutcome, FailedConnection, OptimizationPhase, OptimizationProgress,
    OptimizationResult, OptimizationStatistics, PerformanceReport, TerminationReason,
};
pub use schedule::{
    DayType, Direction, Minutes, RecoveryImpact, Schedule, TimePoint, Trip, TripTimes,
};
