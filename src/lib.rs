//! Transit connection optimizer.
//!
//! Adjusts trip timings in a draft bus schedule so that more trips meet
//! external services (commuter trains, school bells, other bus routes)
//! while keeping minimum layovers, bounded shifts, and regular headways.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `Schedule`, `Trip`, `ConnectionOpportunity`,
//!   `ConnectionWindow`, `RecoveryBank`, `Move`, request and result types
//! - **`windows`**: Gap classification into ideal/partial/missed
//! - **`recovery`**: Per-stop recovery ledger with borrowing
//! - **`engine`**: Feasibility-gated greedy search over trip shifts
//! - **`headway`**: Post-pass headway smoothing
//! - **`service`**: Phase sequencing, caching, budgets, cancellation
//! - **`validation`**: Request checks
//! - **`error`**: Error taxonomy
//!
//! # Example
//!
//! ```
//! use connection_optimizer::models::{
//!     ConnectionOpportunity, ConnectionType, OptimizationRequest, Schedule, TimePoint, Trip,
//! };
//! use connection_optimizer::service::ConnectionOptimizationService;
//!
//! let schedule = Schedule::new("WKDY-12", "12")
//!     .with_time_point(TimePoint::new("STN", 0))
//!     .with_time_point(TimePoint::new("MALL", 1))
//!     .with_trip(
//!         Trip::new(101, 1)
//!             .with_stop("STN", 480, 480)
//!             .with_stop("MALL", 495, 495)
//!             .with_recovery("MALL", 8),
//!     );
//! let train = ConnectionOpportunity::new("GO-0757", ConnectionType::GoTrain, "STN", 477)
//!     .with_priority(8);
//!
//! let service = ConnectionOptimizationService::new();
//! let result = service.optimize_schedule_connections(
//!     &OptimizationRequest::new(schedule, vec![train]),
//!     &mut |progress| assert!(progress.progress <= 100.0),
//! );
//!
//! assert!(result.success);
//! assert_eq!(result.successful_connections[0].gap, 5);
//! ```
//!
//! # Architecture
//!
//! Data flows one way: the service validates and analyzes the request, the
//! engine searches over an owned copy of the schedule while borrowing from
//! the recovery bank, the headway corrector smooths the result, and the
//! service compiles statistics. The input schedule is never mutated.
//!
//! # References
//!
//! - Ceder, Golany, Tal (2001), "Creating bus timetables with maximal
//!   synchronization"
//! - Ibarra-Rojas, Delgado, Giesen, Muñoz (2015), "Planning, operation, and
//!   control of bus transport systems: A literature review"

pub mod engine;
pub mod error;
pub mod headway;
pub mod models;
pub mod recovery;
pub mod service;
pub mod validation;
pub mod windows;
