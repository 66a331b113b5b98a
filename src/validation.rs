//! Request validation.
//!
//! Checks a request before any optimization work starts. Hard problems are
//! returned together as [`ValidationError`]s; soft problems are returned by
//! [`collect_warnings`] and only become result warnings.
//!
//! Hard checks:
//! - Schedule has trips, request has opportunities
//! - Duplicate trip numbers and opportunity IDs
//! - Priority in 1..=10
//! - Every time and duration within one week of the service-day origin
//! - Configured connection windows are consistent
//! - Constraints, bank ratios, headway settings, and options are in range

use std::collections::HashSet;

use crate::models::{Minutes, OptimizationRequest, Schedule};

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Trip count above which a schedule is reported as large.
pub const LARGE_SCHEDULE_TRIPS: usize = 500;

/// Opportunity count above which a request is reported as large.
pub const LARGE_OPPORTUNITY_SET: usize = 200;

/// Largest accepted magnitude of any time or duration (one week).
pub const MAX_TIME_MAGNITUDE: Minutes = 7 * 24 * 60;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// The schedule has no trips.
    EmptySchedule,
    /// The request has no connection opportunities.
    NoOpportunities,
    /// Two entities share the same ID.
    DuplicateId,
    /// Priority outside 1..=10.
    InvalidPriority,
    /// A configured window is inconsistent.
    InvalidWindow,
    /// A constraint is out of range.
    InvalidConstraint,
    /// Recovery bank settings are out of range.
    InvalidBankConfig,
    /// Headway correction settings are out of range.
    InvalidHeadwayConfig,
    /// Search options are out of range.
    InvalidOptions,
    /// A time or duration lies outside the accepted range.
    TimeOutOfRange,
}

impl ValidationError {
    /// Creates an error.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validates an optimization request.
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_request(request: &OptimizationRequest) -> ValidationResult {
    let mut errors = Vec::new();

    validate_schedule(&request.schedule, &mut errors);

    if request.connection_opportunities.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::NoOpportunities,
            "Request has no connection opportunities",
        ));
    }

    let mut opportunity_ids = HashSet::new();
    for opp in &request.connection_opportunities {
        if !opportunity_ids.insert(opp.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate opportunity ID: {}", opp.id),
            ));
        }
        check_time(
            &mut errors,
            opp.target_time,
            || format!("Opportunity '{}' target time", opp.id),
        );
        if !(1..=10).contains(&opp.priority) {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidPriority,
                format!("Opportunity '{}' has priority {} (expected 1-10)", opp.id, opp.priority),
            ));
        }
    }

    for (connection_type, window) in request.connection_windows.configured() {
        let (ideal, partial) = (window.ideal, window.partial);
        for value in [ideal.min, ideal.max, partial.min, partial.max, window.missed_threshold] {
            check_time(&mut errors, value, || format!("Connection window for {connection_type}"));
        }
        if !window.is_consistent() {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidWindow,
                format!("Connection window for {connection_type} is inconsistent"),
            ));
        }
    }

    let c = &request.constraints;
    for (value, name) in [
        (c.max_trip_deviation, "max_trip_deviation"),
        (c.max_schedule_shift, "max_schedule_shift"),
        (c.min_recovery_time, "min_recovery_time"),
        (c.max_recovery_time, "max_recovery_time"),
        (c.headway_tolerance, "headway_tolerance"),
    ] {
        check_time(&mut errors, value, || name.to_string());
    }
    let mut constraint = |ok: bool, message: &str| {
        if !ok {
            errors.push(ValidationError::new(ValidationErrorKind::InvalidConstraint, message));
        }
    };
    constraint(c.max_trip_deviation >= 0, "max_trip_deviation must not be negative");
    constraint(c.max_schedule_shift >= 0, "max_schedule_shift must not be negative");
    constraint(c.min_recovery_time >= 0, "min_recovery_time must not be negative");
    constraint(
        c.min_recovery_time <= c.max_recovery_time,
        "min_recovery_time must not exceed max_recovery_time",
    );
    constraint(c.headway_tolerance >= 0, "headway_tolerance must not be negative");
    constraint(
        [c.priority_weights.bus_route, c.priority_weights.go_train, c.priority_weights.school_bell]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0),
        "priority weights must be finite and non-negative",
    );
    constraint(
        c.performance.max_optimization_time_ms > 0,
        "max_optimization_time_ms must be positive",
    );
    constraint(
        c.performance.max_memory_usage_mb > 0.0,
        "max_memory_usage_mb must be positive",
    );
    constraint(
        c.performance.early_termination_threshold > 0.0
            && c.performance.early_termination_threshold <= 1.0,
        "early_termination_threshold must be in (0, 1]",
    );

    let bank = &request.recovery_bank_config;
    if !(0.0..=1.0).contains(&bank.max_borrowing_ratio) {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidBankConfig,
            format!("max_borrowing_ratio {} must be in [0, 1]", bank.max_borrowing_ratio),
        ));
    }
    let mut stop_ids = HashSet::new();
    for stop in &bank.stop_configs {
        if !stop_ids.insert(stop.stop_id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate stop config: {}", stop.stop_id),
            ));
        }
        check_time(&mut errors, stop.reserved_minutes, || {
            format!("Stop '{}' reserved minutes", stop.stop_id)
        });
        if stop.reserved_minutes < 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidBankConfig,
                format!("Stop '{}' has negative reserved minutes", stop.stop_id),
            ));
        }
        if let Some(ratio) = stop.max_borrow_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidBankConfig,
                    format!("Stop '{}' ratio {} must be in [0, 1]", stop.stop_id, ratio),
                ));
            }
        }
    }

    let h = &request.headway_correction;
    check_time(&mut errors, h.max_deviation_threshold, || "max_deviation_threshold".into());
    if let Some(target) = h.target_headway {
        check_time(&mut errors, target, || "target_headway".into());
    }
    if h.enabled {
        if !(h.correction_strength > 0.0 && h.correction_strength <= 1.0) {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidHeadwayConfig,
                "correction_strength must be in (0, 1]",
            ));
        }
        if h.correction_horizon == 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidHeadwayConfig,
                "correction_horizon must be at least 1",
            ));
        }
        if h.max_deviation_threshold < 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidHeadwayConfig,
                "max_deviation_threshold must not be negative",
            ));
        }
        if h.target_headway.is_some_and(|t| t <= 0) {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidHeadwayConfig,
                "target_headway must be positive",
            ));
        }
    }

    let o = &request.options;
    if o.max_iterations == 0 {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidOptions,
            "max_iterations must be at least 1",
        ));
    }
    if !(o.convergence_threshold.is_finite() && o.convergence_threshold >= 0.0) {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidOptions,
            "convergence_threshold must be finite and non-negative",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_schedule(schedule: &Schedule, errors: &mut Vec<ValidationError>) {
    if schedule.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::EmptySchedule,
            format!("Schedule '{}' has no trips", schedule.id),
        ));
    }

    let mut trip_numbers = HashSet::new();
    for trip in &schedule.trips {
        if !trip_numbers.insert(trip.trip_number) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate trip number: {}", trip.trip_number),
            ));
        }
        let maps = [
            ("arrival", &trip.times.arrivals),
            ("departure", &trip.times.departures),
            ("recovery", &trip.times.recovery),
        ];
        for (label, map) in maps {
            for (stop, &value) in map {
                check_time(errors, value, || {
                    format!("Trip {} {label} at '{stop}'", trip.trip_number)
                });
            }
        }
    }

    let mut time_point_ids = HashSet::new();
    for tp in &schedule.time_points {
        if !time_point_ids.insert(tp.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate time point ID: {}", tp.id),
            ));
        }
    }
}

fn check_time(errors: &mut Vec<ValidationError>, value: Minutes, what: impl FnOnce() -> String) {
    if !(-MAX_TIME_MAGNITUDE..=MAX_TIME_MAGNITUDE).contains(&value) {
        errors.push(ValidationError::new(
            ValidationErrorKind::TimeOutOfRange,
            format!("{} is {value} min (limit ±{MAX_TIME_MAGNITUDE})", what()),
        ));
    }
}

/// Soft issues that do not prevent a run.
pub fn collect_warnings(request: &OptimizationRequest) -> Vec<String> {
    let mut warnings = Vec::new();
    let schedule = &request.schedule;

    if schedule.trip_count() > LARGE_SCHEDULE_TRIPS {
        warnings.push(format!(
            "Large schedule ({} trips); optimization may approach the time budget",
            schedule.trip_count()
        ));
    }
    if request.connection_opportunities.len() > LARGE_OPPORTUNITY_SET {
        warnings.push(format!(
            "Large opportunity set ({}); consider splitting the request",
            request.connection_opportunities.len()
        ));
    }

    for opp in &request.connection_opportunities {
        if !schedule.time_points.is_empty() && !schedule.has_time_point(&opp.location_id) {
            warnings.push(format!(
                "Opportunity '{}' location '{}' is not a time point of the route",
                opp.id, opp.location_id
            ));
        }
        for trip in &opp.affected_trips {
            if schedule.trip(*trip).is_none() {
                warnings.push(format!(
                    "Opportunity '{}' references unknown trip {}",
                    opp.id, trip
                ));
            }
        }
    }

    let floor = request.constraints.min_recovery_time;
    let below: Vec<u32> = schedule
        .trips
        .iter()
        .filter(|t| !t.times.recovery.is_empty() && t.total_recovery() < floor)
        .map(|t| t.trip_number)
        .collect();
    if !below.is_empty() {
        warnings.push(format!(
            "{} trip(s) start below the minimum recovery time: {:?}",
            below.len(),
            below
        ));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConnectionOpportunity, ConnectionType, ConnectionWindow, ConnectionWindows, Trip,
        WindowBand,
    };

    fn make_request() -> OptimizationRequest {
        let schedule = Schedule::new("S1", "R1")
            .with_trip(Trip::new(1, 1).with_stop("A", 600, 600).with_recovery("A", 5));
        OptimizationRequest::new(
            schedule,
            vec![ConnectionOpportunity::new("C1", ConnectionType::GoTrain, "A", 597)],
        )
    }

    #[test]
    fn test_valid_request() {
        assert!(validate_request(&make_request()).is_ok());
    }

    #[test]
    fn test_empty_request_reports_all_errors() {
        let req = OptimizationRequest::new(Schedule::new("S", "R"), Vec::new());
        let errors = validate_request(&req).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::EmptySchedule));
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::NoOpportunities));
    }

    #[test]
    fn test_duplicate_ids() {
        let mut req = make_request();
        req.schedule.trips.push(Trip::new(1, 2).with_stop("A", 700, 700));
        req.connection_opportunities
            .push(ConnectionOpportunity::new("C1", ConnectionType::BusRoute, "A", 10));
        let errors = validate_request(&req).unwrap_err();
        assert_eq!(
            errors.iter().filter(|e| e.kind == ValidationErrorKind::DuplicateId).count(),
            2
        );
    }

    #[test]
    fn test_invalid_priority() {
        let mut req = make_request();
        req.connection_opportunities[0].priority = 11;
        let errors = validate_request(&req).unwrap_err();
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidPriority);
    }

    #[test]
    fn test_inconsistent_window() {
        let req = make_request().with_windows(ConnectionWindows::new().with_window(
            ConnectionType::GoTrain,
            ConnectionWindow::new(WindowBand::new(5, 10), WindowBand::new(7, 15), 20),
        ));
        let errors = validate_request(&req).unwrap_err();
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidWindow);
    }

    #[test]
    fn test_recovery_range_inverted() {
        let mut req = make_request();
        req.constraints.min_recovery_time = 10;
        req.constraints.max_recovery_time = 5;
        let errors = validate_request(&req).unwrap_err();
        assert!(errors.iter().all(|e| e.kind == ValidationErrorKind::InvalidConstraint));
    }

    #[test]
    fn test_bank_ratio_out_of_range() {
        let mut req = make_request();
        req.recovery_bank_config.max_borrowing_ratio = 1.5;
        let errors = validate_request(&req).unwrap_err();
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidBankConfig);
    }

    #[test]
    fn test_headway_checks_skipped_when_disabled() {
        let mut req = make_request();
        req.headway_correction.correction_strength = 0.0;
        assert!(validate_request(&req).is_err());
        req.headway_correction.enabled = false;
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_times_outside_one_week_rejected() {
        let mut req = make_request();
        req.connection_opportunities[0].target_time = Minutes::MIN;
        req.schedule.trips[0].times.departures.insert("A".into(), MAX_TIME_MAGNITUDE + 1);
        req.constraints.max_trip_deviation = Minutes::MAX;
        let errors = validate_request(&req).unwrap_err();
        assert_eq!(
            errors.iter().filter(|e| e.kind == ValidationErrorKind::TimeOutOfRange).count(),
            3
        );
    }

    #[test]
    fn test_after_midnight_times_accepted() {
        let mut req = make_request();
        req.connection_opportunities[0].target_time = 1500;
        req.schedule.trips[0] = Trip::new(1, 1).with_stop("A", 1505, 1505).with_recovery("A", 5);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_warnings() {
        let mut req = make_request();
        req.connection_opportunities[0].affected_trips.push(42);
        req.constraints.min_recovery_time = 8;
        let warnings = collect_warnings(&req);
        assert!(warnings.iter().any(|w| w.contains("unknown trip 42")));
        assert!(warnings.iter().any(|w| w.contains("below the minimum recovery")));
    }
}
