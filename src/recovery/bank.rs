//! Recovery bank service.
//!
//! Borrows are validated in full before anything is written, so a refused
//! borrow leaves the ledger untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::BorrowError;
use crate::models::{
    Loan, Minutes, OptimizationConstraints, RecoveryAccount, RecoveryBank, RecoveryBankConfig,
    Schedule,
};

/// A request to borrow recovery for one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRequest {
    /// Stop whose account lends.
    pub stop_id: String,
    /// Borrowing trip.
    pub trip_number: u32,
    /// Minutes requested.
    pub amount: Minutes,
    /// Trip recovery after the move, before the loan.
    pub post_move_recovery: Minutes,
}

impl BorrowRequest {
    /// Creates a request.
    pub fn new(stop_id: impl Into<String>, trip_number: u32, amount: Minutes, post_move_recovery: Minutes) -> Self {
        Self {
            stop_id: stop_id.into(),
            trip_number,
            amount,
            post_move_recovery,
        }
    }
}

/// Outcome of a ledger reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Re-summed available total.
    pub total_available: Minutes,
    /// Re-summed borrowed total.
    pub total_borrowed: Minutes,
    /// Absolute difference between recorded and re-summed totals.
    pub drift: Minutes,
    /// Whether both ratio caps hold after reconciliation.
    pub within_caps: bool,
}

/// Per-stop ledger of lendable recovery.
///
/// # Example
///
/// ```
/// use connection_optimizer::models::{
///     OptimizationConstraints, RecoveryBankConfig, Schedule, Trip,
/// };
/// use connection_optimizer::recovery::{BorrowRequest, RecoveryBankService};
///
/// let schedule = Schedule::new("S1", "R1")
///     .with_trip(Trip::new(1, 1).with_stop("A", 600, 600).with_recovery("A", 12));
/// let mut bank = RecoveryBankService::new();
/// bank.initialize(&schedule, &RecoveryBankConfig::default(), &OptimizationConstraints::default());
/// assert_eq!(bank.bank().total_available_recovery, 10);
///
/// let loan = bank.borrow(&BorrowRequest::new("A", 1, 3, 0)).unwrap();
/// assert_eq!(loan.minutes, 3);
/// assert_eq!(bank.bank().total_borrowed_recovery, 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecoveryBankService {
    bank: RecoveryBank,
    min_recovery_time: Minutes,
}

impl RecoveryBankService {
    /// Creates an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the ledger from the schedule's scheduled recovery.
    ///
    /// One account per stop that carries recovery on some trip. An account
    /// lends `Σ max(0, recovery − min_recovery_time)` over its trips, less
    /// the stop's reserved minutes.
    #[tracing::instrument(level = "debug", skip_all, fields(schedule = %schedule.id))]
    pub fn initialize(
        &mut self,
        schedule: &Schedule,
        config: &RecoveryBankConfig,
        constraints: &OptimizationConstraints,
    ) -> &RecoveryBank {
        let min = constraints.min_recovery_time;
        let mut surplus: BTreeMap<String, Minutes> = BTreeMap::new();
        for trip in &schedule.trips {
            for (stop, &minutes) in &trip.times.recovery {
                *surplus.entry(stop.clone()).or_insert(0) += (minutes - min).max(0);
            }
        }

        let accounts: BTreeMap<String, RecoveryAccount> = surplus
            .into_iter()
            .map(|(stop, minutes)| {
                let stop_cfg = config.stop_config(&stop);
                let reserved = stop_cfg.map_or(0, |c| c.reserved_minutes.max(0));
                let ratio = stop_cfg
                    .and_then(|c| c.max_borrow_ratio)
                    .unwrap_or(config.max_borrowing_ratio);
                let account = RecoveryAccount::new(stop.clone(), (minutes - reserved).max(0), ratio);
                (stop, account)
            })
            .collect();

        let total_available = accounts.values().map(|a| a.available).sum();
        self.bank = RecoveryBank {
            accounts,
            total_available_recovery: total_available,
            total_borrowed_recovery: 0,
            max_borrowing_ratio: config.max_borrowing_ratio,
            allow_borrowing: config.allow_borrowing,
        };
        self.min_recovery_time = min;

        tracing::debug!(
            stops = self.bank.accounts.len(),
            total_available,
            "recovery bank initialized"
        );
        &self.bank
    }

    /// Current ledger.
    pub fn bank(&self) -> &RecoveryBank {
        &self.bank
    }

    /// Fraction of the pool lent out.
    pub fn utilization(&self) -> f64 {
        self.bank.utilization()
    }

    /// Minutes a stop can still lend under both caps.
    pub fn headroom(&self, stop_id: &str) -> Minutes {
        self.bank
            .account(stop_id)
            .map_or(0, |a| a.headroom().min(self.bank.global_headroom()))
    }

    /// Whether a borrow would be granted.
    pub fn can_borrow(&self, request: &BorrowRequest) -> bool {
        self.check_borrow(request).is_ok()
    }

    /// Checks a borrow against every rule without touching the ledger.
    pub fn check_borrow(&self, request: &BorrowRequest) -> Result<(), BorrowError> {
        if !self.bank.allow_borrowing {
            return Err(BorrowError::Disabled);
        }
        if request.amount <= 0 {
            return Err(BorrowError::InvalidAmount {
                amount: request.amount,
            });
        }
        let account = self
            .bank
            .account(&request.stop_id)
            .ok_or_else(|| BorrowError::UnknownStop {
                stop_id: request.stop_id.clone(),
            })?;
        if request.amount > account.headroom() {
            return Err(BorrowError::StopCapExceeded {
                stop_id: request.stop_id.clone(),
                requested: request.amount,
                headroom: account.headroom(),
            });
        }
        let global = self.bank.global_headroom();
        if request.amount > global {
            return Err(BorrowError::RatioCapExceeded {
                requested: request.amount,
                headroom: global,
            });
        }
        let resulting = request.post_move_recovery + request.amount;
        if resulting < self.min_recovery_time {
            return Err(BorrowError::FloorViolation {
                trip_number: request.trip_number,
                resulting,
                minimum: self.min_recovery_time,
            });
        }
        Ok(())
    }

    /// Records a loan: the full amount or nothing.
    pub fn borrow(&mut self, request: &BorrowRequest) -> Result<Loan, BorrowError> {
        self.check_borrow(request)?;
        let account = self
            .bank
            .accounts
            .get_mut(&request.stop_id)
            .ok_or_else(|| BorrowError::UnknownStop {
                stop_id: request.stop_id.clone(),
            })?;
        account.borrowed += request.amount;
        *account.loans.entry(request.trip_number).or_insert(0) += request.amount;
        self.bank.total_borrowed_recovery += request.amount;

        tracing::trace!(
            stop = %request.stop_id,
            trip = request.trip_number,
            amount = request.amount,
            utilization = self.bank.utilization(),
            "recovery borrowed"
        );
        Ok(Loan::new(request.stop_id.clone(), request.trip_number, request.amount))
    }

    /// Returns up to `minutes` of a trip's outstanding loan at a stop.
    ///
    /// Returns the minutes actually repaid.
    pub fn repay(&mut self, stop_id: &str, trip_number: u32, minutes: Minutes) -> Result<Minutes, BorrowError> {
        if minutes <= 0 {
            return Err(BorrowError::InvalidAmount { amount: minutes });
        }
        let account = self
            .bank
            .accounts
            .get_mut(stop_id)
            .ok_or_else(|| BorrowError::UnknownStop {
                stop_id: stop_id.to_string(),
            })?;
        let outstanding = account.loans.get(&trip_number).copied().unwrap_or(0);
        if outstanding <= 0 {
            return Err(BorrowError::NoOutstandingLoan {
                stop_id: stop_id.to_string(),
                trip_number,
            });
        }
        let repaid = minutes.min(outstanding);
        if repaid == outstanding {
            account.loans.remove(&trip_number);
        } else {
            account.loans.insert(trip_number, outstanding - repaid);
        }
        account.borrowed -= repaid;
        self.bank.total_borrowed_recovery -= repaid;
        Ok(repaid)
    }

    /// Re-sums totals from the accounts and their loans, correcting drift.
    pub fn reconcile(&mut self) -> ReconcileReport {
        let mut total_borrowed = 0;
        for account in self.bank.accounts.values_mut() {
            account.borrowed = account.outstanding();
            total_borrowed += account.borrowed;
        }
        let total_available: Minutes = self.bank.accounts.values().map(|a| a.available).sum();
        let drift = (self.bank.total_available_recovery - total_available).abs()
            + (self.bank.total_borrowed_recovery - total_borrowed).abs();
        if drift != 0 {
            tracing::warn!(drift, "recovery ledger drift corrected");
        }
        self.bank.total_available_recovery = total_available;
        self.bank.total_borrowed_recovery = total_borrowed;
        ReconcileReport {
            total_available,
            total_borrowed,
            drift,
            within_caps: self.bank.within_caps(),
        }
    }

    /// Clears all ledger state.
    pub fn reset(&mut self) {
        self.bank = RecoveryBank::default();
        self.min_recovery_time = 0;
    }

    #[cfg(test)]
    pub(crate) fn bank_mut(&mut self) -> &mut RecoveryBank {
        &mut self.bank
    }
}
