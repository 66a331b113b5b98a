//! Recovery bank ledger types.
//!
//! The bank pools the slack each stop holds above the recovery floor.
//! Trips whose layover would fall below the floor after a move may borrow
//! from the pool of the stop where they lay over.
//!
//! # Caps
//!
//! | Cap | Condition |
//! |-----|-----------|
//! | Stop | `borrowed ≤ available × max_borrow_ratio` per account |
//! | Global | `Σ borrowed ≤ Σ available × max_borrowing_ratio` |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Minutes;

/// Per-stop bank configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecoveryConfig {
    /// Time point the configuration applies to.
    pub stop_id: String,
    /// Minutes held back from the pool at this stop.
    #[serde(default)]
    pub reserved_minutes: Minutes,
    /// Ratio cap for this stop; the global ratio when absent.
    #[serde(default)]
    pub max_borrow_ratio: Option<f64>,
}

impl StopRecoveryConfig {
    /// Creates a configuration with no reserve and the global ratio.
    pub fn new(stop_id: impl Into<String>) -> Self {
        Self {
            stop_id: stop_id.into(),
            reserved_minutes: 0,
            max_borrow_ratio: None,
        }
    }

    /// Sets the reserved minutes.
    pub fn with_reserved_minutes(mut self, minutes: Minutes) -> Self {
        self.reserved_minutes = minutes;
        self
    }

    /// Sets a stop-specific ratio cap.
    pub fn with_max_borrow_ratio(mut self, ratio: f64) -> Self {
        self.max_borrow_ratio = Some(ratio);
        self
    }
}

/// Bank configuration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryBankConfig {
    /// Whether trips may borrow at all.
    pub allow_borrowing: bool,
    /// Global cap on `Σ borrowed / Σ available`.
    pub max_borrowing_ratio: f64,
    /// Per-stop overrides.
    pub stop_configs: Vec<StopRecoveryConfig>,
}

impl Default for RecoveryBankConfig {
    fn default() -> Self {
        Self {
            allow_borrowing: true,
            max_borrowing_ratio: 0.5,
            stop_configs: Vec::new(),
        }
    }
}

impl RecoveryBankConfig {
    /// Enables or disables borrowing.
    pub fn with_borrowing(mut self, allow: bool) -> Self {
        self.allow_borrowing = allow;
        self
    }

    /// Sets the global ratio cap.
    pub fn with_max_borrowing_ratio(mut self, ratio: f64) -> Self {
        self.max_borrowing_ratio = ratio;
        self
    }

    /// Adds a per-stop configuration.
    pub fn with_stop_config(mut self, config: StopRecoveryConfig) -> Self {
        self.stop_configs.push(config);
        self
    }

    /// Configuration for a stop, if any.
    pub fn stop_config(&self, stop_id: &str) -> Option<&StopRecoveryConfig> {
        self.stop_configs.iter().find(|c| c.stop_id == stop_id)
    }
}

/// Ledger entry of one stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAccount {
    /// Stop the account belongs to.
    pub stop_id: String,
    /// Lendable minutes (fixed at initialization).
    pub available: Minutes,
    /// Minutes currently lent out.
    pub borrowed: Minutes,
    /// Ratio cap of this account.
    pub max_borrow_ratio: f64,
    /// Outstanding loans by trip number.
    pub loans: BTreeMap<u32, Minutes>,
}

impl RecoveryAccount {
    /// Creates an account with nothing lent out.
    pub fn new(stop_id: impl Into<String>, available: Minutes, max_borrow_ratio: f64) -> Self {
        Self {
            stop_id: stop_id.into(),
            available,
            borrowed: 0,
            max_borrow_ratio,
            loans: BTreeMap::new(),
        }
    }

    /// Largest amount the account may lend in total.
    pub fn capacity(&self) -> Minutes {
        (self.available.max(0) as f64 * self.max_borrow_ratio).floor() as Minutes
    }

    /// Minutes the account may still lend.
    pub fn headroom(&self) -> Minutes {
        (self.capacity() - self.borrowed).max(0)
    }

    /// Sum of outstanding loans.
    pub fn outstanding(&self) -> Minutes {
        self.loans.values().sum()
    }
}

/// The recovery ledger of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryBank {
    /// Accounts by stop id.
    pub accounts: BTreeMap<String, RecoveryAccount>,
    /// `Σ available` across accounts.
    pub total_available_recovery: Minutes,
    /// `Σ borrowed` across accounts.
    pub total_borrowed_recovery: Minutes,
    /// Global ratio cap.
    pub max_borrowing_ratio: f64,
    /// Whether borrowing is enabled.
    pub allow_borrowing: bool,
}

impl RecoveryBank {
    /// Account of a stop.
    pub fn account(&self, stop_id: &str) -> Option<&RecoveryAccount> {
        self.accounts.get(stop_id)
    }

    /// Fraction of the pool currently lent out (0 for an empty pool).
    pub fn utilization(&self) -> f64 {
        if self.total_available_recovery <= 0 {
            0.0
        } else {
            self.total_borrowed_recovery as f64 / self.total_available_recovery as f64
        }
    }

    /// Minutes the global cap still allows.
    pub fn global_headroom(&self) -> Minutes {
        let cap = (self.total_available_recovery.max(0) as f64 * self.max_borrowing_ratio).floor() as Minutes;
        (cap - self.total_borrowed_recovery).max(0)
    }

    /// Whether both ratio caps hold.
    pub fn within_caps(&self) -> bool {
        let global = self.total_borrowed_recovery as f64
            <= self.total_available_recovery.max(0) as f64 * self.max_borrowing_ratio + 1e-9;
        global && self.accounts.values().all(|a| a.borrowed <= a.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_headroom() {
        let mut a = RecoveryAccount::new("A", 9, 0.5);
        assert_eq!(a.capacity(), 4);
        assert_eq!(a.headroom(), 4);
        a.borrowed = 3;
        assert_eq!(a.headroom(), 1);
        a.borrowed = 6;
        assert_eq!(a.headroom(), 0);
    }

    #[test]
    fn test_bank_utilization() {
        let mut bank = RecoveryBank {
            total_available_recovery: 20,
            max_borrowing_ratio: 0.5,
            allow_borrowing: true,
            ..Default::default()
        };
        assert_eq!(bank.utilization(), 0.0);
        bank.total_borrowed_recovery = 5;
        assert!((bank.utilization() - 0.25).abs() < 1e-12);
        assert_eq!(bank.global_headroom(), 5);
        assert!(bank.within_caps());
        bank.total_borrowed_recovery = 11;
        assert!(!bank.within_caps());
    }

    #[test]
    fn test_config_lookup() {
        let cfg = RecoveryBankConfig::default()
            .with_stop_config(StopRecoveryConfig::new("A").with_reserved_minutes(2));
        assert!(cfg.allow_borrowing);
        assert_eq!(cfg.stop_config("A").map(|c| c.reserved_minutes), Some(2));
        assert!(cfg.stop_config("B").is_none());
    }
}
