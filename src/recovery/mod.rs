//! Recovery bank.
//!
//! Maintains the per-stop ledger of lendable layover slack. Borrowing is the
//! only way a move may push a trip's recovery below the floor: the move
//! borrows its full shortfall or is rejected.
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `initialize` | Build accounts from scheduled recovery |
//! | `check_borrow` / `can_borrow` | Validate without writing |
//! | `borrow` | Record the full loan or nothing |
//! | `repay` | Return outstanding credit |
//! | `reconcile` | Re-sum totals and report drift |
//! | `reset` | Clear the ledger |

mod bank;

pub use bank::{BorrowRequest, ReconcileReport, RecoveryBankService};
