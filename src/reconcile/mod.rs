//! Keeps cached balances and budget totals in step with the ledger.
//!
//! Every reconciler recomputes its figure from scratch and writes it only if
//! it differs from the stored value. Running a reconciler again, or from two
//! triggers at once, is therefore harmless.

mod balance;
mod budget;
mod pass;
mod queue;

pub use balance::{AccountReconciliation, BalanceAudit, reconcile_account};
pub use budget::{BudgetReconciliation, reconcile_budget};
pub use pass::{EntityRef, PassFailure, PassReport, PassScope, run_pass};
pub use queue::{ReconcileQueue, ReconcileScheduler, ReconcileState, spawn_reconcile_worker};

/// Values closer than this are treated as equal.
const EPSILON: f64 = 1e-4;

/// Whether `a` and `b` are equal within floating point drift.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}
