//! Budget Ledger keeps the derived figures of a personal finance ledger honest.
//!
//! Account balances and budget totals are caches over the transaction ledger.
//! This library recomputes them from scratch, materializes the entries implied
//! by recurring subscriptions, and keeps both legs of every transfer in sync.
//!
//! Every operation takes an explicit SQLite [Connection](rusqlite::Connection)
//! and, where "now" matters, a [Clock]. Recomputation is idempotent, so every
//! entry point is safe to call more than once or from overlapping triggers.

#![warn(missing_docs)]

mod account;
mod budget;
mod category;
mod database_id;
mod db;
mod error;
mod logging;
mod reconcile;
mod subscription;
mod timezone;
mod transaction;
mod transfer;
mod user;

#[cfg(test)]
mod test_utils;

pub use account::{
    Account, AccountType, NewAccount, create_account, get_account, get_account_ids,
    get_accounts_for_user, update_account_balances,
};
pub use budget::{
    Budget, NewBudget, create_budget, get_budget, get_budget_ids, get_budgets_for_user,
    update_budget_amount,
};
pub use category::{Category, create_category, get_categories_for_user, get_category, set_archived};
pub use database_id::{
    AccountId, BudgetId, CategoryId, SubscriptionId, TransactionId, TransferId,
};
pub use db::initialize as initialize_db;
pub use error::{Error, UnknownVariant};
pub use logging::setup_logging;
pub use reconcile::{
    AccountReconciliation, BalanceAudit, BudgetReconciliation, EntityRef, PassFailure,
    PassReport, PassScope, ReconcileQueue, ReconcileScheduler, ReconcileState, approx_eq,
    reconcile_account, reconcile_budget, run_pass, spawn_reconcile_worker,
};
pub use subscription::{
    Frequency, NewSubscription, Subscription, create_subscription, delete_subscription,
    get_subscription, get_subscriptions_for_account, get_subscriptions_for_user, materialize,
};
pub use timezone::{
    Clock, FixedClock, SystemClock, local_date, local_noon, local_now, resolve_timezone, to_local,
};
pub use transaction::{
    Transaction, TransactionBuilder, TransactionStatus, TransactionType, create_transaction,
    delete_transaction, get_transaction, get_transactions_for_account,
    get_transactions_for_category, get_transactions_for_subscription, update_transaction,
};
pub use transfer::{
    NewTransfer, Transfer, TransferLegs, TransferUpdate, create_transfer, delete_transfer,
    get_transfer, get_transfers_for_user, update_transfer,
};
pub use user::{User, UserID, create_user, get_user_by_id, set_user_timezone};
