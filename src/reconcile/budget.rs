//! Recomputes a budget's cached spend for the current month.

use rusqlite::Connection;
use serde::Serialize;

use crate::{
    Error,
    budget::{get_budget, update_budget_amount},
    database_id::BudgetId,
    reconcile::approx_eq,
    timezone::{Clock, local_date, local_now, resolve_timezone},
    transaction::{TransactionStatus, TransactionType, get_transactions_for_category},
    user::get_user_by_id,
};

/// The result of reconciling one budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetReconciliation {
    /// The budget that was reconciled.
    pub budget_id: BudgetId,
    /// The recomputed spend for the current month.
    pub amount: f64,
    /// Whether the stored amount differed and was overwritten.
    pub changed: bool,
}

/// Recompute the current month's spend of a budget and store it if it changed.
///
/// Only cleared entries in the budget's category whose local date falls in the
/// owner's current local month count. Expenses add to the spend, income in
/// the category offsets it, and the total never drops below zero. A category
/// without entries has zero spend.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the budget does not exist,
/// - [Error::MissingTimezone] or [Error::InvalidTimezoneError] if the owner's
///   timezone is not usable,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn reconcile_budget(
    budget_id: BudgetId,
    connection: &Connection,
    clock: &dyn Clock,
) -> Result<BudgetReconciliation, Error> {
    let budget = get_budget(budget_id, connection)?;
    let transactions = get_transactions_for_category(budget.category_id, connection)?;

    let amount = match transactions.first() {
        None => 0.0,
        Some(first) => {
            // Every entry in a category belongs to the category's owner.
            let owner = get_user_by_id(first.user_id, connection)?;
            let tz = resolve_timezone(&owner)?;
            let today = local_now(clock, tz).date();

            let spend: f64 = transactions
                .iter()
                .filter(|transaction| transaction.status == TransactionStatus::Cleared)
                .filter(|transaction| {
                    let date = local_date(transaction.date, tz);
                    date.year() == today.year() && date.month() == today.month()
                })
                .map(|transaction| match transaction.kind {
                    TransactionType::Expense => transaction.amount,
                    TransactionType::Income => -transaction.amount,
                })
                .sum();

            spend.max(0.0)
        }
    };

    if approx_eq(amount, budget.amount) {
        tracing::debug!(budget_id, amount, "budget is up to date");

        return Ok(BudgetReconciliation {
            budget_id,
            amount,
            changed: false,
        });
    }

    update_budget_amount(budget_id, amount, connection)?;

    tracing::info!(
        budget_id,
        amount_before = budget.amount,
        amount_after = amount,
        "updated budget amount"
    );

    Ok(BudgetReconciliation {
        budget_id,
        amount,
        changed: true,
    })
}
