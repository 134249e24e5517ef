//! Reads the ledger entries that the reconcilers recompute caches from.

use rusqlite::Connection;

use crate::{
    Error,
    database_id::{AccountId, CategoryId, SubscriptionId},
    transaction::{
        Transaction,
        core::{SELECT_TRANSACTION, map_transaction_row},
    },
};

/// Retrieve every transaction on an account, oldest first.
pub fn get_transactions_for_account(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    query_by_column("account_id", account_id, connection)
}

/// Retrieve every transaction in a category, oldest first.
pub fn get_transactions_for_category(
    category_id: CategoryId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    query_by_column("category_id", category_id, connection)
}

/// Retrieve every transaction generated by a subscription, oldest first.
pub fn get_transactions_for_subscription(
    subscription_id: SubscriptionId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    query_by_column("subscription_id", subscription_id, connection)
}

fn query_by_column(
    column: &'static str,
    id: i64,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let mut transactions = connection
        .prepare(&format!("{SELECT_TRANSACTION} WHERE {column} = :id"))?
        .query_map(&[(":id", &id)], map_transaction_row)?
        .collect::<Result<Vec<_>, _>>()?;

    // Dates are stored with the owner's offset, so sort on the instant rather
    // than the stored text.
    transactions.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

    Ok(transactions)
}
