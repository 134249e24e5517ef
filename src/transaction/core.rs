//! Defines the ledger entry model and its database queries.

use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    account::get_owned_account,
    category::get_owned_category,
    database_id::{AccountId, CategoryId, SubscriptionId, TransactionId},
    error::{UnknownVariant, validate_amount},
    user::UserID,
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether money came into or went out of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Money coming in.
    Income,
    /// Money going out.
    Expense,
}

impl TransactionType {
    /// The value stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
        }
    }

    /// The sign of an entry of this type on its account's balance.
    pub fn balance_sign(self) -> f64 {
        match self {
            Self::Income => 1.0,
            Self::Expense => -1.0,
        }
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "INCOME" => Ok(Self::Income),
            "EXPENSE" => Ok(Self::Expense),
            other => Err(FromSqlError::Other(Box::new(UnknownVariant {
                kind: "transaction type",
                value: other.to_owned(),
            }))),
        }
    }
}

/// How far along a ledger entry is in settling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Authorised but not yet settled.
    Pending,
    /// Settled.
    Cleared,
    /// Will never settle. Counts towards nothing.
    Cancelled,
}

impl TransactionStatus {
    /// The value stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Cleared => "CLEARED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl ToSql for TransactionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "PENDING" => Ok(Self::Pending),
            "CLEARED" => Ok(Self::Cleared),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(FromSqlError::Other(Box::new(UnknownVariant {
                kind: "transaction status",
                value: other.to_owned(),
            }))),
        }
    }
}

/// A ledger entry: a single income or expense on one account.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The user that owns the transaction.
    pub user_id: UserID,
    /// The account the money moved in or out of.
    pub account_id: AccountId,
    /// The category of the transaction.
    pub category_id: CategoryId,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The magnitude of the transaction, never negative.
    pub amount: f64,
    /// Whether the money came in or went out.
    pub kind: TransactionType,
    /// Whether the transaction has settled.
    pub status: TransactionStatus,
    /// When the transaction happened, stored at local noon.
    pub date: OffsetDateTime,
    /// The subscription that generated this transaction, if any.
    pub subscription_id: Option<SubscriptionId>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        user_id: UserID,
        account_id: AccountId,
        category_id: CategoryId,
        amount: f64,
        kind: TransactionType,
        date: OffsetDateTime,
    ) -> TransactionBuilder {
        TransactionBuilder {
            user_id,
            account_id,
            category_id,
            description: String::new(),
            amount,
            kind,
            status: TransactionStatus::Cleared,
            date,
            subscription_id: None,
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// New transactions default to [TransactionStatus::Cleared], an empty
/// description and no subscription.
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// The user that owns the transaction.
    pub user_id: UserID,
    /// The account the money moved in or out of.
    pub account_id: AccountId,
    /// The category of the transaction.
    pub category_id: CategoryId,
    /// A human-readable description of the transaction.
    pub description: String,
    /// The magnitude of the transaction. Must be non-negative.
    pub amount: f64,
    /// Whether the money came in or went out.
    pub kind: TransactionType,
    /// Whether the transaction has settled.
    pub status: TransactionStatus,
    /// When the transaction happened.
    ///
    /// Callers should normalise calendar dates with [crate::local_noon].
    pub date: OffsetDateTime,
    /// The subscription that generated this transaction, if any.
    pub subscription_id: Option<SubscriptionId>,
}

impl TransactionBuilder {
    /// Set the description for the transaction.
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    /// Set the status for the transaction.
    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the subscription that generated the transaction.
    pub fn subscription_id(mut self, subscription_id: Option<SubscriptionId>) -> Self {
        self.subscription_id = subscription_id;
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

pub(crate) const SELECT_TRANSACTION: &str = "SELECT id, user_id, account_id, category_id,
    description, amount, type, status, date, subscription_id FROM \"transaction\"";

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the amount is negative or not finite,
/// - [Error::InvalidAccount] or [Error::InvalidCategory] if the account or
///   category does not exist or belongs to another user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    get_owned_account(builder.account_id, builder.user_id, connection)?;
    get_owned_category(builder.category_id, builder.user_id, connection)?;

    insert_transaction(builder, connection)
}

/// Insert a transaction without checking ownership of the account and category.
pub(crate) fn insert_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    validate_amount(builder.amount)?;

    connection
        .prepare(
            "INSERT INTO \"transaction\"
             (user_id, account_id, category_id, description, amount, type, status, date,
              subscription_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING id, user_id, account_id, category_id, description, amount, type,
              status, date, subscription_id",
        )?
        .query_row(
            (
                builder.user_id.as_i64(),
                builder.account_id,
                builder.category_id,
                builder.description,
                builder.amount,
                builder.kind,
                builder.status,
                builder.date,
                builder.subscription_id,
            ),
            map_transaction_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    connection
        .prepare(&format!("{SELECT_TRANSACTION} WHERE id = :id"))?
        .query_row(&[(":id", &id)], map_transaction_row)
        .map_err(|error| error.into())
}

/// Overwrite the stored fields of `transaction`.
///
/// The owner of a transaction cannot be changed.
///
/// # Errors
/// This function will return a:
/// - [Error::TransferLegLocked] if the transaction is a transfer leg,
/// - [Error::InvalidAmount] if the amount is negative or not finite,
/// - [Error::InvalidAccount] or [Error::InvalidCategory] if the new account or
///   category does not belong to the owner,
/// - [Error::UpdateMissingTransaction] if the transaction does not exist,
/// - or [Error::SqlError] there is some other SQL error.
pub fn update_transaction(transaction: &Transaction, connection: &Connection) -> Result<(), Error> {
    if is_transfer_leg(transaction.id, connection)? {
        return Err(Error::TransferLegLocked(transaction.id));
    }

    get_owned_account(transaction.account_id, transaction.user_id, connection)?;
    get_owned_category(transaction.category_id, transaction.user_id, connection)?;

    write_transaction(transaction, connection)
}

/// Overwrite the stored fields of `transaction` without any checks besides the amount.
pub(crate) fn write_transaction(
    transaction: &Transaction,
    connection: &Connection,
) -> Result<(), Error> {
    validate_amount(transaction.amount)?;

    let rows_affected = connection.execute(
        "UPDATE \"transaction\"
         SET account_id = ?1, category_id = ?2, description = ?3, amount = ?4, type = ?5,
             status = ?6, date = ?7, subscription_id = ?8
         WHERE id = ?9 AND user_id = ?10",
        (
            transaction.account_id,
            transaction.category_id,
            &transaction.description,
            transaction.amount,
            transaction.kind,
            transaction.status,
            transaction.date,
            transaction.subscription_id,
            transaction.id,
            transaction.user_id.as_i64(),
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingTransaction);
    }

    Ok(())
}

/// Delete a transaction by ID.
///
/// # Errors
/// This function will return a:
/// - [Error::TransferLegLocked] if the transaction is a transfer leg,
/// - [Error::DeleteMissingTransaction] if the transaction does not exist,
/// - or [Error::SqlError] there is some other SQL error.
pub fn delete_transaction(id: TransactionId, connection: &Connection) -> Result<(), Error> {
    if is_transfer_leg(id, connection)? {
        return Err(Error::TransferLegLocked(id));
    }

    remove_transaction(id, connection)
}

pub(crate) fn remove_transaction(id: TransactionId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM \"transaction\" WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingTransaction);
    }

    Ok(())
}

/// Whether the transaction is one of the two legs of a transfer.
pub(crate) fn is_transfer_leg(id: TransactionId, connection: &Connection) -> Result<bool, Error> {
    connection
        .query_row(
            "SELECT EXISTS(
                SELECT 1 FROM transfer WHERE from_transaction_id = ?1 OR to_transaction_id = ?1
             )",
            [id],
            |row| row.get(0),
        )
        .map_err(|error| error.into())
}

/// Get the total number of transactions in the database.
#[cfg(test)]
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                account_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                description TEXT NOT NULL,
                amount REAL NOT NULL CHECK (amount >= 0),
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                date TEXT NOT NULL,
                subscription_id INTEGER,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
                FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE,
                FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE,
                FOREIGN KEY(subscription_id) REFERENCES subscription(id)
                     ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_account ON \"transaction\"(account_id);",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_category ON \"transaction\"(category_id);",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_subscription
          ON \"transaction\"(subscription_id);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = UserID::new(row.get(1)?);
    let account_id = row.get(2)?;
    let category_id = row.get(3)?;
    let description = row.get(4)?;
    let amount = row.get(5)?;
    let kind = row.get(6)?;
    let status = row.get(7)?;
    let date = row.get(8)?;
    let subscription_id = row.get(9)?;

    Ok(Transaction {
        id,
        user_id,
        account_id,
        category_id,
        description,
        amount,
        kind,
        status,
        date,
        subscription_id,
    })
}

// ============================================================================
// TESTS
// ============================================================================
