//! Defines the transfer model and its database queries.

use rusqlite::{Connection, Row};
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    database_id::{AccountId, CategoryId, TransactionId, TransferId},
    transaction::{Transaction, TransactionStatus},
    user::UserID,
};

/// A movement of money between two accounts of the same user.
///
/// A transfer owns exactly two ledger entries, its legs: an expense on the
/// source account and an income on the destination account. Both legs share
/// the transfer's amount, date, status, description and category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transfer {
    /// The ID of the transfer.
    pub id: TransferId,
    /// The user that owns the transfer.
    pub user_id: UserID,
    /// The category of both legs.
    pub category_id: CategoryId,
    /// The account the money leaves.
    pub from_account_id: AccountId,
    /// The account the money arrives in.
    pub to_account_id: AccountId,
    /// The description of both legs.
    pub description: String,
    /// The amount moved.
    pub amount: f64,
    /// When the money moved, stored at local noon.
    pub date: OffsetDateTime,
    /// The status of both legs.
    pub status: TransactionStatus,
    /// The expense leg on the source account.
    pub from_transaction_id: TransactionId,
    /// The income leg on the destination account.
    pub to_transaction_id: TransactionId,
}

/// The fields needed to create a [Transfer].
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransfer {
    /// The user that owns the transfer.
    pub user_id: UserID,
    /// The account the money leaves.
    pub from_account_id: AccountId,
    /// The account the money arrives in.
    pub to_account_id: AccountId,
    /// The category of both legs.
    pub category_id: CategoryId,
    /// The amount moved.
    pub amount: f64,
    /// The owner's local calendar date the money moved on.
    pub date: Date,
    /// The description of both legs.
    pub description: String,
    /// The status of both legs.
    pub status: TransactionStatus,
}

/// The fields of a transfer to change. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferUpdate {
    /// The new source account.
    pub from_account_id: Option<AccountId>,
    /// The new destination account.
    pub to_account_id: Option<AccountId>,
    /// The new category.
    pub category_id: Option<CategoryId>,
    /// The new amount.
    pub amount: Option<f64>,
    /// The new local calendar date.
    pub date: Option<Date>,
    /// The new description.
    pub description: Option<String>,
    /// The new status.
    pub status: Option<TransactionStatus>,
}

/// A transfer together with its two legs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferLegs {
    /// The transfer row.
    pub transfer: Transfer,
    /// The expense on the source account.
    pub from_leg: Transaction,
    /// The income on the destination account.
    pub to_leg: Transaction,
}

const SELECT_TRANSFER: &str = "SELECT id, user_id, category_id, from_account_id, to_account_id,
    description, amount, date, status, from_transaction_id, to_transaction_id FROM transfer";

/// Retrieve a transfer by its `id`.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to a valid transfer.
pub fn get_transfer(id: TransferId, connection: &Connection) -> Result<Transfer, Error> {
    connection
        .prepare(&format!("{SELECT_TRANSFER} WHERE id = :id"))?
        .query_row(&[(":id", &id)], map_transfer_row)
        .map_err(|error| error.into())
}

/// Retrieve the transfers of `user_id`, oldest first.
pub fn get_transfers_for_user(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Transfer>, Error> {
    let mut transfers = connection
        .prepare(&format!("{SELECT_TRANSFER} WHERE user_id = :user_id"))?
        .query_map(&[(":user_id", &user_id.as_i64())], map_transfer_row)?
        .collect::<Result<Vec<_>, _>>()?;

    transfers.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

    Ok(transfers)
}

pub(crate) fn insert_transfer_row(
    transfer: &Transfer,
    connection: &Connection,
) -> Result<TransferId, Error> {
    connection.execute(
        "INSERT INTO transfer
         (user_id, category_id, from_account_id, to_account_id, description, amount, date, status,
          from_transaction_id, to_transaction_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        (
            transfer.user_id.as_i64(),
            transfer.category_id,
            transfer.from_account_id,
            transfer.to_account_id,
            &transfer.description,
            transfer.amount,
            transfer.date,
            transfer.status,
            transfer.from_transaction_id,
            transfer.to_transaction_id,
        ),
    )?;

    Ok(connection.last_insert_rowid())
}

pub(crate) fn update_transfer_row(
    transfer: &Transfer,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE transfer
         SET category_id = ?1, from_account_id = ?2, to_account_id = ?3, description = ?4,
             amount = ?5, date = ?6, status = ?7, from_transaction_id = ?8, to_transaction_id = ?9
         WHERE id = ?10",
        (
            transfer.category_id,
            transfer.from_account_id,
            transfer.to_account_id,
            &transfer.description,
            transfer.amount,
            transfer.date,
            transfer.status,
            transfer.from_transaction_id,
            transfer.to_transaction_id,
            transfer.id,
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingTransfer);
    }

    Ok(())
}

pub(crate) fn delete_transfer_row(id: TransferId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM transfer WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingTransfer);
    }

    Ok(())
}

/// Create the transfer table.
///
/// The leg references are deferred so that the legs and the transfer row can
/// be written in any order within one database transaction.
pub fn create_transfer_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS transfer (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            from_account_id INTEGER NOT NULL,
            to_account_id INTEGER NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL CHECK (amount >= 0),
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            from_transaction_id INTEGER NOT NULL UNIQUE,
            to_transaction_id INTEGER NOT NULL UNIQUE,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE,
            FOREIGN KEY(from_account_id) REFERENCES account(id) ON UPDATE CASCADE,
            FOREIGN KEY(to_account_id) REFERENCES account(id) ON UPDATE CASCADE,
            FOREIGN KEY(from_transaction_id) REFERENCES \"transaction\"(id)
                DEFERRABLE INITIALLY DEFERRED,
            FOREIGN KEY(to_transaction_id) REFERENCES \"transaction\"(id)
                DEFERRABLE INITIALLY DEFERRED
        );

        CREATE INDEX IF NOT EXISTS idx_transfer_user ON transfer(user_id);",
    )?;

    Ok(())
}

fn map_transfer_row(row: &Row) -> Result<Transfer, rusqlite::Error> {
    Ok(Transfer {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        category_id: row.get(2)?,
        from_account_id: row.get(3)?,
        to_account_id: row.get(4)?,
        description: row.get(5)?,
        amount: row.get(6)?,
        date: row.get(7)?,
        status: row.get(8)?,
        from_transaction_id: row.get(9)?,
        to_transaction_id: row.get(10)?,
    })
}
