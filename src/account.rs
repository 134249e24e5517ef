//! Accounts and their cached balances.

use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    database_id::AccountId,
    error::{UnknownVariant, validate_amount},
    user::UserID,
};

/// The kind of account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// An everyday transaction account.
    Checking,
    /// A savings account.
    Savings,
    /// A credit card or line of credit.
    Credit,
    /// Anything else, e.g. cash.
    Other,
}

impl AccountType {
    /// The value stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "CHECKING",
            Self::Savings => "SAVINGS",
            Self::Credit => "CREDIT",
            Self::Other => "OTHER",
        }
    }
}

impl ToSql for AccountType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccountType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "CHECKING" => Ok(Self::Checking),
            "SAVINGS" => Ok(Self::Savings),
            "CREDIT" => Ok(Self::Credit),
            "OTHER" => Ok(Self::Other),
            other => Err(FromSqlError::Other(Box::new(UnknownVariant {
                kind: "account type",
                value: other.to_owned(),
            }))),
        }
    }
}

/// A bank account, credit card or other store of money.
///
/// `balance` and `pending_balance` are caches over the account's ledger
/// entries, only the reconciler writes them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    /// The id for the account.
    pub id: AccountId,
    /// The user that owns the account.
    pub user_id: UserID,
    /// The display name of the account.
    pub name: String,
    /// The kind of account.
    pub kind: AccountType,
    /// The total of cleared entries.
    pub balance: f64,
    /// The total of cleared and pending entries.
    pub pending_balance: f64,
    /// The credit limit, if any.
    pub credit_limit: Option<f64>,
}

/// The fields needed to create an [Account].
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    /// The user that owns the account.
    pub user_id: UserID,
    /// The display name of the account.
    pub name: String,
    /// The kind of account.
    pub kind: AccountType,
    /// The credit limit, if any.
    pub credit_limit: Option<f64>,
}

pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            balance REAL NOT NULL DEFAULT 0,
            pending_balance REAL NOT NULL DEFAULT 0,
            credit_limit REAL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_account_user ON account(user_id);",
    )?;

    Ok(())
}

const SELECT_ACCOUNT: &str =
    "SELECT id, user_id, name, kind, balance, pending_balance, credit_limit FROM account";

pub fn map_account_row(row: &Row) -> Result<Account, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = UserID::new(row.get(1)?);
    let name = row.get(2)?;
    let kind = row.get(3)?;
    let balance = row.get(4)?;
    let pending_balance = row.get(5)?;
    let credit_limit = row.get(6)?;

    Ok(Account {
        id,
        user_id,
        name,
        kind,
        balance,
        pending_balance,
        credit_limit,
    })
}

/// Create a new account with zero balances.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the credit limit is negative or not finite,
/// - or [Error::SqlError] if the user does not exist or there is some other SQL error.
pub fn create_account(account: NewAccount, connection: &Connection) -> Result<Account, Error> {
    if let Some(limit) = account.credit_limit {
        validate_amount(limit)?;
    }

    connection
        .prepare(
            "INSERT INTO account (user_id, name, kind, credit_limit)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id, user_id, name, kind, balance, pending_balance, credit_limit",
        )?
        .query_row(
            (
                account.user_id.as_i64(),
                account.name,
                account.kind,
                account.credit_limit,
            ),
            map_account_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve an account by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_account(id: AccountId, connection: &Connection) -> Result<Account, Error> {
    connection
        .prepare(&format!("{SELECT_ACCOUNT} WHERE id = :id"))?
        .query_row(&[(":id", &id)], map_account_row)
        .map_err(|error| error.into())
}

/// Retrieve an account only if it belongs to `user_id`.
///
/// # Errors
/// Returns [Error::InvalidAccount] if the account does not exist or belongs to
/// another user.
pub(crate) fn get_owned_account(
    id: AccountId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Account, Error> {
    match get_account(id, connection) {
        Ok(account) if account.user_id == user_id => Ok(account),
        Ok(_) | Err(Error::NotFound) => Err(Error::InvalidAccount(id)),
        Err(error) => Err(error),
    }
}

/// Retrieve all accounts owned by `user_id`, ordered by name.
pub fn get_accounts_for_user(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Account>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_ACCOUNT} WHERE user_id = :user_id ORDER BY name ASC"
        ))?
        .query_map(&[(":user_id", &user_id.as_i64())], map_account_row)?
        .map(|maybe_account| maybe_account.map_err(|error| error.into()))
        .collect()
}

/// Retrieve the IDs of every account in the database.
pub fn get_account_ids(connection: &Connection) -> Result<Vec<AccountId>, Error> {
    connection
        .prepare("SELECT id FROM account ORDER BY id ASC")?
        .query_map([], |row| row.get(0))?
        .map(|maybe_id| maybe_id.map_err(|error| error.into()))
        .collect()
}

/// Overwrite the cached balances of an account.
///
/// # Errors
/// Returns [Error::NotFound] if the account does not exist.
pub fn update_account_balances(
    id: AccountId,
    balance: f64,
    pending_balance: f64,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE account SET balance = ?1, pending_balance = ?2 WHERE id = ?3",
        (balance, pending_balance, id),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}
