//! Defines the crate level error type and its conversion from SQL errors.

use crate::{
    database_id::{AccountId, CategoryId, TransactionId, TransferId},
    user::UserID,
};

/// The errors that may occur in the ledger engine.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The user has no timezone set.
    ///
    /// Date bucketing depends on the user's local calendar, so callers must
    /// ask the user to set a timezone rather than assume UTC.
    #[error("user {0} does not have a timezone set")]
    MissingTimezone(UserID),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// The account ID does not refer to an account owned by the acting user.
    #[error("the account ID {0} does not refer to a valid account")]
    InvalidAccount(AccountId),

    /// The category ID does not refer to a category owned by the acting user.
    #[error("the category ID {0} does not refer to a valid category")]
    InvalidCategory(CategoryId),

    /// A negative, infinite or NaN amount was used.
    ///
    /// Amounts are magnitudes, the direction of money comes from the
    /// transaction type.
    #[error("{0} is not a valid amount, amounts must be finite and non-negative")]
    InvalidAmount(f64),

    /// A transfer was requested from an account to itself.
    #[error("cannot transfer from account {0} to itself")]
    SameAccountTransfer(AccountId),

    /// An end date was before the start date.
    #[error("the end date is before the start date")]
    InvalidDateRange,

    /// A transfer row references a leg that no longer exists.
    ///
    /// This indicates data corruption. The transfer is left untouched so that
    /// the problem can be investigated, the missing leg is never recreated.
    #[error("transfer {transfer_id} is missing its leg {transaction_id}")]
    MissingTransferLeg {
        /// The transfer with the missing leg.
        transfer_id: TransferId,
        /// The ID of the leg that could not be found.
        transaction_id: TransactionId,
    },

    /// A transfer leg was edited or deleted directly.
    ///
    /// Transfer legs may only be changed through the transfer functions.
    #[error("transaction {0} is a transfer leg and can only be changed via its transfer")]
    TransferLegLocked(TransactionId),

    /// A stored enum value did not match any known variant.
    #[error("{0}")]
    UnknownVariant(String),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,

    /// Tried to update a transfer that does not exist
    #[error("tried to update a transfer that is not in the database")]
    UpdateMissingTransfer,

    /// Tried to delete a transfer that does not exist
    #[error("tried to delete a transfer that is not in the database")]
    DeleteMissingTransfer,

    /// Tried to delete a subscription that does not exist
    #[error("tried to delete a subscription that is not in the database")]
    DeleteMissingSubscription,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,
}

/// A stored value could not be mapped to one of the variants of a closed enum.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} \"{value}\"")]
pub struct UnknownVariant {
    /// The name of the enum, e.g. "frequency".
    pub kind: &'static str,
    /// The raw value read from the database.
    pub value: String,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            rusqlite::Error::FromSqlConversionFailure(index, data_type, cause) => {
                match cause.downcast::<UnknownVariant>() {
                    Ok(unknown) => Error::UnknownVariant(unknown.to_string()),
                    Err(cause) => {
                        let error =
                            rusqlite::Error::FromSqlConversionFailure(index, data_type, cause);
                        tracing::error!("an unhandled SQL error occurred: {}", error);
                        Error::SqlError(error)
                    }
                }
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

/// Check that `amount` can be stored as a magnitude.
pub(crate) fn validate_amount(amount: f64) -> Result<f64, Error> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(amount)
    } else {
        Err(Error::InvalidAmount(amount))
    }
}
