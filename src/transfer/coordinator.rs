//! Creates, updates and deletes transfers together with their two legs.
//!
//! Every function here writes the legs and the transfer row in one database
//! transaction, so a failure part way through leaves nothing behind. After a
//! successful write the affected accounts are scheduled for reconciliation.

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{
    Error,
    account::get_owned_account,
    category::get_owned_category,
    database_id::{AccountId, CategoryId, TransactionId, TransferId},
    error::validate_amount,
    reconcile::{PassScope, ReconcileScheduler},
    timezone::{local_noon, resolve_timezone},
    transaction::{
        Transaction, TransactionBuilder, TransactionStatus, TransactionType, get_transaction,
        insert_transaction, remove_transaction, write_transaction,
    },
    transfer::core::{
        NewTransfer, Transfer, TransferLegs, TransferUpdate, delete_transfer_row, get_transfer,
        insert_transfer_row, update_transfer_row,
    },
    user::{UserID, get_user_by_id},
};

/// The fields shared by both legs of a transfer.
struct LegFields<'a> {
    user_id: UserID,
    from_account_id: AccountId,
    to_account_id: AccountId,
    category_id: CategoryId,
    amount: f64,
    date: OffsetDateTime,
    description: &'a str,
    status: TransactionStatus,
}

impl LegFields<'_> {
    fn validate(&self, connection: &Connection) -> Result<(), Error> {
        validate_amount(self.amount)?;

        if self.from_account_id == self.to_account_id {
            return Err(Error::SameAccountTransfer(self.from_account_id));
        }

        get_owned_account(self.from_account_id, self.user_id, connection)?;
        get_owned_account(self.to_account_id, self.user_id, connection)?;
        get_owned_category(self.category_id, self.user_id, connection)?;

        Ok(())
    }

    fn leg(&self, account_id: AccountId, kind: TransactionType) -> TransactionBuilder {
        Transaction::build(
            self.user_id,
            account_id,
            self.category_id,
            self.amount,
            kind,
            self.date,
        )
        .description(self.description)
        .status(self.status)
    }

    fn insert_legs(&self, connection: &Connection) -> Result<(Transaction, Transaction), Error> {
        let from_leg = insert_transaction(
            self.leg(self.from_account_id, TransactionType::Expense),
            connection,
        )?;
        let to_leg = insert_transaction(
            self.leg(self.to_account_id, TransactionType::Income),
            connection,
        )?;

        Ok((from_leg, to_leg))
    }

    /// Overwrite the shared fields of an existing leg, keeping its account and type.
    fn sync_leg(&self, leg: &mut Transaction, connection: &Connection) -> Result<(), Error> {
        leg.category_id = self.category_id;
        leg.amount = self.amount;
        leg.date = self.date;
        leg.description = self.description.to_owned();
        leg.status = self.status;

        write_transaction(leg, connection)
    }

    fn into_transfer(
        self,
        id: TransferId,
        from_transaction_id: TransactionId,
        to_transaction_id: TransactionId,
    ) -> Transfer {
        Transfer {
            id,
            user_id: self.user_id,
            category_id: self.category_id,
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            description: self.description.to_owned(),
            amount: self.amount,
            date: self.date,
            status: self.status,
            from_transaction_id,
            to_transaction_id,
        }
    }
}

/// Create a transfer and its two legs.
///
/// The date is stored at noon in the owner's timezone. On success both
/// accounts are scheduled for reconciliation.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the amount is negative or not finite,
/// - [Error::SameAccountTransfer] if both accounts are the same,
/// - [Error::InvalidAccount] or [Error::InvalidCategory] if either account or
///   the category does not belong to the user,
/// - [Error::MissingTimezone] or [Error::InvalidTimezoneError] if the owner's
///   timezone is not usable,
/// - or [Error::SqlError] if there is some other SQL error.
///
/// Nothing is written if an error is returned.
pub fn create_transfer(
    transfer: NewTransfer,
    connection: &Connection,
    scheduler: &dyn ReconcileScheduler,
) -> Result<TransferLegs, Error> {
    let db_transaction = connection.unchecked_transaction()?;

    let owner = get_user_by_id(transfer.user_id, &db_transaction)?;
    let tz = resolve_timezone(&owner)?;

    let fields = LegFields {
        user_id: transfer.user_id,
        from_account_id: transfer.from_account_id,
        to_account_id: transfer.to_account_id,
        category_id: transfer.category_id,
        amount: transfer.amount,
        date: local_noon(transfer.date, tz),
        description: &transfer.description,
        status: transfer.status,
    };
    fields.validate(&db_transaction)?;

    let (from_leg, to_leg) = fields.insert_legs(&db_transaction)?;
    let mut transfer = fields.into_transfer(0, from_leg.id, to_leg.id);
    transfer.id = insert_transfer_row(&transfer, &db_transaction)?;

    db_transaction.commit()?;

    tracing::info!(
        transfer_id = transfer.id,
        from_account_id = transfer.from_account_id,
        to_account_id = transfer.to_account_id,
        amount = transfer.amount,
        "created transfer"
    );

    scheduler.schedule(PassScope::Account(transfer.from_account_id));
    scheduler.schedule(PassScope::Account(transfer.to_account_id));

    Ok(TransferLegs {
        transfer,
        from_leg,
        to_leg,
    })
}

/// Change a transfer and keep both legs in step.
///
/// If either account changes, the old legs are deleted and new legs are
/// created on the new accounts. Otherwise both legs are updated in place.
/// On success every account touched before or after the change is scheduled
/// for reconciliation.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransfer] if the transfer does not exist or belongs
///   to another user,
/// - [Error::MissingTransferLeg] if one of the legs no longer exists,
/// - any of the validation errors of [create_transfer] for the new values,
/// - or [Error::SqlError] if there is some other SQL error.
///
/// Nothing is written if an error is returned.
pub fn update_transfer(
    transfer_id: TransferId,
    user_id: UserID,
    update: TransferUpdate,
    connection: &Connection,
    scheduler: &dyn ReconcileScheduler,
) -> Result<TransferLegs, Error> {
    let db_transaction = connection.unchecked_transaction()?;

    let current = match get_transfer(transfer_id, &db_transaction) {
        Ok(transfer) if transfer.user_id == user_id => transfer,
        Ok(_) | Err(Error::NotFound) => return Err(Error::UpdateMissingTransfer),
        Err(error) => return Err(error),
    };

    let mut from_leg = get_leg(&current, current.from_transaction_id, &db_transaction)?;
    let mut to_leg = get_leg(&current, current.to_transaction_id, &db_transaction)?;

    let date = match update.date {
        Some(date) => {
            let owner = get_user_by_id(user_id, &db_transaction)?;
            local_noon(date, resolve_timezone(&owner)?)
        }
        None => current.date,
    };
    let description = update.description.unwrap_or_else(|| current.description.clone());

    let fields = LegFields {
        user_id,
        from_account_id: update.from_account_id.unwrap_or(current.from_account_id),
        to_account_id: update.to_account_id.unwrap_or(current.to_account_id),
        category_id: update.category_id.unwrap_or(current.category_id),
        amount: update.amount.unwrap_or(current.amount),
        date,
        description: &description,
        status: update.status.unwrap_or(current.status),
    };
    fields.validate(&db_transaction)?;

    let accounts_changed = fields.from_account_id != current.from_account_id
        || fields.to_account_id != current.to_account_id;

    if accounts_changed {
        let (new_from_leg, new_to_leg) = fields.insert_legs(&db_transaction)?;
        remove_transaction(from_leg.id, &db_transaction)?;
        remove_transaction(to_leg.id, &db_transaction)?;
        from_leg = new_from_leg;
        to_leg = new_to_leg;
    } else {
        fields.sync_leg(&mut from_leg, &db_transaction)?;
        fields.sync_leg(&mut to_leg, &db_transaction)?;
    }

    let transfer = fields.into_transfer(transfer_id, from_leg.id, to_leg.id);
    update_transfer_row(&transfer, &db_transaction)?;

    db_transaction.commit()?;

    tracing::info!(
        transfer_id,
        replaced_legs = accounts_changed,
        "updated transfer"
    );

    let mut affected = vec![
        current.from_account_id,
        current.to_account_id,
        transfer.from_account_id,
        transfer.to_account_id,
    ];
    affected.sort_unstable();
    affected.dedup();

    for account_id in affected {
        scheduler.schedule(PassScope::Account(account_id));
    }

    Ok(TransferLegs {
        transfer,
        from_leg,
        to_leg,
    })
}

/// Delete a transfer and both of its legs.
///
/// On success both accounts are scheduled for reconciliation.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingTransfer] if the transfer does not exist or belongs
///   to another user,
/// - or [Error::SqlError] if there is some SQL error, in which case nothing
///   is deleted.
pub fn delete_transfer(
    transfer_id: TransferId,
    user_id: UserID,
    connection: &Connection,
    scheduler: &dyn ReconcileScheduler,
) -> Result<(), Error> {
    let db_transaction = connection.unchecked_transaction()?;

    let transfer = match get_transfer(transfer_id, &db_transaction) {
        Ok(transfer) if transfer.user_id == user_id => transfer,
        Ok(_) | Err(Error::NotFound) => return Err(Error::DeleteMissingTransfer),
        Err(error) => return Err(error),
    };

    delete_transfer_row(transfer_id, &db_transaction)?;

    for leg_id in [transfer.from_transaction_id, transfer.to_transaction_id] {
        match remove_transaction(leg_id, &db_transaction) {
            Ok(()) => {}
            Err(Error::DeleteMissingTransaction) => tracing::error!(
                transfer_id,
                transaction_id = leg_id,
                "transfer was missing a leg when it was deleted"
            ),
            Err(error) => return Err(error),
        }
    }

    db_transaction.commit()?;

    tracing::info!(transfer_id, "deleted transfer");

    scheduler.schedule(PassScope::Account(transfer.from_account_id));
    scheduler.schedule(PassScope::Account(transfer.to_account_id));

    Ok(())
}

fn get_leg(
    transfer: &Transfer,
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    get_transaction(transaction_id, connection).map_err(|error| match error {
        Error::NotFound => {
            tracing::error!(
                transfer_id = transfer.id,
                transaction_id,
                "transfer leg is missing"
            );
            Error::MissingTransferLeg {
                transfer_id: transfer.id,
                transaction_id,
            }
        }
        error => error,
    })
}
