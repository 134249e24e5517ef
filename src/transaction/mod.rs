//! Ledger entries.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - Database functions for storing, updating and deleting transactions
//! - The ledger queries that the reconcilers read from

mod core;
mod ledger;

pub use core::{
    Transaction, TransactionBuilder, TransactionStatus, TransactionType, create_transaction,
    create_transaction_table, delete_transaction, get_transaction, update_transaction,
};
pub(crate) use core::{insert_transaction, remove_transaction, write_transaction};
pub use ledger::{
    get_transactions_for_account, get_transactions_for_category, get_transactions_for_subscription,
};

#[cfg(test)]
pub use core::count_transactions;
