//! Transfers between two accounts of the same user.
//!
//! A transfer is stored as a transfer row plus two ledger entries, its legs.
//! The legs are only ever written through the functions in this module.

mod coordinator;
mod core;

pub use coordinator::{create_transfer, delete_transfer, update_transfer};
pub use core::{
    NewTransfer, Transfer, TransferLegs, TransferUpdate, create_transfer_table, get_transfer,
    get_transfers_for_user,
};
