//! Recurring subscriptions and the lazy creation of their ledger entries.

mod core;
mod frequency;
mod materialize;

pub use core::{
    NewSubscription, Subscription, create_subscription, create_subscription_table,
    delete_subscription, get_subscription, get_subscriptions_for_account,
    get_subscriptions_for_user,
};
pub(crate) use core::get_subscription_ids;
pub use frequency::Frequency;
pub use materialize::materialize;
