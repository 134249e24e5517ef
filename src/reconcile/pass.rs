//! Runs every reconciler over a set of entities, isolating failures per entity.

use rusqlite::Connection;
use serde::{Deserialize, Serialize, Serializer};

use crate::{
    Error,
    account::{get_account, get_account_ids, get_accounts_for_user},
    budget::{get_budget_ids, get_budgets_for_user},
    database_id::{AccountId, BudgetId, SubscriptionId},
    reconcile::{AccountReconciliation, BudgetReconciliation, reconcile_account, reconcile_budget},
    subscription::{
        get_subscription_ids, get_subscriptions_for_account, get_subscriptions_for_user,
        materialize,
    },
    timezone::Clock,
    user::UserID,
};

/// The entities a reconciliation pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassScope {
    /// One account, its subscriptions and the budgets of its owner.
    Account(AccountId),
    /// Every account, subscription and budget of one user.
    User(UserID),
    /// Everything in the database.
    All,
}

/// An entity that a pass tried to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRef {
    /// The entities in the scope could not be listed.
    Scope(PassScope),
    /// A subscription being materialized.
    Subscription(SubscriptionId),
    /// An account whose balances were being reconciled.
    Account(AccountId),
    /// A budget whose amount was being reconciled.
    Budget(BudgetId),
}

/// An entity that could not be reconciled and why.
#[derive(Debug, PartialEq, Serialize)]
pub struct PassFailure {
    /// The entity that failed.
    pub entity: EntityRef,
    /// The error that stopped it.
    #[serde(serialize_with = "serialize_error")]
    pub error: Error,
}

fn serialize_error<S: Serializer>(error: &Error, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// The outcome of one reconciliation pass.
#[derive(Debug, PartialEq, Serialize)]
pub struct PassReport {
    /// The scope the pass ran over.
    pub scope: PassScope,
    /// How many ledger entries subscriptions generated.
    pub materialized: usize,
    /// The result for every account that was reconciled.
    pub accounts: Vec<AccountReconciliation>,
    /// The result for every budget that was reconciled.
    pub budgets: Vec<BudgetReconciliation>,
    /// The entities that could not be reconciled.
    pub failures: Vec<PassFailure>,
}

impl PassReport {
    fn new(scope: PassScope) -> Self {
        Self {
            scope,
            materialized: 0,
            accounts: Vec::new(),
            budgets: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Whether every entity in scope was reconciled.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, entity: EntityRef, error: Error) {
        tracing::warn!(?entity, %error, "reconciliation failed");
        self.failures.push(PassFailure { entity, error });
    }
}

/// Bring every derived figure in `scope` up to date.
///
/// Subscriptions are materialized first so that the balance and budget
/// reconcilers see their entries. Each subscription, account and budget is
/// handled on its own: a failure is recorded in the report and the pass moves
/// on to the next entity.
///
/// The materializer opens its own database transactions, so `connection` must
/// not be inside one.
pub fn run_pass(scope: PassScope, connection: &Connection, clock: &dyn Clock) -> PassReport {
    let mut report = PassReport::new(scope);

    match subscriptions_in_scope(scope, connection) {
        Ok(subscription_ids) => {
            for subscription_id in subscription_ids {
                match materialize(subscription_id, connection, clock) {
                    Ok(created) => report.materialized += created.len(),
                    Err(error) => {
                        report.record_failure(EntityRef::Subscription(subscription_id), error)
                    }
                }
            }
        }
        Err(error) => report.record_failure(EntityRef::Scope(scope), error),
    }

    match accounts_in_scope(scope, connection) {
        Ok(account_ids) => {
            for account_id in account_ids {
                match reconcile_account(account_id, connection, clock) {
                    Ok(reconciliation) => report.accounts.push(reconciliation),
                    Err(error) => report.record_failure(EntityRef::Account(account_id), error),
                }
            }
        }
        Err(error) => report.record_failure(EntityRef::Scope(scope), error),
    }

    match budgets_in_scope(scope, connection) {
        Ok(budget_ids) => {
            for budget_id in budget_ids {
                match reconcile_budget(budget_id, connection, clock) {
                    Ok(reconciliation) => report.budgets.push(reconciliation),
                    Err(error) => report.record_failure(EntityRef::Budget(budget_id), error),
                }
            }
        }
        Err(error) => report.record_failure(EntityRef::Scope(scope), error),
    }

    tracing::info!(
        ?scope,
        materialized = report.materialized,
        accounts = report.accounts.len(),
        budgets = report.budgets.len(),
        failures = report.failures.len(),
        "finished reconciliation pass"
    );

    report
}

fn subscriptions_in_scope(
    scope: PassScope,
    connection: &Connection,
) -> Result<Vec<SubscriptionId>, Error> {
    let subscriptions = match scope {
        PassScope::Account(account_id) => get_subscriptions_for_account(account_id, connection)?,
        PassScope::User(user_id) => get_subscriptions_for_user(user_id, connection)?,
        PassScope::All => return get_subscription_ids(connection),
    };

    Ok(subscriptions
        .into_iter()
        .map(|subscription| subscription.id)
        .collect())
}

fn accounts_in_scope(scope: PassScope, connection: &Connection) -> Result<Vec<AccountId>, Error> {
    match scope {
        PassScope::Account(account_id) => Ok(vec![account_id]),
        PassScope::User(user_id) => Ok(get_accounts_for_user(user_id, connection)?
            .into_iter()
            .map(|account| account.id)
            .collect()),
        PassScope::All => get_account_ids(connection),
    }
}

fn budgets_in_scope(scope: PassScope, connection: &Connection) -> Result<Vec<BudgetId>, Error> {
    let user_id = match scope {
        PassScope::Account(account_id) => get_account(account_id, connection)?.user_id,
        PassScope::User(user_id) => user_id,
        PassScope::All => return get_budget_ids(connection),
    };

    Ok(get_budgets_for_user(user_id, connection)?
        .into_iter()
        .map(|budget| budget.id)
        .collect())
}
