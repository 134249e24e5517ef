//! Hands reconciliation requests to a background worker.
//!
//! Writers do not wait for the derived figures to catch up. They submit a
//! [PassScope] and a worker task runs the pass later. Requests that pile up
//! while a pass is running are merged, since running the same pass twice in
//! a row gives the same result.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};

use crate::{
    Error,
    reconcile::{PassReport, PassScope, run_pass},
    timezone::Clock,
};

/// Accepts requests to reconcile part of the database.
pub trait ReconcileScheduler: Send + Sync {
    /// Ask for `scope` to be reconciled at some later point.
    ///
    /// Delivery is best effort, a dropped request is repaired by the next
    /// pass over the same entities.
    fn schedule(&self, scope: PassScope);
}

/// The state shared by the reconcile worker.
#[derive(Clone)]
pub struct ReconcileState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The source of "now" for every pass.
    pub clock: Arc<dyn Clock>,
}

/// A handle for submitting requests to a worker started by [spawn_reconcile_worker].
#[derive(Debug, Clone)]
pub struct ReconcileQueue {
    sender: UnboundedSender<PassScope>,
}

impl ReconcileScheduler for ReconcileQueue {
    fn schedule(&self, scope: PassScope) {
        if self.sender.send(scope).is_err() {
            tracing::warn!(?scope, "reconcile worker has stopped, dropping request");
        }
    }
}

/// Start a worker task that runs reconciliation passes for submitted requests.
///
/// The worker stops once every [ReconcileQueue] clone has been dropped and the
/// remaining requests have been handled. Must be called from within a tokio
/// runtime.
pub fn spawn_reconcile_worker(state: ReconcileState) -> (ReconcileQueue, JoinHandle<()>) {
    let (sender, receiver) = unbounded_channel();
    let handle = tokio::spawn(run_worker(state, receiver));

    (ReconcileQueue { sender }, handle)
}

async fn run_worker(state: ReconcileState, mut receiver: UnboundedReceiver<PassScope>) {
    while let Some(first) = receiver.recv().await {
        let mut batch = vec![first];

        while let Ok(scope) = receiver.try_recv() {
            batch.push(scope);
        }

        let scopes = coalesce(batch);
        let state = state.clone();

        // SQLite calls block, keep them off the async worker threads.
        match tokio::task::spawn_blocking(move || run_batch(&state, &scopes)).await {
            Ok(Ok(reports)) => {
                for report in reports.iter().filter(|report| !report.is_success()) {
                    tracing::warn!(
                        scope = ?report.scope,
                        failures = report.failures.len(),
                        "reconciliation pass finished with failures"
                    );
                }
            }
            Ok(Err(error)) => tracing::error!("could not run reconciliation: {error}"),
            Err(error) => tracing::error!("reconciliation task panicked: {error}"),
        }
    }

    tracing::debug!("reconcile queue closed, stopping worker");
}

fn run_batch(state: &ReconcileState, scopes: &[PassScope]) -> Result<Vec<PassReport>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    Ok(scopes
        .iter()
        .map(|scope| run_pass(*scope, &connection, state.clock.as_ref()))
        .collect())
}

/// Drop duplicate scopes, keeping the first occurrence of each.
///
/// A request for everything makes every other request redundant.
fn coalesce(batch: Vec<PassScope>) -> Vec<PassScope> {
    if batch.contains(&PassScope::All) {
        return vec![PassScope::All];
    }

    let mut scopes = Vec::with_capacity(batch.len());

    for scope in batch {
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }

    scopes
}

#[cfg(test)]
mod queue_tests {
    use std::sync::{Arc, Mutex};

    use time::macros::datetime;

    use crate::{
        account::get_account,
        reconcile::{PassScope, ReconcileScheduler},
        test_utils::{fixed_clock, get_test_connection, new_account, new_category, new_user},
        transaction::{Transaction, TransactionType, create_transaction},
        user::UserID,
    };

    use super::{ReconcileState, coalesce, spawn_reconcile_worker};

    #[test]
    fn coalesce_removes_duplicates_in_order() {
        let got = coalesce(vec![
            PassScope::Account(2),
            PassScope::User(UserID::new(1)),
            PassScope::Account(2),
            PassScope::Account(1),
        ]);

        assert_eq!(
            got,
            vec![
                PassScope::Account(2),
                PassScope::User(UserID::new(1)),
                PassScope::Account(1)
            ]
        );
    }

    #[test]
    fn coalesce_all_subsumes_everything() {
        let got = coalesce(vec![
            PassScope::Account(2),
            PassScope::All,
            PassScope::User(UserID::new(1)),
        ]);

        assert_eq!(got, vec![PassScope::All]);
    }

    #[tokio::test]
    async fn worker_reconciles_scheduled_accounts() {
        let conn = get_test_connection();
        let user = new_user(&conn, "Pacific/Auckland");
        let account = new_account(&conn, user.id, "Everyday");
        let category = new_category(&conn, user.id, "Pay");
        create_transaction(
            Transaction::build(
                user.id,
                account.id,
                category.id,
                120.0,
                TransactionType::Income,
                datetime!(2024-03-01 12:00 +13),
            ),
            &conn,
        )
        .unwrap();
        let db_connection = Arc::new(Mutex::new(conn));
        let state = ReconcileState {
            db_connection: db_connection.clone(),
            clock: Arc::new(fixed_clock(datetime!(2024-03-20 09:00 +13))),
        };

        let (queue, handle) = spawn_reconcile_worker(state);
        queue.schedule(PassScope::Account(account.id));
        queue.schedule(PassScope::Account(account.id));
        drop(queue);
        handle.await.unwrap();

        let connection = db_connection.lock().unwrap();
        assert_eq!(get_account(account.id, &connection).unwrap().balance, 120.0);
    }
}
