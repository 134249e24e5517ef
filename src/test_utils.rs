//! Fixtures shared by the unit tests.

use std::sync::Mutex;

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{
    account::{Account, AccountType, NewAccount, create_account},
    category::{Category, create_category},
    db::initialize,
    reconcile::{PassScope, ReconcileScheduler},
    timezone::FixedClock,
    user::{User, UserID, create_user},
};

/// An initialized in-memory database.
pub fn get_test_connection() -> Connection {
    let connection =
        Connection::open_in_memory().expect("Could not open in-memory SQLite database");
    initialize(&connection).expect("Could not initialize database");
    connection
}

/// A user in the timezone `timezone`.
pub fn new_user(connection: &Connection, timezone: &str) -> User {
    create_user(Some(timezone), connection).expect("Could not create user")
}

/// A checking account without a credit limit.
pub fn new_account(connection: &Connection, user_id: UserID, name: &str) -> Account {
    create_account(
        NewAccount {
            user_id,
            name: name.to_owned(),
            kind: AccountType::Checking,
            credit_limit: None,
        },
        connection,
    )
    .expect("Could not create account")
}

pub fn new_category(connection: &Connection, user_id: UserID, title: &str) -> Category {
    create_category(user_id, title, "", connection).expect("Could not create category")
}

pub fn fixed_clock(now: OffsetDateTime) -> FixedClock {
    FixedClock(now)
}

/// A [ReconcileScheduler] that remembers what was scheduled.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    scopes: Mutex<Vec<PassScope>>,
}

impl RecordingScheduler {
    /// The scopes scheduled so far, in order.
    pub fn scopes(&self) -> Vec<PassScope> {
        self.scopes.lock().expect("Could not lock scopes").clone()
    }
}

impl ReconcileScheduler for RecordingScheduler {
    fn schedule(&self, scope: PassScope) {
        self.scopes.lock().expect("Could not lock scopes").push(scope);
    }
}
