//! Recomputes an account's cached balances from its ledger entries.

use rusqlite::Connection;
use serde::Serialize;

use crate::{
    Error,
    account::{get_account, update_account_balances},
    database_id::AccountId,
    reconcile::approx_eq,
    timezone::{Clock, local_date, local_now, resolve_timezone},
    transaction::{TransactionStatus, get_transactions_for_account},
    user::get_user_by_id,
};

/// The cached balances of an account before and after a reconciliation wrote them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalanceAudit {
    /// The stored balance before the write.
    pub balance_before: f64,
    /// The stored pending balance before the write.
    pub pending_balance_before: f64,
    /// The balance that was written.
    pub balance_after: f64,
    /// The pending balance that was written.
    pub pending_balance_after: f64,
}

/// The result of reconciling one account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccountReconciliation {
    /// The account that was reconciled.
    pub account_id: AccountId,
    /// The recomputed cleared balance.
    pub balance: f64,
    /// The recomputed balance including pending entries.
    pub pending_balance: f64,
    /// Whether the stored balances differed and were overwritten.
    pub changed: bool,
    /// The before and after values, present when `changed` is true.
    pub audit: Option<BalanceAudit>,
}

/// Recompute the balances of an account from scratch and store them if they changed.
///
/// Entries dated after the owner's local today are ignored. Cleared entries
/// count towards both balances, pending entries only towards the pending
/// balance and cancelled entries towards neither.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the account does not exist,
/// - [Error::MissingTimezone] or [Error::InvalidTimezoneError] if the owner's
///   timezone is not usable,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn reconcile_account(
    account_id: AccountId,
    connection: &Connection,
    clock: &dyn Clock,
) -> Result<AccountReconciliation, Error> {
    let account = get_account(account_id, connection)?;
    let owner = get_user_by_id(account.user_id, connection)?;
    let tz = resolve_timezone(&owner)?;
    let today = local_now(clock, tz).date();

    let mut balance = 0.0;
    let mut pending_balance = 0.0;

    for transaction in get_transactions_for_account(account_id, connection)? {
        if local_date(transaction.date, tz) > today {
            continue;
        }

        let signed_amount = transaction.kind.balance_sign() * transaction.amount;

        match transaction.status {
            TransactionStatus::Cleared => {
                balance += signed_amount;
                pending_balance += signed_amount;
            }
            TransactionStatus::Pending => pending_balance += signed_amount,
            TransactionStatus::Cancelled => {}
        }
    }

    if approx_eq(balance, account.balance) && approx_eq(pending_balance, account.pending_balance)
    {
        tracing::debug!(account_id, balance, pending_balance, "account balance is up to date");

        return Ok(AccountReconciliation {
            account_id,
            balance,
            pending_balance,
            changed: false,
            audit: None,
        });
    }

    update_account_balances(account_id, balance, pending_balance, connection)?;

    let audit = BalanceAudit {
        balance_before: account.balance,
        pending_balance_before: account.pending_balance,
        balance_after: balance,
        pending_balance_after: pending_balance,
    };

    tracing::info!(
        account_id,
        balance_before = audit.balance_before,
        balance_after = audit.balance_after,
        pending_balance_before = audit.pending_balance_before,
        pending_balance_after = audit.pending_balance_after,
        "updated account balance"
    );

    Ok(AccountReconciliation {
        account_id,
        balance,
        pending_balance,
        changed: true,
        audit: Some(audit),
    })
}

#[cfg(test)]
mod balance_tests {
    use time::macros::{date, datetime};

    use crate::{
        Error,
        account::get_account,
        test_utils::{fixed_clock, get_test_connection, new_account, new_category, new_user},
        timezone::{get_timezone, local_noon},
        transaction::{
            Transaction, TransactionStatus, TransactionType, create_transaction,
            update_transaction,
        },
        user::create_user,
    };

    use super::{BalanceAudit, reconcile_account};

    const TZ: &str = "Pacific/Auckland";

    struct Fixture {
        conn: rusqlite::Connection,
        user_id: crate::user::UserID,
        account_id: i64,
        category_id: i64,
    }

    fn fixture() -> Fixture {
        let conn = get_test_connection();
        let user = new_user(&conn, TZ);
        let account = new_account(&conn, user.id, "Everyday");
        let category = new_category(&conn, user.id, "Food");

        Fixture {
            conn,
            user_id: user.id,
            account_id: account.id,
            category_id: category.id,
        }
    }

    fn add(
        fixture: &Fixture,
        amount: f64,
        kind: TransactionType,
        status: TransactionStatus,
        date: time::Date,
    ) -> Transaction {
        let tz = get_timezone(TZ).unwrap();

        create_transaction(
            Transaction::build(
                fixture.user_id,
                fixture.account_id,
                fixture.category_id,
                amount,
                kind,
                local_noon(date, tz),
            )
            .status(status),
            &fixture.conn,
        )
        .unwrap()
    }

    #[test]
    fn income_adds_and_expense_subtracts() {
        let fixture = fixture();
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));
        add(
            &fixture,
            100.0,
            TransactionType::Income,
            TransactionStatus::Cleared,
            date!(2024 - 03 - 01),
        );
        add(
            &fixture,
            40.0,
            TransactionType::Expense,
            TransactionStatus::Cleared,
            date!(2024 - 03 - 20),
        );

        let got = reconcile_account(fixture.account_id, &fixture.conn, &clock).unwrap();

        assert_eq!(got.balance, 60.0);
        assert_eq!(got.pending_balance, 60.0);
        assert!(got.changed);
        assert_eq!(
            got.audit,
            Some(BalanceAudit {
                balance_before: 0.0,
                pending_balance_before: 0.0,
                balance_after: 60.0,
                pending_balance_after: 60.0,
            })
        );
        let stored = get_account(fixture.account_id, &fixture.conn).unwrap();
        assert_eq!(stored.balance, 60.0);
        assert_eq!(stored.pending_balance, 60.0);
    }

    #[test]
    fn second_run_changes_nothing() {
        let fixture = fixture();
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));
        add(
            &fixture,
            0.1,
            TransactionType::Income,
            TransactionStatus::Cleared,
            date!(2024 - 03 - 01),
        );
        add(
            &fixture,
            0.2,
            TransactionType::Income,
            TransactionStatus::Cleared,
            date!(2024 - 03 - 02),
        );

        let first = reconcile_account(fixture.account_id, &fixture.conn, &clock).unwrap();
        let second = reconcile_account(fixture.account_id, &fixture.conn, &clock).unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(second.audit, None);
        assert_eq!(first.balance, second.balance);
        assert_eq!(first.pending_balance, second.pending_balance);
    }

    #[test]
    fn future_entries_are_excluded() {
        let fixture = fixture();
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));
        add(
            &fixture,
            100.0,
            TransactionType::Income,
            TransactionStatus::Cleared,
            date!(2024 - 03 - 21),
        );
        add(
            &fixture,
            5.0,
            TransactionType::Income,
            TransactionStatus::Pending,
            date!(2024 - 03 - 21),
        );

        let got = reconcile_account(fixture.account_id, &fixture.conn, &clock).unwrap();

        assert_eq!(got.balance, 0.0);
        assert_eq!(got.pending_balance, 0.0);
        assert!(!got.changed);
    }

    #[test]
    fn entry_later_today_is_included() {
        let fixture = fixture();
        // 08:00 local, the entry is stored at noon the same day.
        let clock = fixed_clock(datetime!(2024-03-20 08:00 +13));
        add(
            &fixture,
            10.0,
            TransactionType::Income,
            TransactionStatus::Cleared,
            date!(2024 - 03 - 20),
        );

        let got = reconcile_account(fixture.account_id, &fixture.conn, &clock).unwrap();

        assert_eq!(got.balance, 10.0);
    }

    #[test]
    fn today_is_the_owners_local_day() {
        let fixture = fixture();
        // Still the 19th in UTC, already the 20th in Auckland.
        let clock = fixed_clock(datetime!(2024-03-19 20:00 UTC));
        add(
            &fixture,
            10.0,
            TransactionType::Income,
            TransactionStatus::Cleared,
            date!(2024 - 03 - 20),
        );

        let got = reconcile_account(fixture.account_id, &fixture.conn, &clock).unwrap();

        assert_eq!(got.balance, 10.0);
    }

    #[test]
    fn pending_only_affects_pending_balance() {
        let fixture = fixture();
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));
        add(
            &fixture,
            100.0,
            TransactionType::Income,
            TransactionStatus::Cleared,
            date!(2024 - 03 - 01),
        );
        add(
            &fixture,
            20.0,
            TransactionType::Expense,
            TransactionStatus::Pending,
            date!(2024 - 03 - 20),
        );

        let got = reconcile_account(fixture.account_id, &fixture.conn, &clock).unwrap();

        assert_eq!(got.balance, 100.0);
        assert_eq!(got.pending_balance, 80.0);
    }

    #[test]
    fn cancelled_counts_for_nothing() {
        let fixture = fixture();
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));
        add(
            &fixture,
            100.0,
            TransactionType::Income,
            TransactionStatus::Cleared,
            date!(2024 - 03 - 01),
        );
        add(
            &fixture,
            20.0,
            TransactionType::Expense,
            TransactionStatus::Cancelled,
            date!(2024 - 03 - 02),
        );

        let got = reconcile_account(fixture.account_id, &fixture.conn, &clock).unwrap();

        assert_eq!(got.balance, 100.0);
        assert_eq!(got.pending_balance, 100.0);
    }

    #[test]
    fn corrects_drifted_cache() {
        let fixture = fixture();
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));
        let mut entry = add(
            &fixture,
            50.0,
            TransactionType::Expense,
            TransactionStatus::Cleared,
            date!(2024 - 03 - 01),
        );
        reconcile_account(fixture.account_id, &fixture.conn, &clock).unwrap();
        entry.amount = 45.0;
        update_transaction(&entry, &fixture.conn).unwrap();

        let got = reconcile_account(fixture.account_id, &fixture.conn, &clock).unwrap();

        assert!(got.changed);
        assert_eq!(got.audit.map(|audit| audit.balance_before), Some(-50.0));
        assert_eq!(got.balance, -45.0);
    }

    #[test]
    fn missing_timezone_is_reported() {
        let conn = get_test_connection();
        let user = create_user(None, &conn).unwrap();
        let account = new_account(&conn, user.id, "Everyday");
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));

        assert_eq!(
            reconcile_account(account.id, &conn, &clock),
            Err(Error::MissingTimezone(user.id))
        );
    }

    #[test]
    fn missing_account_is_reported() {
        let conn = get_test_connection();
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));

        assert_eq!(reconcile_account(42, &conn, &clock), Err(Error::NotFound));
    }
}
