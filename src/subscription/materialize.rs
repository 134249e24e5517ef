//! Creates the ledger entries implied by a subscription's schedule.

use std::collections::HashSet;

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use time::Date;

use crate::{
    Error,
    database_id::{SubscriptionId, TransactionId},
    subscription::get_subscription,
    timezone::{Clock, local_date, local_noon, local_now, resolve_timezone},
    transaction::{
        Transaction, TransactionStatus, TransactionType, get_transactions_for_subscription,
        insert_transaction,
    },
    user::get_user_by_id,
};

/// Create the missing ledger entries of a subscription up to today.
///
/// Walks the schedule from the start date up to and including the earlier of
/// the end date and the owner's local today. An occurrence is created as a
/// cleared expense at local noon unless an entry for the subscription already
/// exists on that local date. Existing entries are never changed or removed,
/// so calling this repeatedly or concurrently creates each entry once.
///
/// Opens its own database transaction, so `connection` must not be inside one.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the subscription or its owner does not exist,
/// - [Error::MissingTimezone] or [Error::InvalidTimezoneError] if the owner's
///   timezone is not usable,
/// - or [Error::SqlError] if there is some other SQL error, in which case no
///   entries are created.
pub fn materialize(
    subscription_id: SubscriptionId,
    connection: &Connection,
    clock: &dyn Clock,
) -> Result<Vec<TransactionId>, Error> {
    // Take the write lock before reading which entries exist so that
    // overlapping runs cannot both create the same occurrence.
    let db_transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let subscription = get_subscription(subscription_id, &db_transaction)?;
    let owner = get_user_by_id(subscription.user_id, &db_transaction)?;
    let tz = resolve_timezone(&owner)?;

    let start = local_date(subscription.start_date, tz);
    let today = local_now(clock, tz).date();
    let last = match subscription.end_date {
        Some(end_date) => local_date(end_date, tz).min(today),
        None => today,
    };

    let existing: HashSet<Date> =
        get_transactions_for_subscription(subscription_id, &db_transaction)?
            .into_iter()
            .map(|transaction| local_date(transaction.date, tz))
            .collect();

    let mut created = Vec::new();

    for n in 0.. {
        let Some(date) = subscription.frequency.occurrence(start, n) else {
            break;
        };

        if date > last {
            break;
        }

        if existing.contains(&date) {
            continue;
        }

        let transaction = insert_transaction(
            Transaction::build(
                subscription.user_id,
                subscription.account_id,
                subscription.category_id,
                subscription.amount,
                TransactionType::Expense,
                local_noon(date, tz),
            )
            .description(&subscription.description)
            .status(TransactionStatus::Cleared)
            .subscription_id(Some(subscription_id)),
            &db_transaction,
        )?;

        created.push(transaction.id);
    }

    db_transaction.commit()?;

    if created.is_empty() {
        tracing::debug!(subscription_id, "subscription is up to date");
    } else {
        tracing::info!(
            subscription_id,
            created = created.len(),
            "materialized subscription entries"
        );
    }

    Ok(created)
}

#[cfg(test)]
mod materialize_tests {
    use std::{collections::HashSet, time::Duration};

    use time::macros::{date, datetime};

    use crate::{
        Error,
        db::initialize,
        subscription::{Frequency, NewSubscription, create_subscription, delete_subscription},
        test_utils::{fixed_clock, get_test_connection, new_account, new_category, new_user},
        timezone::{get_timezone, local_date, local_noon},
        transaction::{
            TransactionStatus, TransactionType, count_transactions,
            get_transactions_for_subscription,
        },
        user::create_user,
    };

    use super::materialize;

    const TZ: &str = "Pacific/Auckland";

    fn monthly_subscription(
        conn: &rusqlite::Connection,
        user_id: crate::user::UserID,
        start: time::Date,
        end: Option<time::Date>,
    ) -> crate::subscription::Subscription {
        let tz = get_timezone(TZ).unwrap();
        let account = new_account(conn, user_id, "Everyday");
        let category = new_category(conn, user_id, "Phone");

        create_subscription(
            NewSubscription {
                user_id,
                account_id: account.id,
                category_id: category.id,
                description: "Phone plan".to_owned(),
                amount: 30.0,
                frequency: Frequency::Monthly,
                start_date: local_noon(start, tz),
                end_date: end.map(|end| local_noon(end, tz)),
            },
            conn,
        )
        .unwrap()
    }

    #[test]
    fn monthly_creates_one_entry_per_month_up_to_today() {
        let conn = get_test_connection();
        let user = new_user(&conn, TZ);
        let subscription = monthly_subscription(&conn, user.id, date!(2024 - 01 - 15), None);
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));

        let created = materialize(subscription.id, &conn, &clock).unwrap();

        let tz = get_timezone(TZ).unwrap();
        let entries = get_transactions_for_subscription(subscription.id, &conn).unwrap();
        let dates: Vec<_> = entries.iter().map(|entry| local_date(entry.date, tz)).collect();
        assert_eq!(created.len(), 3);
        assert_eq!(
            dates,
            vec![date!(2024 - 01 - 15), date!(2024 - 02 - 15), date!(2024 - 03 - 15)]
        );
        for entry in &entries {
            assert_eq!(entry.amount, 30.0);
            assert_eq!(entry.kind, TransactionType::Expense);
            assert_eq!(entry.status, TransactionStatus::Cleared);
            assert_eq!(entry.account_id, subscription.account_id);
            assert_eq!(entry.category_id, subscription.category_id);
            assert_eq!(entry.description, "Phone plan");
        }
    }

    #[test]
    fn second_run_creates_nothing() {
        let conn = get_test_connection();
        let user = new_user(&conn, TZ);
        let subscription = monthly_subscription(&conn, user.id, date!(2024 - 01 - 15), None);
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));

        let first = materialize(subscription.id, &conn, &clock).unwrap();
        let second = materialize(subscription.id, &conn, &clock).unwrap();

        assert_eq!(first.len(), 3);
        assert!(second.is_empty());
        assert_eq!(count_transactions(&conn), Ok(3));
    }

    #[test]
    fn includes_occurrence_on_today_and_end_date() {
        let conn = get_test_connection();
        let user = new_user(&conn, TZ);
        let subscription = monthly_subscription(
            &conn,
            user.id,
            date!(2024 - 01 - 15),
            Some(date!(2024 - 02 - 15)),
        );
        let clock = fixed_clock(datetime!(2024-06-01 09:00 +12));

        let created = materialize(subscription.id, &conn, &clock).unwrap();

        assert_eq!(created.len(), 2);
    }

    #[test]
    fn uses_local_today_not_utc() {
        let conn = get_test_connection();
        let user = new_user(&conn, TZ);
        let subscription = monthly_subscription(&conn, user.id, date!(2024 - 01 - 15), None);
        // Still the 14th in UTC, already the 15th in Auckland.
        let clock = fixed_clock(datetime!(2024-02-14 20:00 UTC));

        let created = materialize(subscription.id, &conn, &clock).unwrap();

        assert_eq!(created.len(), 2);
    }

    #[test]
    fn future_start_creates_nothing() {
        let conn = get_test_connection();
        let user = new_user(&conn, TZ);
        let subscription = monthly_subscription(&conn, user.id, date!(2024 - 05 - 01), None);
        let clock = fixed_clock(datetime!(2024-04-30 12:00 +12));

        assert_eq!(materialize(subscription.id, &conn, &clock), Ok(vec![]));
    }

    #[test]
    fn fills_gap_left_by_deleted_entry() {
        let conn = get_test_connection();
        let user = new_user(&conn, TZ);
        let subscription = monthly_subscription(&conn, user.id, date!(2024 - 01 - 15), None);
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));
        let created = materialize(subscription.id, &conn, &clock).unwrap();
        crate::transaction::delete_transaction(created[1], &conn).unwrap();

        let refilled = materialize(subscription.id, &conn, &clock).unwrap();

        assert_eq!(refilled.len(), 1);
        assert_eq!(count_transactions(&conn), Ok(3));
    }

    #[test]
    fn fails_without_timezone() {
        let conn = get_test_connection();
        let user = create_user(None, &conn).unwrap();
        let subscription = monthly_subscription(&conn, user.id, date!(2024 - 01 - 15), None);
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));

        assert_eq!(
            materialize(subscription.id, &conn, &clock),
            Err(Error::MissingTimezone(user.id))
        );
        assert_eq!(count_transactions(&conn), Ok(0));
    }

    #[test]
    fn fails_on_missing_subscription() {
        let conn = get_test_connection();
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));

        assert_eq!(materialize(1, &conn, &clock), Err(Error::NotFound));
    }

    #[test]
    fn deleting_subscription_deletes_its_entries() {
        let conn = get_test_connection();
        let user = new_user(&conn, TZ);
        let subscription = monthly_subscription(&conn, user.id, date!(2024 - 01 - 15), None);
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));
        materialize(subscription.id, &conn, &clock).unwrap();

        delete_subscription(subscription.id, &conn).unwrap();

        assert_eq!(count_transactions(&conn), Ok(0));
    }

    #[test]
    fn concurrent_runs_create_each_entry_once() {
        let path = std::env::temp_dir().join(format!(
            "budget_ledger_concurrent_materialize_{}.db",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let conn = rusqlite::Connection::open(&path).unwrap();
        initialize(&conn).unwrap();
        let tz = get_timezone(TZ).unwrap();
        let user = new_user(&conn, TZ);
        let account = new_account(&conn, user.id, "Everyday");
        let category = new_category(&conn, user.id, "Coffee");
        let subscription = create_subscription(
            NewSubscription {
                user_id: user.id,
                account_id: account.id,
                category_id: category.id,
                description: "Flat white".to_owned(),
                amount: 5.5,
                frequency: Frequency::Daily,
                start_date: local_noon(date!(2024 - 01 - 01), tz),
                end_date: Some(local_noon(date!(2024 - 03 - 20), tz)),
            },
            &conn,
        )
        .unwrap();
        let clock = fixed_clock(datetime!(2024-03-20 09:00 +13));

        let created: Vec<usize> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let conn = rusqlite::Connection::open(&path).unwrap();
                        conn.busy_timeout(Duration::from_secs(10)).unwrap();
                        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
                        materialize(subscription.id, &conn, &clock).unwrap().len()
                    })
                })
                .collect();

            workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .collect()
        });

        let entries = get_transactions_for_subscription(subscription.id, &conn).unwrap();
        let dates: HashSet<_> = entries.iter().map(|entry| local_date(entry.date, tz)).collect();
        drop(conn);
        let _ = std::fs::remove_file(&path);

        assert_eq!(created.iter().sum::<usize>(), 80, "got {created:?}");
        assert_eq!(entries.len(), 80);
        assert_eq!(dates.len(), 80);
    }
}
