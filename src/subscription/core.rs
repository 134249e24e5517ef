//! Defines the subscription model and its database queries.

use rusqlite::{Connection, Row};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    account::get_owned_account,
    category::get_owned_category,
    database_id::{AccountId, CategoryId, SubscriptionId},
    error::validate_amount,
    subscription::Frequency,
    user::UserID,
};

/// A fixed expense that recurs on a schedule, e.g. a phone plan.
///
/// A subscription generates one ledger entry per occurrence, see [crate::materialize].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    /// The ID of the subscription.
    pub id: SubscriptionId,
    /// The user that owns the subscription.
    pub user_id: UserID,
    /// The account that is charged.
    pub account_id: AccountId,
    /// The category of the generated entries.
    pub category_id: CategoryId,
    /// The description of the generated entries.
    pub description: String,
    /// The amount charged per occurrence.
    pub amount: f64,
    /// How often the subscription charges.
    pub frequency: Frequency,
    /// The first occurrence.
    pub start_date: OffsetDateTime,
    /// The last day an occurrence may fall on, if the subscription ends.
    pub end_date: Option<OffsetDateTime>,
}

/// The fields needed to create a [Subscription].
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    /// The user that owns the subscription.
    pub user_id: UserID,
    /// The account that is charged.
    pub account_id: AccountId,
    /// The category of the generated entries.
    pub category_id: CategoryId,
    /// The description of the generated entries.
    pub description: String,
    /// The amount charged per occurrence.
    pub amount: f64,
    /// How often the subscription charges.
    pub frequency: Frequency,
    /// The first occurrence.
    pub start_date: OffsetDateTime,
    /// The last day an occurrence may fall on, if the subscription ends.
    pub end_date: Option<OffsetDateTime>,
}

const SELECT_SUBSCRIPTION: &str = "SELECT id, user_id, account_id, category_id, description,
    amount, frequency, start_date, end_date FROM subscription";

/// Create a subscription.
///
/// No ledger entries are created until the subscription is materialized.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the amount is negative or not finite,
/// - [Error::InvalidDateRange] if the end date is before the start date,
/// - [Error::InvalidAccount] or [Error::InvalidCategory] if the account or
///   category does not belong to the user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_subscription(
    subscription: NewSubscription,
    connection: &Connection,
) -> Result<Subscription, Error> {
    validate_amount(subscription.amount)?;

    if subscription
        .end_date
        .is_some_and(|end_date| end_date < subscription.start_date)
    {
        return Err(Error::InvalidDateRange);
    }

    get_owned_account(subscription.account_id, subscription.user_id, connection)?;
    get_owned_category(subscription.category_id, subscription.user_id, connection)?;

    connection
        .prepare(
            "INSERT INTO subscription
             (user_id, account_id, category_id, description, amount, frequency, start_date,
              end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING id, user_id, account_id, category_id, description, amount, frequency,
              start_date, end_date",
        )?
        .query_row(
            (
                subscription.user_id.as_i64(),
                subscription.account_id,
                subscription.category_id,
                subscription.description,
                subscription.amount,
                subscription.frequency,
                subscription.start_date,
                subscription.end_date,
            ),
            map_subscription_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a subscription by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid subscription,
/// - [Error::UnknownVariant] if the stored frequency is not recognised,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_subscription(
    id: SubscriptionId,
    connection: &Connection,
) -> Result<Subscription, Error> {
    connection
        .prepare(&format!("{SELECT_SUBSCRIPTION} WHERE id = :id"))?
        .query_row(&[(":id", &id)], map_subscription_row)
        .map_err(|error| error.into())
}

/// Retrieve the subscriptions that charge `account_id`.
pub fn get_subscriptions_for_account(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<Subscription>, Error> {
    query_subscriptions("account_id", account_id, connection)
}

/// Retrieve the subscriptions of `user_id`.
pub fn get_subscriptions_for_user(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Subscription>, Error> {
    query_subscriptions("user_id", user_id.as_i64(), connection)
}

/// Retrieve the IDs of every subscription in the database.
pub(crate) fn get_subscription_ids(connection: &Connection) -> Result<Vec<SubscriptionId>, Error> {
    connection
        .prepare("SELECT id FROM subscription ORDER BY id ASC")?
        .query_map([], |row| row.get(0))?
        .map(|maybe_id| maybe_id.map_err(|error| error.into()))
        .collect()
}

fn query_subscriptions(
    column: &'static str,
    id: i64,
    connection: &Connection,
) -> Result<Vec<Subscription>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_SUBSCRIPTION} WHERE {column} = :id ORDER BY id ASC"
        ))?
        .query_map(&[(":id", &id)], map_subscription_row)?
        .map(|maybe_subscription| maybe_subscription.map_err(|error| error.into()))
        .collect()
}

/// Delete a subscription and every ledger entry it generated.
///
/// # Errors
/// Returns [Error::DeleteMissingSubscription] if the subscription does not exist.
pub fn delete_subscription(id: SubscriptionId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM subscription WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingSubscription);
    }

    Ok(())
}

pub fn create_subscription_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS subscription (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL CHECK (amount >= 0),
            frequency TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_subscription_account ON subscription(account_id);
        CREATE INDEX IF NOT EXISTS idx_subscription_user ON subscription(user_id);",
    )?;

    Ok(())
}

fn map_subscription_row(row: &Row) -> Result<Subscription, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = UserID::new(row.get(1)?);
    let account_id = row.get(2)?;
    let category_id = row.get(3)?;
    let description = row.get(4)?;
    let amount = row.get(5)?;
    let frequency = row.get(6)?;
    let start_date = row.get(7)?;
    let end_date = row.get(8)?;

    Ok(Subscription {
        id,
        user_id,
        account_id,
        category_id,
        description,
        amount,
        frequency,
        start_date,
        end_date,
    })
}

#[cfg(test)]
mod subscription_tests {
    use time::macros::datetime;

    use crate::{
        Error,
        subscription::Frequency,
        test_utils::{get_test_connection, new_account, new_category, new_user},
    };

    use super::{
        NewSubscription, create_subscription, delete_subscription, get_subscription,
        get_subscriptions_for_account, get_subscriptions_for_user,
    };

    #[test]
    fn create_and_get_subscription() {
        let conn = get_test_connection();
        let user = new_user(&conn, "Pacific/Auckland");
        let account = new_account(&conn, user.id, "Everyday");
        let category = new_category(&conn, user.id, "Phone");

        let subscription = create_subscription(
            NewSubscription {
                user_id: user.id,
                account_id: account.id,
                category_id: category.id,
                description: "Phone plan".to_owned(),
                amount: 30.0,
                frequency: Frequency::Monthly,
                start_date: datetime!(2024-01-15 12:00 +13),
                end_date: None,
            },
            &conn,
        )
        .unwrap();

        assert_eq!(get_subscription(subscription.id, &conn), Ok(subscription.clone()));
        assert_eq!(
            get_subscriptions_for_account(account.id, &conn),
            Ok(vec![subscription.clone()])
        );
        assert_eq!(get_subscriptions_for_user(user.id, &conn), Ok(vec![subscription]));
    }

    #[test]
    fn create_fails_when_end_precedes_start() {
        let conn = get_test_connection();
        let user = new_user(&conn, "Pacific/Auckland");
        let account = new_account(&conn, user.id, "Everyday");
        let category = new_category(&conn, user.id, "Phone");

        let result = create_subscription(
            NewSubscription {
                user_id: user.id,
                account_id: account.id,
                category_id: category.id,
                description: String::new(),
                amount: 30.0,
                frequency: Frequency::Monthly,
                start_date: datetime!(2024-01-15 12:00 +13),
                end_date: Some(datetime!(2023-12-15 12:00 +13)),
            },
            &conn,
        );

        assert_eq!(result, Err(Error::InvalidDateRange));
    }

    #[test]
    fn unknown_frequency_is_not_defaulted() {
        let conn = get_test_connection();
        let user = new_user(&conn, "Pacific/Auckland");
        let account = new_account(&conn, user.id, "Everyday");
        let category = new_category(&conn, user.id, "Phone");
        let subscription = create_subscription(
            NewSubscription {
                user_id: user.id,
                account_id: account.id,
                category_id: category.id,
                description: String::new(),
                amount: 30.0,
                frequency: Frequency::Weekly,
                start_date: datetime!(2024-01-15 12:00 +13),
                end_date: None,
            },
            &conn,
        )
        .unwrap();
        conn.execute(
            "UPDATE subscription SET frequency = 'QUARTERLY' WHERE id = ?1",
            [subscription.id],
        )
        .unwrap();

        assert_eq!(
            get_subscription(subscription.id, &conn),
            Err(Error::UnknownVariant("unknown frequency \"QUARTERLY\"".to_owned()))
        );
    }

    #[test]
    fn delete_fails_on_missing_subscription() {
        let conn = get_test_connection();

        assert_eq!(delete_subscription(9, &conn), Err(Error::DeleteMissingSubscription));
    }
}
