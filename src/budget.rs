//! Budgets and their cached spend.

use rusqlite::{Connection, Row};
use serde::Serialize;
use time::Date;

use crate::{
    Error,
    category::get_owned_category,
    database_id::{BudgetId, CategoryId},
    error::validate_amount,
    user::UserID,
};

/// A spending target for one category.
///
/// `amount` is a cache of the current month's spend, only the reconciler
/// writes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Budget {
    /// The ID of the budget.
    pub id: BudgetId,
    /// The user that owns the budget.
    pub user_id: UserID,
    /// The category whose spend is tracked.
    pub category_id: CategoryId,
    /// A text description of the budget.
    pub description: String,
    /// The most the user wants to spend.
    pub goal: f64,
    /// How much has been spent in the current period.
    pub amount: f64,
    /// The first day the budget applies to.
    pub start_date: Option<Date>,
    /// The last day the budget applies to.
    pub end_date: Option<Date>,
}

/// The fields needed to create a [Budget].
#[derive(Debug, Clone, PartialEq)]
pub struct NewBudget {
    /// The user that owns the budget.
    pub user_id: UserID,
    /// The category whose spend is tracked.
    pub category_id: CategoryId,
    /// A text description of the budget.
    pub description: String,
    /// The most the user wants to spend.
    pub goal: f64,
    /// The first day the budget applies to.
    pub start_date: Option<Date>,
    /// The last day the budget applies to.
    pub end_date: Option<Date>,
}

const SELECT_BUDGET: &str =
    "SELECT id, user_id, category_id, description, goal, amount, start_date, end_date FROM budget";

/// Create a budget with zero spend.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the goal is negative or not finite,
/// - [Error::InvalidDateRange] if the end date is before the start date,
/// - [Error::InvalidCategory] if the category does not belong to the user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_budget(budget: NewBudget, connection: &Connection) -> Result<Budget, Error> {
    validate_amount(budget.goal)?;

    if let (Some(start), Some(end)) = (budget.start_date, budget.end_date)
        && end < start
    {
        return Err(Error::InvalidDateRange);
    }

    get_owned_category(budget.category_id, budget.user_id, connection)?;

    connection
        .prepare(
            "INSERT INTO budget (user_id, category_id, description, goal, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id, user_id, category_id, description, goal, amount, start_date, end_date",
        )?
        .query_row(
            (
                budget.user_id.as_i64(),
                budget.category_id,
                budget.description,
                budget.goal,
                budget.start_date,
                budget.end_date,
            ),
            map_budget_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a budget by its `id`.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to a valid budget.
pub fn get_budget(id: BudgetId, connection: &Connection) -> Result<Budget, Error> {
    connection
        .prepare(&format!("{SELECT_BUDGET} WHERE id = :id"))?
        .query_row(&[(":id", &id)], map_budget_row)
        .map_err(|error| error.into())
}

/// Retrieve the budgets of `user_id`.
pub fn get_budgets_for_user(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Budget>, Error> {
    connection
        .prepare(&format!("{SELECT_BUDGET} WHERE user_id = :user_id ORDER BY id ASC"))?
        .query_map(&[(":user_id", &user_id.as_i64())], map_budget_row)?
        .map(|maybe_budget| maybe_budget.map_err(|error| error.into()))
        .collect()
}

/// Retrieve the IDs of every budget in the database.
pub fn get_budget_ids(connection: &Connection) -> Result<Vec<BudgetId>, Error> {
    connection
        .prepare("SELECT id FROM budget ORDER BY id ASC")?
        .query_map([], |row| row.get(0))?
        .map(|maybe_id| maybe_id.map_err(|error| error.into()))
        .collect()
}

/// Overwrite the cached spend of a budget.
///
/// # Errors
/// Returns [Error::NotFound] if the budget does not exist.
pub fn update_budget_amount(
    id: BudgetId,
    amount: f64,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected =
        connection.execute("UPDATE budget SET amount = ?1 WHERE id = ?2", (amount, id))?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

pub fn create_budget_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS budget (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            goal REAL NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            start_date TEXT,
            end_date TEXT,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_budget_user ON budget(user_id);",
    )?;

    Ok(())
}

fn map_budget_row(row: &Row) -> Result<Budget, rusqlite::Error> {
    Ok(Budget {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        category_id: row.get(2)?,
        description: row.get(3)?,
        goal: row.get(4)?,
        amount: row.get(5)?,
        start_date: row.get(6)?,
        end_date: row.get(7)?,
    })
}
