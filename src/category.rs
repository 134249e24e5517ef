//! Categories group ledger entries and are the unit that budgets track.

use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::{Error, database_id::CategoryId, user::UserID};

/// A label for ledger entries, e.g. "Groceries".
///
/// Archived categories stay valid for existing entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    /// The ID of the category.
    pub id: CategoryId,
    /// The user that owns the category.
    pub user_id: UserID,
    /// The name of the category.
    pub title: String,
    /// A longer description of what belongs in the category.
    pub description: String,
    /// Whether the category is hidden from new entries.
    pub archived: bool,
}

/// Create a category and return it with its generated ID.
pub fn create_category(
    user_id: UserID,
    title: &str,
    description: &str,
    connection: &Connection,
) -> Result<Category, Error> {
    connection.execute(
        "INSERT INTO category (user_id, title, description) VALUES (?1, ?2, ?3);",
        (user_id.as_i64(), title, description),
    )?;

    let id = connection.last_insert_rowid();

    Ok(Category {
        id,
        user_id,
        title: title.to_owned(),
        description: description.to_owned(),
        archived: false,
    })
}

/// Retrieve a single category by ID.
pub fn get_category(category_id: CategoryId, connection: &Connection) -> Result<Category, Error> {
    connection
        .prepare(
            "SELECT id, user_id, title, description, archived FROM category WHERE id = :id;",
        )?
        .query_row(&[(":id", &category_id)], map_row)
        .map_err(|error| error.into())
}

/// Retrieve a category only if it belongs to `user_id`.
///
/// # Errors
/// Returns [Error::InvalidCategory] if the category does not exist or belongs
/// to another user.
pub(crate) fn get_owned_category(
    category_id: CategoryId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Category, Error> {
    match get_category(category_id, connection) {
        Ok(category) if category.user_id == user_id => Ok(category),
        Ok(_) | Err(Error::NotFound) => Err(Error::InvalidCategory(category_id)),
        Err(error) => Err(error),
    }
}

/// Retrieve the categories of `user_id` ordered alphabetically by title.
pub fn get_categories_for_user(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Category>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, title, description, archived FROM category
             WHERE user_id = :user_id ORDER BY title ASC;",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_row)?
        .map(|maybe_category| maybe_category.map_err(|error| error.into()))
        .collect()
}

/// Archive or restore a category. Returns an error if the category doesn't exist.
pub fn set_archived(
    category_id: CategoryId,
    archived: bool,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE category SET archived = ?1 WHERE id = ?2",
        (archived, category_id),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Initialize the category table and indexes.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS category (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            archived INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_category_user ON category(user_id);",
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<Category, rusqlite::Error> {
    Ok(Category {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        archived: row.get(4)?,
    })
}

#[cfg(test)]
mod category_tests {
    use crate::{
        Error,
        test_utils::{get_test_connection, new_user},
    };

    use super::{
        create_category, get_categories_for_user, get_category, get_owned_category, set_archived,
    };

    #[test]
    fn create_and_get_category() {
        let conn = get_test_connection();
        let user = new_user(&conn, "Pacific/Auckland");

        let category = create_category(user.id, "Groceries", "Food and drink", &conn).unwrap();

        assert_eq!(get_category(category.id, &conn), Ok(category));
    }

    #[test]
    fn create_fails_for_missing_user() {
        let conn = get_test_connection();
        let user = new_user(&conn, "Pacific/Auckland");
        let missing = crate::user::UserID::new(user.id.as_i64() + 1);

        let result = create_category(missing, "Groceries", "", &conn);

        assert!(matches!(result, Err(Error::SqlError(_))), "got {result:?}");
    }

    #[test]
    fn archive_keeps_category_retrievable() {
        let conn = get_test_connection();
        let user = new_user(&conn, "Pacific/Auckland");
        let category = create_category(user.id, "Rent", "", &conn).unwrap();

        set_archived(category.id, true, &conn).unwrap();

        let got = get_category(category.id, &conn).unwrap();
        assert!(got.archived);
        assert_eq!(get_owned_category(category.id, user.id, &conn), Ok(got));
    }

    #[test]
    fn set_archived_fails_on_missing_category() {
        let conn = get_test_connection();

        assert_eq!(set_archived(5, true, &conn), Err(Error::NotFound));
    }

    #[test]
    fn owned_category_rejects_other_users() {
        let conn = get_test_connection();
        let owner = new_user(&conn, "Pacific/Auckland");
        let stranger = new_user(&conn, "Pacific/Auckland");
        let category = create_category(owner.id, "Rent", "", &conn).unwrap();

        assert_eq!(
            get_owned_category(category.id, stranger.id, &conn),
            Err(Error::InvalidCategory(category.id))
        );
    }

    #[test]
    fn lists_categories_alphabetically() {
        let conn = get_test_connection();
        let user = new_user(&conn, "Pacific/Auckland");
        let rent = create_category(user.id, "Rent", "", &conn).unwrap();
        let food = create_category(user.id, "Food", "", &conn).unwrap();

        assert_eq!(get_categories_for_user(user.id, &conn), Ok(vec![food, rent]));
    }
}
