//! This file defines the `Category` type, its validation rules and the SQL
//! queries for managing categories.
//!
//! Categories are shared by all users: they are created and managed by
//! admins, and every user's transactions reference them.

use std::fmt::Display;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::DatabaseID,
    db::{format_timestamp, parse_timestamp_column},
};

/// The color assigned to a category when the client does not choose one.
pub const DEFAULT_CATEGORY_COLOR: &str = "#3B82F6";

/// The name of a category.
///
/// Between 1 and 50 characters, restricted to letters, digits, spaces and
/// ampersands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct CategoryName(String);

impl CategoryName {
    /// Create a category name.
    ///
    /// # Errors
    /// Returns an [Error::Validation] if `name` is empty, longer than 50
    /// characters, or contains a character outside letters, digits, spaces
    /// and `&`.
    pub fn new(name: &str) -> Result<Self, Error> {
        if name.is_empty() || name.chars().count() > 50 {
            return Err(Error::Validation(
                "Name must be between 1 and 50 characters".to_owned(),
            ));
        }

        if !name
            .chars()
            .all(|char| char.is_ascii_alphanumeric() || char == ' ' || char == '&')
        {
            return Err(Error::Validation(
                "Name can only contain letters, numbers, spaces, and &".to_owned(),
            ));
        }

        Ok(Self(name.to_owned()))
    }

    /// Create a category name without validation.
    ///
    /// The caller should ensure the string already satisfies the name rules,
    /// e.g. because it was read back from the database.
    pub fn new_unchecked(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl AsRef<str> for CategoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for CategoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A category for expenses and income, e.g., 'Groceries', 'Eating Out',
/// 'Wages'.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    /// The ID of the category.
    pub id: DatabaseID,
    /// The name of the category.
    pub name: CategoryName,
    /// An optional description of what the category covers.
    pub description: Option<String>,
    /// A six hex digit color code used when charting the category.
    pub color: String,
    /// When the category was created.
    #[serde(rename = "createdAt")]
    pub created_at: OffsetDateTime,
}

/// The fields needed to create a category.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: CategoryName,
    pub description: Option<String>,
    pub color: String,
}

/// A partial update of a category. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<CategoryName>,
    pub description: Option<String>,
    pub color: Option<String>,
}

/// Validate an optional category description.
///
/// # Errors
/// Returns an [Error::Validation] if the description exceeds 200 characters.
pub fn validate_description(description: &str) -> Result<(), Error> {
    if description.chars().count() > 200 {
        return Err(Error::Validation(
            "Description must be less than 200 characters".to_owned(),
        ));
    }

    Ok(())
}

/// Validate a category color code, e.g. `#3B82F6`.
///
/// # Errors
/// Returns an [Error::Validation] if the color is not a `#` followed by six
/// hex digits.
pub fn validate_color(color: &str) -> Result<(), Error> {
    let mut chars = color.chars();

    let is_valid = chars.next() == Some('#')
        && color.len() == 7
        && chars.all(|char| char.is_ascii_hexdigit());

    if !is_valid {
        return Err(Error::Validation(
            "Color must be a valid hex color code".to_owned(),
        ));
    }

    Ok(())
}

pub(crate) fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS category (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                color TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        (),
    )?;

    Ok(())
}

/// Create a category in the database.
///
/// # Errors
/// Returns an [Error::Conflict] if a category with the same name already
/// exists, or an [Error::SqlError] if there is some other SQL error.
pub fn create_category(new_category: NewCategory, connection: &Connection) -> Result<Category, Error> {
    let category = connection
        .prepare(
            "INSERT INTO category (name, description, color, created_at)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id, name, description, color, created_at",
        )?
        .query_row(
            (
                new_category.name.as_ref(),
                &new_category.description,
                &new_category.color,
                format_timestamp(OffsetDateTime::now_utc()),
            ),
            map_row,
        )?;

    Ok(category)
}

/// Retrieve the category with `category_id` from the database.
///
/// # Errors
/// Returns an [Error::NotFound] if `category_id` does not refer to a valid
/// category, or an [Error::SqlError] if there is some other SQL error.
pub fn get_category(category_id: DatabaseID, connection: &Connection) -> Result<Category, Error> {
    connection
        .prepare(
            "SELECT id, name, description, color, created_at FROM category WHERE id = :id",
        )?
        .query_row(&[(":id", &category_id)], map_row)
        .map_err(|error| error.into())
}

/// Retrieve all categories, ordered by name.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_all_categories(connection: &Connection) -> Result<Vec<Category>, Error> {
    connection
        .prepare(
            "SELECT id, name, description, color, created_at FROM category ORDER BY name",
        )?
        .query_map([], map_row)?
        .map(|maybe_category| maybe_category.map_err(Error::SqlError))
        .collect()
}

/// Check whether a category name is already taken by a category other than
/// `exclude_id`.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn name_is_taken(
    name: &CategoryName,
    exclude_id: Option<DatabaseID>,
    connection: &Connection,
) -> Result<bool, Error> {
    let count: i64 = connection
        .prepare("SELECT COUNT(*) FROM category WHERE name = ?1 AND id != ?2")?
        .query_row((name.as_ref(), exclude_id.unwrap_or(-1)), |row| row.get(0))?;

    Ok(count > 0)
}

/// Apply a partial update to the category with `category_id`.
///
/// # Errors
/// Returns an [Error::NotFound] if `category_id` does not refer to a valid
/// category, an [Error::Conflict] if the new name is already taken, or an
/// [Error::SqlError] if there is some other SQL error.
pub fn update_category(
    category_id: DatabaseID,
    update: CategoryUpdate,
    connection: &Connection,
) -> Result<Category, Error> {
    let mut set_clause_parts = Vec::new();
    let mut query_parameters: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(name) = update.name {
        set_clause_parts.push(format!("name = ?{}", query_parameters.len() + 1));
        query_parameters.push(name.as_ref().to_owned().into());
    }

    if let Some(description) = update.description {
        set_clause_parts.push(format!("description = ?{}", query_parameters.len() + 1));
        query_parameters.push(description.into());
    }

    if let Some(color) = update.color {
        set_clause_parts.push(format!("color = ?{}", query_parameters.len() + 1));
        query_parameters.push(color.into());
    }

    if set_clause_parts.is_empty() {
        return Err(Error::Validation("No valid fields to update".to_owned()));
    }

    let query = format!(
        "UPDATE category SET {} WHERE id = ?{}
         RETURNING id, name, description, color, created_at",
        set_clause_parts.join(", "),
        query_parameters.len() + 1,
    );
    query_parameters.push(category_id.into());

    connection
        .prepare(&query)?
        .query_row(rusqlite::params_from_iter(query_parameters.iter()), map_row)
        .map_err(|error| error.into())
}

/// Delete the category with `category_id`.
///
/// The caller is responsible for checking that no transactions reference the
/// category first; the foreign key constraint backs that check up.
///
/// # Errors
/// Returns an [Error::NotFound] if `category_id` does not refer to a valid
/// category, or an [Error::SqlError] if there is some other SQL error.
pub fn delete_category(category_id: DatabaseID, connection: &Connection) -> Result<(), Error> {
    let rows_deleted = connection.execute("DELETE FROM category WHERE id = ?1", (category_id,))?;

    if rows_deleted == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Count the transactions (for any user) that reference `category_id`.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn count_referencing_transactions(
    category_id: DatabaseID,
    connection: &Connection,
) -> Result<u64, Error> {
    let count: i64 = connection
        .prepare("SELECT COUNT(*) FROM \"transaction\" WHERE category_id = ?1")?
        .query_row((category_id,), |row| row.get(0))?;

    Ok(count as u64)
}

pub(crate) fn map_row(row: &Row) -> Result<Category, rusqlite::Error> {
    let raw_name: String = row.get(1)?;
    let created_at: String = row.get(4)?;

    Ok(Category {
        id: row.get(0)?,
        name: CategoryName::new_unchecked(&raw_name),
        description: row.get(2)?,
        color: row.get(3)?,
        created_at: parse_timestamp_column(4, &created_at)?,
    })
}


#[cfg(test)]
mod category_query_tests {
    use rusqlite::Connection;

    use crate::{Error, db::initialize};

    use super::{
        Category, CategoryName, CategoryUpdate, DEFAULT_CATEGORY_COLOR, NewCategory,
        count_referencing_transactions, create_category, delete_category, get_all_categories,
        get_category, name_is_taken, update_category,
    };

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");
        connection
    }

    fn build_category(name: &str) -> NewCategory {
        NewCategory {
            name: CategoryName::new(name).unwrap(),
            description: None,
            color: DEFAULT_CATEGORY_COLOR.to_owned(),
        }
    }

    #[test]
    fn create_and_get_category() {
        let connection = get_test_connection();

        let created = create_category(build_category("Groceries"), &connection).unwrap();
        let got = get_category(created.id, &connection).unwrap();

        assert_eq!(created, got);
        assert_eq!(got.name.as_ref(), "Groceries");
        assert_eq!(got.color, DEFAULT_CATEGORY_COLOR);
    }

    #[test]
    fn create_duplicate_name_fails_with_conflict() {
        let connection = get_test_connection();
        create_category(build_category("Groceries"), &connection).unwrap();

        let result = create_category(build_category("Groceries"), &connection);

        assert!(matches!(result, Err(Error::Conflict(_))), "got {result:?}");
    }

    #[test]
    fn get_missing_category_fails_with_not_found() {
        let connection = get_test_connection();

        assert_eq!(get_category(42, &connection), Err(Error::NotFound));
    }

    #[test]
    fn get_all_categories_orders_by_name() {
        let connection = get_test_connection();
        create_category(build_category("Transport"), &connection).unwrap();
        create_category(build_category("Groceries"), &connection).unwrap();

        let names: Vec<String> = get_all_categories(&connection)
            .unwrap()
            .into_iter()
            .map(|category: Category| category.name.to_string())
            .collect();

        assert_eq!(names, ["Groceries", "Transport"]);
    }

    #[test]
    fn name_is_taken_ignores_excluded_id() {
        let connection = get_test_connection();
        let category = create_category(build_category("Groceries"), &connection).unwrap();
        let name = CategoryName::new("Groceries").unwrap();

        assert!(name_is_taken(&name, None, &connection).unwrap());
        assert!(!name_is_taken(&name, Some(category.id), &connection).unwrap());
    }

    #[test]
    fn update_category_changes_only_given_fields() {
        let connection = get_test_connection();
        let category = create_category(build_category("Groceries"), &connection).unwrap();

        let updated = update_category(
            category.id,
            CategoryUpdate {
                color: Some("#FF0000".to_owned()),
                ..Default::default()
            },
            &connection,
        )
        .unwrap();

        assert_eq!(updated.name, category.name);
        assert_eq!(updated.color, "#FF0000");
    }

    #[test]
    fn update_with_no_fields_fails_with_validation_error() {
        let connection = get_test_connection();
        let category = create_category(build_category("Groceries"), &connection).unwrap();

        let result = update_category(category.id, CategoryUpdate::default(), &connection);

        assert!(matches!(result, Err(Error::Validation(_))), "got {result:?}");
    }

    #[test]
    fn delete_category_removes_row() {
        let connection = get_test_connection();
        let category = create_category(build_category("Groceries"), &connection).unwrap();

        delete_category(category.id, &connection).unwrap();

        assert_eq!(get_category(category.id, &connection), Err(Error::NotFound));
    }

    #[test]
    fn delete_missing_category_fails_with_not_found() {
        let connection = get_test_connection();

        assert_eq!(delete_category(42, &connection), Err(Error::NotFound));
    }

    #[test]
    fn count_referencing_transactions_counts_all_users() {
        use time::macros::date;

        use crate::transaction::{NewTransaction, TransactionKind, create_transaction};

        let connection = get_test_connection();
        let category = create_category(build_category("Groceries"), &connection).unwrap();

        for user_id in [1, 2] {
            create_transaction(
                NewTransaction {
                    user_id,
                    category_id: category.id,
                    amount: 10.0,
                    kind: TransactionKind::Expense,
                    description: None,
                    date: date!(2026 - 01 - 15),
                },
                &connection,
            )
            .unwrap();
        }

        assert_eq!(
            count_referencing_transactions(category.id, &connection).unwrap(),
            2
        );
    }
}
