//! This module defines the `Transaction` type, its validation rules and the
//! SQL queries for creating, updating and deleting transactions.
//!
//! Queries that read transactions back out (listing, filtering, analytics
//! inputs) live in [query].

pub mod query;

use std::fmt::Display;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    database_id::{DatabaseID, UserID},
    db::{format_timestamp, parse_timestamp_column},
};

/// Whether a transaction brings money in or takes money out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    /// The database/wire representation of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    /// Parse a kind from its wire representation.
    ///
    /// # Errors
    /// Returns an [Error::Validation] for anything other than `income` or
    /// `expense`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        match text {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            _ => Err(Error::Validation(
                "Type must be either income or expense".to_owned(),
            )),
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An expense or income, i.e. an exchange of money.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: DatabaseID,
    /// The ID of the user that owns the transaction.
    pub user_id: UserID,
    /// The ID of the category the transaction belongs to.
    pub category_id: DatabaseID,
    /// The amount of money spent or earned in this transaction.
    pub amount: f64,
    /// Whether the transaction is income or an expense.
    pub kind: TransactionKind,
    /// A text description of what the transaction was for.
    pub description: Option<String>,
    /// When the transaction happened, as assigned by the user. Distinct from
    /// the time the row was created.
    pub date: Date,
    /// When the transaction was recorded.
    pub created_at: OffsetDateTime,
    /// When the transaction was last modified.
    pub updated_at: OffsetDateTime,
}

/// The fields needed to create a transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: UserID,
    pub category_id: DatabaseID,
    pub amount: f64,
    pub kind: TransactionKind,
    pub description: Option<String>,
    pub date: Date,
}

/// A partial update of a transaction. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub category_id: Option<DatabaseID>,
    pub amount: Option<f64>,
    pub kind: Option<TransactionKind>,
    pub description: Option<String>,
    pub date: Option<Date>,
}

/// Validate a transaction amount.
///
/// Amounts are positive decimals with two implied fractional digits.
///
/// # Errors
/// Returns an [Error::Validation] if the amount is not finite or is below
/// one cent.
pub fn validate_amount(amount: f64) -> Result<(), Error> {
    if !amount.is_finite() || amount < 0.01 {
        return Err(Error::Validation(
            "Amount must be greater than 0".to_owned(),
        ));
    }

    Ok(())
}

/// Validate an optional transaction description.
///
/// # Errors
/// Returns an [Error::Validation] if the description exceeds 500 characters.
pub fn validate_description(description: &str) -> Result<(), Error> {
    if description.chars().count() > 500 {
        return Err(Error::Validation(
            "Description must be less than 500 characters".to_owned(),
        ));
    }

    Ok(())
}

pub(crate) fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL REFERENCES category(id),
                amount REAL NOT NULL,
                kind TEXT NOT NULL,
                description TEXT,
                date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS transaction_user_date \
         ON \"transaction\" (user_id, date);",
        (),
    )?;

    Ok(())
}

/// Create a new transaction in the database.
///
/// # Errors
/// Returns an [Error::InvalidReference] if `category_id` does not refer to a
/// valid category, or an [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = OffsetDateTime::now_utc();

    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\" \
             (user_id, category_id, amount, kind, description, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING id, user_id, category_id, amount, kind, description, date, \
                       created_at, updated_at",
        )?
        .query_row(
            (
                new_transaction.user_id,
                new_transaction.category_id,
                new_transaction.amount,
                new_transaction.kind.as_str(),
                &new_transaction.description,
                new_transaction.date,
                format_timestamp(now),
                format_timestamp(now),
            ),
            map_row,
        )
        .map_err(Error::from)?;

    Ok(transaction)
}

/// Apply a partial update to the transaction with `transaction_id`.
///
/// Only the owning user's transactions are visible to this query; an ID owned
/// by someone else behaves like a missing row.
///
/// # Errors
/// Returns an [Error::NotFound] if `transaction_id` does not refer to a
/// transaction owned by `user_id`, an [Error::InvalidReference] if a new
/// `category_id` does not refer to a valid category, or an [Error::SqlError]
/// if there is some other SQL error.
pub fn update_transaction(
    transaction_id: DatabaseID,
    user_id: UserID,
    update: TransactionUpdate,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let mut set_clause_parts = Vec::new();
    let mut query_parameters: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(category_id) = update.category_id {
        set_clause_parts.push(format!("category_id = ?{}", query_parameters.len() + 1));
        query_parameters.push(category_id.into());
    }

    if let Some(amount) = update.amount {
        set_clause_parts.push(format!("amount = ?{}", query_parameters.len() + 1));
        query_parameters.push(amount.into());
    }

    if let Some(kind) = update.kind {
        set_clause_parts.push(format!("kind = ?{}", query_parameters.len() + 1));
        query_parameters.push(kind.as_str().to_owned().into());
    }

    if let Some(description) = update.description {
        set_clause_parts.push(format!("description = ?{}", query_parameters.len() + 1));
        query_parameters.push(description.into());
    }

    if let Some(date) = update.date {
        set_clause_parts.push(format!("date = ?{}", query_parameters.len() + 1));
        query_parameters.push(date.to_string().into());
    }

    if set_clause_parts.is_empty() {
        return Err(Error::Validation("No valid fields to update".to_owned()));
    }

    set_clause_parts.push(format!("updated_at = ?{}", query_parameters.len() + 1));
    query_parameters.push(format_timestamp(OffsetDateTime::now_utc()).into());

    let query = format!(
        "UPDATE \"transaction\" SET {} WHERE id = ?{} AND user_id = ?{}
         RETURNING id, user_id, category_id, amount, kind, description, date, \
                   created_at, updated_at",
        set_clause_parts.join(", "),
        query_parameters.len() + 1,
        query_parameters.len() + 2,
    );
    query_parameters.push(transaction_id.into());
    query_parameters.push(user_id.into());

    connection
        .prepare(&query)?
        .query_row(rusqlite::params_from_iter(query_parameters.iter()), map_row)
        .map_err(|error| error.into())
}

/// Delete the transaction with `transaction_id` owned by `user_id`.
///
/// # Errors
/// Returns an [Error::NotFound] if `transaction_id` does not refer to a
/// transaction owned by `user_id`, or an [Error::SqlError] if there is some
/// other SQL error.
pub fn delete_transaction(
    transaction_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_deleted = connection.execute(
        "DELETE FROM \"transaction\" WHERE id = ?1 AND user_id = ?2",
        (transaction_id, user_id),
    )?;

    if rows_deleted == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

pub(crate) fn map_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let kind_text: String = row.get(4)?;
    let kind = match kind_text.as_str() {
        "income" => TransactionKind::Income,
        "expense" => TransactionKind::Expense,
        _ => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown transaction kind \"{kind_text}\"").into(),
            ));
        }
    };

    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        amount: row.get(3)?,
        kind,
        description: row.get(5)?,
        date: row.get(6)?,
        created_at: parse_timestamp_column(7, &created_at)?,
        updated_at: parse_timestamp_column(8, &updated_at)?,
    })
}

#[cfg(test)]
mod transaction_query_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error,
        category::{CategoryName, DEFAULT_CATEGORY_COLOR, NewCategory, create_category},
        db::initialize,
    };

    use super::{
        NewTransaction, TransactionKind, TransactionUpdate, create_transaction,
        delete_transaction, update_transaction,
    };

    fn get_test_connection() -> (Connection, i64) {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");

        let category = create_category(
            NewCategory {
                name: CategoryName::new("Groceries").unwrap(),
                description: None,
                color: DEFAULT_CATEGORY_COLOR.to_owned(),
            },
            &connection,
        )
        .expect("Could not create category");

        (connection, category.id)
    }

    fn build_transaction(category_id: i64) -> NewTransaction {
        NewTransaction {
            user_id: 1,
            category_id,
            amount: 19.99,
            kind: TransactionKind::Expense,
            description: Some("weekly shop".to_owned()),
            date: date!(2026 - 01 - 15),
        }
    }

    #[test]
    fn create_transaction_returns_inserted_row() {
        let (connection, category_id) = get_test_connection();

        let transaction =
            create_transaction(build_transaction(category_id), &connection).unwrap();

        assert_eq!(transaction.amount, 19.99);
        assert_eq!(transaction.kind, TransactionKind::Expense);
        assert_eq!(transaction.date, date!(2026 - 01 - 15));
        assert_eq!(transaction.created_at, transaction.updated_at);
    }

    #[test]
    fn create_transaction_with_invalid_category_fails() {
        let (connection, _) = get_test_connection();

        let result = create_transaction(build_transaction(999), &connection);

        assert_eq!(result, Err(Error::InvalidReference));
    }

    #[test]
    fn update_transaction_changes_only_given_fields() {
        let (connection, category_id) = get_test_connection();
        let transaction =
            create_transaction(build_transaction(category_id), &connection).unwrap();

        let updated = update_transaction(
            transaction.id,
            transaction.user_id,
            TransactionUpdate {
                amount: Some(25.50),
                ..Default::default()
            },
            &connection,
        )
        .unwrap();

        assert_eq!(updated.amount, 25.50);
        assert_eq!(updated.description, transaction.description);
        assert_eq!(updated.date, transaction.date);
    }

    #[test]
    fn update_transaction_owned_by_other_user_fails_with_not_found() {
        let (connection, category_id) = get_test_connection();
        let transaction =
            create_transaction(build_transaction(category_id), &connection).unwrap();

        let result = update_transaction(
            transaction.id,
            2,
            TransactionUpdate {
                amount: Some(1.0),
                ..Default::default()
            },
            &connection,
        );

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn delete_transaction_removes_row() {
        let (connection, category_id) = get_test_connection();
        let transaction =
            create_transaction(build_transaction(category_id), &connection).unwrap();

        delete_transaction(transaction.id, transaction.user_id, &connection).unwrap();

        let count: i64 = connection
            .prepare("SELECT COUNT(*) FROM \"transaction\"")
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn delete_transaction_owned_by_other_user_fails_with_not_found() {
        let (connection, category_id) = get_test_connection();
        let transaction =
            create_transaction(build_transaction(category_id), &connection).unwrap();

        assert_eq!(
            delete_transaction(transaction.id, 2, &connection),
            Err(Error::NotFound)
        );
    }
}
