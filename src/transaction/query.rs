//! Database read queries for transactions: the filtered, sorted and paged
//! listing, single lookups, and the range queries that feed the analytics
//! engine.

use rusqlite::{Connection, Row, params_from_iter, types::Value};
use time::Date;

use crate::{
    Error,
    category::CategoryName,
    database_id::{DatabaseID, UserID},
};

use super::{Transaction, map_row};

/// The transaction fields a listing may be sorted by.
///
/// This is a closed set so client input never reaches the SQL text; anything
/// unrecognized falls back to [SortBy::Date].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Date,
    Amount,
    Description,
    CreatedAt,
}

impl SortBy {
    /// Map a client supplied `sort_by` value onto the allow-list.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("date") => SortBy::Date,
            Some("amount") => SortBy::Amount,
            Some("description") => SortBy::Description,
            Some("created_at") => SortBy::CreatedAt,
            _ => SortBy::Date,
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortBy::Date => "date",
            SortBy::Amount => "amount",
            SortBy::Description => "description",
            SortBy::CreatedAt => "created_at",
        }
    }
}

/// The order to sort transactions in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Sort in order of increasing value.
    Ascending,
    /// Sort in order of decreasing value.
    Descending,
}

impl SortOrder {
    /// Map a client supplied `sort_order` value onto the allow-list.
    /// Anything unrecognized falls back to [SortOrder::Descending].
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(str::to_ascii_lowercase).as_deref() {
            Some("asc") => SortOrder::Ascending,
            _ => SortOrder::Descending,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// Defines how the transaction listing should be filtered, sorted and paged.
#[derive(Debug, Clone)]
pub struct TransactionListQuery {
    /// Include only transactions of this kind (`income`/`expense`).
    pub kind: Option<String>,
    /// Include only transactions in this category.
    pub category_id: Option<DatabaseID>,
    /// Include only transactions on or after this date.
    pub start_date: Option<Date>,
    /// Include only transactions on or before this date.
    pub end_date: Option<Date>,
    /// Match against the transaction description or its category name.
    pub search: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    /// 1-based page number.
    pub page: u64,
    /// Transactions per page.
    pub limit: u64,
}

/// A transaction joined with the name and color of its category.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionWithCategory {
    pub transaction: Transaction,
    pub category_name: CategoryName,
    pub category_color: String,
}

fn map_joined_row(row: &Row) -> Result<TransactionWithCategory, rusqlite::Error> {
    let transaction = map_row(row)?;
    let raw_name: String = row.get(9)?;

    Ok(TransactionWithCategory {
        transaction,
        category_name: CategoryName::new_unchecked(&raw_name),
        category_color: row.get(10)?,
    })
}

const JOINED_COLUMNS: &str = "t.id, t.user_id, t.category_id, t.amount, t.kind, \
     t.description, t.date, t.created_at, t.updated_at, c.name, c.color";

/// Build the WHERE clause for a listing query, pushing one parameter per
/// active filter.
fn build_where_clause(
    user_id: UserID,
    query: &TransactionListQuery,
    query_parameters: &mut Vec<Value>,
) -> String {
    let mut where_clause_parts = vec![format!(
        "t.user_id = ?{}",
        query_parameters.len() + 1
    )];
    query_parameters.push(user_id.into());

    if let Some(ref kind) = query.kind {
        where_clause_parts.push(format!("t.kind = ?{}", query_parameters.len() + 1));
        query_parameters.push(kind.clone().into());
    }

    if let Some(category_id) = query.category_id {
        where_clause_parts.push(format!("t.category_id = ?{}", query_parameters.len() + 1));
        query_parameters.push(category_id.into());
    }

    if let Some(start_date) = query.start_date {
        where_clause_parts.push(format!("t.date >= ?{}", query_parameters.len() + 1));
        query_parameters.push(start_date.to_string().into());
    }

    if let Some(end_date) = query.end_date {
        where_clause_parts.push(format!("t.date <= ?{}", query_parameters.len() + 1));
        query_parameters.push(end_date.to_string().into());
    }

    if let Some(ref search) = query.search {
        let parameter_index = query_parameters.len() + 1;
        where_clause_parts.push(format!(
            "(t.description LIKE ?{parameter_index} OR c.name LIKE ?{parameter_index})"
        ));
        query_parameters.push(format!("%{search}%").into());
    }

    where_clause_parts.join(" AND ")
}

/// Query for a page of a user's transactions, returning the page rows and
/// the total number of matching transactions.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn list_transactions(
    user_id: UserID,
    query: &TransactionListQuery,
    connection: &Connection,
) -> Result<(Vec<TransactionWithCategory>, u64), Error> {
    let mut query_parameters: Vec<Value> = Vec::new();
    let where_clause = build_where_clause(user_id, query, &mut query_parameters);

    let count_query = format!(
        "SELECT COUNT(*) FROM \"transaction\" t \
         JOIN category c ON t.category_id = c.id \
         WHERE {where_clause}"
    );
    let total: i64 = connection
        .prepare(&count_query)?
        .query_row(params_from_iter(query_parameters.iter()), |row| row.get(0))?;

    let limit = query.limit.max(1);
    let offset = (query.page.max(1) - 1) * limit;

    // Sort by the allow-listed column, then ID to keep the order stable
    // across rows that compare equal.
    let page_query = format!(
        "SELECT {JOINED_COLUMNS} FROM \"transaction\" t \
         JOIN category c ON t.category_id = c.id \
         WHERE {where_clause} \
         ORDER BY t.{column} {order}, t.id {order} \
         LIMIT ?{limit_index} OFFSET ?{offset_index}",
        column = query.sort_by.column(),
        order = query.sort_order.keyword(),
        limit_index = query_parameters.len() + 1,
        offset_index = query_parameters.len() + 2,
    );
    query_parameters.push((limit as i64).into());
    query_parameters.push((offset as i64).into());

    let transactions = connection
        .prepare(&page_query)?
        .query_map(params_from_iter(query_parameters.iter()), map_joined_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::SqlError))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((transactions, total as u64))
}

/// Retrieve a single transaction owned by `user_id`, joined with its
/// category.
///
/// # Errors
/// Returns an [Error::NotFound] if the transaction does not exist or belongs
/// to another user, or an [Error::SqlError] if there is some other SQL error.
pub fn get_transaction_with_category(
    transaction_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<TransactionWithCategory, Error> {
    let query = format!(
        "SELECT {JOINED_COLUMNS} FROM \"transaction\" t \
         JOIN category c ON t.category_id = c.id \
         WHERE t.id = :id AND t.user_id = :user_id"
    );

    connection
        .prepare(&query)?
        .query_row(
            &[(":id", &transaction_id), (":user_id", &user_id)],
            map_joined_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve all of a user's transactions with dates within the inclusive
/// range `[start_date, end_date]`, for the aggregation engine.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn transactions_in_range(
    user_id: UserID,
    start_date: Date,
    end_date: Date,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, category_id, amount, kind, description, date, \
                    created_at, updated_at \
             FROM \"transaction\" \
             WHERE user_id = ?1 AND date BETWEEN ?2 AND ?3",
        )?
        .query_map(
            (user_id, start_date.to_string(), end_date.to_string()),
            map_row,
        )?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::SqlError))
        .collect()
}

/// Retrieve all of a user's transactions dated within `year`, for the
/// monthly trends aggregation.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn transactions_in_year(
    user_id: UserID,
    year: i32,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, category_id, amount, kind, description, date, \
                    created_at, updated_at \
             FROM \"transaction\" \
             WHERE user_id = ?1 AND date BETWEEN ?2 AND ?3",
        )?
        .query_map(
            (
                user_id,
                format!("{year:04}-01-01"),
                format!("{year:04}-12-31"),
            ),
            map_row,
        )?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::SqlError))
        .collect()
}

/// Retrieve a user's most recent transactions, ordered by date then creation
/// time descending, capped at `limit`.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn recent_transactions(
    user_id: UserID,
    limit: u64,
    connection: &Connection,
) -> Result<Vec<TransactionWithCategory>, Error> {
    let query = format!(
        "SELECT {JOINED_COLUMNS} FROM \"transaction\" t \
         JOIN category c ON t.category_id = c.id \
         WHERE t.user_id = ?1 \
         ORDER BY t.date DESC, t.created_at DESC, t.id DESC \
         LIMIT ?2"
    );

    connection
        .prepare(&query)?
        .query_map((user_id, limit as i64), map_joined_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::SqlError))
        .collect()
}
