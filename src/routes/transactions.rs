//! Route handlers for listing, creating, updating and deleting transactions.
//!
//! Listings are served through the response cache; every mutation
//! invalidates the caller's transaction and analytics namespaces before its
//! response is sent, so a follow-up read never sees a stale aggregate.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    AppState, Error,
    analytics::parse_date,
    auth::Claims,
    cache::{CacheKey, CacheTag, TtlClass, read_through},
    category,
    database_id::{DatabaseID, UserID},
    pagination::Pagination,
    policy::{Capability, authorize},
    transaction::{
        NewTransaction, TransactionKind, TransactionUpdate, create_transaction,
        delete_transaction,
        query::{
            SortBy, SortOrder, TransactionListQuery, TransactionWithCategory,
            get_transaction_with_category, list_transactions,
        },
        update_transaction, validate_amount, validate_description,
    },
};

/// A transaction as returned to clients, joined with its category.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionResponse {
    id: DatabaseID,
    amount: f64,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: TransactionKind,
    date: Date,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    category: CategoryRef,
}

#[derive(Debug, Serialize)]
pub(crate) struct CategoryRef {
    id: DatabaseID,
    name: String,
    color: String,
}

impl From<TransactionWithCategory> for TransactionResponse {
    fn from(row: TransactionWithCategory) -> Self {
        Self {
            id: row.transaction.id,
            amount: row.transaction.amount,
            description: row.transaction.description,
            kind: row.transaction.kind,
            date: row.transaction.date,
            created_at: row.transaction.created_at,
            updated_at: row.transaction.updated_at,
            category: CategoryRef {
                id: row.transaction.category_id,
                name: row.category_name.to_string(),
                color: row.category_color,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct TransactionListResponse {
    transactions: Vec<TransactionResponse>,
    pagination: Pagination,
}

#[derive(Debug, Serialize)]
struct TransactionMutationResponse {
    message: &'static str,
    transaction: TransactionResponse,
}

/// The query parameters accepted by the transaction listing.
#[derive(Debug, Deserialize)]
pub(crate) struct TransactionListParams {
    page: Option<u64>,
    limit: Option<u64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    category_id: Option<DatabaseID>,
    start_date: Option<String>,
    end_date: Option<String>,
    search: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

/// A route handler for the paginated, filtered, sorted transaction listing.
pub(crate) async fn get_transactions(
    State(state): State<AppState>,
    claims: Claims,
    uri: Uri,
    Query(params): Query<TransactionListParams>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ReadData)?;

    let (page, limit) = state
        .pagination_config
        .resolve(params.page, params.limit);

    let query = TransactionListQuery {
        kind: params.kind,
        category_id: params.category_id,
        start_date: params.start_date.as_deref().map(parse_date).transpose()?,
        end_date: params.end_date.as_deref().map(parse_date).transpose()?,
        search: params.search,
        sort_by: SortBy::from_param(params.sort_by.as_deref()),
        sort_order: SortOrder::from_param(params.sort_order.as_deref()),
        page,
        limit,
    };

    let cache_key = CacheKey::new(&uri, claims.sub);
    let tags = [CacheTag::UserTransactions(claims.sub)];

    read_through(
        &state.cache,
        cache_key,
        TtlClass::Transactions,
        &tags,
        || {
            let connection = state
                .db_connection
                .lock()
                .expect("Could not acquire database lock");

            let (transactions, total) = list_transactions(claims.sub, &query, &connection)?;

            Ok(TransactionListResponse {
                transactions: transactions
                    .into_iter()
                    .map(TransactionResponse::from)
                    .collect(),
                pagination: Pagination::new(page, limit, total),
            })
        },
    )
    .await
}

/// A route handler for getting a single transaction by its database ID.
pub(crate) async fn get_transaction(
    State(state): State<AppState>,
    claims: Claims,
    Path(transaction_id): Path<DatabaseID>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ReadData)?;

    let connection = state
        .db_connection
        .lock()
        .expect("Could not acquire database lock");

    let row = get_transaction_with_category(transaction_id, claims.sub, &connection)?;

    Ok(Json(TransactionResponse::from(row)).into_response())
}

/// The body accepted when creating a transaction.
#[derive(Debug, Deserialize)]
pub(crate) struct CreateTransactionData {
    amount: Option<f64>,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    category_id: Option<DatabaseID>,
    date: Option<String>,
}

impl CreateTransactionData {
    fn validate(self, user_id: UserID) -> Result<NewTransaction, Error> {
        let amount = self
            .amount
            .ok_or_else(|| Error::Validation("Amount must be a number".to_owned()))?;
        validate_amount(amount)?;

        let kind = self
            .kind
            .as_deref()
            .map(TransactionKind::parse)
            .transpose()?
            .ok_or_else(|| {
                Error::Validation("Type must be either income or expense".to_owned())
            })?;

        let category_id = self
            .category_id
            .filter(|&id| id >= 1)
            .ok_or_else(|| {
                Error::Validation("Category ID must be a positive integer".to_owned())
            })?;

        let date = self
            .date
            .as_deref()
            .map(parse_date)
            .transpose()?
            .ok_or_else(|| Error::Validation("Date must be a valid ISO 8601 date".to_owned()))?;

        if let Some(ref description) = self.description {
            validate_description(description)?;
        }

        Ok(NewTransaction {
            user_id,
            category_id,
            amount,
            kind,
            description: self.description,
            date,
        })
    }
}

/// A route handler for creating a new transaction.
///
/// # Panics
/// Panics if the lock for the database connection is already held by the
/// same thread.
pub(crate) async fn create_transaction_endpoint(
    State(state): State<AppState>,
    claims: Claims,
    Json(data): Json<CreateTransactionData>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::MutateTransactions)?;

    let new_transaction = data.validate(claims.sub)?;

    let row = {
        let connection = state
            .db_connection
            .lock()
            .expect("Could not acquire database lock");

        // The pre-check gives the friendly error; the foreign key constraint
        // remains the authoritative guard if the category disappears between
        // check and insert.
        category::get_category(new_transaction.category_id, &connection).map_err(
            |error| match error {
                Error::NotFound => Error::InvalidReference,
                other => other,
            },
        )?;

        let transaction = create_transaction(new_transaction, &connection)?;

        get_transaction_with_category(transaction.id, claims.sub, &connection)?
    };

    invalidate_for_user(&state, claims.sub).await;

    Ok((
        StatusCode::CREATED,
        Json(TransactionMutationResponse {
            message: "Transaction created successfully",
            transaction: row.into(),
        }),
    )
        .into_response())
}

/// The body accepted when updating a transaction. All fields optional.
#[derive(Debug, Deserialize)]
pub(crate) struct UpdateTransactionData {
    amount: Option<f64>,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    category_id: Option<DatabaseID>,
    date: Option<String>,
}

impl UpdateTransactionData {
    fn validate(self) -> Result<TransactionUpdate, Error> {
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
        }

        if let Some(ref description) = self.description {
            validate_description(description)?;
        }

        if self.category_id.is_some_and(|id| id < 1) {
            return Err(Error::Validation(
                "Category ID must be a positive integer".to_owned(),
            ));
        }

        Ok(TransactionUpdate {
            category_id: self.category_id,
            amount: self.amount,
            kind: self.kind.as_deref().map(TransactionKind::parse).transpose()?,
            description: self.description,
            date: self.date.as_deref().map(parse_date).transpose()?,
        })
    }
}

/// A route handler for partially updating a transaction.
///
/// # Panics
/// Panics if the lock for the database connection is already held by the
/// same thread.
pub(crate) async fn update_transaction_endpoint(
    State(state): State<AppState>,
    claims: Claims,
    Path(transaction_id): Path<DatabaseID>,
    Json(data): Json<UpdateTransactionData>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::MutateTransactions)?;

    let update = data.validate()?;

    let row = {
        let connection = state
            .db_connection
            .lock()
            .expect("Could not acquire database lock");

        if let Some(category_id) = update.category_id {
            category::get_category(category_id, &connection).map_err(|error| match error {
                Error::NotFound => Error::InvalidReference,
                other => other,
            })?;
        }

        let transaction =
            update_transaction(transaction_id, claims.sub, update, &connection)?;

        get_transaction_with_category(transaction.id, claims.sub, &connection)?
    };

    invalidate_for_user(&state, claims.sub).await;

    Ok(Json(TransactionMutationResponse {
        message: "Transaction updated successfully",
        transaction: row.into(),
    })
    .into_response())
}

/// A route handler for deleting a transaction.
///
/// # Panics
/// Panics if the lock for the database connection is already held by the
/// same thread.
pub(crate) async fn delete_transaction_endpoint(
    State(state): State<AppState>,
    claims: Claims,
    Path(transaction_id): Path<DatabaseID>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::MutateTransactions)?;

    {
        let connection = state
            .db_connection
            .lock()
            .expect("Could not acquire database lock");

        delete_transaction(transaction_id, claims.sub, &connection)?;
    }

    invalidate_for_user(&state, claims.sub).await;

    Ok(Json(serde_json::json!({
        "message": "Transaction deleted successfully",
    }))
    .into_response())
}

/// Remove the cache namespaces a transaction mutation affects: the user's
/// listings and their analytics aggregates. Runs after the write committed
/// and before the response is sent.
async fn invalidate_for_user(state: &AppState, user_id: UserID) {
    state
        .cache
        .invalidate(&[
            CacheTag::UserTransactions(user_id),
            CacheTag::UserAnalytics(user_id),
        ])
        .await;
}
