//! Route handlers for the analytics endpoints.
//!
//! Each handler validates its date parameters, fetches the relevant
//! transactions, runs the pure aggregation functions from
//! [crate::analytics], and serves the result through the response cache.

use axum::{
    extract::{Query, State},
    http::Uri,
    response::Response,
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    AppState, Error,
    analytics::{
        CategoryBreakdown, DateRange, MonthlyTrends, Overview, SpendingPatterns,
        category_breakdown, monthly_trends, overview, spending_patterns,
    },
    auth::Claims,
    cache::{CacheKey, CacheTag, TtlClass, read_through},
    category::get_all_categories,
    database_id::DatabaseID,
    policy::{Capability, authorize},
    transaction::{
        TransactionKind,
        query::{recent_transactions, transactions_in_range, transactions_in_year},
    },
};

/// The default number of transactions in the recent feed.
const DEFAULT_RECENT_LIMIT: u64 = 10;
/// The most transactions the recent feed will return.
const MAX_RECENT_LIMIT: u64 = 100;

/// The date range parameters shared by the range-based analytics endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct RangeParams {
    start_date: Option<String>,
    end_date: Option<String>,
    period: Option<String>,
}

impl RangeParams {
    /// Resolve the range, defaulting to the current month to date.
    fn resolve(&self) -> Result<DateRange, Error> {
        DateRange::from_params(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            OffsetDateTime::now_utc().date(),
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OverviewPeriod {
    start_date: Date,
    end_date: Date,
    #[serde(rename = "type")]
    period_type: String,
}

#[derive(Debug, Serialize)]
struct OverviewResponse {
    period: OverviewPeriod,
    overview: Overview,
}

/// A route handler for income/expense totals over a date range.
pub(crate) async fn get_overview(
    State(state): State<AppState>,
    claims: Claims,
    uri: Uri,
    Query(params): Query<RangeParams>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ReadData)?;

    let range = params.resolve()?;
    let cache_key = CacheKey::new(&uri, claims.sub);
    let tags = analytics_tags(claims.sub);

    read_through(&state.cache, cache_key, TtlClass::Analytics, &tags, || {
        let connection = state
            .db_connection
            .lock()
            .expect("Could not acquire database lock");

        let transactions =
            transactions_in_range(claims.sub, range.start_date, range.end_date, &connection)?;

        Ok(OverviewResponse {
            period: OverviewPeriod {
                start_date: range.start_date,
                end_date: range.end_date,
                period_type: params.period.clone().unwrap_or_else(|| "month".to_owned()),
            },
            overview: overview(&transactions),
        })
    })
    .await
}

#[derive(Debug, Serialize)]
struct ExpensesByCategoryResponse {
    period: DateRange,
    #[serde(flatten)]
    breakdown: CategoryBreakdown,
}

/// A route handler for per-category expense totals over a date range.
pub(crate) async fn get_expenses_by_category(
    State(state): State<AppState>,
    claims: Claims,
    uri: Uri,
    Query(params): Query<RangeParams>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ReadData)?;

    let range = params.resolve()?;
    let cache_key = CacheKey::new(&uri, claims.sub);
    let tags = analytics_tags(claims.sub);

    read_through(&state.cache, cache_key, TtlClass::Analytics, &tags, || {
        let connection = state
            .db_connection
            .lock()
            .expect("Could not acquire database lock");

        let transactions =
            transactions_in_range(claims.sub, range.start_date, range.end_date, &connection)?;
        let categories = get_all_categories(&connection)?;

        Ok(ExpensesByCategoryResponse {
            period: range,
            breakdown: category_breakdown(&transactions, &categories),
        })
    })
    .await
}

/// The parameters accepted by the monthly trends endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TrendsParams {
    year: Option<i32>,
    months: Option<u8>,
}

/// A route handler for the fixed-length per-month income/expense series.
pub(crate) async fn get_monthly_trends(
    State(state): State<AppState>,
    claims: Claims,
    uri: Uri,
    Query(params): Query<TrendsParams>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ReadData)?;

    let year = params
        .year
        .unwrap_or_else(|| OffsetDateTime::now_utc().year());
    let months = params.months.unwrap_or(12);
    if !(1..=12).contains(&months) {
        return Err(Error::Validation(
            "Months must be between 1 and 12".to_owned(),
        ));
    }

    let cache_key = CacheKey::new(&uri, claims.sub);
    let tags = analytics_tags(claims.sub);

    read_through(&state.cache, cache_key, TtlClass::Analytics, &tags, || {
        let connection = state
            .db_connection
            .lock()
            .expect("Could not acquire database lock");

        let transactions = transactions_in_year(claims.sub, year, &connection)?;

        Ok::<MonthlyTrends, Error>(monthly_trends(&transactions, year, months))
    })
    .await
}

/// The parameters accepted by the recent transactions endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct RecentParams {
    limit: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecentTransaction {
    id: DatabaseID,
    amount: f64,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: TransactionKind,
    date: Date,
    created_at: OffsetDateTime,
    category: RecentTransactionCategory,
}

#[derive(Debug, Serialize)]
struct RecentTransactionCategory {
    name: String,
    color: String,
}

#[derive(Debug, Serialize)]
struct RecentTransactionsResponse {
    transactions: Vec<RecentTransaction>,
}

/// A route handler for the most recently recorded transactions.
pub(crate) async fn get_recent_transactions(
    State(state): State<AppState>,
    claims: Claims,
    uri: Uri,
    Query(params): Query<RecentParams>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ReadData)?;

    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);

    let cache_key = CacheKey::new(&uri, claims.sub);
    // The feed embeds category data, so it also lives in the namespaces a
    // category mutation clears.
    let tags = [
        CacheTag::UserTransactions(claims.sub),
        CacheTag::UserAnalytics(claims.sub),
        CacheTag::Analytics,
    ];

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

            let transactions = recent_transactions(claims.sub, limit, &connection)?
                .into_iter()
                .map(|row| RecentTransaction {
                    id: row.transaction.id,
                    amount: row.transaction.amount,
                    description: row.transaction.description,
                    kind: row.transaction.kind,
                    date: row.transaction.date,
                    created_at: row.transaction.created_at,
                    category: RecentTransactionCategory {
                        name: row.category_name.to_string(),
                        color: row.category_color,
                    },
                })
                .collect();

            Ok(RecentTransactionsResponse { transactions })
        },
    )
    .await
}

#[derive(Debug, Serialize)]
struct SpendingPatternsResponse {
    period: DateRange,
    #[serde(flatten)]
    patterns: SpendingPatterns,
}

/// A route handler for the day/hour spending histogram.
pub(crate) async fn get_spending_patterns(
    State(state): State<AppState>,
    claims: Claims,
    uri: Uri,
    Query(params): Query<RangeParams>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ReadData)?;

    let range = params.resolve()?;
    let cache_key = CacheKey::new(&uri, claims.sub);
    let tags = analytics_tags(claims.sub);

    read_through(&state.cache, cache_key, TtlClass::Analytics, &tags, || {
        let connection = state
            .db_connection
            .lock()
            .expect("Could not acquire database lock");

        let transactions =
            transactions_in_range(claims.sub, range.start_date, range.end_date, &connection)?;

        Ok(SpendingPatternsResponse {
            period: range,
            patterns: spending_patterns(&transactions),
        })
    })
    .await
}

/// The cache namespaces an analytics aggregate lives in: the owning user's
/// analytics, plus the global analytics namespace cleared by category
/// mutations.
fn analytics_tags(user_id: DatabaseID) -> [CacheTag; 2] {
    [CacheTag::UserAnalytics(user_id), CacheTag::Analytics]
}
