//! Application router configuration and the handlers that do not belong to a
//! resource: the liveness probe and the JSON 404 fallback.

mod analytics;
mod categories;
mod transactions;

use axum::{
    Json, Router,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{AppState, endpoints};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(
            endpoints::TRANSACTIONS,
            get(transactions::get_transactions).post(transactions::create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            get(transactions::get_transaction)
                .put(transactions::update_transaction_endpoint)
                .delete(transactions::delete_transaction_endpoint),
        )
        .route(
            endpoints::CATEGORIES,
            get(categories::get_categories).post(categories::create_category_endpoint),
        )
        .route(
            endpoints::CATEGORY,
            get(categories::get_category)
                .put(categories::update_category_endpoint)
                .delete(categories::delete_category_endpoint),
        )
        .route(endpoints::ANALYTICS_OVERVIEW, get(analytics::get_overview))
        .route(
            endpoints::ANALYTICS_EXPENSES_BY_CATEGORY,
            get(analytics::get_expenses_by_category),
        )
        .route(
            endpoints::ANALYTICS_MONTHLY_TRENDS,
            get(analytics::get_monthly_trends),
        )
        .route(
            endpoints::ANALYTICS_RECENT_TRANSACTIONS,
            get(analytics::get_recent_transactions),
        )
        .route(
            endpoints::ANALYTICS_SPENDING_PATTERNS,
            get(analytics::get_spending_patterns),
        )
        .fallback(get_404_not_found)
        .with_state(state)
}

/// The liveness probe used by deployment tooling.
async fn get_health() -> Response {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    Json(json!({
        "status": "OK",
        "timestamp": timestamp,
    }))
    .into_response()
}

async fn get_404_not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Route not found",
            "path": uri.to_string(),
        })),
    )
        .into_response()
}
