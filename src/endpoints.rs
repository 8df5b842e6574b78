//! The API endpoint URIs.
//!
//! For endpoints that take a parameter, e.g., '/transactions/{transaction_id}',
//! use [format_endpoint].

/// The liveness probe.
pub const HEALTH: &str = "/health";
/// The route to list and create transactions.
pub const TRANSACTIONS: &str = "/transactions";
/// The route to access a single transaction.
pub const TRANSACTION: &str = "/transactions/{transaction_id}";
/// The route to list and create categories.
pub const CATEGORIES: &str = "/categories";
/// The route to access a single category.
pub const CATEGORY: &str = "/categories/{category_id}";
/// The route for income/expense totals over a date range.
pub const ANALYTICS_OVERVIEW: &str = "/analytics/overview";
/// The route for per-category expense totals over a date range.
pub const ANALYTICS_EXPENSES_BY_CATEGORY: &str = "/analytics/expenses-by-category";
/// The route for per-month income/expense series for a year.
pub const ANALYTICS_MONTHLY_TRENDS: &str = "/analytics/monthly-trends";
/// The route for the most recently recorded transactions.
pub const ANALYTICS_RECENT_TRANSACTIONS: &str = "/analytics/recent-transactions";
/// The route for day/hour spending histograms.
pub const ANALYTICS_SPENDING_PATTERNS: &str = "/analytics/spending-patterns";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/transactions/{transaction_id}',
/// '{transaction_id}' is the parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_string();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|offset| param_start + offset + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}

// These tests are here so that we know the formatted endpoints are valid URIs.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use super::format_endpoint;

    #[test]
    fn format_endpoint_replaces_parameter() {
        assert_eq!(
            format_endpoint(super::TRANSACTION, 42),
            "/transactions/42"
        );
        assert_eq!(format_endpoint(super::CATEGORY, 7), "/categories/7");
    }

    #[test]
    fn format_endpoint_passes_through_parameterless_paths() {
        assert_eq!(format_endpoint(super::TRANSACTIONS, 42), "/transactions");
    }

    #[test]
    fn formatted_endpoints_are_valid_uris() {
        for endpoint in [
            format_endpoint(super::TRANSACTION, 1),
            format_endpoint(super::CATEGORY, 1),
        ] {
            assert!(endpoint.parse::<Uri>().is_ok(), "invalid URI {endpoint}");
        }
    }
}
