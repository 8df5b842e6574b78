//! Fintrack is a REST API for tracking categorized income and expenses.
//!
//! The interesting parts are the [analytics] aggregation engine, the
//! tag-invalidated response [cache], and the role [policy] gating mutations;
//! the rest is JSON plumbing around a SQLite ledger. Identity (accounts,
//! sign-in, token issuance) lives in an external service whose tokens this
//! crate verifies.

use std::{net::SocketAddr, time::Duration};

use axum_server::Handle;
use tokio::signal;

pub mod analytics;
pub mod auth;
pub mod cache;
pub mod category;
pub mod database_id;
pub mod db;
pub mod endpoints;
pub mod pagination;
pub mod policy;
pub mod transaction;

mod app_state;
mod error;
mod routes;

pub use app_state::AppState;
pub use error::Error;
pub use routes::build_router;

/// An async task that waits for either the ctrl+c or terminate signal,
/// whichever comes first, and then signals the server to shut down
/// gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}
