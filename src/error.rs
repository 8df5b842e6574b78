//! Defines the app level error type and its conversion to JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The client sent malformed or out-of-range input.
    ///
    /// The message is safe to show to the client and describes which field
    /// failed validation.
    #[error("{0}")]
    Validation(String),

    /// A date range was requested with a start date after the end date.
    #[error("start date cannot be after end date")]
    InvalidRange,

    /// The caller's role does not permit the requested operation.
    #[error("insufficient permissions")]
    Forbidden,

    /// The requested resource was not found.
    ///
    /// Also returned when a resource exists but is owned by another user, so
    /// that clients cannot probe for other users' data.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The request conflicts with existing data, e.g. a duplicate category
    /// name or deleting a category that transactions still reference.
    #[error("{0}")]
    Conflict(String),

    /// A transaction referenced a category that does not exist.
    #[error("invalid category ID")]
    InvalidReference,

    /// The database is busy or unreachable. The client may retry.
    #[error("the service is temporarily unavailable")]
    Unavailable,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// An error occurred while serializing a struct as JSON.
    #[error("could not serialize as JSON: {0}")]
    JsonSerializationError(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            // The client tried to reference a non-existent category.
            rusqlite::Error::SqliteFailure(sql_error, Some(_))
                if sql_error.extended_code == 787 =>
            {
                Error::InvalidReference
            }
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("category.name") =>
            {
                Error::Conflict("Category with this name already exists".to_owned())
            }
            rusqlite::Error::SqliteFailure(sql_error, _)
                if sql_error.code == rusqlite::ErrorCode::DatabaseBusy
                    || sql_error.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                Error::Unavailable
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => Error::SqlError(error),
        }
    }
}

impl Error {
    /// The HTTP status code the error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::InvalidRange | Error::InvalidReference => {
                StatusCode::BAD_REQUEST
            }
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::SqlError(_) | Error::JsonSerializationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        // Internal errors are logged server side and replaced with a generic
        // message so implementation details are not leaked to the client.
        let error_message = match self {
            Error::SqlError(_) | Error::JsonSerializationError(_) => {
                tracing::error!("An unexpected error occurred: {self}");
                "Internal server error".to_owned()
            }
            error => error.to_string(),
        };

        (status_code, Json(json!({ "error": error_message }))).into_response()
    }
}
