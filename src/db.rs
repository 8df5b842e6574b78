//! Database schema creation and connection setup.

use std::time::Duration;

use rusqlite::Connection;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{Error, category, transaction};

/// How long a store call may wait on a busy database before failing with
/// [Error::Unavailable](crate::Error::Unavailable).
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the database by creating the tables for the domain models.
///
/// Also enables foreign key enforcement, which is the authoritative guard for
/// category references: application level pre-checks give friendlier errors,
/// but a concurrent category deletion between check and write still surfaces
/// as a constraint violation rather than corrupt data.
///
/// # Errors
/// Returns an [Error::SqlError] if the tables could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;
    connection.busy_timeout(BUSY_TIMEOUT)?;

    category::create_category_table(connection)?;
    transaction::create_transaction_table(connection)?;

    Ok(())
}

/// Render a timestamp as the RFC 3339 text stored in timestamp columns.
///
/// Timestamps are always UTC, so the rendered strings sort chronologically
/// and round-trip through [parse_timestamp_column].
pub(crate) fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .expect("UTC timestamps are RFC 3339 representable")
}

/// Parse a timestamp column previously written by [format_timestamp].
pub(crate) fn parse_timestamp_column(
    column: usize,
    text: &str,
) -> Result<OffsetDateTime, rusqlite::Error> {
    OffsetDateTime::parse(text, &Rfc3339).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            Box::new(error),
        )
    })
}

#[cfg(test)]
mod initialize_tests {
    use rusqlite::Connection;

    use super::initialize;

    #[test]
    fn creates_tables() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).expect("Could not initialize database");

        let table_count: i64 = connection
            .prepare(
                "SELECT COUNT(*) FROM sqlite_master \
                 WHERE type = 'table' AND name IN ('category', 'transaction')",
            )
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap();

        assert_eq!(table_count, 2);
    }

    #[test]
    fn is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).expect("Could not initialize database");
        initialize(&connection).expect("Initializing twice should not fail");
    }

    #[test]
    fn enforces_foreign_keys() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();

        let result = connection.execute(
            "INSERT INTO \"transaction\" \
             (user_id, category_id, amount, kind, date, created_at, updated_at) \
             VALUES (1, 999, 1.0, 'expense', '2026-01-01', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            (),
        );

        assert!(result.is_err(), "insert with dangling category succeeded");
    }
}
