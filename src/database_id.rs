//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseID = i64;

/// Alias for the integer type identifying a user.
///
/// User accounts live in the external identity service; this crate only ever
/// sees the ID carried by a verified token.
pub type UserID = i64;
