use tracing::error;
use transit_core::StoreError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Maps a failed insert or update onto the storage error taxonomy.
pub(crate) fn map_db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(mapped) = classify(db.code().as_deref(), db.constraint(), false) {
            return mapped;
        }
    }
    error!(error = %err, "Database operation failed");
    StoreError::Backend(err.to_string())
}

/// Same as `map_db_error`, except a foreign key violation means the row is
/// still referenced (RESTRICT) rather than pointing at a missing row.
pub(crate) fn map_delete_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(mapped) = classify(db.code().as_deref(), db.constraint(), true) {
            return mapped;
        }
    }
    error!(error = %err, "Database delete failed");
    StoreError::Backend(err.to_string())
}

fn classify(code: Option<&str>, constraint: Option<&str>, deleting: bool) -> Option<StoreError> {
    let constraint = constraint.unwrap_or("unnamed constraint").to_string();
    match code {
        Some(UNIQUE_VIOLATION) => Some(StoreError::Conflict(constraint)),
        Some(FOREIGN_KEY_VIOLATION) if deleting => Some(StoreError::Conflict(constraint)),
        Some(FOREIGN_KEY_VIOLATION) => Some(StoreError::MissingReference(constraint)),
        _ => None,
    }
}
