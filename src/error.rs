use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),

    #[error("PIN incorrecto. Inténtalo de nuevo.")]
    InvalidPin,

    #[error("State lock poisoned: {0}")]
    Lock(String),

    #[error("Edit mode is locked")]
    EditLocked,

    #[error("Not found: {entity} {id}")]
    NotFound { entity: String, id: String },
}

impl TrackerError {
    /// SQLite reported contention that a later attempt may not hit.
    pub fn is_transient(&self) -> bool {
        match self {
            TrackerError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_transient() {
        let err = TrackerError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn validation_is_not_transient() {
        assert!(!TrackerError::Validation("x".into()).is_transient());
        assert!(!TrackerError::InvalidPin.is_transient());
    }
}
