// ================================================================
// File: chatdesk-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The persistence layer could not be reached or refused the operation.
    /// Callers of a whole cycle retry these with backoff.
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// A compare-and-set lost against a concurrent writer. Never surfaced as a
    /// cycle failure; the entity is re-evaluated on the next pass.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Missing or invalid SLA policy / agent capacity configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested transition does not apply to the entity's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Uuid error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Event bus error: {0}")]
    EventBus(String),
}

impl Error {
    /// True for failures worth retrying on a later attempt (store outages,
    /// dropped connections, pool exhaustion, timeouts, serialization and
    /// resource errors reported by Postgres).
    pub fn is_transient(&self) -> bool {
        match self {
            Error::TransientStore(_) | Error::Timeout(_) => true,
            Error::Database(e) => match e {
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
                _ => false,
            },
            _ => false,
        }
    }

    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, Error::ConcurrentModification(_))
    }
}

/// SQLSTATE classes that may succeed on retry: connection exception (08),
/// transaction rollback (40), insufficient resources (53) and operator
/// intervention (57).
pub fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code.get(..2), Some("08" | "40" | "53" | "57"))
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}
