use std::fmt;

/// Marker the store puts in errors for queries lacking a composite index.
const MISSING_INDEX_MARKER: &str = "requires an index";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Session is not open")]
    NotInitialized,

    #[error("Missing composite index: {message}")]
    MissingIndex { message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn invalid(message: impl fmt::Display) -> Self {
        Error::InvalidInput(message.to_string())
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }

    pub fn is_missing_index(&self) -> bool {
        matches!(self, Error::MissingIndex { .. })
    }

    /// Log this error for operation `op` at a level matching its severity.
    /// Missing indexes are escalated with instructions for the operator.
    pub fn log(&self, op: &str) {
        match self {
            Error::MissingIndex { message } => {
                tracing::error!(op, %message, "Store query needs a composite index");
                tracing::error!(
                    op,
                    "Create the index from the link in the message above (Firestore console, \
                     Indexes tab), e.g. a collection group index on 'transacciones' with \
                     'fecha' descending, then retry"
                );
            }
            Error::NotInitialized => tracing::error!(op, "Session is not open"),
            Error::InvalidInput(message) => tracing::warn!(op, %message, "Rejected input"),
            Error::NotFound(what) => tracing::warn!(op, %what, "Not found"),
            Error::Store(err) => tracing::error!(op, error = ?err, "Store operation failed"),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        if message.contains(MISSING_INDEX_MARKER) {
            Error::MissingIndex { message }
        } else {
            Error::Store(err)
        }
    }
}
