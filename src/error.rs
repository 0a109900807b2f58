//! Error type shared by the store, analyzer, reconciler and exporter.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required field was missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The spreadsheet could not be read or does not have the expected shape.
    #[error("spreadsheet error: {0}")]
    SourceFormat(String),

    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub(crate) fn student_not_found(id: i64) -> Self {
        Error::NotFound {
            entity: "student",
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::student_not_found(7).to_string(),
            "student 7 not found"
        );
        let timeout = Error::Timeout {
            operation: "spreadsheet read",
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.to_string(), "spreadsheet read timed out after 30s");
    }
}
