//! Errors from Northbound database access.

use ovn_driver_common::DriverError;
use thiserror::Error;

/// Errors from OVSDB clients and transaction handling.
#[derive(Error, Debug)]
pub enum NbError {
    #[error("OVSDB connection error: {0}")]
    Connection(String),

    #[error("OVSDB I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OVSDB JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OVSDB protocol error: {0}")]
    Protocol(String),

    /// The server reported an error for an operation in the batch.
    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("cannot decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("unsupported OVSDB endpoint: {0}")]
    UnsupportedEndpoint(String),
}

impl NbError {
    /// Creates a decode error.
    pub fn decode(what: impl Into<String>, message: impl Into<String>) -> Self {
        NbError::Decode {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Returns true if reconnecting may help.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, NbError::Connection(_) | NbError::Io(_))
    }
}

/// Result type for Northbound operations.
pub type NbResult<T> = std::result::Result<T, NbError>;

impl From<NbError> for DriverError {
    fn from(err: NbError) -> Self {
        match err {
            NbError::Transaction(message) => DriverError::transaction(message),
            other => DriverError::transaction(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = NbError::Transaction("constraint violation".to_string());
        assert_eq!(err.to_string(), "transaction error: constraint violation");

        let err = NbError::decode("Logical_Switch row", "missing name");
        assert_eq!(
            err.to_string(),
            "cannot decode Logical_Switch row: missing name"
        );
    }

    #[test]
    fn test_into_driver_error() {
        let err: DriverError = NbError::Transaction("constraint violation".into()).into();
        assert_eq!(err.to_string(), "transaction error: constraint violation");

        let err: DriverError = NbError::Connection("refused".into()).into();
        assert_eq!(err.kind(), ovn_driver_common::ErrorKind::Transaction);
    }

    #[test]
    fn test_is_connection_error() {
        assert!(NbError::Connection("refused".into()).is_connection_error());
        assert!(!NbError::Protocol("bad id".into()).is_connection_error());
    }
}
