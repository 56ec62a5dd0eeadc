//! Error types for driver operations.
//!
//! Every lifecycle operation reports failures through [`DriverError`]. The
//! variants follow the driver's error taxonomy: missing objects, uniqueness
//! conflicts, failed Northbound transactions and failed host wiring, plus the
//! lower level shell and configuration failures those are built from.

use std::io;
use thiserror::Error;

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Coarse classification of a [`DriverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced network, port or bridge does not exist.
    NotFound,
    /// Duplicate subnet, IP address or port name.
    Conflict,
    /// The Northbound database rejected a batch.
    Transaction,
    /// A host interface primitive failed.
    HostWiring,
    /// Bad input or configuration.
    InvalidInput,
    /// Anything else.
    Internal,
}

/// Errors that can occur while driving the Northbound database and the host.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Referenced object is missing.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Object kind (e.g. "logical switch", "network").
        kind: String,
        /// Object name or identifier.
        name: String,
    },

    /// Uniqueness invariant would be violated.
    #[error("{message}")]
    Conflict {
        /// Human readable description of the clash.
        message: String,
    },

    /// Endpoint metadata missing from the logical switch.
    #[error("endpoint metadata not found in logical switch {switch}")]
    MetadataNotFound {
        /// Logical switch that was searched.
        switch: String,
    },

    /// A Northbound transaction failed or reported an error.
    #[error("transaction error: {message}")]
    Transaction {
        /// Underlying database message.
        message: String,
    },

    /// A host interface primitive failed.
    #[error("host wiring failed during {step}: {message}")]
    HostWiring {
        /// The wiring step (e.g. "create veth pair").
        step: String,
        /// Error message.
        message: String,
    },

    /// A host command could not be started.
    #[error("cannot run '{command}': {source}")]
    ShellExec {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A host command exited non-zero.
    #[error("'{command}' exited with {exit_code}: {output}")]
    ShellCommandFailed {
        command: String,
        exit_code: i32,
        /// stdout and stderr, joined
        output: String,
    },

    /// A request field or daemon setting is missing or malformed.
    #[error("invalid {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Unexpected driver state.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DriverError {
    /// Creates a not found error.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a host wiring error.
    pub fn host_wiring(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HostWiring {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid input error for `field`.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::NotFound { .. } | DriverError::MetadataNotFound { .. } => {
                ErrorKind::NotFound
            }
            DriverError::Conflict { .. } => ErrorKind::Conflict,
            DriverError::Transaction { .. } => ErrorKind::Transaction,
            DriverError::HostWiring { .. }
            | DriverError::ShellExec { .. }
            | DriverError::ShellCommandFailed { .. } => ErrorKind::HostWiring,
            DriverError::InvalidConfig { .. } => ErrorKind::InvalidInput,
            DriverError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if a teardown path may treat this error as "already gone".
    pub fn is_teardown_tolerable(&self) -> bool {
        matches!(self, DriverError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::not_found("logical switch", "ls-0123456789ab");
        assert_eq!(err.to_string(), "logical switch ls-0123456789ab not found");
    }

    #[test]
    fn test_transaction_error() {
        let err = DriverError::transaction("referential integrity violation");
        assert_eq!(
            err.to_string(),
            "transaction error: referential integrity violation"
        );
    }

    #[test]
    fn test_failed_host_command_is_wiring_error() {
        let err = DriverError::ShellCommandFailed {
            command: "/sbin/ip link del veth0123456".to_string(),
            exit_code: 1,
            output: "Cannot find device".to_string(),
        };
        assert!(err.to_string().contains("ip link del"));
        assert!(err.to_string().contains("exited with 1"));
        assert_eq!(err.kind(), ErrorKind::HostWiring);
    }

    #[test]
    fn test_kind() {
        assert_eq!(
            DriverError::conflict("subnet in use").kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            DriverError::MetadataNotFound {
                switch: "ls-x".to_string()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DriverError::host_wiring("set mac", "boom").kind(),
            ErrorKind::HostWiring
        );
        assert_eq!(
            DriverError::invalid_config("subnet", "missing").kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_is_teardown_tolerable() {
        assert!(DriverError::not_found("port", "lsp-x").is_teardown_tolerable());
        assert!(!DriverError::transaction("boom").is_teardown_tolerable());
        assert!(!DriverError::internal("bug").is_teardown_tolerable());
    }
}
