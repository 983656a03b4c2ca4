//! Error types for service client operations.

use std::io;
use thiserror::Error;

use crate::types::ServiceKind;

/// Errors that can occur while preparing, connecting or looking up services.
#[derive(Error, Debug)]
pub enum DuctError {
    /// I/O error while prompting or probing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No implementation is registered for the requested protocol.
    #[error("Missing implementation for protocol: '{0}'")]
    UnknownProtocol(String),

    /// Generic configuration problem.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A host was configured without a port.
    #[error("Host specified but no port specified: '{0}'")]
    HostWithoutPort(String),

    /// A port was configured without a host.
    #[error("Port specified but no host provided: {0}")]
    PortWithoutHost(u16),

    /// Port value could not be coerced into a valid port number.
    #[error("Invalid port: '{0}'")]
    InvalidPort(String),

    /// A collaborator was not of the expected capability.
    #[error("Provided {field} is not a {expected} collaborator (found {found})")]
    CollaboratorMismatch {
        field: &'static str,
        expected: ServiceKind,
        found: String,
    },

    /// The service could not be reached from the local machine.
    #[error(
        "Cannot connect to '{host}:{port}' on your current connection. Please check your connection before trying again."
    )]
    LocalUnreachable { host: String, port: u16 },

    /// The service could not be reached through the attached tunnel.
    #[error(
        "Remote '{tunnel}' cannot connect to '{host}:{port}'. Please check your settings before trying again."
    )]
    RemoteUnreachable {
        tunnel: String,
        host: String,
        port: u16,
    },

    /// None of the candidate hosts answered.
    #[error("Unable to connect to any of the hosts: {}", .0.join(", "))]
    NoAvailableHost(Vec<String>),

    /// Registry lookup found nothing.
    #[error("No {kind} named '{name}' in registry")]
    LookupFailed { name: String, kind: ServiceKind },

    /// Registry lookup matched more than one entry.
    #[error("Ambiguous lookup for {kind} '{name}': {count} matches")]
    AmbiguousLookup {
        name: String,
        kind: ServiceKind,
        count: usize,
    },

    /// A tunnel failed to manage a port forward.
    #[error("Tunnel '{tunnel}' error: {message}")]
    Tunnel { tunnel: String, message: String },

    /// Error raised by a protocol implementation's hook.
    #[error(transparent)]
    Protocol(Box<dyn std::error::Error + Send + Sync>),
}

/// Result type alias for service client operations.
pub type Result<T> = std::result::Result<T, DuctError>;

impl DuctError {
    /// Create a new configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Wrap an error raised by a protocol driver.
    pub fn protocol<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Protocol(err.into())
    }

    /// Create a new tunnel error.
    pub fn tunnel(tunnel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tunnel {
            tunnel: tunnel.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the server could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::LocalUnreachable { .. } | Self::RemoteUnreachable { .. }
        )
    }

    /// Check if this error stems from inconsistent configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::HostWithoutPort(_)
                | Self::PortWithoutHost(_)
                | Self::InvalidPort(_)
                | Self::CollaboratorMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DuctError::UnknownProtocol("presto".into());
        assert_eq!(
            format!("{err}"),
            "Missing implementation for protocol: 'presto'"
        );

        let err = DuctError::LocalUnreachable {
            host: "10.0.0.5".into(),
            port: 9999,
        };
        assert!(format!("{err}").contains("'10.0.0.5:9999'"));

        let err = DuctError::RemoteUnreachable {
            tunnel: "bastion".into(),
            host: "db.internal".into(),
            port: 5432,
        };
        assert!(
            format!("{err}").starts_with("Remote 'bastion' cannot connect to 'db.internal:5432'")
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(DuctError::HostWithoutPort("h".into()).is_configuration());
        assert!(DuctError::PortWithoutHost(80).is_configuration());
        assert!(!DuctError::PortWithoutHost(80).is_unreachable());
        assert!(
            DuctError::LocalUnreachable {
                host: "h".into(),
                port: 1
            }
            .is_unreachable()
        );
    }

    #[test]
    fn test_protocol_error_is_transparent() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused by driver");
        let err = DuctError::protocol(io_err);
        assert_eq!(format!("{err}"), "refused by driver");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "test");
        let err: DuctError = io_err.into();
        assert!(matches!(err, DuctError::Io(_)));
    }
}
