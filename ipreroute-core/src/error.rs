//! Error types for IP Reroute.
//!
//! Two families of errors exist and neither ever escapes to the client:
//! - lookup errors, absorbed by the decision engine (fail open)
//! - forward errors, translated into a `502 Bad Gateway` by the forwarder

use std::time::Duration;

use thiserror::Error;

/// Result type alias for IP Reroute operations.
pub type Result<T> = std::result::Result<T, RerouteError>;

/// Unified error type for IP Reroute operations.
///
/// # Example
///
/// ```
/// use ipreroute_core::error::RerouteError;
/// use std::time::Duration;
///
/// let err = RerouteError::LookupTimeout(Duration::from_millis(50));
/// assert_eq!(err.kind(), "lookup-timeout");
/// ```
#[derive(Debug, Error)]
pub enum RerouteError {
    /// The flag store did not answer before the deadline.
    #[error("Flag store lookup timed out after {0:?}")]
    LookupTimeout(Duration),

    /// Could not open a connection to the flag store.
    #[error("Flag store connection failed: {0}")]
    LookupConnect(#[source] std::io::Error),

    /// The flag store answered with something we could not interpret.
    #[error("Flag store protocol error: {0}")]
    LookupProtocol(String),

    /// Could not reach the reroute destination.
    #[error("Reroute destination unreachable: {0}")]
    ForwardDial(String),

    /// TLS handshake with the reroute destination failed.
    #[error("TLS handshake with reroute destination failed: {0}")]
    ForwardTls(String),

    /// Request or response could not be written or read.
    #[error("Forwarding I/O error: {0}")]
    ForwardIo(String),

    /// Component could not be constructed from its configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RerouteError {
    /// Stable identifier used as the `kind` field in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LookupTimeout(_) => "lookup-timeout",
            Self::LookupConnect(_) => "lookup-connect-failure",
            Self::LookupProtocol(_) => "lookup-protocol-error",
            Self::ForwardDial(_) => "forward-dial-failure",
            Self::ForwardTls(_) => "forward-tls-failure",
            Self::ForwardIo(_) => "forward-io-failure",
            Self::Config(_) => "config",
        }
    }

    /// Returns the HTTP status code for errors that end up in a response.
    ///
    /// Lookup errors are absorbed by the decision engine and never produce a
    /// response of their own.
    pub fn status_code(&self) -> hyper::StatusCode {
        use hyper::StatusCode;

        match self {
            Self::ForwardDial(_) | Self::ForwardTls(_) | Self::ForwardIo(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the sanitized message sent to clients.
    ///
    /// Never contains addresses or error details.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ForwardDial(_) | Self::ForwardTls(_) | Self::ForwardIo(_) => "Bad Gateway",
            _ => "Internal Server Error",
        }
    }
}
