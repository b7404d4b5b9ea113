//! Venue error types
//!
//! All errors raised while talking to a remote collaborator (perp venue,
//! swap service, bridge, chain RPC) are wrapped in `VenueError`. The
//! retry layer only looks at `is_retryable()`.

use thiserror::Error;

/// Errors raised by adapters for the perp venue, swap service, bridges and chains
#[derive(Error, Debug)]
pub enum VenueError {
    /// Could not reach the remote service
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Call did not complete within the per-call timeout
    #[error("Network timeout after {0}ms")]
    NetworkTimeout(u64),

    /// Response could not be parsed or violated the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Remote side understood the request and refused it
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON-RPC failure talking to a chain node
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Transaction mined but reverted
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// Could not sign a request
    #[error("Signing error: {0}")]
    Signing(String),

    /// Health check failed
    #[error("Service unhealthy: {0}")]
    Unhealthy(String),

    /// The adapter has no route for the requested operation
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl VenueError {
    /// Whether a retry has a chance of succeeding
    pub fn is_retryable(&self) -> bool {
        match self {
            VenueError::ConnectionFailed(_)
            | VenueError::NetworkTimeout(_)
            | VenueError::Rpc(_)
            | VenueError::Unhealthy(_) => true,
            VenueError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            VenueError::InvalidResponse(_)
            | VenueError::Rejected(_)
            | VenueError::Reverted(_)
            | VenueError::Signing(_)
            | VenueError::Unsupported(_) => false,
        }
    }
}

/// Result type alias for venue operations
pub type VenueResult<T> = std::result::Result<T, VenueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed_display() {
        let err = VenueError::ConnectionFailed("timeout".to_string());
        assert_eq!(err.to_string(), "Connection failed: timeout");
    }

    #[test]
    fn test_network_timeout_display() {
        let err = VenueError::NetworkTimeout(5000);
        assert_eq!(err.to_string(), "Network timeout after 5000ms");
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(VenueError::ConnectionFailed("x".into()).is_retryable());
        assert!(VenueError::NetworkTimeout(10).is_retryable());
        assert!(VenueError::Rpc("nonce too low".into()).is_retryable());
        assert!(VenueError::Unhealthy("503".into()).is_retryable());
    }

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        assert!(!VenueError::Rejected("insufficient margin".into()).is_retryable());
        assert!(!VenueError::Reverted("0xdead".into()).is_retryable());
        assert!(!VenueError::InvalidResponse("bad json".into()).is_retryable());
        assert!(!VenueError::Signing("bad key".into()).is_retryable());
        assert!(!VenueError::Unsupported("unichain -> base".into()).is_retryable());
    }
}
