//! Error types for mxwire.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for all exchange operations.
#[derive(Debug, Error)]
pub enum MxError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope serialization error.
    #[error("envelope encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Envelope deserialization error.
    #[error("envelope decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Wire-format violation. The connection is poisoned and must not be reused.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failure during the client-side identify/hello/proceed sequence.
    ///
    /// Retryable on a fresh connection, unlike failures mid-request.
    #[error("connection initialization failed: {0}")]
    ConnectionInitialization(#[source] Box<MxError>),

    /// The peer closed the stream while we awaited `PROCEED`.
    ///
    /// A silent close at that point almost always means the remote rejected
    /// our certificate during the TLS handshake above us.
    #[error("the remote closed the connection before proceeding; it likely does not trust this endpoint")]
    AuthenticationFailed,

    /// Second read of a single-use attachment stream.
    #[error("attachment stream {0} has already been consumed")]
    StreamConsumed(Uuid),

    /// Attachment stream with no content bound to it.
    #[error("attachment stream {0} has no content bound to it")]
    StreamUnbound(Uuid),

    /// Connection closed where the state machine required more input.
    #[error("connection closed")]
    ConnectionClosed,
}

impl MxError {
    /// Protocol error naming the expected and observed tokens.
    pub(crate) fn unexpected(expected: &str, observed: &str) -> Self {
        MxError::Protocol(format!("expected `{expected}`, observed `{observed}`"))
    }

    /// The underlying failure with connection-initialization wrapping removed.
    pub fn cause(&self) -> &MxError {
        match self {
            MxError::ConnectionInitialization(inner) => inner.cause(),
            other => other,
        }
    }

    /// True when this failure (or its wrapped cause) is the authentication-like
    /// close observed while awaiting `PROCEED`.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self.cause(), MxError::AuthenticationFailed)
    }
}

/// Result type alias using MxError.
pub type Result<T> = std::result::Result<T, MxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_names_both_tokens() {
        let err = MxError::unexpected("HELLO", "GREETINGS");
        let text = err.to_string();
        assert!(text.contains("HELLO"));
        assert!(text.contains("GREETINGS"));
    }

    #[test]
    fn cause_unwraps_nested_initialization_failures() {
        let err = MxError::ConnectionInitialization(Box::new(MxError::ConnectionInitialization(
            Box::new(MxError::AuthenticationFailed),
        )));
        assert!(matches!(err.cause(), MxError::AuthenticationFailed));
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn protocol_error_is_not_authentication_failure() {
        let err = MxError::Protocol("bad token".into());
        assert!(!err.is_authentication_failure());
    }
}
