//! Unified error type for the SSAP client.

use ssap_protocol::ProtocolError;
use ssap_session::SessionError;
use ssap_transport::TransportError;

/// Top-level error that wraps the layer-specific errors.
///
/// A broker answer with `ok: false` is never an error: it reaches the
/// callback as a normal message.
#[derive(Debug, thiserror::Error)]
pub enum SsapError {
    /// Sending on an open connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A request could not be encoded, or an inbound frame decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The operation is not allowed right now: the connection is not
    /// open, or the session is not in a state that permits it. Nothing
    /// was queued.
    #[error("invalid operation: {reason}")]
    InvalidOperation {
        reason: String,
        /// The session-layer refusal, when the session caused it.
        #[source]
        source: Option<SessionError>,
    },

    /// The connection to the broker could not be established. The session
    /// has been reset.
    #[error("could not connect to {url}: {reason}")]
    Connection { url: String, reason: String },

    /// Handler (un)registration was rejected.
    #[error("invalid callback: {0}")]
    InvalidCallback(String),
}

impl From<SessionError> for SsapError {
    fn from(err: SessionError) -> Self {
        SsapError::InvalidOperation {
            reason: err.to_string(),
            source: Some(err),
        }
    }
}

impl SsapError {
    pub(crate) fn invalid_operation(reason: impl Into<String>) -> Self {
        SsapError::InvalidOperation {
            reason: reason.into(),
            source: None,
        }
    }

    /// `true` for every refusal caused by calling an operation in the
    /// wrong state.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, SsapError::InvalidOperation { .. })
    }

    /// The session-layer cause of an [`SsapError::InvalidOperation`].
    pub fn session_error(&self) -> Option<&SessionError> {
        match self {
            SsapError::InvalidOperation { source, .. } => source.as_ref(),
            _ => None,
        }
    }
}
