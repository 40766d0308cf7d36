//! Error types for the session layer.

/// Operations refused because the session is in the wrong state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The operation needs a session key, and no JOIN has succeeded
    /// (or a LEAVE has since succeeded).
    #[error("no active session: JOIN first")]
    NotJoined,

    /// Renewing needs the token of a token-based JOIN.
    #[error("session was not opened with a token, cannot renew")]
    NoToken,

    /// UNSUBSCRIBE before any SUBSCRIBE in this session.
    #[error("no SUBSCRIBE has been issued in this session")]
    NoSubscription,
}
