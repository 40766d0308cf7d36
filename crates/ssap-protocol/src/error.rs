//! Error types for the protocol layer.
//!
//! Decode failures always keep the raw text that could not be understood,
//! so a log line is enough to reproduce a broker quirk.

use crate::MessageType;

/// Errors that can occur while encoding or decoding SSAP messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The inbound frame is not UTF-8 text.
    #[error("frame is not valid UTF-8: {fragment}")]
    InvalidUtf8 { fragment: String },

    /// A JSON document (the frame, a string-encoded body, or a repaired
    /// `data` field) could not be parsed.
    #[error("malformed JSON ({source}): {fragment}")]
    MalformedJson {
        #[source]
        source: serde_json::Error,
        fragment: String,
    },

    /// The frame parsed, but is not a JSON object with the envelope
    /// fields every SSAP message has.
    #[error("missing or invalid `{field}` in {fragment}")]
    InvalidEnvelope {
        field: &'static str,
        fragment: String,
    },

    /// The body does not have the layout its message type requires.
    #[error("malformed {message_type} body ({source}): {fragment}")]
    MalformedBody {
        message_type: MessageType,
        #[source]
        source: serde_json::Error,
        fragment: String,
    },

    /// `messageType` is not one of the known kinds.
    #[error("unknown message type `{0}`")]
    UnknownMessageType(String),

    /// `direction` is not REQUEST, RESPONSE or ERROR.
    #[error("unknown direction `{0}`")]
    UnknownDirection(String),

    /// `queryType` is not one of the known query types.
    #[error("unknown query type `{0}`")]
    UnknownQueryType(String),

    /// `errorCode` is present but not one of the known codes.
    #[error("unknown error code `{0}`")]
    UnknownErrorCode(String),
}

impl ProtocolError {
    /// The raw offending text, for decode errors.
    pub fn fragment(&self) -> Option<&str> {
        match self {
            ProtocolError::Encode(_) => None,
            ProtocolError::InvalidUtf8 { fragment }
            | ProtocolError::MalformedJson { fragment, .. }
            | ProtocolError::InvalidEnvelope { fragment, .. }
            | ProtocolError::MalformedBody { fragment, .. } => Some(fragment),
            ProtocolError::UnknownMessageType(token)
            | ProtocolError::UnknownDirection(token)
            | ProtocolError::UnknownQueryType(token)
            | ProtocolError::UnknownErrorCode(token) => Some(token),
        }
    }
}
