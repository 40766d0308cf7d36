/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed (bad URL, refused, handshake error).
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The connection is no longer usable: its writer has stopped or the
    /// peer closed it.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}
