//! Transport abstraction layer for the SSAP client.
//!
//! The protocol engine never touches sockets. It talks to a [`Transport`]
//! that opens one [`Connection`] per endpoint and reports what happens on
//! it through a [`TransportHandler`]:
//!
//! ```text
//! engine ──open/send/close──→ Transport / Connection
//! engine ←─on_open/on_data/on_close── TransportHandler callbacks
//! ```
//!
//! Callbacks are invoked from the transport's own tasks, so handler code
//! runs on the transport's delivery context, not on the caller's.
//!
//! # Feature Flags
//!
//! - `websocket` (default): websocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a fresh, process-unique identifier.
    ///
    /// Transport implementations call this once per opened connection.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Receives the notifications a connection produces.
///
/// Every method is called synchronously from the transport's reader
/// context and should return quickly.
pub trait TransportHandler: Send + Sync + 'static {
    /// The connection identified by `id` is open and ready to send.
    fn on_open(&self, id: ConnectionId);

    /// A complete frame arrived on connection `id`.
    fn on_data(&self, id: ConnectionId, data: Vec<u8>);

    /// Connection `id` is gone. `reason` is a human-readable cause when
    /// the peer or the transport supplied one.
    fn on_close(&self, id: ConnectionId, reason: Option<String>);
}

/// Opens outbound connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Opens a connection to `url`, negotiating `protocols` as
    /// subprotocols, and wires its events to `handler`.
    ///
    /// Implementations must call [`TransportHandler::on_open`] once the
    /// connection can carry data, either before or after this future
    /// resolves.
    fn open(
        &self,
        url: &str,
        protocols: &[String],
        handler: Arc<dyn TransportHandler>,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single open connection.
///
/// `send` and `close` only hand work to the transport and never wait for
/// the network, which is what lets the engine call them from inside a
/// [`TransportHandler`] callback.
pub trait Connection: Send + Sync + 'static {
    /// Queues `data` for delivery to the remote peer.
    fn send(&self, data: Vec<u8>) -> Result<(), TransportError>;

    /// Asks the transport to close the connection gracefully.
    fn close(&self) -> Result<(), TransportError>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
