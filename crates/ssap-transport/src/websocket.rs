//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each opened connection is split into two tasks:
//! - a writer that drains an unbounded channel fed by
//!   [`Connection::send`] / [`Connection::close`], and
//! - a reader that forwards every frame to the [`TransportHandler`].

use std::io;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::{Connection, ConnectionId, Transport, TransportError, TransportHandler};

/// Work items for the writer task.
enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// A [`Transport`] that opens client websocket connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport. It holds no state of its own.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn open(
        &self,
        url: &str,
        protocols: &[String],
        handler: Arc<dyn TransportHandler>,
    ) -> Result<Self::Connection, TransportError> {
        let mut request = url.into_client_request().map_err(|e| {
            TransportError::ConnectFailed(io::Error::new(
                io::ErrorKind::InvalidInput,
                e,
            ))
        })?;

        if !protocols.is_empty() {
            let value =
                HeaderValue::from_str(&protocols.join(", ")).map_err(|e| {
                    TransportError::ConnectFailed(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        e,
                    ))
                })?;
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let id = ConnectionId::next();
        tracing::info!(%id, url, "websocket connection established");

        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Frame(data) => {
                        // SSAP is JSON text; anything that is not UTF-8
                        // goes out as a binary frame.
                        let msg = match String::from_utf8(data) {
                            Ok(text) => Message::text(text),
                            Err(e) => Message::binary(e.into_bytes()),
                        };
                        if let Err(e) = sink.send(msg).await {
                            tracing::debug!(%id, error = %e, "websocket send failed");
                            break;
                        }
                    }
                    Outbound::Close => {
                        if let Err(e) = sink.close().await {
                            tracing::debug!(%id, error = %e, "websocket close failed");
                        }
                        break;
                    }
                }
            }
            tracing::trace!(%id, "websocket writer stopped");
        });

        handler.on_open(id);

        tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        handler.on_data(id, text.as_bytes().to_vec());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        handler.on_data(id, data.to_vec());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| {
                            format!("{} {}", u16::from(f.code), f.reason.as_str())
                        });
                    }
                    Some(Ok(_)) => continue, // ping/pong/raw frame
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                }
            };
            tracing::info!(%id, reason = ?reason, "websocket connection closed");
            handler.on_close(id, reason);
        });

        Ok(WebSocketConnection {
            id,
            outbound: outbound_tx,
        })
    }
}

/// A single client websocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Connection for WebSocketConnection {
    fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        self.outbound.send(Outbound::Frame(data)).map_err(|_| {
            TransportError::ConnectionClosed(format!(
                "{} writer has stopped",
                self.id
            ))
        })
    }

    fn close(&self) -> Result<(), TransportError> {
        self.outbound.send(Outbound::Close).map_err(|_| {
            TransportError::ConnectionClosed(format!(
                "{} writer has stopped",
                self.id
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
