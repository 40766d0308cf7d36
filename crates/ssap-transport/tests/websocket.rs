//! Integration tests for the websocket transport.
//!
//! These tests spin up a real loopback websocket server so the transport
//! is exercised over an actual TCP connection.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use ssap_transport::{
        Connection, ConnectionId, Transport, TransportError, TransportHandler,
        WebSocketTransport,
    };
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request, Response,
    };

    #[derive(Debug, PartialEq)]
    enum Event {
        Open(ConnectionId),
        Data(ConnectionId, Vec<u8>),
        Close(ConnectionId),
    }

    /// Forwards every transport notification into a channel.
    struct Recorder(mpsc::UnboundedSender<Event>);

    impl TransportHandler for Recorder {
        fn on_open(&self, id: ConnectionId) {
            let _ = self.0.send(Event::Open(id));
        }

        fn on_data(&self, id: ConnectionId, data: Vec<u8>) {
            let _ = self.0.send(Event::Data(id, data));
        }

        fn on_close(&self, id: ConnectionId, _reason: Option<String>) {
            let _ = self.0.send(Event::Close(id));
        }
    }

    /// Starts a one-shot server that echoes the subprotocol header,
    /// answers the first text frame with `ack:<frame>`, then closes.
    async fn start_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("local addr").to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("should accept");
            let mut ws = tokio_tungstenite::accept_hdr_async(
                stream,
                |req: &Request, mut resp: Response| {
                    if let Some(protocol) =
                        req.headers().get("Sec-WebSocket-Protocol")
                    {
                        resp.headers_mut()
                            .insert("Sec-WebSocket-Protocol", protocol.clone());
                    }
                    Ok::<Response, ErrorResponse>(resp)
                },
            )
            .await
            .expect("server handshake");

            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let reply = format!("ack:{}", text.as_str());
                    ws.send(Message::text(reply)).await.expect("reply");
                    ws.close(None).await.expect("close");
                    break;
                }
            }
        });

        format!("ws://{addr}")
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event should arrive in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_websocket_open_send_receive_close() {
        let url = start_echo_server().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn = WebSocketTransport::new()
            .open(&url, &["http_only".to_string()], Arc::new(Recorder(tx)))
            .await
            .expect("should connect");

        assert_eq!(next_event(&mut rx).await, Event::Open(conn.id()));

        conn.send(br#"{"messageType":"JOIN"}"#.to_vec())
            .expect("send should queue");

        assert_eq!(
            next_event(&mut rx).await,
            Event::Data(conn.id(), br#"ack:{"messageType":"JOIN"}"#.to_vec())
        );
        assert_eq!(next_event(&mut rx).await, Event::Close(conn.id()));
    }

    #[tokio::test]
    async fn test_websocket_open_refused_returns_connect_failed() {
        // Grab a free port, then release it so nothing is listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = WebSocketTransport::new()
            .open(&format!("ws://{addr}"), &[], Arc::new(Recorder(tx)))
            .await;

        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_websocket_open_invalid_url_returns_connect_failed() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = WebSocketTransport::new()
            .open("not a url", &[], Arc::new(Recorder(tx)))
            .await;

        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_websocket_send_after_close_eventually_fails() {
        let url = start_echo_server().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn = WebSocketTransport::new()
            .open(&url, &["http_only".to_string()], Arc::new(Recorder(tx)))
            .await
            .expect("should connect");
        let _ = next_event(&mut rx).await;

        conn.close().expect("close should queue");

        // Once the writer task has drained the close request it stops,
        // and further sends report a closed connection.
        let mut failed = false;
        for _ in 0..50 {
            if conn.send(b"late".to_vec()).is_err() {
                failed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(failed, "send should fail after the writer stops");
    }
}
