//! In-memory transport and helpers shared by the endpoint tests.

#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};
use ssap::{
    Callback, Connection, ConnectionId, Endpoint, EndpointBuilder, Message,
    Transport, TransportError, TransportHandler,
};

#[derive(Default)]
struct Wire {
    handler: Mutex<Option<Arc<dyn TransportHandler>>>,
    current: Mutex<Option<ConnectionId>>,
    sent: Mutex<Vec<Vec<u8>>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    refuse: AtomicBool,
    stay_silent: AtomicBool,
    close_on_open: AtomicBool,
}

/// A transport that records what the endpoint sends and lets the test
/// play the broker.
#[derive(Clone, Default)]
pub struct MockTransport {
    wire: Arc<Wire>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `open` fail.
    pub fn refuse_connections(&self) {
        self.wire.refuse.store(true, Ordering::SeqCst);
    }

    /// Makes `open` succeed without ever reporting the connection open.
    pub fn never_signal_open(&self) {
        self.wire.stay_silent.store(true, Ordering::SeqCst);
    }

    /// Makes `open` report the connection closed instead of open.
    pub fn close_during_handshake(&self) {
        self.wire.close_on_open.store(true, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.wire.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.wire.closes.load(Ordering::SeqCst)
    }

    /// Every frame sent so far, decoded as JSON.
    pub fn sent(&self) -> Vec<Value> {
        self.wire
            .sent
            .lock()
            .iter()
            .map(|frame| serde_json::from_slice(frame).expect("endpoint sends JSON"))
            .collect()
    }

    pub fn sent_raw(&self) -> Vec<Vec<u8>> {
        self.wire.sent.lock().clone()
    }

    /// `messageType` of every frame sent so far.
    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|frame| frame["messageType"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Delivers a frame from the broker on the current connection.
    pub fn deliver(&self, frame: impl Into<Vec<u8>>) {
        let (handler, id) = self.endpoint_side();
        handler.on_data(id, frame.into());
    }

    /// The broker drops the connection.
    pub fn drop_connection(&self) {
        let (handler, id) = self.endpoint_side();
        handler.on_close(id, Some("1006 abnormal".into()));
    }

    fn endpoint_side(&self) -> (Arc<dyn TransportHandler>, ConnectionId) {
        let handler = self.wire.handler.lock().clone().expect("transport opened");
        let id = self.wire.current.lock().expect("transport opened");
        (handler, id)
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn open(
        &self,
        _url: &str,
        _protocols: &[String],
        handler: Arc<dyn TransportHandler>,
    ) -> Result<MockConnection, TransportError> {
        self.wire.opens.fetch_add(1, Ordering::SeqCst);
        if self.wire.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        let id = ConnectionId::next();
        *self.wire.handler.lock() = Some(Arc::clone(&handler));
        *self.wire.current.lock() = Some(id);
        if self.wire.close_on_open.load(Ordering::SeqCst) {
            handler.on_close(id, Some("handshake rejected".into()));
        } else if !self.wire.stay_silent.load(Ordering::SeqCst) {
            handler.on_open(id);
        }
        Ok(MockConnection {
            id,
            wire: Arc::clone(&self.wire),
        })
    }
}

pub struct MockConnection {
    id: ConnectionId,
    wire: Arc<Wire>,
}

impl Connection for MockConnection {
    fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        self.wire.sent.lock().push(data);
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.wire.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Collects every message the endpoint delivers.
#[derive(Clone, Default)]
pub struct Recorder {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl Recorder {
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }
}

impl Callback for Recorder {
    fn on_message(&self, msg: &Message) {
        self.messages.lock().push(msg.clone());
    }
}

pub fn endpoint_with(callback: impl Callback) -> (Endpoint<MockTransport>, MockTransport) {
    let transport = MockTransport::new();
    let endpoint = EndpointBuilder::new()
        .url("ws://sib.test/sib/api_websocket")
        .build(transport.clone(), callback);
    (endpoint, transport)
}

pub fn recording_endpoint() -> (Endpoint<MockTransport>, MockTransport, Recorder) {
    let recorder = Recorder::default();
    let (endpoint, transport) = endpoint_with(recorder.clone());
    (endpoint, transport, recorder)
}

/// A broker response frame.
pub fn response(kind: &str, ok: bool, data: Value, session_key: Option<&str>) -> Vec<u8> {
    let mut body = json!({"ok": ok, "data": data, "error": null, "errorCode": null});
    if !ok {
        body["errorCode"] = json!("OTHER");
        body["error"] = json!("refused");
    }
    json!({
        "body": body,
        "direction": if ok { "RESPONSE" } else { "ERROR" },
        "messageType": kind,
        "sessionKey": session_key,
    })
    .to_string()
    .into_bytes()
}

pub fn join_ok(session_key: &str) -> Vec<u8> {
    response("JOIN", true, json!(session_key), Some(session_key))
}

/// An INDICATION for `ontology`, with the broker's string-encoded body.
pub fn indication(ontology: &str, session_key: &str) -> Vec<u8> {
    let body = r#"{"data":"[{"t":21}]","ok":true}"#;
    json!({
        "body": body,
        "direction": "REQUEST",
        "messageType": "INDICATION",
        "ontology": ontology,
        "sessionKey": session_key,
    })
    .to_string()
    .into_bytes()
}

/// Opens a session on `endpoint` and answers the JOIN.
pub async fn joined(endpoint: &Endpoint<MockTransport>, transport: &MockTransport, key: &str) {
    endpoint
        .join_with_token("token-1", "TestKP:instance-1")
        .await
        .expect("join should queue");
    transport.deliver(join_ok(key));
    assert_eq!(endpoint.session_key().as_deref(), Some(key));
}
