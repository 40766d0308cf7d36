//! The SSAP endpoint.
//!
//! An [`Endpoint`] owns one transport connection, the request queue, and
//! the session. Public operations build a request, queue it, and return
//! as soon as it is handed to the transport; results arrive through the
//! [`Callback`].
//!
//! ```text
//! caller ──op──→ queue ──head──→ Connection::send
//!                  ↑                     │
//!                  └── advance ←── on_data (decode → session → callback)
//! ```
//!
//! At most one request is on the wire at a time. The next one goes out
//! when a non-INDICATION message arrives.
//!
//! Engine state sits behind a synchronous mutex. Transport callbacks take
//! it briefly and never hold it while the application callback runs.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use ssap_protocol::{BulkRequest, Message, MessageType, QueryDescriptor, QueryType};
use ssap_session::Session;
use ssap_transport::{
    Connection, ConnectionId, Transport, TransportHandler, WebSocketTransport,
};
use tokio::sync::watch;

use crate::config::{EndpointBuilder, EndpointConfig};
use crate::queue::{QueuedRequest, RequestQueue};
use crate::{Callback, SsapError};

/// Lifecycle of the physical connection, as seen by waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    /// Nothing open, or torn down after LEAVE.
    Down,
    Up(ConnectionId),
    /// The transport reported the connection gone.
    Closed(ConnectionId),
}

struct Engine<C> {
    connection: Option<C>,
    queue: RequestQueue,
    session: Session,
}

impl<C: Connection> Engine<C> {
    fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(Connection::id)
    }

    /// Puts the head of the queue on the wire, if there is one.
    fn send_head(&self, span: &tracing::Span) {
        let (Some(conn), Some(head)) = (self.connection.as_ref(), self.queue.head())
        else {
            return;
        };
        tracing::debug!(parent: span, kind = %head.message_type, "sending request");
        if let Err(e) = conn.send(head.payload.clone()) {
            tracing::warn!(parent: span, error = %e, "failed to send queued request");
        }
    }
}

/// State shared between the endpoint and the transport's reader task.
struct Shared<C> {
    config: EndpointConfig,
    callback: Arc<dyn Callback>,
    span: tracing::Span,
    engine: Mutex<Engine<C>>,
    link: watch::Sender<Link>,
}

impl<C: Connection> Shared<C> {
    fn is_current(&self, id: ConnectionId) -> bool {
        self.engine.lock().connection_id() == Some(id)
    }

    /// Pops the answered request, applies session effects, and sends the
    /// next request. Indications leave the queue alone.
    fn advance(&self, kind: MessageType, ok: bool) {
        if kind == MessageType::Indication {
            return;
        }
        let mut engine = self.engine.lock();

        let answered = engine.queue.complete_head().is_some();
        if !answered {
            tracing::warn!(parent: &self.span, %kind, "response with no pending request");
        }

        let mut torn_down = false;
        if ok {
            match kind {
                MessageType::Leave => {
                    if let Some(conn) = engine.connection.take() {
                        if let Err(e) = conn.close() {
                            tracing::debug!(parent: &self.span, error = %e, "close after LEAVE failed");
                        }
                    }
                    engine.session.apply_leave();
                    let dropped = engine.queue.clear();
                    if dropped > 0 {
                        tracing::warn!(parent: &self.span, dropped, "requests queued after LEAVE discarded");
                    }
                    torn_down = true;
                    tracing::info!(parent: &self.span, "session left, connection closed");
                }
                MessageType::Subscribe => engine.session.apply_subscribe(),
                MessageType::Unsubscribe => engine.session.apply_unsubscribe(),
                _ => {}
            }
        }

        if answered && !torn_down {
            engine.send_head(&self.span);
        }
        drop(engine);

        if torn_down {
            self.link.send_replace(Link::Down);
        }
    }
}

impl<C: Connection> TransportHandler for Shared<C> {
    fn on_open(&self, id: ConnectionId) {
        tracing::debug!(parent: &self.span, %id, "transport open");
        self.link.send_replace(Link::Up(id));
    }

    fn on_data(&self, id: ConnectionId, data: Vec<u8>) {
        // The broker sends stray single bytes around a close.
        if data.len() <= 1 {
            return;
        }
        if !self.is_current(id) {
            tracing::debug!(parent: &self.span, %id, "frame from a stale connection ignored");
            return;
        }
        tracing::debug!(
            parent: &self.span,
            %id,
            frame = %String::from_utf8_lossy(&data),
            "frame received"
        );

        let envelope = match ssap_protocol::decode_envelope(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    parent: &self.span,
                    error = %e,
                    fragment = e.fragment().unwrap_or_default(),
                    "dropping undecodable frame"
                );
                return;
            }
        };
        let kind = envelope.message_type();

        // The broker answered, even if we cannot read the answer.
        let msg = match envelope.into_message() {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(
                    parent: &self.span,
                    %kind,
                    error = %e,
                    fragment = e.fragment().unwrap_or_default(),
                    "dropping message with undecodable body"
                );
                self.advance(kind, false);
                return;
            }
        };
        let ok = msg.is_ok();

        if ok && kind == MessageType::Join {
            match msg.session_key.as_deref() {
                Some(key) => {
                    let renewed = self.engine.lock().session.apply_join(key);
                    tracing::info!(parent: &self.span, renewed, "session joined");
                }
                None => {
                    tracing::warn!(parent: &self.span, "JOIN response without a session key");
                }
            }
        }

        self.callback.on_message(&msg);
        self.advance(kind, ok);
    }

    fn on_close(&self, id: ConnectionId, reason: Option<String>) {
        {
            let mut engine = self.engine.lock();
            if engine.connection_id() == Some(id) {
                engine.connection = None;
                let dropped = engine.queue.clear();
                if dropped > 0 {
                    tracing::warn!(parent: &self.span, dropped, "connection closed with requests pending");
                }
            }
        }
        tracing::info!(parent: &self.span, %id, reason = ?reason, "transport closed");
        // Down covers a close reported before the open.
        self.link.send_if_modified(|link| {
            if *link == Link::Up(id) || *link == Link::Down {
                *link = Link::Closed(id);
                true
            } else {
                false
            }
        });
    }
}

/// A client connection to an SSAP broker.
///
/// Operations that need an open connection fail with an
/// [`SsapError::is_invalid_operation`] error instead of connecting; only
/// [`join_with_token`](Self::join_with_token),
/// [`join_with_credentials`](Self::join_with_credentials) and
/// [`config`](Self::config) open it.
pub struct Endpoint<T: Transport = WebSocketTransport> {
    transport: T,
    shared: Arc<Shared<T::Connection>>,
    connecting: tokio::sync::Mutex<()>,
}

impl Endpoint<WebSocketTransport> {
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::new()
    }

    /// An endpoint using the websocket transport and default settings.
    pub fn websocket(url: impl Into<String>, callback: impl Callback) -> Self {
        EndpointBuilder::new()
            .url(url)
            .build(WebSocketTransport::new(), callback)
    }
}

impl<T: Transport> Endpoint<T> {
    pub(crate) fn new(
        config: EndpointConfig,
        transport: T,
        callback: Arc<dyn Callback>,
        span: tracing::Span,
    ) -> Self {
        let (link, _) = watch::channel(Link::Down);
        Self {
            transport,
            shared: Arc::new(Shared {
                config,
                callback,
                span,
                engine: Mutex::new(Engine {
                    connection: None,
                    queue: RequestQueue::new(),
                    session: Session::new(),
                }),
                link,
            }),
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &EndpointConfig {
        &self.shared.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.engine.lock().connection.is_some()
    }

    /// A snapshot of the session.
    pub fn session(&self) -> Session {
        self.shared.engine.lock().session.clone()
    }

    pub fn session_key(&self) -> Option<String> {
        self.shared.engine.lock().session.session_key().map(str::to_string)
    }

    pub fn active_subscriptions(&self) -> u32 {
        self.shared.engine.lock().session.active_subscriptions()
    }

    /// Requests queued or in flight.
    pub fn pending_requests(&self) -> usize {
        self.shared.engine.lock().queue.len()
    }

    /// Kind of the request currently awaiting its response.
    pub fn in_flight(&self) -> Option<MessageType> {
        self.shared.engine.lock().queue.head().map(|r| r.message_type)
    }

    /// Opens a session with a KP token. `instance` is `<KP>:<instance>`.
    ///
    /// Connects first if needed, waiting for the transport to open.
    pub async fn join_with_token(&self, token: &str, instance: &str) -> Result<(), SsapError> {
        self.ensure_connected().await?;
        self.submit(|session| {
            session.record_join_attempt(Some(token), instance);
            Ok(Message::join_with_token(token, instance))
        })
    }

    /// Opens a session with user credentials.
    pub async fn join_with_credentials(
        &self,
        user: &str,
        password: &str,
        instance: &str,
    ) -> Result<(), SsapError> {
        self.ensure_connected().await?;
        self.submit(|session| {
            session.record_join_attempt(None, instance);
            Ok(Message::join_with_credentials(user, password, instance))
        })
    }

    /// Asks the broker for a new session key, using the token and instance
    /// of the current session.
    pub fn renew_session(&self) -> Result<(), SsapError> {
        self.submit(|session| {
            let (token, instance, key) = session.renewal()?;
            Ok(Message::renew_session(token, instance, key))
        })
    }

    /// Closes the session. On success the connection is closed too.
    pub fn leave(&self) -> Result<(), SsapError> {
        let span = &self.shared.span;
        self.submit(|session| {
            let key = session.require_key()?;
            let open = session.active_subscriptions();
            if open > 0 {
                tracing::warn!(parent: span, open, "leaving with active subscriptions");
            }
            Ok(Message::leave(Some(key)))
        })
    }

    /// Inserts `payload` into `ontology`: a document for
    /// [`QueryType::Native`], a statement otherwise.
    pub fn insert(
        &self,
        ontology: &str,
        payload: Value,
        query_type: QueryType,
    ) -> Result<(), SsapError> {
        self.submit(|session| {
            Ok(Message::insert(ontology, payload, query_type, session.session_key()))
        })
    }

    pub fn update(
        &self,
        ontology: &str,
        query: QueryDescriptor,
        data: Value,
    ) -> Result<(), SsapError> {
        self.submit(|session| {
            Ok(Message::update(ontology, query, data, session.session_key()))
        })
    }

    pub fn delete(&self, ontology: &str, query: QueryDescriptor) -> Result<(), SsapError> {
        self.submit(|session| Ok(Message::delete(ontology, query, session.session_key())))
    }

    pub fn query(&self, ontology: &str, query: QueryDescriptor) -> Result<(), SsapError> {
        self.submit(|session| Ok(Message::query(ontology, query, session.session_key())))
    }

    /// Subscribes to `ontology`. The subscription id arrives in the
    /// SUBSCRIBE response ([`Message::subscription_id`]).
    pub fn subscribe(
        &self,
        ontology: &str,
        query: QueryDescriptor,
        ms_refresh: u64,
    ) -> Result<(), SsapError> {
        self.submit(|session| {
            session.record_subscribe_issued();
            Ok(Message::subscribe(ontology, query, ms_refresh, session.session_key()))
        })
    }

    pub fn unsubscribe(&self, subscription_id: &str) -> Result<(), SsapError> {
        self.submit(|session| {
            session.require_subscribe_issued()?;
            Ok(Message::unsubscribe(subscription_id, session.session_key()))
        })
    }

    /// Sends every operation in `request` as a single BULK.
    pub fn bulk(&self, ontology: &str, request: BulkRequest) -> Result<(), SsapError> {
        self.submit(|session| Ok(Message::bulk(request, ontology, session.session_key())))
    }

    /// Requests KP configuration from an asset service. Needs no session.
    pub async fn config(
        &self,
        kp: &str,
        kp_instance: &str,
        token: &str,
        asset_service: &str,
        asset_service_param: Value,
    ) -> Result<(), SsapError> {
        self.ensure_connected().await?;
        self.submit(|_| {
            Ok(Message::config(kp, kp_instance, token, asset_service, asset_service_param))
        })
    }

    /// Waits until the connection closes, either after a successful LEAVE
    /// or because the transport went away.
    pub async fn run_until_stopped(&self) -> Result<(), SsapError> {
        let id = self.shared.engine.lock().connection_id().ok_or_else(|| {
            SsapError::invalid_operation("the connection with the broker is not open")
        })?;
        let mut link = self.shared.link.subscribe();
        let _ = link.wait_for(|state| *state != Link::Up(id)).await;
        tracing::debug!(parent: &self.shared.span, %id, "stopped");
        Ok(())
    }

    /// Builds a request against the current session and queues it.
    ///
    /// Nothing is queued when the connection is not open or `build`
    /// fails.
    fn submit<F>(&self, build: F) -> Result<(), SsapError>
    where
        F: FnOnce(&mut Session) -> Result<Message, SsapError>,
    {
        let span = &self.shared.span;
        let mut engine = self.shared.engine.lock();
        let Engine {
            connection,
            queue,
            session,
        } = &mut *engine;
        let Some(conn) = connection.as_ref() else {
            return Err(SsapError::invalid_operation(
                "the connection with the broker is not open",
            ));
        };

        let msg = build(session)?;
        let payload = ssap_protocol::encode(&msg)?;
        let kind = msg.message_type;

        let is_head = queue.push(QueuedRequest {
            message_type: kind,
            payload: payload.clone(),
        });
        tracing::debug!(parent: span, %kind, pending = queue.len(), "request queued");

        if is_head {
            tracing::debug!(parent: span, %kind, "sending request");
            if let Err(e) = conn.send(payload) {
                queue.retract_last();
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn ensure_connected(&self) -> Result<(), SsapError> {
        let _connecting = self.connecting.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let shared = &self.shared;
        let url = shared.config.url.as_str();
        tracing::info!(parent: &shared.span, url, "connecting");
        shared.link.send_replace(Link::Down);

        let handler: Arc<dyn TransportHandler> = shared.clone();
        let conn = match self
            .transport
            .open(url, &shared.config.protocols, handler)
            .await
        {
            Ok(conn) => conn,
            Err(e) => return Err(self.connect_failed(e.to_string())),
        };
        let id = conn.id();
        shared.engine.lock().connection = Some(conn);

        let mut link = shared.link.subscribe();
        let settled = link.wait_for(|state| {
            matches!(state, Link::Up(seen) | Link::Closed(seen) if *seen == id)
        });
        let outcome = match shared.config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, settled).await {
                Ok(result) => result.map(|state| *state),
                Err(_) => {
                    return Err(self.connect_failed(format!("not open after {limit:?}")));
                }
            },
            None => settled.await.map(|state| *state),
        };

        match outcome {
            Ok(Link::Up(_)) => {
                tracing::info!(parent: &shared.span, %id, "connected");
                Ok(())
            }
            Ok(_) => Err(self.connect_failed("closed during the handshake")),
            Err(_) => Err(self.connect_failed("connection state unavailable")),
        }
    }

    /// Resets everything after a failed connection attempt.
    fn connect_failed(&self, reason: impl Into<String>) -> SsapError {
        let reason = reason.into();
        {
            let mut engine = self.shared.engine.lock();
            if let Some(conn) = engine.connection.take() {
                let _ = conn.close();
            }
            engine.session.clear();
            engine.queue.clear();
        }
        self.shared.link.send_replace(Link::Down);
        tracing::warn!(parent: &self.shared.span, %reason, "connection failed");
        SsapError::Connection {
            url: self.shared.config.url.clone(),
            reason,
        }
    }
}

impl<T: Transport> Drop for Endpoint<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.shared.engine.lock().connection.take() {
            let _ = conn.close();
        }
    }
}
