//! # ssap
//!
//! Client for SSAP, the Sofia2 Semantic Sensor Access Protocol: JSON
//! requests and responses exchanged with a broker over one websocket.
//!
//! An [`Endpoint`] serializes requests in FIFO order with a single
//! request in flight, tracks the session, and hands every inbound
//! message to a [`Callback`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ssap::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), SsapError> {
//! let endpoint = Endpoint::websocket(
//!     "ws://localhost:8080/sib/api_websocket",
//!     SingleHandler::new(|msg: &Message| {
//!         println!("{} ok={}", msg.message_type, msg.is_ok());
//!     }),
//! );
//! endpoint.join_with_token("my-token", "MyKP:instance-1").await?;
//! endpoint.insert("TestSensor", json!({"x": 1}), QueryType::Native)?;
//! endpoint.leave()?;
//! endpoint.run_until_stopped().await
//! # }
//! ```

mod callback;
mod config;
mod endpoint;
mod error;
mod queue;

pub use callback::{Callback, Handler, HandlerId, MultiHandler, SingleHandler};
pub use config::{DEFAULT_PROTOCOL, EndpointBuilder, EndpointConfig};
pub use endpoint::Endpoint;
pub use error::SsapError;

pub use ssap_protocol::{
    Body, BulkRequest, Direction, ErrorCode, Message, MessageType, ProtocolError,
    QueryDescriptor, QueryType, ResponseBody,
};
pub use ssap_session::{Session, SessionError, SessionState};
pub use ssap_transport::{
    Connection, ConnectionId, Transport, TransportError, TransportHandler,
    WebSocketTransport,
};

/// Everything an application typically needs.
pub mod prelude {
    pub use crate::{
        BulkRequest, Callback, Endpoint, ErrorCode, Message, MessageType,
        MultiHandler, QueryDescriptor, QueryType, SingleHandler, SsapError,
    };
}
