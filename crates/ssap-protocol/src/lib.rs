//! Wire protocol for SSAP.
//!
//! This crate is the message codec of the client:
//!
//! - **Types** ([`MessageType`], [`Direction`], [`QueryType`],
//!   [`ErrorCode`]): closed enumerations with their wire spellings.
//! - **Messages** ([`Message`], [`Body`]): the envelope and the
//!   kind-specific bodies, plus constructors for every outbound request.
//! - **Codec** ([`encode`], [`decode`]): canonical sorted-key JSON out,
//!   tolerant parsing of the broker's output in.
//!
//! It knows nothing about connections or sessions.
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Endpoint (queue, session, callbacks)
//! ```

mod builder;
mod codec;
mod error;
mod message;
mod types;

pub use builder::BulkRequest;
pub use codec::{Envelope, decode, decode_envelope, encode, encode_to_string};
pub use error::ProtocolError;
pub use message::{
    Body, BulkItem, ConfigBody, DataBody, DeleteBody, JoinBody, JoinCredentials,
    Message, QueryBody, QueryDescriptor, ResponseBody, SubscribeBody,
    UnsubscribeBody,
};
pub use types::{Direction, ErrorCode, MessageType, QueryType};
