//! Session state for an SSAP client.
//!
//! A [`Session`] remembers what the client needs between requests: the
//! session key issued by the broker, the token and instance the session
//! was opened with, and how many subscriptions are active.
//!
//! ```text
//! Endpoint (above)  ← reads the key for every session-bound request
//!     ↕
//! Session (this crate)  ← applies JOIN / LEAVE / SUBSCRIBE outcomes
//! ```
//!
//! The session holds no locks and does no I/O; the endpoint owns it and
//! serializes access.

mod error;
mod session;

pub use error::SessionError;
pub use session::{Session, SessionState};
