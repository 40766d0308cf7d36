//! The session record and its state machine.
//!
//! ```text
//!   Disconnected ──(JOIN ok)──→ Joined ──(LEAVE ok)──→ Disconnected
//!                                 │  ↑
//!                                 └──┘ (renew: JOIN ok, new key)
//! ```
//!
//! A failed connection attempt resets everything to the initial state.

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session key. The initial state.
    Disconnected,
    /// A JOIN has succeeded and no LEAVE has succeeded since.
    Joined,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Client-side session data.
///
/// `session_key` is present exactly while the state is
/// [`SessionState::Joined`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    session_key: Option<String>,
    token: Option<String>,
    instance: Option<String>,
    active_subscriptions: u32,
    subscribe_issued: bool,
}

impl Session {
    /// An empty, disconnected session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.session_key.is_some() {
            SessionState::Joined
        } else {
            SessionState::Disconnected
        }
    }

    pub fn is_joined(&self) -> bool {
        self.state() == SessionState::Joined
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// Subscriptions confirmed by the broker and not yet cancelled.
    ///
    /// Informational only: nothing is ever refused because of it.
    pub fn active_subscriptions(&self) -> u32 {
        self.active_subscriptions
    }

}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

impl Session {
    /// Remembers the identity a JOIN is being sent with.
    ///
    /// `token` is `None` for a user/password JOIN, which cannot be renewed.
    pub fn record_join_attempt(&mut self, token: Option<&str>, instance: &str) {
        self.token = token.map(str::to_string);
        self.instance = Some(instance.to_string());
    }

    /// The session key to put on a session-bound request.
    pub fn require_key(&self) -> Result<&str, SessionError> {
        self.session_key().ok_or(SessionError::NotJoined)
    }

    /// Token, instance and key for a renew JOIN.
    pub fn renewal(&self) -> Result<(&str, &str, &str), SessionError> {
        let key = self.require_key()?;
        let token = self.token().ok_or(SessionError::NoToken)?;
        let instance = self.instance().ok_or(SessionError::NoToken)?;
        Ok((token, instance, key))
    }

    /// Notes that a SUBSCRIBE was sent in this session.
    pub fn record_subscribe_issued(&mut self) {
        self.subscribe_issued = true;
    }

    /// UNSUBSCRIBE is only allowed once a SUBSCRIBE went out.
    pub fn require_subscribe_issued(&self) -> Result<(), SessionError> {
        if self.subscribe_issued {
            Ok(())
        } else {
            Err(SessionError::NoSubscription)
        }
    }

    /// Applies a successful JOIN response. A JOIN while already joined is
    /// a renewal and replaces the key.
    ///
    /// Returns `true` if this was a renewal.
    pub fn apply_join(&mut self, session_key: &str) -> bool {
        let renewed = self.is_joined();
        self.session_key = Some(session_key.to_string());
        renewed
    }

    /// Applies a successful LEAVE response: every field is cleared.
    pub fn apply_leave(&mut self) {
        self.clear();
    }

    /// A SUBSCRIBE was confirmed.
    pub fn apply_subscribe(&mut self) {
        self.active_subscriptions += 1;
    }

    /// An UNSUBSCRIBE was confirmed. Never goes below zero.
    pub fn apply_unsubscribe(&mut self) {
        self.active_subscriptions = self.active_subscriptions.saturating_sub(1);
    }

    /// Back to the initial state, for LEAVE and connection failures.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
