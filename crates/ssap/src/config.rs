//! Endpoint configuration and builder.

use std::sync::Arc;
use std::time::Duration;

use ssap_transport::Transport;

use crate::Callback;
use crate::endpoint::Endpoint;

/// The websocket subprotocol the broker expects.
pub const DEFAULT_PROTOCOL: &str = "http_only";

/// Where and how an endpoint connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Broker URL, e.g. `ws://sofia2.com/sib/api_websocket`.
    pub url: String,

    /// Subprotocols offered during the handshake.
    pub protocols: Vec<String>,

    /// How long JOIN/CONFIG wait for the connection to open.
    ///
    /// `None` waits until the transport reports success or failure.
    pub connect_timeout: Option<Duration>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            protocols: vec![DEFAULT_PROTOCOL.to_string()],
            connect_timeout: None,
        }
    }
}

/// Builder for an [`Endpoint`].
///
/// # Example
///
/// ```rust,no_run
/// use ssap::{Endpoint, Message, SingleHandler, WebSocketTransport};
///
/// let endpoint = Endpoint::builder()
///     .url("ws://localhost:8080/sib/api_websocket")
///     .connect_timeout(std::time::Duration::from_secs(10))
///     .build(
///         WebSocketTransport::new(),
///         SingleHandler::new(|msg: &Message| println!("{}", msg.message_type)),
///     );
/// ```
#[derive(Debug, Default)]
pub struct EndpointBuilder {
    config: EndpointConfig,
    span: Option<tracing::Span>,
}

impl EndpointBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Span every engine log event is recorded under.
    ///
    /// Defaults to an `ssap_endpoint` span carrying the URL.
    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build<T, C>(self, transport: T, callback: C) -> Endpoint<T>
    where
        T: Transport,
        C: Callback,
    {
        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!("ssap_endpoint", url = %self.config.url)
        });
        Endpoint::new(self.config, transport, Arc::new(callback), span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_offers_http_only() {
        let config = EndpointConfig::default();
        assert_eq!(config.protocols, ["http_only"]);
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn test_builder_sets_fields() {
        let builder = EndpointBuilder::new()
            .url("ws://sib")
            .protocols(["a", "b"])
            .connect_timeout(Duration::from_millis(250));
        assert_eq!(builder.config.url, "ws://sib");
        assert_eq!(builder.config.protocols, ["a", "b"]);
        assert_eq!(
            builder.config.connect_timeout,
            Some(Duration::from_millis(250))
        );
    }
}
