//! Delivery of inbound messages to application code.
//!
//! The endpoint hands every decoded message to one [`Callback`]. Two
//! implementations are provided:
//!
//! - [`SingleHandler`]: one function sees everything.
//! - [`MultiHandler`]: handlers registered per message kind; for
//!   SUBSCRIBE, UNSUBSCRIBE and INDICATION, per kind *and* ontology.
//!
//! Callbacks run synchronously on the transport's reader task. They should
//! return quickly; a slow handler delays every later message.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use ssap_protocol::{Message, MessageType};

use crate::SsapError;

/// Receives every message the endpoint decodes.
pub trait Callback: Send + Sync + 'static {
    fn on_message(&self, msg: &Message);
}

impl<C: Callback + ?Sized> Callback for Arc<C> {
    fn on_message(&self, msg: &Message) {
        (**self).on_message(msg)
    }
}

/// A function of exactly one argument: the message.
///
/// Implemented for every `Fn(&Message)` closure, so the shape of a
/// handler is checked by the compiler.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, msg: &Message);
}

impl<F> Handler for F
where
    F: Fn(&Message) + Send + Sync + 'static,
{
    fn handle(&self, msg: &Message) {
        self(msg)
    }
}

/// Passes every message to one handler.
pub struct SingleHandler<H> {
    handler: H,
}

impl<H: Handler> SingleHandler<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }
}

impl<H: Handler> Callback for SingleHandler<H> {
    fn on_message(&self, msg: &Message) {
        self.handler.handle(msg);
    }
}

/// Identifies one registration on a [`MultiHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

type Registered = Vec<(HandlerId, Arc<dyn Handler>)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_kind: HashMap<MessageType, Registered>,
    by_ontology: HashMap<(MessageType, String), Registered>,
}

impl Registry {
    fn allocate(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }
}

/// Routes each message to the handlers registered for it, in
/// registration order.
///
/// Non-subscription kinds are routed by kind alone. Subscription kinds
/// (SUBSCRIBE, UNSUBSCRIBE, INDICATION) are routed by kind and the
/// message's `ontology`; a message with no ontology, or one nobody
/// registered for, reaches no handler.
///
/// Share it with the endpoint through an `Arc` to keep registering after
/// the endpoint is built.
#[derive(Default)]
pub struct MultiHandler {
    registry: RwLock<Registry>,
}

impl MultiHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for a non-subscription kind.
    ///
    /// Fails with [`SsapError::InvalidCallback`] for SUBSCRIBE,
    /// UNSUBSCRIBE and INDICATION, which need an ontology.
    pub fn register_handler(
        &self,
        kind: MessageType,
        handler: impl Handler,
    ) -> Result<HandlerId, SsapError> {
        if kind.is_subscription_kind() {
            return Err(SsapError::InvalidCallback(format!(
                "{kind} handlers are registered per ontology"
            )));
        }
        let mut registry = self.registry.write();
        let id = registry.allocate();
        registry
            .by_kind
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Registers `handler` for a subscription kind on `ontology`.
    pub fn register_subscription_handler(
        &self,
        kind: MessageType,
        ontology: &str,
        handler: impl Handler,
    ) -> Result<HandlerId, SsapError> {
        if !kind.is_subscription_kind() {
            return Err(SsapError::InvalidCallback(format!(
                "{kind} is not a subscription message kind"
            )));
        }
        let mut registry = self.registry.write();
        let id = registry.allocate();
        registry
            .by_ontology
            .entry((kind, ontology.to_string()))
            .or_default()
            .push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Removes one registration.
    ///
    /// Fails with [`SsapError::InvalidCallback`] if `id` is not currently
    /// registered.
    pub fn unregister_handler(&self, id: HandlerId) -> Result<(), SsapError> {
        let mut registry = self.registry.write();
        let Registry {
            by_kind,
            by_ontology,
            ..
        } = &mut *registry;
        let lists = by_kind.values_mut().chain(by_ontology.values_mut());
        for list in lists {
            if let Some(pos) = list.iter().position(|(h, _)| *h == id) {
                list.remove(pos);
                return Ok(());
            }
        }
        Err(SsapError::InvalidCallback(format!("{id} is not registered")))
    }

    /// Number of handlers a message of this kind/ontology would reach.
    pub fn handler_count(&self, kind: MessageType, ontology: Option<&str>) -> usize {
        let registry = self.registry.read();
        Self::lookup(&registry, kind, ontology).map_or(0, Vec::len)
    }

    fn lookup<'a>(
        registry: &'a Registry,
        kind: MessageType,
        ontology: Option<&str>,
    ) -> Option<&'a Registered> {
        if kind.is_subscription_kind() {
            let ontology = ontology?;
            registry.by_ontology.get(&(kind, ontology.to_string()))
        } else {
            registry.by_kind.get(&kind)
        }
    }
}

impl Callback for MultiHandler {
    fn on_message(&self, msg: &Message) {
        // Handlers run outside the lock so they may (un)register.
        let handlers: Vec<Arc<dyn Handler>> = {
            let registry = self.registry.read();
            Self::lookup(&registry, msg.message_type, msg.ontology.as_deref())
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler.handle(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use ssap_protocol::{Body, Direction};

    use super::*;

    fn message(kind: MessageType, ontology: Option<&str>) -> Message {
        Message {
            message_type: kind,
            direction: Direction::Response,
            session_key: Some("sk".into()),
            ontology: ontology.map(str::to_string),
            body: Body::Indication(json!({})),
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl Handler) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        (count, move |_: &Message| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_single_handler_sees_every_message() {
        let (count, handler) = counter();
        let callback = SingleHandler::new(handler);
        callback.on_message(&message(MessageType::Join, None));
        callback.on_message(&message(MessageType::Indication, Some("Temp")));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_multi_handler_routes_indication_by_ontology() {
        let multi = MultiHandler::new();
        let (temp, a) = counter();
        let (other, b) = counter();
        multi
            .register_subscription_handler(MessageType::Indication, "Temp", a)
            .unwrap();
        multi
            .register_subscription_handler(MessageType::Indication, "Humidity", b)
            .unwrap();

        multi.on_message(&message(MessageType::Indication, Some("Temp")));

        assert_eq!(temp.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_multi_handler_unknown_ontology_reaches_nobody() {
        let multi = MultiHandler::new();
        let (count, handler) = counter();
        multi
            .register_subscription_handler(MessageType::Indication, "Temp", handler)
            .unwrap();
        multi.on_message(&message(MessageType::Indication, Some("Pressure")));
        multi.on_message(&message(MessageType::Indication, None));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_multi_handler_invokes_in_registration_order() {
        let multi = MultiHandler::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            multi
                .register_handler(MessageType::Insert, move |_: &Message| {
                    order.lock().push(tag);
                })
                .unwrap();
        }
        multi.on_message(&message(MessageType::Insert, Some("T")));
        assert_eq!(*order.lock(), ["first", "second", "third"]);
    }

    #[test]
    fn test_register_handler_rejects_subscription_kind() {
        let multi = MultiHandler::new();
        let (_, handler) = counter();
        let err = multi
            .register_handler(MessageType::Indication, handler)
            .unwrap_err();
        assert!(matches!(err, SsapError::InvalidCallback(_)));
    }

    #[test]
    fn test_register_subscription_handler_rejects_plain_kind() {
        let multi = MultiHandler::new();
        let (_, handler) = counter();
        assert!(matches!(
            multi.register_subscription_handler(MessageType::Query, "T", handler),
            Err(SsapError::InvalidCallback(_))
        ));
    }

    #[test]
    fn test_unregister_handler_removes_only_that_handler() {
        let multi = MultiHandler::new();
        let (first, a) = counter();
        let (second, b) = counter();
        let id = multi.register_handler(MessageType::Join, a).unwrap();
        multi.register_handler(MessageType::Join, b).unwrap();

        multi.unregister_handler(id).unwrap();
        multi.on_message(&message(MessageType::Join, None));

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(multi.handler_count(MessageType::Join, None), 1);
    }

    #[test]
    fn test_unregister_unknown_handler_returns_invalid_callback() {
        let multi = MultiHandler::new();
        let (_, handler) = counter();
        let id = multi
            .register_subscription_handler(MessageType::Subscribe, "T", handler)
            .unwrap();
        multi.unregister_handler(id).unwrap();
        assert!(matches!(
            multi.unregister_handler(id),
            Err(SsapError::InvalidCallback(_))
        ));
    }
}
