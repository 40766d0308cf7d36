//! Constructors for outbound SSAP requests.
//!
//! Every constructor produces a REQUEST with the envelope fields its kind
//! needs. JOIN and CONFIG never carry a session key; the renew variant of
//! JOIN is the one exception and carries the session being renewed.

use serde_json::Value;

use crate::message::{
    Body, BulkItem, ConfigBody, DataBody, DeleteBody, JoinBody, JoinCredentials,
    Message, QueryBody, QueryDescriptor, SubscribeBody, UnsubscribeBody,
};
use crate::{Direction, MessageType, QueryType};

impl Message {
    fn request(
        message_type: MessageType,
        session_key: Option<&str>,
        ontology: Option<&str>,
        body: Body,
    ) -> Self {
        Self {
            message_type,
            direction: Direction::Request,
            session_key: session_key.map(str::to_string),
            ontology: ontology.map(str::to_string),
            body,
        }
    }

    /// Token-based JOIN. `instance` is formatted `<KP>:<instance>`.
    pub fn join_with_token(token: &str, instance: &str) -> Self {
        Self::request(
            MessageType::Join,
            None,
            None,
            Body::Join(JoinBody {
                instance: instance.to_string(),
                credentials: JoinCredentials::Token {
                    token: token.to_string(),
                },
            }),
        )
    }

    /// User/password JOIN.
    pub fn join_with_credentials(user: &str, password: &str, instance: &str) -> Self {
        Self::request(
            MessageType::Join,
            None,
            None,
            Body::Join(JoinBody {
                instance: instance.to_string(),
                credentials: JoinCredentials::Password {
                    user: user.to_string(),
                    password: password.to_string(),
                },
            }),
        )
    }

    /// JOIN that renews `session_key`. Same body as a token JOIN.
    pub fn renew_session(token: &str, instance: &str, session_key: &str) -> Self {
        let mut msg = Self::join_with_token(token, instance);
        msg.session_key = Some(session_key.to_string());
        msg
    }

    pub fn leave(session_key: Option<&str>) -> Self {
        Self::request(MessageType::Leave, session_key, None, Body::Empty)
    }

    /// INSERT. With [`QueryType::Native`] the payload is the document and
    /// goes in `data`; any other type sends it as a statement in `query`.
    pub fn insert(
        ontology: &str,
        payload: Value,
        query_type: QueryType,
        session_key: Option<&str>,
    ) -> Self {
        let (data, query) = if query_type == QueryType::Native {
            (Some(payload), None)
        } else {
            (None, Some(payload))
        };
        Self::request(
            MessageType::Insert,
            session_key,
            Some(ontology),
            Body::Insert(DataBody {
                data,
                query,
                query_type,
            }),
        )
    }

    /// UPDATE: `query` selects the instances, `data` is the update
    /// expression.
    pub fn update(
        ontology: &str,
        query: QueryDescriptor,
        data: Value,
        session_key: Option<&str>,
    ) -> Self {
        Self::request(
            MessageType::Update,
            session_key,
            Some(ontology),
            Body::Update(DataBody {
                data: Some(data),
                query: Some(query.query),
                query_type: query.query_type,
            }),
        )
    }

    pub fn delete(
        ontology: &str,
        query: QueryDescriptor,
        session_key: Option<&str>,
    ) -> Self {
        Self::request(
            MessageType::Delete,
            session_key,
            Some(ontology),
            Body::Delete(DeleteBody {
                query: query.query,
                query_type: query.query_type,
            }),
        )
    }

    pub fn query(
        ontology: &str,
        query: QueryDescriptor,
        session_key: Option<&str>,
    ) -> Self {
        Self::request(
            MessageType::Query,
            session_key,
            Some(ontology),
            Body::Query(QueryBody {
                query: query.query,
                query_params: query.params,
                query_type: query.query_type,
            }),
        )
    }

    /// SUBSCRIBE. `ms_refresh` is the minimum interval between two
    /// INDICATION batches.
    pub fn subscribe(
        ontology: &str,
        query: QueryDescriptor,
        ms_refresh: u64,
        session_key: Option<&str>,
    ) -> Self {
        Self::request(
            MessageType::Subscribe,
            session_key,
            Some(ontology),
            Body::Subscribe(SubscribeBody {
                query: query.query,
                query_type: query.query_type,
                ms_refresh,
            }),
        )
    }

    pub fn unsubscribe(subscription_id: &str, session_key: Option<&str>) -> Self {
        Self::request(
            MessageType::Unsubscribe,
            session_key,
            None,
            Body::Unsubscribe(UnsubscribeBody {
                subscription_id: subscription_id.to_string(),
            }),
        )
    }

    /// CONFIG. `kp_instance` is the bare instance id, without the KP
    /// prefix used by JOIN.
    pub fn config(
        kp: &str,
        kp_instance: &str,
        token: &str,
        asset_service: &str,
        asset_service_param: Value,
    ) -> Self {
        Self::request(
            MessageType::Config,
            None,
            None,
            Body::Config(ConfigBody {
                kp: kp.to_string(),
                kp_instance: kp_instance.to_string(),
                token: token.to_string(),
                asset_service: asset_service.to_string(),
                asset_service_param,
            }),
        )
    }

    /// BULK wrapping every operation accumulated in `request`.
    pub fn bulk(
        request: BulkRequest,
        ontology: &str,
        session_key: Option<&str>,
    ) -> Self {
        Self::request(
            MessageType::Bulk,
            session_key,
            Some(ontology),
            Body::Bulk(request.into_items()),
        )
    }
}

/// A batch of INSERT / UPDATE / DELETE operations sent as one BULK.
///
/// Items keep the order they were added in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkRequest {
    items: Vec<BulkItem>,
}

impl BulkRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_insert(
        &mut self,
        ontology: &str,
        payload: Value,
        query_type: QueryType,
    ) -> &mut Self {
        self.push(Message::insert(ontology, payload, query_type, None))
    }

    pub fn add_update(
        &mut self,
        ontology: &str,
        query: QueryDescriptor,
        data: Value,
    ) -> &mut Self {
        self.push(Message::update(ontology, query, data, None))
    }

    pub fn add_delete(&mut self, ontology: &str, query: QueryDescriptor) -> &mut Self {
        self.push(Message::delete(ontology, query, None))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[BulkItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<BulkItem> {
        self.items
    }

    fn push(&mut self, msg: Message) -> &mut Self {
        self.items.push(BulkItem {
            message_type: msg.message_type,
            ontology: msg.ontology.unwrap_or_default(),
            body: msg.body,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_join_and_config_never_carry_session_key() {
        assert_eq!(Message::join_with_token("tok", "KP:1").session_key, None);
        assert_eq!(
            Message::join_with_credentials("u", "p", "KP:1").session_key,
            None
        );
        let config = Message::config("KP", "1", "tok", "svc", json!({}));
        assert_eq!(config.session_key, None);
        assert_eq!(config.ontology, None);
    }

    #[test]
    fn test_renew_session_keeps_token_body_with_session_key() {
        let msg = Message::renew_session("tok", "KP:1", "sk-1");
        assert_eq!(msg.message_type, MessageType::Join);
        assert_eq!(msg.session_key.as_deref(), Some("sk-1"));
        assert_eq!(
            msg.body,
            Body::Join(JoinBody {
                instance: "KP:1".into(),
                credentials: JoinCredentials::Token {
                    token: "tok".into()
                },
            })
        );
    }

    #[test]
    fn test_insert_native_puts_payload_in_data() {
        let msg = Message::insert("T", json!({"x": 1}), QueryType::Native, Some("sk"));
        let Body::Insert(body) = msg.body else {
            panic!("expected insert body");
        };
        assert_eq!(body.data, Some(json!({"x": 1})));
        assert_eq!(body.query, None);
    }

    #[test]
    fn test_insert_sql_like_puts_payload_in_query() {
        let msg = Message::insert(
            "T",
            json!("INSERT INTO T(x) VALUES (1)"),
            QueryType::SqlLike,
            Some("sk"),
        );
        let Body::Insert(body) = msg.body else {
            panic!("expected insert body");
        };
        assert_eq!(body.data, None);
        assert_eq!(body.query, Some(json!("INSERT INTO T(x) VALUES (1)")));
    }

    #[test]
    fn test_bulk_request_keeps_order_and_drops_session_key() {
        let mut bulk = BulkRequest::new();
        bulk.add_insert("A", json!({"v": 1}), QueryType::Native)
            .add_update("B", QueryDescriptor::native(json!({"v": 1})), json!({"$set": {"v": 2}}))
            .add_delete("C", QueryDescriptor::sql_like("DELETE FROM C"));

        let kinds: Vec<_> = bulk.items().iter().map(|i| i.message_type).collect();
        assert_eq!(
            kinds,
            [MessageType::Insert, MessageType::Update, MessageType::Delete]
        );
        assert_eq!(bulk.items()[2].ontology, "C");

        let msg = Message::bulk(bulk, "A", Some("sk"));
        assert_eq!(msg.ontology.as_deref(), Some("A"));
        assert_eq!(msg.session_key.as_deref(), Some("sk"));
    }
}
