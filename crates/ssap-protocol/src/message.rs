//! The SSAP message model.
//!
//! A [`Message`] is the decoded form of one JSON envelope:
//!
//! ```text
//! {"body": {...}, "direction": "REQUEST", "messageType": "INSERT",
//!  "ontology": "TestSensor", "sessionKey": "abc"}
//! ```
//!
//! The envelope fields are shared by every kind; the [`Body`] is a tagged
//! union whose variant depends on the kind and the direction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Direction, ErrorCode, MessageType, QueryType};

/// One SSAP message, outbound or inbound.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// What kind of operation this message belongs to.
    pub message_type: MessageType,
    /// REQUEST for everything the client sends.
    pub direction: Direction,
    /// The session the message belongs to. Absent on JOIN (token or
    /// credentials) and CONFIG requests.
    pub session_key: Option<String>,
    /// Target ontology, for the kinds that address one.
    pub ontology: Option<String>,
    /// Kind-specific payload.
    pub body: Body,
}

/// Kind-specific message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// LEAVE request: `{}`.
    Empty,
    Join(JoinBody),
    /// INSERT request.
    Insert(DataBody),
    /// UPDATE request.
    Update(DataBody),
    Delete(DeleteBody),
    Query(QueryBody),
    Subscribe(SubscribeBody),
    Unsubscribe(UnsubscribeBody),
    Config(ConfigBody),
    Bulk(Vec<BulkItem>),
    /// Any RESPONSE or ERROR from the broker.
    Response(ResponseBody),
    /// Subscription notification, kept as the broker sent it (after the
    /// string-body repairs).
    Indication(Value),
}

/// JOIN body: `{instance, token}` or `{instance, password, user}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinBody {
    /// KP instance, formatted `<KP>:<instance>`.
    pub instance: String,
    #[serde(flatten)]
    pub credentials: JoinCredentials,
}

/// How a JOIN authenticates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoinCredentials {
    Token { token: String },
    Password { user: String, password: String },
}

/// INSERT / UPDATE body.
///
/// INSERT fills exactly one of `data` / `query` (see
/// [`QueryType::Native`]); UPDATE fills both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBody {
    pub data: Option<Value>,
    pub query: Option<Value>,
    pub query_type: QueryType,
}

/// DELETE body. Carries no `data` field at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBody {
    pub query: Value,
    pub query_type: QueryType,
}

/// QUERY body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryBody {
    pub query: Value,
    pub query_params: Option<Value>,
    pub query_type: QueryType,
}

/// SUBSCRIBE body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeBody {
    pub query: Value,
    pub query_type: QueryType,
    /// Minimum time between two notification batches.
    pub ms_refresh: u64,
}

/// UNSUBSCRIBE body. The field name is the broker's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeBody {
    #[serde(rename = "idSuscripcion")]
    pub subscription_id: String,
}

/// CONFIG body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigBody {
    /// KP name.
    pub kp: String,
    /// Instance identifier without the `<KP>:` prefix.
    #[serde(rename = "instanciaKp")]
    pub kp_instance: String,
    pub token: String,
    pub asset_service: String,
    pub asset_service_param: Value,
}

/// One operation inside a BULK request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    /// INSERT, UPDATE or DELETE. Written as `type` on the wire.
    pub message_type: MessageType,
    pub ontology: String,
    pub body: Body,
}

/// Body of every RESPONSE / ERROR.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseBody {
    /// Broker's success flag. `false` when the field is missing.
    pub ok: bool,
    /// Result payload. For successful INSERT/UPDATE responses this is the
    /// decoded form of the broker's pseudo-JSON string.
    pub data: Option<Value>,
    /// Human-readable error text.
    pub error: Option<String>,
    /// Error category, when `ok` is false.
    pub error_code: Option<ErrorCode>,
    /// Any other fields, untouched.
    pub extra: Map<String, Value>,
}

impl Message {
    /// `true` if this message kind carries an `ok` flag.
    pub fn has_ok_field(&self) -> bool {
        self.message_type.has_ok_field()
    }

    /// `true` for a response whose `ok` flag is set.
    ///
    /// Always `false` for INDICATION and CONFIG messages, and for
    /// requests.
    pub fn is_ok(&self) -> bool {
        self.has_ok_field()
            && matches!(&self.body, Body::Response(body) if body.ok)
    }

    /// `true` for an unsolicited subscription notification.
    pub fn is_indication(&self) -> bool {
        self.message_type == MessageType::Indication
    }

    /// The response body, if this is a RESPONSE or ERROR.
    pub fn response(&self) -> Option<&ResponseBody> {
        match &self.body {
            Body::Response(body) => Some(body),
            _ => None,
        }
    }

    /// The broker's error code, if the response reported one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.response().and_then(|body| body.error_code)
    }

    /// The payload of a response, or the `data` member of an indication.
    pub fn data(&self) -> Option<&Value> {
        match &self.body {
            Body::Response(body) => body.data.as_ref(),
            Body::Indication(body) => body.get("data"),
            _ => None,
        }
    }

    /// The subscription identifier assigned by a successful SUBSCRIBE.
    pub fn subscription_id(&self) -> Option<&str> {
        if self.message_type != MessageType::Subscribe || !self.is_ok() {
            return None;
        }
        self.data().and_then(Value::as_str)
    }
}

/// What to select and how to interpret it.
///
/// Used by QUERY, UPDATE, DELETE and SUBSCRIBE.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub query_type: QueryType,
    /// Query text (`Value::String`) or structured filter.
    pub query: Value,
    /// Named parameters. Only QUERY sends them.
    pub params: Option<Value>,
}

impl QueryDescriptor {
    /// A query of the given type.
    pub fn new(query_type: QueryType, query: impl Into<Value>) -> Self {
        Self {
            query_type,
            query: query.into(),
            params: None,
        }
    }

    /// A [`QueryType::Native`] query.
    pub fn native(query: impl Into<Value>) -> Self {
        Self::new(QueryType::Native, query)
    }

    /// A [`QueryType::SqlLike`] query.
    pub fn sql_like(query: impl Into<String>) -> Self {
        Self::new(QueryType::SqlLike, query.into())
    }

    /// Attaches named parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(kind: MessageType, body: ResponseBody) -> Message {
        Message {
            message_type: kind,
            direction: Direction::Response,
            session_key: Some("sk".into()),
            ontology: None,
            body: Body::Response(body),
        }
    }

    #[test]
    fn test_is_ok_reads_response_flag() {
        let ok = response(
            MessageType::Insert,
            ResponseBody {
                ok: true,
                ..Default::default()
            },
        );
        let failed = response(MessageType::Insert, ResponseBody::default());
        assert!(ok.is_ok());
        assert!(!failed.is_ok());
    }

    #[test]
    fn test_is_ok_false_for_config_even_if_flag_set() {
        let msg = response(
            MessageType::Config,
            ResponseBody {
                ok: true,
                ..Default::default()
            },
        );
        assert!(!msg.is_ok());
    }

    #[test]
    fn test_subscription_id_from_successful_subscribe() {
        let msg = response(
            MessageType::Subscribe,
            ResponseBody {
                ok: true,
                data: Some(json!("sub-42")),
                ..Default::default()
            },
        );
        assert_eq!(msg.subscription_id(), Some("sub-42"));
    }

    #[test]
    fn test_subscription_id_absent_on_failure_or_other_kind() {
        let failed = response(
            MessageType::Subscribe,
            ResponseBody {
                data: Some(json!("sub-42")),
                ..Default::default()
            },
        );
        let insert = response(
            MessageType::Insert,
            ResponseBody {
                ok: true,
                data: Some(json!("sub-42")),
                ..Default::default()
            },
        );
        assert_eq!(failed.subscription_id(), None);
        assert_eq!(insert.subscription_id(), None);
    }

    #[test]
    fn test_data_of_indication_reads_data_member() {
        let msg = Message {
            message_type: MessageType::Indication,
            direction: Direction::Request,
            session_key: None,
            ontology: Some("Temp".into()),
            body: Body::Indication(json!({"data": [{"t": 21}]})),
        };
        assert!(msg.is_indication());
        assert!(!msg.is_ok());
        assert_eq!(msg.data(), Some(&json!([{"t": 21}])));
    }

    #[test]
    fn test_query_descriptor_constructors() {
        let q = QueryDescriptor::sql_like("SELECT * FROM Temp")
            .with_params(json!({"limit": 1}));
        assert_eq!(q.query_type, QueryType::SqlLike);
        assert_eq!(q.query, json!("SELECT * FROM Temp"));
        assert_eq!(q.params, Some(json!({"limit": 1})));

        let native = QueryDescriptor::native(json!({"x": {"$gt": 1}}));
        assert_eq!(native.query_type, QueryType::Native);
        assert!(native.params.is_none());
    }
}
