//! Canonical JSON encoding and tolerant decoding of SSAP frames.
//!
//! [`encode`] and [`decode`] are pure functions. Encoding is compact JSON
//! with every object's keys sorted, so the same [`Message`] always
//! produces the same bytes.
//!
//! Decoding undoes three quirks of the broker's output before the frame
//! is mapped onto the message model:
//!
//! - every pair of backslashes is removed from the raw frame;
//! - a `body` delivered as a JSON string is decoded again (for INDICATION,
//!   after un-quoting `"[` and `]"`);
//! - on a successful INSERT/UPDATE response, a string `data` containing
//!   `ObjectId("...")` tokens is rewritten into valid JSON and decoded.
//!
//! The substitutions are literal and match what the broker emits; they
//! are not a general repair of broken JSON.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::message::{
    Body, BulkItem, ConfigBody, DataBody, DeleteBody, JoinBody, Message,
    QueryBody, ResponseBody, SubscribeBody, UnsubscribeBody,
};
use crate::{Direction, ErrorCode, MessageType, ProtocolError};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serializes `msg` into canonical wire bytes.
///
/// The envelope always has `body`, `direction`, `messageType` and
/// `sessionKey` (`null` when absent); `ontology` is written only when set.
pub fn encode(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let mut envelope = Map::new();
    envelope.insert("body".into(), body_to_value(&msg.body)?);
    envelope.insert("direction".into(), msg.direction.as_str().into());
    envelope.insert("messageType".into(), msg.message_type.as_str().into());
    envelope.insert(
        "sessionKey".into(),
        msg.session_key.clone().map_or(Value::Null, Value::String),
    );
    if let Some(ontology) = &msg.ontology {
        envelope.insert("ontology".into(), ontology.clone().into());
    }
    // serde_json's default map is ordered by key, which gives the
    // canonical layout at every nesting level.
    serde_json::to_vec(&Value::Object(envelope)).map_err(ProtocolError::Encode)
}

/// [`encode`] as a `String`.
pub fn encode_to_string(msg: &Message) -> Result<String, ProtocolError> {
    let bytes = encode(msg)?;
    // serde_json only ever produces UTF-8.
    String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidUtf8 {
        fragment: String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

fn body_to_value(body: &Body) -> Result<Value, ProtocolError> {
    let value = match body {
        Body::Empty => Value::Object(Map::new()),
        Body::Join(b) => to_value(b)?,
        Body::Insert(b) | Body::Update(b) => to_value(b)?,
        Body::Delete(b) => to_value(b)?,
        Body::Query(b) => to_value(b)?,
        Body::Subscribe(b) => to_value(b)?,
        Body::Unsubscribe(b) => to_value(b)?,
        Body::Config(b) => to_value(b)?,
        Body::Bulk(items) => Value::Array(
            items
                .iter()
                .map(bulk_item_to_value)
                .collect::<Result<_, _>>()?,
        ),
        Body::Response(b) => response_to_value(b),
        Body::Indication(v) => v.clone(),
    };
    Ok(value)
}

fn to_value<T: serde::Serialize>(body: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(body).map_err(ProtocolError::Encode)
}

fn bulk_item_to_value(item: &BulkItem) -> Result<Value, ProtocolError> {
    let mut map = Map::new();
    map.insert("body".into(), body_to_value(&item.body)?);
    map.insert("ontology".into(), item.ontology.clone().into());
    map.insert("type".into(), item.message_type.as_str().into());
    Ok(Value::Object(map))
}

fn response_to_value(body: &ResponseBody) -> Value {
    let mut map = body.extra.clone();
    map.insert("ok".into(), body.ok.into());
    map.insert("data".into(), body.data.clone().unwrap_or(Value::Null));
    map.insert(
        "error".into(),
        body.error.clone().map_or(Value::Null, Value::String),
    );
    map.insert(
        "errorCode".into(),
        body.error_code
            .map_or(Value::Null, |code| code.as_str().into()),
    );
    Value::Object(map)
}

/// Parses one inbound frame.
///
/// Broker-reported failures (`ok: false` with an `errorCode`) are normal
/// messages. Only frames that cannot be understood at all are errors.
pub fn decode(frame: &[u8]) -> Result<Message, ProtocolError> {
    decode_envelope(frame)?.into_message()
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A frame whose envelope fields decoded, with the body still raw.
///
/// Lets a caller learn which kind of message arrived even when the body
/// turns out to be undecodable.
#[derive(Debug, Clone)]
pub struct Envelope {
    message_type: MessageType,
    direction: Direction,
    session_key: Option<String>,
    ontology: Option<String>,
    body: Value,
}

/// Decodes the envelope of one inbound frame, leaving the body raw.
pub fn decode_envelope(frame: &[u8]) -> Result<Envelope, ProtocolError> {
    let text = std::str::from_utf8(frame).map_err(|_| {
        ProtocolError::InvalidUtf8 {
            fragment: String::from_utf8_lossy(frame).into_owned(),
        }
    })?;
    let cleaned = strip_backslash_pairs(text);
    let value: Value = parse_json(&cleaned)?;

    let Value::Object(mut envelope) = value else {
        return Err(ProtocolError::InvalidEnvelope {
            field: "message",
            fragment: cleaned,
        });
    };

    let message_type: MessageType =
        required_str(&envelope, "messageType", &cleaned)?.parse()?;
    let direction: Direction =
        required_str(&envelope, "direction", &cleaned)?.parse()?;
    let session_key = optional_str(&envelope, "sessionKey", &cleaned)?;
    let ontology = optional_str(&envelope, "ontology", &cleaned)?;
    let body = envelope.remove("body").unwrap_or(Value::Null);

    Ok(Envelope {
        message_type,
        direction,
        session_key,
        ontology,
        body,
    })
}

impl Envelope {
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Decodes the body and completes the message.
    pub fn into_message(self) -> Result<Message, ProtocolError> {
        let Envelope {
            message_type,
            direction,
            session_key,
            ontology,
            mut body,
        } = self;

        while let Value::String(encoded) = body {
            let encoded = if message_type == MessageType::Indication {
                unquote_indication_brackets(&encoded)
            } else {
                encoded
            };
            body = parse_json(&encoded)?;
        }

        let body = if message_type == MessageType::Indication {
            Body::Indication(body)
        } else if direction == Direction::Request {
            decode_request_body(message_type, body)?
        } else {
            Body::Response(decode_response_body(message_type, body)?)
        };

        Ok(Message {
            message_type,
            direction,
            session_key,
            ontology,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_json(text: &str) -> Result<Value, ProtocolError> {
    serde_json::from_str(text).map_err(|source| ProtocolError::MalformedJson {
        source,
        fragment: text.to_string(),
    })
}

fn required_str<'a>(
    envelope: &'a Map<String, Value>,
    field: &'static str,
    fragment: &str,
) -> Result<&'a str, ProtocolError> {
    envelope
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::InvalidEnvelope {
            field,
            fragment: fragment.to_string(),
        })
}

fn optional_str(
    envelope: &Map<String, Value>,
    field: &'static str,
    fragment: &str,
) -> Result<Option<String>, ProtocolError> {
    match envelope.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ProtocolError::InvalidEnvelope {
            field,
            fragment: fragment.to_string(),
        }),
    }
}

/// Removes every occurrence of two consecutive backslashes.
fn strip_backslash_pairs(text: &str) -> String {
    text.replace("\\\\", "")
}

/// INDICATION bodies quote their arrays: `"data":"[...]"`.
fn unquote_indication_brackets(text: &str) -> String {
    text.replace("\"[", "[").replace("]\"", "]")
}

/// Turns `ObjectId("abc")` into the JSON string `"ObjectId('abc')"`.
fn quote_object_ids(text: &str) -> String {
    text.replace("ObjectId", "\"ObjectId")
        .replace("(\"", "('")
        .replace("\")", "')\"")
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

fn decode_request_body(
    message_type: MessageType,
    body: Value,
) -> Result<Body, ProtocolError> {
    let decoded = match message_type {
        MessageType::Leave => Body::Empty,
        MessageType::Join => Body::Join(typed::<JoinBody>(message_type, body)?),
        MessageType::Insert => Body::Insert(typed::<DataBody>(message_type, body)?),
        MessageType::Update => Body::Update(typed::<DataBody>(message_type, body)?),
        MessageType::Delete => Body::Delete(typed::<DeleteBody>(message_type, body)?),
        MessageType::Query => Body::Query(typed::<QueryBody>(message_type, body)?),
        MessageType::Subscribe => {
            Body::Subscribe(typed::<SubscribeBody>(message_type, body)?)
        }
        MessageType::Unsubscribe => {
            Body::Unsubscribe(typed::<UnsubscribeBody>(message_type, body)?)
        }
        MessageType::Config => Body::Config(typed::<ConfigBody>(message_type, body)?),
        MessageType::Bulk => Body::Bulk(decode_bulk_items(body)?),
        MessageType::Indication => Body::Indication(body),
    };
    Ok(decoded)
}

fn decode_bulk_items(body: Value) -> Result<Vec<BulkItem>, ProtocolError> {
    let Value::Array(items) = body else {
        return Err(malformed(MessageType::Bulk, "expected an array", &body));
    };
    items
        .into_iter()
        .map(|item| {
            let Value::Object(mut map) = item else {
                return Err(malformed(MessageType::Bulk, "expected an object", &item));
            };
            let message_type: MessageType = map
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    malformed(MessageType::Bulk, "missing `type`", &Value::Object(map.clone()))
                })?
                .parse()?;
            let ontology = map
                .get("ontology")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let inner = map.remove("body").unwrap_or(Value::Null);
            Ok(BulkItem {
                message_type,
                ontology,
                body: decode_request_body(message_type, inner)?,
            })
        })
        .collect()
}

fn decode_response_body(
    message_type: MessageType,
    body: Value,
) -> Result<ResponseBody, ProtocolError> {
    let mut map = match body {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(malformed(message_type, "expected an object", &other));
        }
    };

    let ok = map.remove("ok").and_then(|v| v.as_bool()).unwrap_or(false);

    let mut data = map.remove("data").filter(|v| !v.is_null());
    let repairs_data = matches!(message_type, MessageType::Insert | MessageType::Update);
    if ok && repairs_data {
        if let Some(Value::String(raw)) = &data {
            data = Some(parse_json(&quote_object_ids(raw))?);
        }
    }

    let error = match map.remove("error") {
        Some(Value::String(text)) => Some(text),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };

    let error_code = match map.remove("errorCode") {
        None | Some(Value::Null) => None,
        Some(Value::String(code)) => Some(code.parse::<ErrorCode>()?),
        Some(other) => return Err(ProtocolError::UnknownErrorCode(other.to_string())),
    };

    Ok(ResponseBody {
        ok,
        data,
        error,
        error_code,
        extra: map,
    })
}

fn typed<T: DeserializeOwned>(
    message_type: MessageType,
    body: Value,
) -> Result<T, ProtocolError> {
    let fragment = body.to_string();
    serde_json::from_value(body).map_err(|source| ProtocolError::MalformedBody {
        message_type,
        source,
        fragment,
    })
}

fn malformed(message_type: MessageType, reason: &str, body: &Value) -> ProtocolError {
    ProtocolError::MalformedBody {
        message_type,
        source: serde::de::Error::custom(reason),
        fragment: body.to_string(),
    }
}
