//! Closed enumerations used on the SSAP wire.
//!
//! Every enum has a bijective string table: [`as_str`](MessageType::as_str)
//! gives the wire spelling and `FromStr` parses it back, failing with a
//! dedicated [`ProtocolError`] variant that carries the unknown token.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Wire string tables
// ---------------------------------------------------------------------------

/// Declares a fieldless enum together with its wire string table.
///
/// Generates `ALL`, `as_str`, `from_wire`, `Display`, and string-based
/// serde impls. `FromStr` is written per enum so each one can report its
/// own error variant.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// The wire spelling of this value.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Looks up a value by its exact wire spelling.
            pub fn from_wire(text: &str) -> Option<Self> {
                match text {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

wire_enum! {
    /// The kind of an SSAP message.
    pub enum MessageType {
        Join => "JOIN",
        Leave => "LEAVE",
        Insert => "INSERT",
        Update => "UPDATE",
        Delete => "DELETE",
        Query => "QUERY",
        Subscribe => "SUBSCRIBE",
        Unsubscribe => "UNSUBSCRIBE",
        /// Server-pushed subscription notification. Never answers a request.
        Indication => "INDICATION",
        Config => "CONFIG",
        Bulk => "BULK",
    }
}

impl MessageType {
    /// Kinds whose handlers are keyed by ontology as well as by kind.
    pub const SUBSCRIPTION_KINDS: [MessageType; 3] = [
        MessageType::Subscribe,
        MessageType::Unsubscribe,
        MessageType::Indication,
    ];

    /// `true` for SUBSCRIBE, UNSUBSCRIBE and INDICATION.
    pub fn is_subscription_kind(self) -> bool {
        Self::SUBSCRIPTION_KINDS.contains(&self)
    }

    /// `true` if responses of this kind carry an `ok` flag.
    ///
    /// INDICATION and CONFIG bodies have no `ok` field.
    pub fn has_ok_field(self) -> bool {
        !matches!(self, MessageType::Indication | MessageType::Config)
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s)
            .ok_or_else(|| ProtocolError::UnknownMessageType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

wire_enum! {
    /// Whether a message is a request, a response, or an error response.
    pub enum Direction {
        Request => "REQUEST",
        Response => "RESPONSE",
        Error => "ERROR",
    }
}

impl FromStr for Direction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s)
            .ok_or_else(|| ProtocolError::UnknownDirection(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// QueryType
// ---------------------------------------------------------------------------

wire_enum! {
    /// How the `query`/`data` payload of a request is interpreted.
    pub enum QueryType {
        SqlLike => "SQLLIKE",
        /// MongoDB-style native JSON. The only type whose INSERT payload
        /// travels in `data` instead of `query`.
        Native => "NATIVE",
        SibDefined => "SIB_DEFINED",
        Cep => "CEP",
        /// Historical database.
        Hdb => "HDB",
        /// Configuration database.
        Cdb => "CDB",
    }
}

impl Default for QueryType {
    fn default() -> Self {
        QueryType::Native
    }
}

impl FromStr for QueryType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s)
            .ok_or_else(|| ProtocolError::UnknownQueryType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

wire_enum! {
    /// Broker-reported failure category on a response whose `ok` is false.
    pub enum ErrorCode {
        Authentication => "AUTHENTICATION",
        Authorization => "AUTHORIZATION",
        Processor => "PROCESSOR",
        Persistence => "PERSISTENCE",
        ParseSql => "PARSE_SQL",
        OntologyNotFound => "ONTOLOGY_NOT_FOUND",
        SibDefinedQueryNotFound => "SIB_DEFINED_QUERY_NOT_FOUND",
        Other => "OTHER",
    }
}

impl ErrorCode {
    /// The broker's own spelling of [`ErrorCode::Authentication`].
    pub const BROKER_AUTHENTICATION_SPELLING: &'static str = "AUTENTICATION";
}

impl FromStr for ErrorCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::BROKER_AUTHENTICATION_SPELLING {
            return Ok(ErrorCode::Authentication);
        }
        Self::from_wire(s)
            .ok_or_else(|| ProtocolError::UnknownErrorCode(s.to_string()))
    }
}
