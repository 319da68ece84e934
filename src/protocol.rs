//! Message definitions for the AppSync flavour of the [graphql-ws protocol][1]
//!
//! AppSync speaks the older subscriptions-transport-ws dialect with a few
//! additions of its own: `ka` keepalives, `start_ack` and `connection_error`.
//!
//! [1]: https://docs.aws.amazon.com/appsync/latest/devguide/real-time-websocket-client.html

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Messages sent from the client to the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit,
    Start { id: String, payload: StartPayload },
    Stop { id: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StartPayload {
    /// The JSON encoded `{"query": .., "variables": ..}` document.
    ///
    /// This has to be a string rather than an object as the authorization
    /// signature is computed over these exact bytes.
    pub data: String,
    pub extensions: Extensions,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Extensions {
    pub authorization: BTreeMap<String, String>,
}

/// Messages sent from the server to the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<ConnectionAckPayload>,
    },
    Ka,
    StartAck {
        id: String,
    },
    Data {
        id: String,
        payload: Value,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    ConnectionError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Complete {
        id: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAckPayload {
    #[serde(rename = "connectionTimeoutMs")]
    pub connection_timeout_ms: Option<u64>,
}

impl Event {
    pub fn r#type(&self) -> &'static str {
        match self {
            Event::ConnectionAck { .. } => "connection_ack",
            Event::Ka => "ka",
            Event::StartAck { .. } => "start_ack",
            Event::Data { .. } => "data",
            Event::Error { .. } => "error",
            Event::ConnectionError { .. } => "connection_error",
            Event::Complete { .. } => "complete",
        }
    }
}

/// Converts the payload of an in-stream `error` frame into something shaped
/// like a GraphQL response, so it can be decoded by the subscriber.
pub fn error_response(payload: Option<Value>) -> Value {
    match payload {
        Some(Value::Object(object)) if object.contains_key("errors") => Value::Object(object),
        Some(Value::Array(errors)) => json!({ "errors": errors }),
        Some(error) => json!({ "errors": [error] }),
        None => json!({ "errors": [] }),
    }
}

/// A short human readable description of an error payload
pub fn describe_errors(payload: Option<&Value>) -> String {
    let Some(payload) = payload else {
        return "no details given".into();
    };

    let messages = payload
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|error| {
                    let message = error.get("message").and_then(Value::as_str);
                    let kind = error.get("errorType").and_then(Value::as_str);
                    match (kind, message) {
                        (Some(kind), Some(message)) => Some(format!("{kind}: {message}")),
                        (None, Some(message)) => Some(message.to_owned()),
                        (Some(kind), None) => Some(kind.to_owned()),
                        (None, None) => None,
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if messages.is_empty() {
        payload.to_string()
    } else {
        messages.join("; ")
    }
}
