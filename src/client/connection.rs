use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::{
    protocol::{ClientMessage, Extensions, StartPayload},
    Error,
};

use super::SubscriptionId;

/// Close code for a session that ended normally
pub(super) const CLOSE_NORMAL: u16 = 1000;

/// Close code for a session we abandoned because the server misbehaved
pub(super) const CLOSE_PROTOCOL_ERROR: u16 = 4950;

/// Abstraction around a websocket connection.
///
/// A built in implementation is provided for `async_tungstenite` when the
/// `native` feature is enabled.
///
/// If users wish to add support for a new client they should implement this trait.
pub trait Connection {
    /// Receive the next message on this connection.
    ///
    /// Returns `None` once the connection is gone.
    fn receive(&mut self) -> impl Future<Output = Option<Message>> + Send;

    /// Send a message with on connection
    fn send(&mut self, message: Message) -> impl Future<Output = Result<(), Error>> + Send;
}

/// A websocket message
///
/// Websocket client libraries usually provide their own version of this struct.
/// The [Connection] trait for a given client should handle translation to & from this enum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// A message containing the given text payload
    Text(String),
    /// A message that closes the connection with the given code & reason
    Close {
        /// The status code for this close message
        code: Option<u16>,
        /// Some text explaining the reason the connection is being closed
        reason: Option<String>,
    },
    /// A ping
    Ping,
    /// A reply to a ping
    Pong,
}

impl Message {
    pub(crate) fn deserialize<T>(self) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let Message::Text(text) = self else {
            return Err(Error::Protocol("expected a text frame".into()));
        };

        serde_json::from_str(&text)
            .map_err(|error| Error::Protocol(format!("unrecognised frame {text}: {error}")))
    }

    pub(crate) fn init() -> Self {
        Self::frame(&ClientMessage::ConnectionInit)
    }

    pub(crate) fn start(
        id: SubscriptionId,
        data: String,
        authorization: BTreeMap<String, String>,
    ) -> Self {
        Self::frame(&ClientMessage::Start {
            id: id.to_string(),
            payload: StartPayload {
                data,
                extensions: Extensions { authorization },
            },
        })
    }

    pub(crate) fn stop(id: SubscriptionId) -> Self {
        Self::frame(&ClientMessage::Stop { id: id.to_string() })
    }

    pub(crate) fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close {
            code: Some(code),
            reason: Some(reason.into()),
        }
    }

    fn frame(message: &ClientMessage) -> Self {
        Self::Text(
            serde_json::to_string(message)
                .expect("client messages only contain strings so this shouldn't fail"),
        )
    }
}

/// An object safe wrapper around the Connection trait, allowing us
/// to use it dynamically
pub(crate) trait ObjectSafeConnection: Send {
    fn receive(&mut self) -> Pin<Box<dyn Future<Output = Option<Message>> + Send + '_>>;

    fn send(
        &mut self,
        message: Message,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>>;
}

impl<T: Connection + Sized + Send> ObjectSafeConnection for T {
    fn receive(&mut self) -> Pin<Box<dyn Future<Output = Option<Message>> + Send + '_>> {
        Box::pin(Connection::receive(self))
    }

    fn send(
        &mut self,
        message: Message,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(Connection::send(self, message))
    }
}
