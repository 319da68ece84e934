use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Error type
///
/// Every variant other than `Decode` ends the session it occurred on.  None of
/// them are retried internally, reconnection policy is left to the caller.
pub enum Error {
    /// The identity service rejected our credentials, or they have expired
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The websocket could not be opened or the handshake was not completed
    #[error("couldn't establish connection: {0}")]
    Connection(String),
    /// The server sent something we didn't expect, or reported a fatal error
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The server stopped sending keepalives
    #[error("no keepalive received within {0:?}")]
    KeepaliveTimeout(Duration),
    /// An I/O failure on the underlying socket or HTTP connection
    #[error("transport error: {0}")]
    Transport(String),
    /// Unexpected close frame
    #[error("got close frame. code: {0}, reason: {1}")]
    Close(u16, String),
    /// Decoding / parsing error
    #[error("message decode error, reason: {0}")]
    Decode(String),
    /// Serializing error
    #[error("couldn't serialize message, reason: {0}")]
    Serializing(String),
    /// Sending error
    #[error("message sending error, reason: {0}")]
    Send(String),
    /// Invalid endpoint or credential configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}
