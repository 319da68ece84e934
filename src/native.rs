//! Integration with `async-tungstenite` on tokio.

use std::{future::poll_fn, pin::Pin};

use async_tungstenite::tokio::{connect_async, ConnectStream};
use chrono::Utc;
use futures_lite::{ready, Stream, StreamExt};
use futures_sink::Sink;
use tungstenite::{
    client::IntoClientRequest,
    http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
    protocol::{frame::coding::CloseCode, CloseFrame},
};

use crate::{
    client::{Connection, Message},
    credentials::Credentials,
    endpoint::Endpoint,
    logging::{debug, warning},
    Error,
};

/// The websocket sub-protocol realtime endpoints speak
pub const SUBPROTOCOL: &str = "graphql-ws";

/// A websocket opened by [`connect`]
pub type RealtimeSocket = async_tungstenite::WebSocketStream<ConnectStream>;

/// Opens a websocket to the realtime endpoint for `endpoint`, authorized
/// with `credentials`.
///
/// The connection isn't retried, failures are reported as
/// [`Error::Connection`].
pub async fn connect(endpoint: &Endpoint, credentials: &Credentials) -> Result<RealtimeSocket, Error> {
    let url = endpoint.connection_url(credentials, Utc::now());

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|error| Error::Connection(error.to_string()))?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

    // The URL carries a signature, so only the host is logged
    debug!("connecting to {}", endpoint.realtime_url());

    let (socket, _) = connect_async(request)
        .await
        .map_err(|error| Error::Connection(error.to_string()))?;

    Ok(socket)
}

impl<T> Connection for T
where
    T: Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
        + Sink<tungstenite::Message>
        + Send
        + Unpin,
    <T as Sink<tungstenite::Message>>::Error: std::fmt::Display,
{
    async fn receive(&mut self) -> Option<Message> {
        loop {
            match self.next().await? {
                Ok(tungstenite::Message::Text(text)) => return Some(Message::Text(text)),
                Ok(tungstenite::Message::Ping(_)) => return Some(Message::Ping),
                Ok(tungstenite::Message::Pong(_)) => return Some(Message::Pong),
                Ok(tungstenite::Message::Close(frame)) => {
                    return Some(Message::Close {
                        code: frame.as_ref().map(|frame| frame.code.into()),
                        reason: frame.map(|frame| frame.reason.to_string()),
                    });
                }
                Ok(tungstenite::Message::Frame(_) | tungstenite::Message::Binary(_)) => continue,
                Err(error) => {
                    #[allow(unused)]
                    let error = error;
                    warning!("error receiving message: {error:?}");
                    return None;
                }
            }
        }
    }

    async fn send(&mut self, message: Message) -> Result<(), Error> {
        let message = match message {
            Message::Text(text) => tungstenite::Message::Text(text),
            Message::Close { code, reason } => {
                tungstenite::Message::Close(code.map(|code| CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.unwrap_or_default().into(),
                }))
            }
            Message::Ping => tungstenite::Message::Ping(Vec::new()),
            Message::Pong => tungstenite::Message::Pong(Vec::new()),
        };

        let mut message = Some(message);
        poll_fn(|cx| {
            let mut sink = Pin::new(&mut *self);
            // The frame stays put until the sink has room for it
            if message.is_some() {
                ready!(sink.as_mut().poll_ready(cx))?;
                if let Some(message) = message.take() {
                    sink.as_mut().start_send(message)?;
                }
            }
            sink.poll_flush(cx)
        })
        .await
        .map_err(|error| Error::Send(error.to_string()))
    }
}
