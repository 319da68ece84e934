use std::future::IntoFuture;

use futures_lite::future;
use serde_json::Value;

use crate::{
    logging::{debug, trace, warning},
    protocol::{self, Event},
    Error,
};

use super::{
    connection::{Message, ObjectSafeConnection, CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR},
    keepalive::KeepAlive,
    state::{SessionState, SessionStatus},
    ConnectionCommand, SubscriptionId,
};

/// The future that drives a subscription session.
///
/// This is the sole owner of the underlying connection: frames from the
/// server, commands from subscription handles and keepalive expiry are all
/// handled here one at a time, in the order they arrive.
///
/// This needs to be awaited (usually by spawning it on your executor) for
/// the subscription to make any progress.  Dropping it closes the session.
#[must_use]
pub struct SessionActor {
    connection: Box<dyn ObjectSafeConnection>,
    id: SubscriptionId,
    commands: async_channel::Receiver<ConnectionCommand>,
    events: async_channel::Sender<Value>,
    keep_alive: KeepAlive,
    status: SessionStatus,
    // Never sent on, handles notice it closing when the actor is dropped.
    _closed: async_channel::Sender<()>,
}

/// Why the main loop stopped
enum Exit {
    /// The caller asked to stop, or stopped listening
    Unsubscribed,
    /// The server ended the subscription
    Completed,
    /// Something went wrong and we're closing the connection
    Failed(Error),
    /// The connection is already gone
    Disconnected(Error),
}

enum Next {
    Command(ConnectionCommand),
    Message(Message),
    ConnectionDropped,
    KeepAliveExpired,
}

impl SessionActor {
    pub(super) fn new(
        connection: Box<dyn ObjectSafeConnection>,
        id: SubscriptionId,
        commands: async_channel::Receiver<ConnectionCommand>,
        events: async_channel::Sender<Value>,
        keep_alive: KeepAlive,
        status: SessionStatus,
        closed: async_channel::Sender<()>,
    ) -> Self {
        status.set_keep_alive(keep_alive.interval());

        SessionActor {
            connection,
            id,
            commands,
            events,
            keep_alive,
            status,
            _closed: closed,
        }
    }

    async fn run(mut self) {
        let exit = self.process().await;

        self.keep_alive.disarm();
        self.status.set_state(SessionState::Closing);

        let error = match exit {
            Exit::Unsubscribed => {
                debug!("unsubscribing {}", self.id);
                let stopped = self.connection.send(Message::stop(self.id)).await;
                self.close(CLOSE_NORMAL, "unsubscribed").await;
                stopped.err()
            }
            Exit::Completed => {
                debug!("server completed subscription {}", self.id);
                self.close(CLOSE_NORMAL, "subscription complete").await;
                None
            }
            Exit::Failed(error) => {
                let code = match error {
                    Error::KeepaliveTimeout(_) => CLOSE_NORMAL,
                    _ => CLOSE_PROTOCOL_ERROR,
                };
                self.close(code, error.to_string()).await;
                Some(error)
            }
            Exit::Disconnected(error) => Some(error),
        };

        if let Some(error) = error {
            warning!("subscription {} ended: {error}", self.id);
            self.status.fail(error);
        }

        // Dropping self marks the session closed
    }

    async fn process(&mut self) -> Exit {
        loop {
            let exit = match self.next().await {
                Next::Command(ConnectionCommand::Unsubscribe) => Some(Exit::Unsubscribed),
                Next::Message(message) => match self.handle_message(message).await {
                    Ok(exit) => exit,
                    Err(error) => Some(Exit::Failed(error)),
                },
                Next::ConnectionDropped => Some(Exit::Disconnected(Error::Transport(
                    "connection dropped".into(),
                ))),
                Next::KeepAliveExpired => Some(Exit::Failed(Error::KeepaliveTimeout(
                    self.keep_alive.interval(),
                ))),
            };

            if let Some(exit) = exit {
                return exit;
            }
        }
    }

    async fn handle_message(&mut self, message: Message) -> Result<Option<Exit>, Error> {
        let event = match message {
            Message::Text(text) => {
                trace!("<< {text}");
                Message::Text(text).deserialize::<Event>()?
            }
            Message::Close { code, reason } => {
                return Ok(Some(Exit::Disconnected(Error::Close(
                    code.unwrap_or_default(),
                    reason.unwrap_or_default(),
                ))))
            }
            // The websocket library takes care of replying to pings
            Message::Ping | Message::Pong => return Ok(None),
        };

        match event {
            Event::Ka => {
                self.keep_alive.rearm();
            }
            Event::StartAck { id } => {
                self.check_id(&id)?;
                trace!("subscription {} registered", self.id);
                self.status.set_state(SessionState::Streaming);
            }
            Event::Data { id, payload } => {
                self.check_id(&id)?;
                self.status.set_state(SessionState::Streaming);
                return Ok(self.forward(payload).await);
            }
            Event::Error { id, payload } => {
                if let Some(id) = &id {
                    self.check_id(id)?;
                }

                if self.status.state() == SessionState::Registering {
                    return Err(Error::Protocol(format!(
                        "subscription rejected: {}",
                        protocol::describe_errors(payload.as_ref())
                    )));
                }

                debug!(
                    "error in subscription {}: {}",
                    self.id,
                    protocol::describe_errors(payload.as_ref())
                );
                return Ok(self.forward(protocol::error_response(payload)).await);
            }
            Event::ConnectionError { payload } => {
                return Err(Error::Protocol(format!(
                    "connection error: {}",
                    protocol::describe_errors(payload.as_ref())
                )));
            }
            Event::Complete { id } => {
                self.check_id(&id)?;
                return Ok(Some(Exit::Completed));
            }
            Event::ConnectionAck { .. } => {
                return Err(Error::Protocol("unexpected connection_ack".into()));
            }
        }

        Ok(None)
    }

    /// Sends a payload to the subscriber, waiting for room in the buffer.
    ///
    /// Commands & keepalive expiry are still handled while waiting, so a
    /// subscriber that has stopped reading can't wedge the session.
    async fn forward(&mut self, payload: Value) -> Option<Exit> {
        let SessionActor {
            commands,
            events,
            keep_alive,
            ..
        } = self;

        let command = async {
            match commands.recv().await {
                // A closed channel means every handle is gone
                Ok(ConnectionCommand::Unsubscribe) | Err(_) => Some(Exit::Unsubscribed),
            }
        };

        let send = async {
            match events.send(payload).await {
                Ok(()) => None,
                // Nobody is listening
                Err(_) => Some(Exit::Unsubscribed),
            }
        };

        let expiry = async {
            keep_alive.expired().await;
            Some(Exit::Failed(Error::KeepaliveTimeout(keep_alive.interval())))
        };

        future::or(command, future::or(send, expiry)).await
    }

    fn check_id(&self, id: &str) -> Result<(), Error> {
        if self.id.matches(id) {
            return Ok(());
        }
        Err(Error::Protocol(format!(
            "received a frame for unknown subscription {id}"
        )))
    }

    async fn close(&mut self, code: u16, reason: impl Into<String>) {
        self.connection.send(Message::close(code, reason)).await.ok();
    }

    async fn next(&mut self) -> Next {
        let SessionActor {
            connection,
            commands,
            keep_alive,
            ..
        } = self;

        let command = async {
            match commands.recv().await {
                Ok(command) => Next::Command(command),
                // Every handle is gone, so nobody can be listening
                Err(_) => Next::Command(ConnectionCommand::Unsubscribe),
            }
        };

        let message = async {
            match connection.receive().await {
                Some(message) => Next::Message(message),
                None => Next::ConnectionDropped,
            }
        };

        let expiry = async {
            keep_alive.expired().await;
            Next::KeepAliveExpired
        };

        // Commands take priority, and anything already received is handled
        // before keepalive expiry so a late `ka` still counts.
        future::or(command, future::or(message, expiry)).await
    }
}

impl std::fmt::Debug for SessionActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionActor")
            .field("id", &self.id)
            .field("keep_alive", &self.keep_alive.interval())
            .finish_non_exhaustive()
    }
}

impl Drop for SessionActor {
    fn drop(&mut self) {
        self.status.set_state(SessionState::Closed);
    }
}

impl IntoFuture for SessionActor {
    type Output = ();

    type IntoFuture = future::Boxed<()>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}
