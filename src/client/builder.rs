use std::{future::Future, time::Duration};

use chrono::Utc;
use futures_lite::{future, StreamExt};
use futures_timer::Delay;

use crate::{
    credentials::Credentials,
    endpoint::{Endpoint, GRAPHQL_URI},
    graphql::GraphqlOperation,
    logging::{debug, trace},
    protocol::{self, Event},
    Error,
};

use super::{
    actor::SessionActor,
    connection::{Connection, Message, ObjectSafeConnection, CLOSE_PROTOCOL_ERROR},
    keepalive::KeepAlive,
    state::{SessionState, SessionStatus},
    Subscription, SubscriptionHandle, SubscriptionId,
};

const DEFAULT_SUBSCRIPTION_BUFFER_SIZE: usize = 5;
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_millis(300_000);

/// Builder for realtime subscription sessions
///
/// ```rust,no_run
/// use appsync_realtime_client::{Endpoint, SubscriptionBuilder, StsCredentialProvider, AccessKey};
/// use appsync_realtime_client::graphql::SubscriptionRequest;
/// use futures_lite::StreamExt;
///
/// # async fn example() -> Result<(), appsync_realtime_client::Error> {
/// let provider = StsCredentialProvider::new(AccessKey::from_env()?);
/// let endpoint = Endpoint::parse("https://abc123.appsync-api.eu-west-1.amazonaws.com/graphql")?;
///
/// let mut subscription = SubscriptionBuilder::new(endpoint)
///     .subscribe(&provider, SubscriptionRequest::new("subscription { onUpdate { id } }"))
///     .await?;
///
/// while let Some(event) = subscription.next().await {
///     println!("{:?}", event?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SubscriptionBuilder {
    endpoint: Endpoint,
    subscription_buffer_size: Option<usize>,
    handshake_timeout: Option<Duration>,
    fallback_keep_alive: Duration,
}

impl SubscriptionBuilder {
    /// Creates a SubscriptionBuilder for the given GraphQL endpoint
    pub fn new(endpoint: Endpoint) -> Self {
        SubscriptionBuilder {
            endpoint,
            subscription_buffer_size: None,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            fallback_keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }

    /// Overrides the region requests are signed for
    pub fn region(self, region: impl Into<String>) -> Self {
        SubscriptionBuilder {
            endpoint: self.endpoint.with_region(region),
            ..self
        }
    }

    /// Sets the number of events that can be buffered before the session
    /// waits for the subscriber to catch up
    pub fn subscription_buffer_size(self, new: usize) -> Self {
        SubscriptionBuilder {
            subscription_buffer_size: Some(new),
            ..self
        }
    }

    /// Sets how long to wait for the socket to open and the server to
    /// acknowledge the connection.  Defaults to 30 seconds.
    pub fn handshake_timeout(self, timeout: Duration) -> Self {
        SubscriptionBuilder {
            handshake_timeout: Some(timeout),
            ..self
        }
    }

    /// Waits on the handshake for as long as the transport allows
    pub fn no_handshake_timeout(self) -> Self {
        SubscriptionBuilder {
            handshake_timeout: None,
            ..self
        }
    }

    /// The keepalive interval to use if the server doesn't provide one in
    /// its `connection_ack`
    pub fn fallback_keep_alive(self, interval: Duration) -> Self {
        SubscriptionBuilder {
            fallback_keep_alive: interval,
            ..self
        }
    }

    /// Fetches credentials, connects and registers a single subscription.
    ///
    /// The returned stream also drives the session, so it just needs to be
    /// polled.
    #[cfg(feature = "native")]
    pub async fn subscribe<Provider, Operation>(
        self,
        provider: &Provider,
        operation: Operation,
    ) -> Result<Subscription<Operation>, Error>
    where
        Provider: crate::CredentialProvider,
        Operation: GraphqlOperation + Unpin + Send + 'static,
        Operation::Response: Send + 'static,
    {
        use std::future::IntoFuture;

        let credentials = provider.session_credentials().await?;

        let connection = within(
            self.handshake_timeout,
            "opening the connection",
            crate::native::connect(&self.endpoint, &credentials),
        )
        .await?;

        let (subscription, actor) = self.build(connection, credentials, operation).await?;

        Ok(subscription.join(actor.into_future()))
    }

    /// Runs the handshake over an already open connection and registers a
    /// single subscription.
    ///
    /// Returns the subscription along with the actor that drives it, which
    /// must be awaited somewhere (usually spawned) for anything to happen.
    /// The connection should have been opened with the signed URL from
    /// [`Endpoint::connection_url`].
    pub async fn build<Conn, Operation>(
        self,
        connection: Conn,
        credentials: Credentials,
        operation: Operation,
    ) -> Result<(Subscription<Operation>, SessionActor), Error>
    where
        Conn: Connection + Send + 'static,
        Operation: GraphqlOperation + Send + 'static,
        Operation::Response: Send + 'static,
    {
        let Self {
            endpoint,
            subscription_buffer_size,
            handshake_timeout,
            fallback_keep_alive,
        } = self;

        if credentials.is_expired_at(Utc::now()) {
            return Err(Error::Authentication("credentials have expired".into()));
        }

        let mut connection: Box<dyn ObjectSafeConnection> = Box::new(connection);
        let status = SessionStatus::default();

        status.set_state(SessionState::AwaitingAck);
        connection.send(Message::init()).await?;

        let keep_alive = within(
            handshake_timeout,
            "waiting for connection_ack",
            wait_for_ack(connection.as_mut()),
        )
        .await?
        .unwrap_or(fallback_keep_alive);

        trace!("connection_ack received, keepalive interval {keep_alive:?}");
        status.set_state(SessionState::Registering);

        let id = SubscriptionId::generate();
        let data = serde_json::to_string(&operation)
            .map_err(|error| Error::Serializing(error.to_string()))?;

        let authorization = endpoint
            .sign(&credentials, GRAPHQL_URI, &data, Utc::now())
            .header_object();

        debug!("registering subscription {id}");
        connection
            .send(Message::start(id, data, authorization))
            .await?;

        let (event_sender, event_receiver) = async_channel::bounded(
            subscription_buffer_size.unwrap_or(DEFAULT_SUBSCRIPTION_BUFFER_SIZE),
        );
        let (command_sender, command_receiver) = async_channel::unbounded();
        let (closed_sender, closed_receiver) = async_channel::bounded(1);

        let actor = SessionActor::new(
            connection,
            id,
            command_receiver,
            event_sender,
            KeepAlive::armed(keep_alive),
            status.clone(),
            closed_sender,
        );

        let subscription = Subscription {
            handle: SubscriptionHandle {
                id,
                commands: command_sender,
                closed: closed_receiver,
                status,
            },
            stream: Some(
                event_receiver
                    .map(move |payload| {
                        operation
                            .decode(payload)
                            .map_err(|error| Error::Decode(error.to_string()))
                    })
                    .boxed(),
            ),
        };

        Ok((subscription, actor))
    }
}

/// Subscribes to `operation` on the GraphQL endpoint at `endpoint`, invoking
/// `handler` for every event until the session closes.
///
/// The handler is expected to unsubscribe (via the handle it is given) once
/// it has seen what it was waiting for.  Returns `Ok` if the session ended
/// that way, or the error that ended it.
///
/// ```rust,no_run
/// use appsync_realtime_client::{AccessKey, StsCredentialProvider};
/// use appsync_realtime_client::graphql::SubscriptionRequest;
///
/// # async fn example() -> Result<(), appsync_realtime_client::Error> {
/// let provider = StsCredentialProvider::new(AccessKey::from_env()?);
///
/// appsync_realtime_client::subscribe(
///     &provider,
///     "https://abc123.appsync-api.eu-west-1.amazonaws.com/graphql",
///     SubscriptionRequest::new("subscription { onUpdate { id status } }"),
///     |event, handle| {
///         let Ok(event) = event else { return };
///         if event["data"]["onUpdate"]["status"] == "DONE" {
///             handle.unsubscribe();
///         }
///     },
/// )
/// .await
/// # }
/// ```
#[cfg(feature = "native")]
pub async fn subscribe<Provider, Operation, Handler>(
    provider: &Provider,
    endpoint: &str,
    operation: Operation,
    handler: Handler,
) -> Result<(), Error>
where
    Provider: crate::CredentialProvider,
    Operation: GraphqlOperation + Unpin + Send + 'static,
    Operation::Response: Send + 'static,
    Handler: FnMut(Result<Operation::Response, Error>, &SubscriptionHandle),
{
    SubscriptionBuilder::new(Endpoint::parse(endpoint)?)
        .subscribe(provider, operation)
        .await?
        .dispatch(handler)
        .await
}

/// Waits for `connection_ack`, returning the keepalive interval it carried
async fn wait_for_ack(
    connection: &mut dyn ObjectSafeConnection,
) -> Result<Option<Duration>, Error> {
    loop {
        let message = match connection.receive().await {
            None => return Err(Error::Transport("connection dropped".into())),
            Some(Message::Close { code, reason }) => {
                return Err(Error::Close(
                    code.unwrap_or_default(),
                    reason.unwrap_or_default(),
                ))
            }
            Some(Message::Ping | Message::Pong) => continue,
            Some(message @ Message::Text(_)) => message,
        };

        match message.deserialize::<Event>()? {
            Event::ConnectionAck { payload } => {
                return Ok(payload
                    .and_then(|payload| payload.connection_timeout_ms)
                    .map(Duration::from_millis));
            }
            // Keepalives can start before the ack
            Event::Ka => {}
            Event::Error { payload, .. } | Event::ConnectionError { payload } => {
                return Err(Error::Protocol(format!(
                    "connection rejected: {}",
                    protocol::describe_errors(payload.as_ref())
                )));
            }
            event => {
                connection
                    .send(Message::close(
                        CLOSE_PROTOCOL_ERROR,
                        "Unexpected message while waiting for ack",
                    ))
                    .await
                    .ok();
                return Err(Error::Protocol(format!(
                    "expected a connection_ack, got {}",
                    event.r#type()
                )));
            }
        }
    }
}

/// Runs `future`, failing with a connection error if it takes longer than
/// `timeout`
async fn within<T>(
    timeout: Option<Duration>,
    stage: &str,
    future: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    let Some(timeout) = timeout else {
        return future.await;
    };

    future::or(future, async {
        Delay::new(timeout).await;
        Err(Error::Connection(format!(
            "handshake timed out after {timeout:?} {stage}"
        )))
    })
    .await
}
