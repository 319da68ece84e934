use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures_lite::{future, stream, Stream, StreamExt};

use crate::{graphql::GraphqlOperation, logging::trace, Error};

use super::{
    production_future::read_from_producer,
    state::{SessionState, SessionStatus},
    ConnectionCommand, SubscriptionId,
};

/// A `futures::Stream` for a subscription.
///
/// Emits an item for each `data` frame received, in the order the server sent
/// them.  Items are only errors if a payload couldn't be decoded, the reason
/// a session ended is available from [`SubscriptionHandle::closed`].
///
/// End a subscription with [`Subscription::unsubscribe`], which sends `stop`
/// and waits for the connection to close.
///
/// Dropping this only unsubscribes cleanly when the [`crate::SessionActor`] is
/// running elsewhere (see [`crate::SubscriptionBuilder::build`]).  When the
/// session is driven by this stream (see [`crate::SubscriptionBuilder::subscribe`])
/// dropping it abandons the connection without a `stop`.
#[must_use = "subscriptions should be ended with `unsubscribe().await`"]
#[pin_project::pin_project(PinnedDrop)]
pub struct Subscription<Operation>
where
    Operation: GraphqlOperation,
{
    pub(in crate::client) handle: SubscriptionHandle,
    pub(in crate::client) stream: Option<stream::Boxed<Result<Operation::Response, Error>>>,
}

#[pin_project::pinned_drop]
impl<Operation> PinnedDrop for Subscription<Operation>
where
    Operation: GraphqlOperation,
{
    fn drop(self: Pin<&mut Self>) {
        self.handle.unsubscribe();
    }
}

impl<Operation> Subscription<Operation>
where
    Operation: GraphqlOperation + Send,
{
    /// Returns the client generated identifier for this subscription.
    pub fn id(&self) -> SubscriptionId {
        self.handle.id
    }

    /// Returns a handle that can be used to unsubscribe or monitor the session
    /// from elsewhere.
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// Stops this subscription, waiting for the `stop` to be sent and the
    /// connection closed.
    ///
    /// Any events still in flight are discarded.  Returns the reason the
    /// session ended, which is `Ok` unless it had already failed.
    pub async fn unsubscribe(mut self) -> Result<(), Error>
    where
        Operation: Unpin,
    {
        let handle = self.handle();
        handle.unsubscribe();

        while self.next().await.is_some() {}

        drop(self);
        handle.closed().await
    }

    /// Feeds every event to `handler` in order until the session closes.
    ///
    /// The handler is given a [`SubscriptionHandle`] so it can unsubscribe
    /// once it sees whatever it was waiting for.  Returns the reason the
    /// session ended, as [`SubscriptionHandle::closed`] does.
    pub async fn dispatch<Handler>(mut self, mut handler: Handler) -> Result<(), Error>
    where
        Operation: Unpin,
        Handler: FnMut(Result<Operation::Response, Error>, &SubscriptionHandle),
    {
        let handle = self.handle();

        while let Some(event) = self.next().await {
            handler(event, &handle);
        }

        // Release the stream before waiting, it may be what's driving the session
        drop(self);
        handle.closed().await
    }

    pub(super) fn join(mut self, future: future::Boxed<()>) -> Self
    where
        Operation::Response: 'static,
    {
        self.stream = self
            .stream
            .take()
            .map(|stream| join_stream(stream, future).boxed());
        self
    }
}

impl<Operation> std::fmt::Debug for Subscription<Operation>
where
    Operation: GraphqlOperation,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.handle.id)
            .field("state", &self.handle.state())
            .finish_non_exhaustive()
    }
}

impl<Operation> Stream for Subscription<Operation>
where
    Operation: GraphqlOperation + Unpin,
{
    type Item = Result<Operation::Response, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.project().stream.as_mut() {
            None => Poll::Ready(None),
            Some(stream) => stream.poll_next(cx),
        }
    }
}

/// A cheap, cloneable reference to a running subscription.
///
/// This can be sent to other tasks to unsubscribe or watch for the session
/// ending without needing access to the `Subscription` itself.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    pub(in crate::client) id: SubscriptionId,
    pub(in crate::client) commands: async_channel::Sender<ConnectionCommand>,
    pub(in crate::client) closed: async_channel::Receiver<()>,
    pub(in crate::client) status: SessionStatus,
}

impl SubscriptionHandle {
    /// The client generated identifier for this subscription
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Asks the session to send a `stop` for this subscription and close the
    /// connection.
    ///
    /// Can be called from anywhere.  Calling this on a session that's already
    /// closing or closed does nothing.
    pub fn unsubscribe(&self) {
        // The command channel is unbounded so this can only fail if the
        // session has already gone away, which is what we wanted anyway.
        if self.commands.try_send(ConnectionCommand::Unsubscribe).is_ok() {
            trace!("unsubscribe requested for {}", self.id);
        }
    }

    /// The current state of the session
    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    /// The keepalive interval the server asked for in its `connection_ack`
    pub fn keep_alive_interval(&self) -> Option<Duration> {
        self.status.keep_alive()
    }

    /// Waits for the session to close.
    ///
    /// Resolves to `Ok` if it closed normally (an unsubscribe, or the server
    /// completing the subscription) and the error that ended it otherwise.
    ///
    /// The session has to be running for this to resolve - if it's joined
    /// to the `Subscription` stream, something needs to be polling that.
    pub async fn closed(&self) -> Result<(), Error> {
        // Nothing is ever sent on this channel, recv returns once the
        // session drops its end.
        self.closed.recv().await.ok();

        match self.status.error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Joins a future onto the execution of a stream returning a stream that also polls
/// the given future.
///
/// If the future ends the stream will still continue till completion but if the stream
/// ends the future will be cancelled.
///
/// This is used to tie the session actor to the subscription stream, so that
/// polling the stream is all a user needs to do to run the subscription.
fn join_stream<Item>(
    stream: stream::Boxed<Item>,
    future: future::Boxed<()>,
) -> impl Stream<Item = Item> {
    stream::unfold(ProducerState::Running(stream, future), producer_handler)
}

enum ProducerState<Item> {
    Running(stream::Boxed<Item>, future::Boxed<()>),
    Draining(stream::Boxed<Item>),
}

async fn producer_handler<Item>(
    mut state: ProducerState<Item>,
) -> Option<(Item, ProducerState<Item>)> {
    loop {
        match state {
            ProducerState::Running(mut stream, producer) => {
                match read_from_producer(stream.next(), producer).await {
                    Some((item, producer)) => {
                        return Some((item?, ProducerState::Running(stream, producer)));
                    }
                    None => state = ProducerState::Draining(stream),
                }
            }
            ProducerState::Draining(mut stream) => {
                return Some((stream.next().await?, ProducerState::Draining(stream)));
            }
        }
    }
}
