mod actor;
mod builder;
mod connection;
mod keepalive;
mod production_future;
mod state;
mod subscription;
mod subscription_id;

pub use self::{
    actor::SessionActor,
    builder::SubscriptionBuilder,
    connection::{Connection, Message},
    state::SessionState,
    subscription::{Subscription, SubscriptionHandle},
    subscription_id::SubscriptionId,
};

#[cfg(feature = "native")]
pub use self::builder::subscribe;

#[derive(Debug)]
pub(super) enum ConnectionCommand {
    /// Send a `stop` for the subscription and close the connection
    Unsubscribe,
}
