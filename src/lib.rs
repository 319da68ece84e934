//! # appsync-realtime-client
//!
//! appsync-realtime-client subscribes to GraphQL subscriptions on
//! AppSync-style realtime endpoints: a websocket variant of a GraphQL HTTP
//! endpoint that speaks the [`graphql-ws`][protocol] sub-protocol, with both
//! the websocket handshake & each subscription registration authorized by an
//! [AWS Signature Version 4][sigv4] signature.
//!
//! A session goes through the following steps:
//!
//! 1. Short lived session credentials are fetched from a [`CredentialProvider`],
//!    usually [`StsCredentialProvider`].
//! 2. A websocket is opened to the realtime endpoint, with the signed handshake
//!    headers carried in the URL.
//! 3. `connection_init` is sent, and the server replies with a `connection_ack`
//!    containing the longest it will go between keepalives.
//! 4. The subscription is signed & registered with a `start` frame.
//! 5. Each `data` frame is delivered to the caller in order, and each `ka`
//!    frame resets the keepalive countdown.  If the countdown runs out the
//!    connection is considered dead.
//! 6. The caller unsubscribes, which sends `stop` and closes the connection.
//!
//! Sessions are never reconnected automatically, the reason a session ended is
//! available from [`SubscriptionHandle::closed`].
//!
//! ```rust,no_run
//! use appsync_realtime_client::{graphql::SubscriptionRequest, AccessKey, StsCredentialProvider};
//!
//! # async fn example() -> Result<(), appsync_realtime_client::Error> {
//! let provider = StsCredentialProvider::new(AccessKey::from_env()?);
//! let request = SubscriptionRequest::new(
//!     "subscription OnStatus($id: String!) { onStatus(id: $id) { id status } }",
//! )
//! .variable("id", "1234");
//!
//! appsync_realtime_client::subscribe(
//!     &provider,
//!     "https://abc123.appsync-api.eu-west-1.amazonaws.com/graphql",
//!     request,
//!     |event, handle| match event {
//!         Ok(event) if event["data"]["onStatus"]["status"] == "FINISHED" => handle.unsubscribe(),
//!         Ok(event) => println!("{event}"),
//!         Err(error) => eprintln!("{error}"),
//!     },
//! )
//! .await
//! # }
//! ```
//!
//! [protocol]: https://docs.aws.amazon.com/appsync/latest/devguide/real-time-websocket-client.html
//! [sigv4]: https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_aws-signing.html

#![warn(missing_docs)]

mod client;
mod error;
mod logging;
mod protocol;

pub mod credentials;
pub mod endpoint;
pub mod graphql;
pub mod signing;

#[cfg(feature = "native")]
pub mod native;

pub use self::{
    client::{
        Connection, Message, SessionActor, SessionState, Subscription, SubscriptionBuilder,
        SubscriptionHandle, SubscriptionId,
    },
    credentials::{AccessKey, CredentialProvider, Credentials, StaticCredentials},
    endpoint::Endpoint,
    error::Error,
};

#[cfg(feature = "native")]
pub use self::{client::subscribe, credentials::StsCredentialProvider};
