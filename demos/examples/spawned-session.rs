//! Opens the connection by hand and runs the session on its own task, with
//! a timer that gives up on the job after a while.

use std::{future::IntoFuture, time::Duration};

use appsync_realtime_client::{
    native, AccessKey, CredentialProvider, Endpoint, Error, StsCredentialProvider,
    SubscriptionBuilder,
};
use demos::{env, is_finished, job_status, job_status_request};
use futures_lite::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let provider =
        StsCredentialProvider::new(AccessKey::from_env()?).duration(Duration::from_secs(900));
    let credentials = provider.session_credentials().await?;

    let endpoint = Endpoint::parse(&env("APPSYNC_ENDPOINT")?)?;
    let connection = native::connect(&endpoint, &credentials).await?;

    let (mut subscription, actor) = SubscriptionBuilder::new(endpoint)
        .subscription_buffer_size(16)
        .build(connection, credentials, job_status_request()?)
        .await?;

    tokio::spawn(actor.into_future());

    let handle = subscription.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(600)).await;
        println!("giving up on the job");
        handle.unsubscribe();
    });

    while let Some(event) = subscription.next().await {
        let event = event?;
        println!("{event}");

        if job_status(&event).is_some_and(is_finished) {
            break;
        }
    }

    subscription.unsubscribe().await
}
