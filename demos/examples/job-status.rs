//! Watches a job until it finishes, using the handler based `subscribe`.

use appsync_realtime_client::{AccessKey, Error, StsCredentialProvider};
use demos::{env, is_finished, job_status, job_status_request};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let provider = StsCredentialProvider::new(AccessKey::from_env()?);

    appsync_realtime_client::subscribe(
        &provider,
        &env("APPSYNC_ENDPOINT")?,
        job_status_request()?,
        |event, handle| {
            let event = match event {
                Ok(event) => event,
                Err(error) => {
                    eprintln!("couldn't decode event: {error}");
                    return;
                }
            };

            println!("{event}");

            if job_status(&event).is_some_and(is_finished) {
                handle.unsubscribe();
            }
        },
    )
    .await
}
