//! Shared bits for the demos.
//!
//! Every demo reads its configuration from the environment:
//!
//! - `AWS_ACCESS_KEY_ID` & `AWS_SECRET_ACCESS_KEY`: a long lived access key
//! - `APPSYNC_ENDPOINT`: the GraphQL endpoint, e.g.
//!   `https://abc123.appsync-api.eu-west-1.amazonaws.com/graphql`
//! - `JOB_ID`: the job to watch

use appsync_realtime_client::{graphql::SubscriptionRequest, Error};
use serde_json::Value;

pub const JOB_STATUS_SUBSCRIPTION: &str = r#"
subscription OnJobStatus($jobId: String!) {
  onJobStatus(jobId: $jobId) {
    jobId
    status
    progress
  }
}
"#;

/// Reads a required environment variable
pub fn env(name: &str) -> Result<String, Error> {
    std::env::var(name).map_err(|_| Error::Config(format!("{name} must be set")))
}

/// The subscription for status changes on the job in `JOB_ID`
pub fn job_status_request() -> Result<SubscriptionRequest, Error> {
    Ok(SubscriptionRequest::new(JOB_STATUS_SUBSCRIPTION).variable("jobId", env("JOB_ID")?))
}

/// The status in a job status event, if it has one
pub fn job_status(event: &Value) -> Option<&str> {
    event["data"]["onJobStatus"]["status"].as_str()
}

/// Whether a job in `status` will see any more changes
pub fn is_finished(status: &str) -> bool {
    matches!(status, "SUCCEEDED" | "FAILED" | "CANCELLED")
}
