use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use url::Url;

use crate::{
    logging::{debug, trace},
    signing::{self, SigningScope, UnsignedRequest},
    Error,
};

use super::{AccessKey, CredentialProvider, Credentials};

const DEFAULT_ENDPOINT: &str = "https://sts.amazonaws.com/";
const STS_REGION: &str = "us-east-1";
const STS_SERVICE: &str = "sts";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Obtains session credentials from an [`AccessKey`] by calling STS
/// `GetSessionToken`.
///
/// Each call to [`CredentialProvider::session_credentials`] makes exactly one
/// request.  A rejected key is reported as [`Error::Authentication`], an
/// unreachable service as [`Error::Transport`].
#[derive(Clone, Debug)]
pub struct StsCredentialProvider {
    access_key: AccessKey,
    endpoint: Url,
    region: String,
    duration: Option<Duration>,
    http: reqwest::Client,
}

impl StsCredentialProvider {
    /// Creates an StsCredentialProvider using the global STS endpoint
    pub fn new(access_key: AccessKey) -> Self {
        StsCredentialProvider {
            access_key,
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint to be a valid URL"),
            region: STS_REGION.into(),
            duration: None,
            http: reqwest::Client::new(),
        }
    }

    /// Overrides the STS endpoint, e.g. to use a regional endpoint.
    ///
    /// The region used for signing should be set alongside this.
    pub fn endpoint(self, endpoint: &str, region: impl Into<String>) -> Result<Self, Error> {
        let endpoint = Url::parse(endpoint)
            .map_err(|error| Error::Config(format!("invalid STS endpoint {endpoint}: {error}")))?;

        Ok(StsCredentialProvider {
            endpoint,
            region: region.into(),
            ..self
        })
    }

    /// Requests session credentials that last for `duration`.
    ///
    /// STS decides the lifetime if this isn't set.
    pub fn duration(self, duration: Duration) -> Self {
        StsCredentialProvider {
            duration: Some(duration),
            ..self
        }
    }

    async fn get_session_token(&self) -> Result<Credentials, Error> {
        let mut body = String::from("Action=GetSessionToken&Version=2011-06-15");
        if let Some(duration) = self.duration {
            body.push_str(&format!("&DurationSeconds={}", duration.as_secs()));
        }

        let host = host_header(&self.endpoint)?;
        let headers = [
            ("content-type", FORM_CONTENT_TYPE.to_owned()),
            ("host", host),
        ];
        let signed = signing::sign(
            &self.access_key.credentials(),
            &SigningScope::new(&self.region, STS_SERVICE),
            &UnsignedRequest {
                method: "POST",
                canonical_uri: self.endpoint.path(),
                headers: &headers,
                body: body.as_bytes(),
            },
            Utc::now(),
        );

        debug!("requesting session credentials from {}", self.endpoint);

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(AUTHORIZATION, &signed.authorization)
            .body(body);
        for (name, value) in &signed.headers {
            // reqwest derives host from the URL, and we've already set content-type
            if name != "host" && name != "content-type" {
                request = request.header(name, value);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|error| Error::Transport(format!("couldn't reach STS: {error}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| Error::Transport(format!("couldn't read STS response: {error}")))?;
        trace!("STS responded with {status}");

        if status.is_client_error() {
            return Err(Error::Authentication(parse_error(&text)));
        }
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "STS returned {status}: {}",
                parse_error(&text)
            )));
        }

        parse_session_token(&text)
    }
}

impl CredentialProvider for StsCredentialProvider {
    async fn session_credentials(&self) -> Result<Credentials, Error> {
        self.get_session_token().await
    }
}

fn host_header(url: &Url) -> Result<String, Error> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::Config(format!("STS endpoint {url} has no host")))?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSessionTokenResponse {
    get_session_token_result: GetSessionTokenResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSessionTokenResult {
    credentials: SessionCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SessionCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    error: StsError,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsError {
    code: String,
    #[serde(default)]
    message: String,
}

pub(super) fn parse_session_token(xml: &str) -> Result<Credentials, Error> {
    let response: GetSessionTokenResponse = quick_xml::de::from_str(xml)
        .map_err(|error| Error::Decode(format!("unexpected STS response: {error}")))?;

    let SessionCredentials {
        access_key_id,
        secret_access_key,
        session_token,
        expiration,
    } = response.get_session_token_result.credentials;

    Ok(Credentials::new(access_key_id, secret_access_key)
        .with_session_token(session_token)
        .with_expiration(expiration))
}

fn parse_error(xml: &str) -> String {
    match quick_xml::de::from_str::<ErrorResponse>(xml) {
        Ok(ErrorResponse { error }) if error.message.is_empty() => error.code,
        Ok(ErrorResponse { error }) => format!("{}: {}", error.code, error.message),
        Err(_) if xml.trim().is_empty() => "no response body".into(),
        Err(_) => xml.trim().to_owned(),
    }
}
