//! Derives realtime connection details from a GraphQL HTTP endpoint.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use url::Url;

use crate::{
    credentials::Credentials,
    signing::{self, SignedRequest, SigningScope, UnsignedRequest},
    Error,
};

const SERVICE: &str = "appsync";
const DEFAULT_REGION: &str = "us-east-1";
const API_LABEL: &str = "appsync-api";
const REALTIME_LABEL: &str = "appsync-realtime-api";

/// Base64 of `{}`, the payload of every realtime connection request
pub const EMPTY_PAYLOAD: &str = "e30=";

/// The canonical URI signed for the websocket handshake
pub const CONNECT_URI: &str = "/graphql/connect";

/// The canonical URI signed for subscription registrations
pub const GRAPHQL_URI: &str = "/graphql";

/// A GraphQL HTTP endpoint, e.g.
/// `https://abc123.appsync-api.eu-west-1.amazonaws.com/graphql`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    host: String,
    region: String,
}

impl Endpoint {
    /// Parses an endpoint URL.
    ///
    /// The region used for signing is taken from the hostname when it follows
    /// the usual `<id>.appsync-api.<region>.amazonaws.com` layout, otherwise
    /// it defaults to `us-east-1` and can be set with [`Endpoint::with_region`].
    pub fn parse(url: &str) -> Result<Self, Error> {
        let url =
            Url::parse(url).map_err(|error| Error::Config(format!("invalid endpoint {url}: {error}")))?;

        if !matches!(url.scheme(), "https" | "http") {
            return Err(Error::Config(format!(
                "endpoint must be an http(s) URL, got {}",
                url.scheme()
            )));
        }

        let hostname = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("endpoint {url} has no host")))?;

        let region = region_from_host(hostname).unwrap_or(DEFAULT_REGION).to_owned();

        let host = match url.port() {
            Some(port) => format!("{hostname}:{port}"),
            None => hostname.to_owned(),
        };

        Ok(Endpoint { url, host, region })
    }

    /// Overrides the region used when signing requests
    pub fn with_region(self, region: impl Into<String>) -> Self {
        Endpoint {
            region: region.into(),
            ..self
        }
    }

    /// The HTTP URL this endpoint was parsed from
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The host (and port, if non-default) requests are signed for
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The region requests are signed for
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The websocket URL for realtime subscriptions, without any query.
    pub fn realtime_url(&self) -> Url {
        let mut url = self.url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .expect("http(s) and ws(s) are all special schemes so can be swapped");

        if let Some(hostname) = url.host_str() {
            let realtime = hostname.replace(API_LABEL, REALTIME_LABEL);
            if realtime != hostname {
                url.set_host(Some(&realtime))
                    .expect("replacing a label in a valid host to produce a valid host");
            }
        }

        url.set_query(None);
        url
    }

    /// The full URL to open a realtime connection: the realtime URL with
    /// the signed handshake headers & empty payload as query parameters.
    pub fn connection_url(&self, credentials: &Credentials, timestamp: DateTime<Utc>) -> Url {
        let header = serde_json::to_vec(&self.connect_headers(credentials, timestamp))
            .expect("a map of strings to serialize");

        let mut url = self.realtime_url();
        url.set_query(Some(&format!(
            "header={}&payload={EMPTY_PAYLOAD}",
            STANDARD.encode(header)
        )));
        url
    }

    /// The signed headers authorizing the websocket handshake
    pub fn connect_headers(
        &self,
        credentials: &Credentials,
        timestamp: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        self.sign(credentials, CONNECT_URI, "{}", timestamp)
            .header_object()
    }

    /// Signs `body` for `canonical_uri` with the header set the gateway
    /// expects.
    pub fn sign(
        &self,
        credentials: &Credentials,
        canonical_uri: &str,
        body: &str,
        timestamp: DateTime<Utc>,
    ) -> SignedRequest {
        let headers = [
            ("accept", "application/json, text/javascript".to_owned()),
            ("content-encoding", "amz-1.0".to_owned()),
            ("content-length", body.len().to_string()),
            ("content-type", "application/json; charset=UTF-8".to_owned()),
            ("host", self.host.clone()),
        ];

        signing::sign(
            credentials,
            &SigningScope::new(&self.region, SERVICE),
            &UnsignedRequest {
                method: "POST",
                canonical_uri,
                headers: &headers,
                body: body.as_bytes(),
            },
            timestamp,
        )
    }
}

fn region_from_host(hostname: &str) -> Option<&str> {
    let mut labels = hostname.split('.');
    labels.find(|label| *label == API_LABEL)?;
    labels.next().filter(|region| !region.is_empty())
}
