//! AWS Signature Version 4 request signing.
//!
//! The realtime gateway authenticates two things with this: the websocket
//! handshake itself, and each subscription registration.  The identity
//! service used to fetch session credentials is signed the same way.
//!
//! Only the subset of SigV4 this crate needs is implemented: query strings are
//! always empty, as every parameter travels in the request body.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;

/// The only algorithm we support.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

const TERMINATOR: &str = "aws4_request";

type HmacSha256 = Hmac<Sha256>;

/// The region & service a signature is valid for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningScope {
    region: String,
    service: String,
}

impl SigningScope {
    /// Creates a scope for the given region & service
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        SigningScope {
            region: region.into(),
            service: service.into(),
        }
    }

    /// The region, e.g. `us-east-1`
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The service, e.g. `appsync`
    pub fn service(&self) -> &str {
        &self.service
    }

    fn credential_scope(&self, timestamp: &DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}/{TERMINATOR}",
            date_stamp(timestamp),
            self.region,
            self.service
        )
    }
}

/// The parts of an HTTP request that go into a signature.
#[derive(Clone, Debug)]
pub struct UnsignedRequest<'a> {
    /// The HTTP method, e.g. `POST`
    pub method: &'a str,
    /// The path of the request, e.g. `/graphql`
    pub canonical_uri: &'a str,
    /// Headers to sign.
    ///
    /// `x-amz-date` and (if the credentials carry one) `x-amz-security-token`
    /// are added by the signer and shouldn't be included here.
    pub headers: &'a [(&'a str, String)],
    /// The request body
    pub body: &'a [u8],
}

/// The output of signing a request.
///
/// This embeds the timestamp it was signed at, so should never be reused
/// for another request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
    /// The HTTP method that was signed
    pub method: String,
    /// The path that was signed
    pub canonical_uri: String,
    /// Every signed header, with lowercased names in code point order
    pub headers: BTreeMap<String, String>,
    /// Lowercase hex SHA256 of the body
    pub payload_hash: String,
    /// Lowercase hex signature
    pub signature: String,
    /// The value of the `Authorization` header
    pub authorization: String,
}

impl SignedRequest {
    /// The `;` separated list of signed header names
    pub fn signed_headers(&self) -> String {
        signed_headers(&self.headers)
    }

    /// All the signed headers along with `Authorization`, in the form the
    /// realtime gateway expects them as a JSON object.
    pub fn header_object(&self) -> BTreeMap<String, String> {
        let mut headers = self.headers.clone();
        headers.insert("Authorization".into(), self.authorization.clone());
        headers
    }
}

/// Signs `request` with `credentials` as of `timestamp`.
///
/// Callers should capture a fresh timestamp for each request: the server
/// rejects signatures that are too far from its own clock.
pub fn sign(
    credentials: &Credentials,
    scope: &SigningScope,
    request: &UnsignedRequest<'_>,
    timestamp: DateTime<Utc>,
) -> SignedRequest {
    let amz_date = amz_date(&timestamp);

    let mut headers = request
        .headers
        .iter()
        .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_owned()))
        .collect::<BTreeMap<_, _>>();
    headers.insert("x-amz-date".into(), amz_date.clone());
    if let Some(token) = credentials.session_token() {
        headers.insert("x-amz-security-token".into(), token.to_owned());
    }

    let payload_hash = sha256_hex(request.body);
    let canonical_request = canonical_request(
        request.method,
        request.canonical_uri,
        &headers,
        &payload_hash,
    );

    let credential_scope = scope.credential_scope(&timestamp);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(
        credentials.secret_access_key(),
        &date_stamp(&timestamp),
        scope.region(),
        scope.service(),
    );
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={}, Signature={signature}",
        credentials.access_key_id(),
        signed_headers(&headers),
    );

    SignedRequest {
        method: request.method.to_owned(),
        canonical_uri: request.canonical_uri.to_owned(),
        headers,
        payload_hash,
        signature,
        authorization,
    }
}

/// The full timestamp format used in `x-amz-date` & the string to sign
pub fn amz_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

/// The date only format used in the credential scope
pub fn date_stamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d").to_string()
}

fn canonical_request(
    method: &str,
    canonical_uri: &str,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
) -> String {
    let canonical_headers = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect::<String>();

    // The empty line is the (always empty) canonical query string.
    format!(
        "{method}\n{canonical_uri}\n\n{canonical_headers}\n{}\n{payload_hash}",
        signed_headers(headers)
    )
}

fn signed_headers(headers: &BTreeMap<String, String>) -> String {
    headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let region_key = hmac_sha256(&date_key, region.as_bytes());
    let service_key = hmac_sha256(&region_key, service.as_bytes());
    hmac_sha256(&service_key, TERMINATOR.as_bytes())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take a key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
