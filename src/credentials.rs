//! Credentials used to sign the realtime handshake & registration.
//!
//! Subscriptions are signed with short lived session credentials.  These are
//! usually obtained from a long lived [`AccessKey`] via STS - see
//! [`StsCredentialProvider`] - but any [`CredentialProvider`] will do.

use std::{fmt, future::Future};

use chrono::{DateTime, Utc};

use crate::Error;

#[cfg(feature = "native")]
mod sts;

#[cfg(feature = "native")]
pub use self::sts::StsCredentialProvider;

const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";

/// A long lived access key pair.
#[derive(Clone)]
pub struct AccessKey {
    access_key_id: String,
    secret_access_key: String,
}

impl AccessKey {
    /// Creates an AccessKey
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        AccessKey {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Reads an AccessKey from `AWS_ACCESS_KEY_ID` & `AWS_SECRET_ACCESS_KEY`
    pub fn from_env() -> Result<Self, Error> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{name} must be set")))
        };

        Ok(AccessKey::new(
            read(ACCESS_KEY_ID_VAR)?,
            read(SECRET_ACCESS_KEY_VAR)?,
        ))
    }

    /// The access key id
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// This key as (non-session) credentials, for signing requests to the
    /// identity service itself.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.access_key_id, &self.secret_access_key)
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKey")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// A set of credentials that can sign requests.
///
/// Session credentials obtained from STS carry a session token & expiry.
/// Once expired they need to be replaced with a fresh set, there is no way
/// to extend them.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    expiration: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Creates some Credentials without a session token or expiry
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Credentials {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expiration: None,
        }
    }

    /// Sets the session token
    pub fn with_session_token(self, token: impl Into<String>) -> Self {
        Credentials {
            session_token: Some(token.into()),
            ..self
        }
    }

    /// Sets the time these credentials expire at
    pub fn with_expiration(self, expiration: DateTime<Utc>) -> Self {
        Credentials {
            expiration: Some(expiration),
            ..self
        }
    }

    /// The access key id
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// The secret access key
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// The session token, if any
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// When these credentials expire, if they do
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    /// Whether these credentials have expired as of `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Something that can provide session credentials for a subscription.
///
/// This is called once per subscription attempt.  Implementations shouldn't
/// retry internally, that decision is left to the caller.
pub trait CredentialProvider {
    /// Fetches a set of session credentials
    fn session_credentials(&self) -> impl Future<Output = Result<Credentials, Error>> + Send;
}

/// A [`CredentialProvider`] that hands out credentials obtained elsewhere.
#[derive(Clone, Debug)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    /// Creates a StaticCredentials
    pub fn new(credentials: Credentials) -> Self {
        StaticCredentials(credentials)
    }
}

impl CredentialProvider for StaticCredentials {
    async fn session_credentials(&self) -> Result<Credentials, Error> {
        if self.0.is_expired_at(Utc::now()) {
            return Err(Error::Authentication("credentials have expired".into()));
        }
        Ok(self.0.clone())
    }
}
