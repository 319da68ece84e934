//! This module contains traits that abstract over GraphQL operations,
//! allowing subscriptions to be described with plain strings or with
//! a typed GraphQL client library.
//!
//! [`SubscriptionRequest`] covers the plain case.  Support is provided for
//! [`cynic`][cynic] & [`graphql_client`][graphql-client] behind the
//! `client-cynic` & `client-graphql-client` features.
//!
//! [cynic]: https://cynic-rs.dev
//! [graphql-client]: https://github.com/graphql-rust/graphql-client

use std::convert::Infallible;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::Error;

/// An abstraction over GraphQL operations.
///
/// The serialized form of an operation is what gets registered with the
/// server, so it should serialize to `{"query": .., "variables": ..}`.
pub trait GraphqlOperation: serde::Serialize {
    /// The actual response & error type of this operation.
    type Response;

    /// The error that will be returned from failed attempts to decode a `Response`.
    type Error: std::error::Error;

    /// Decodes the payload of a `data` frame into the response type that will
    /// be returned to users for this operation.
    fn decode(&self, data: Value) -> Result<Self::Response, Self::Error>;
}

/// A subscription document along with its variables.
///
/// Responses are the untouched payload of each `data` frame, which is usually
/// `{"data": {..}}`, or `{"errors": [..]}` for errors the server reported
/// mid-stream.
///
/// ```rust
/// use appsync_realtime_client::graphql::SubscriptionRequest;
///
/// let request = SubscriptionRequest::new(
///     "subscription OnChange($id: String!) { onChange(id: $id) { id status } }",
/// )
/// .variable("id", "1234");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubscriptionRequest {
    query: String,
    variables: Map<String, Value>,
}

impl SubscriptionRequest {
    /// Creates a request with no variables
    pub fn new(query: impl Into<String>) -> Self {
        SubscriptionRequest {
            query: query.into(),
            variables: Map::new(),
        }
    }

    /// Sets a single variable
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Replaces the variables with the serialized form of `variables`,
    /// which must serialize to a JSON object.
    pub fn variables(self, variables: impl Serialize) -> Result<Self, Error> {
        match serde_json::to_value(variables) {
            Ok(Value::Object(variables)) => Ok(SubscriptionRequest { variables, ..self }),
            Ok(other) => Err(Error::Serializing(format!(
                "variables must be an object, got {other}"
            ))),
            Err(error) => Err(Error::Serializing(error.to_string())),
        }
    }

    /// The subscription document
    pub fn query(&self) -> &str {
        &self.query
    }
}

impl GraphqlOperation for SubscriptionRequest {
    type Response = Value;

    type Error = Infallible;

    fn decode(&self, data: Value) -> Result<Self::Response, Self::Error> {
        Ok(data)
    }
}

#[cfg(feature = "client-cynic")]
mod cynic {
    use super::*;

    impl<ResponseData, Variables> GraphqlOperation
        for ::cynic::StreamingOperation<ResponseData, Variables>
    where
        ResponseData: serde::de::DeserializeOwned,
        Variables: serde::Serialize,
    {
        type Response = ::cynic::GraphQlResponse<ResponseData>;

        type Error = serde_json::Error;

        fn decode(&self, response: Value) -> Result<Self::Response, Self::Error> {
            serde_json::from_value(response)
        }
    }
}

#[cfg(feature = "client-graphql-client")]
pub use self::graphql_client::StreamingOperation;

#[cfg(feature = "client-graphql-client")]
mod graphql_client {
    use super::*;
    use ::graphql_client::{GraphQLQuery, QueryBody, Response};
    use std::marker::PhantomData;

    /// A subscription built from a graphql_client `GraphQLQuery`
    pub struct StreamingOperation<Q: GraphQLQuery> {
        inner: QueryBody<Q::Variables>,
        phantom: PhantomData<Q>,
    }

    impl<Q: GraphQLQuery> StreamingOperation<Q> {
        /// Constructs a StreamingOperation
        pub fn new(variables: Q::Variables) -> Self {
            Self {
                inner: Q::build_query(variables),
                phantom: PhantomData,
            }
        }
    }

    impl<Q: GraphQLQuery> serde::Serialize for StreamingOperation<Q> {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            self.inner.serialize(serializer)
        }
    }

    impl<Q: GraphQLQuery> GraphqlOperation for StreamingOperation<Q> {
        type Response = Response<Q::ResponseData>;

        type Error = serde_json::Error;

        fn decode(&self, response: Value) -> Result<Self::Response, Self::Error> {
            serde_json::from_value(response)
        }
    }
}
