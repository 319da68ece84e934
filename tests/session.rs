use std::{future::IntoFuture, time::Duration};

use appsync_realtime_client::{
    graphql::SubscriptionRequest, Credentials, Endpoint, Error, Message, SessionState,
    Subscription, SubscriptionBuilder,
};
use assert_matches::assert_matches;
use chrono::Utc;
use futures_lite::StreamExt;
use mock_connection::MockServer;
use serde_json::{json, Value};

mod mock_connection;

const ENDPOINT: &str = "https://abc123.appsync-api.eu-west-1.amazonaws.com/graphql";

fn builder() -> SubscriptionBuilder {
    SubscriptionBuilder::new(Endpoint::parse(ENDPOINT).unwrap())
}

fn credentials() -> Credentials {
    Credentials::new("ASIAEXAMPLE", "secret").with_session_token("session-token")
}

fn request() -> SubscriptionRequest {
    SubscriptionRequest::new(
        "subscription OnStatus($id: String!) { onStatus(id: $id) { id status } }",
    )
    .variable("id", "job-1")
}

fn ack(interval_ms: u64) -> Value {
    json!({"type": "connection_ack", "payload": {"connectionTimeoutMs": interval_ms}})
}

/// Runs the handshake with the given ack, spawns the actor & returns the
/// `start` frame the client sent.
async fn start_with(
    builder: SubscriptionBuilder,
    ack: Value,
) -> (Subscription<SubscriptionRequest>, MockServer, Value) {
    let (connection, server) = mock_connection::pair();

    let handshake = async {
        assert_eq!(server.recv_json().await, json!({"type": "connection_init"}));
        server.send_json(ack).await;
        server.recv_json().await
    };

    let (built, start) = tokio::join!(builder.build(connection, credentials(), request()), handshake);
    let (subscription, actor) = built.unwrap();

    tokio::spawn(actor.into_future());

    (subscription, server, start)
}

async fn start(interval_ms: u64) -> (Subscription<SubscriptionRequest>, MockServer, Value) {
    start_with(builder(), ack(interval_ms)).await
}

async fn expect_close(server: &MockServer, expected: u16) {
    assert_matches!(
        server.recv().await,
        Some(Message::Close { code: Some(code), .. }) if code == expected
    );
}

#[tokio::test]
async fn registers_a_single_signed_subscription() {
    let (subscription, server, start) = start(10_000).await;
    let handle = subscription.handle();

    assert_eq!(handle.keep_alive_interval(), Some(Duration::from_secs(10)));
    assert_eq!(handle.state(), SessionState::Registering);

    assert_eq!(start["type"], "start");
    assert_eq!(start["id"], subscription.id().to_string());
    assert_eq!(
        start["payload"]["data"],
        serde_json::to_string(&request()).unwrap()
    );

    let authorization = &start["payload"]["extensions"]["authorization"];
    assert_eq!(authorization["host"], "abc123.appsync-api.eu-west-1.amazonaws.com");
    assert_eq!(authorization["x-amz-security-token"], "session-token");
    assert_eq!(authorization["content-encoding"], "amz-1.0");
    assert_eq!(
        authorization["content-length"],
        start["payload"]["data"].as_str().unwrap().len().to_string()
    );
    let signature = authorization["Authorization"].as_str().unwrap();
    assert!(signature.starts_with("AWS4-HMAC-SHA256 Credential=ASIAEXAMPLE/"));
    assert!(signature.contains("/eu-west-1/appsync/aws4_request"));

    server.assert_silent().await;
}

#[tokio::test]
async fn delivers_data_in_order() {
    let (mut subscription, server, start) = start(10_000).await;
    let id = start["id"].clone();

    server.send_json(json!({"type": "start_ack", "id": id})).await;
    for x in 1..=3 {
        server
            .send_json(json!({"type": "data", "id": id, "payload": {"x": x}}))
            .await;
    }

    for x in 1..=3 {
        assert_eq!(subscription.next().await.unwrap().unwrap(), json!({"x": x}));
    }
    assert_eq!(subscription.handle().state(), SessionState::Streaming);
}

#[tokio::test]
async fn keepalive_expiry_closes_without_stopping() {
    let (subscription, server, _) = start(50).await;
    let handle = subscription.handle();

    assert_eq!(
        handle.closed().await,
        Err(Error::KeepaliveTimeout(Duration::from_millis(50)))
    );
    assert_eq!(handle.state(), SessionState::Closed);

    expect_close(&server, 1000).await;
    assert_eq!(server.recv().await, None);
}

#[tokio::test]
async fn keepalives_extend_the_session() {
    let (subscription, server, _) = start(150).await;
    let handle = subscription.handle();

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.send_json(json!({"type": "ka"})).await;
    }
    assert_ne!(handle.state(), SessionState::Closed);
    server.assert_silent().await;

    assert_matches!(handle.closed().await, Err(Error::KeepaliveTimeout(_)));
}

#[tokio::test]
async fn unsubscribe_stops_before_closing() {
    let (subscription, server, start) = start(10_000).await;
    let id = start["id"].clone();
    let handle = subscription.handle();

    server.send_json(json!({"type": "start_ack", "id": id})).await;
    server
        .send_json(json!({"type": "data", "id": id, "payload": {"x": 1}}))
        .await;

    handle.unsubscribe();

    assert_eq!(server.recv_json().await, json!({"type": "stop", "id": id}));
    expect_close(&server, 1000).await;
    assert_eq!(handle.closed().await, Ok(()));
    assert_eq!(handle.state(), SessionState::Closed);
}

#[tokio::test]
async fn unsubscribing_twice_is_a_no_op() {
    let (subscription, server, start) = start(10_000).await;
    let handle = subscription.handle();

    handle.unsubscribe();
    handle.unsubscribe();

    assert_eq!(
        server.recv_json().await,
        json!({"type": "stop", "id": start["id"]})
    );
    expect_close(&server, 1000).await;
    assert_eq!(server.recv().await, None);

    assert_eq!(handle.closed().await, Ok(()));
    handle.unsubscribe();
    assert_eq!(handle.closed().await, Ok(()));
}

#[tokio::test]
async fn unsubscribe_waits_for_the_session_to_close() {
    let (subscription, server, start) = start(10_000).await;
    let handle = subscription.handle();

    assert_eq!(subscription.unsubscribe().await, Ok(()));
    assert_eq!(handle.state(), SessionState::Closed);

    assert_eq!(
        server.recv_json().await,
        json!({"type": "stop", "id": start["id"]})
    );
    expect_close(&server, 1000).await;
}

#[tokio::test]
async fn dropping_the_subscription_unsubscribes() {
    let (subscription, server, start) = start(10_000).await;
    let handle = subscription.handle();

    drop(subscription);

    assert_eq!(
        server.recv_json().await,
        json!({"type": "stop", "id": start["id"]})
    );
    expect_close(&server, 1000).await;
    assert_eq!(handle.closed().await, Ok(()));
}

#[tokio::test]
async fn rejected_registration_ends_the_session() {
    let (subscription, server, start) = start(10_000).await;

    server
        .send_json(json!({
            "type": "error",
            "id": start["id"],
            "payload": {"errors": [{"errorType": "UnauthorizedException", "message": "Permission denied"}]}
        }))
        .await;

    assert_matches!(
        subscription.handle().closed().await,
        Err(Error::Protocol(message)) if message.contains("UnauthorizedException: Permission denied")
    );
    expect_close(&server, 4950).await;
}

#[tokio::test]
async fn errors_while_streaming_are_forwarded() {
    let (mut subscription, server, start) = start(10_000).await;
    let id = start["id"].clone();

    server.send_json(json!({"type": "start_ack", "id": id})).await;
    server
        .send_json(json!({
            "type": "error",
            "id": id,
            "payload": {"errors": [{"message": "resolver failed"}]}
        }))
        .await;
    server
        .send_json(json!({"type": "data", "id": id, "payload": {"x": 2}}))
        .await;

    assert_eq!(
        subscription.next().await.unwrap().unwrap(),
        json!({"errors": [{"message": "resolver failed"}]})
    );
    assert_eq!(subscription.next().await.unwrap().unwrap(), json!({"x": 2}));
    assert_eq!(subscription.handle().state(), SessionState::Streaming);
}

#[tokio::test]
async fn unknown_frames_are_a_protocol_error() {
    let (subscription, server, _) = start(10_000).await;

    server.send_json(json!({"type": "surprise"})).await;

    assert_matches!(
        subscription.handle().closed().await,
        Err(Error::Protocol(_))
    );
    expect_close(&server, 4950).await;
}

#[tokio::test]
async fn data_for_another_subscription_is_a_protocol_error() {
    let (subscription, server, _) = start(10_000).await;

    server
        .send_json(json!({"type": "data", "id": "someone-else", "payload": {}}))
        .await;

    assert_matches!(
        subscription.handle().closed().await,
        Err(Error::Protocol(message)) if message.contains("someone-else")
    );
}

#[tokio::test]
async fn server_completion_closes_normally() {
    let (mut subscription, server, start) = start(10_000).await;

    server
        .send_json(json!({"type": "complete", "id": start["id"]}))
        .await;

    assert!(subscription.next().await.is_none());
    assert_eq!(subscription.handle().closed().await, Ok(()));
    expect_close(&server, 1000).await;
}

#[tokio::test]
async fn server_close_is_reported() {
    let (subscription, server, _) = start(10_000).await;

    server
        .send(Message::Close {
            code: Some(4401),
            reason: Some("Unauthorized".into()),
        })
        .await;

    assert_eq!(
        subscription.handle().closed().await,
        Err(Error::Close(4401, "Unauthorized".into()))
    );
    assert_eq!(server.recv().await, None);
}

#[tokio::test]
async fn dropped_connections_are_a_transport_error() {
    let (subscription, server, _) = start(10_000).await;

    server.disconnect();

    assert_matches!(
        subscription.handle().closed().await,
        Err(Error::Transport(_))
    );
}

#[tokio::test]
async fn missing_keepalive_interval_uses_the_fallback() {
    let (subscription, _server, _) = start_with(
        builder().fallback_keep_alive(Duration::from_secs(42)),
        json!({"type": "connection_ack"}),
    )
    .await;

    assert_eq!(
        subscription.handle().keep_alive_interval(),
        Some(Duration::from_secs(42))
    );
}

#[tokio::test]
async fn dispatch_runs_until_the_handler_unsubscribes() {
    let (subscription, server, start) = start(10_000).await;
    let id = start["id"].clone();

    for status in ["QUEUED", "RUNNING", "FINISHED", "IGNORED"] {
        server
            .send_json(json!({"type": "data", "id": id, "payload": {"data": {"onStatus": {"status": status}}}}))
            .await;
    }

    let mut seen = Vec::new();
    let outcome = subscription
        .dispatch(|event, handle| {
            let status = event.unwrap()["data"]["onStatus"]["status"].clone();
            if status == "FINISHED" {
                handle.unsubscribe();
            }
            seen.push(status);
        })
        .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(seen[..3], ["QUEUED", "RUNNING", "FINISHED"]);
    assert_eq!(server.recv_json().await, json!({"type": "stop", "id": id}));
    expect_close(&server, 1000).await;
}

#[tokio::test]
async fn ka_before_ack_is_ignored() {
    let (connection, server) = mock_connection::pair();

    let handshake = async {
        server.recv_json().await;
        server.send_json(json!({"type": "ka"})).await;
        server.send_json(ack(5_000)).await;
        server.recv_json().await
    };

    let (built, start) = tokio::join!(builder().build(connection, credentials(), request()), handshake);

    let (subscription, _actor) = built.unwrap();
    assert_eq!(start["type"], "start");
    assert_eq!(
        subscription.handle().keep_alive_interval(),
        Some(Duration::from_secs(5))
    );
}

#[tokio::test]
async fn connection_errors_during_the_handshake_are_fatal() {
    let (connection, server) = mock_connection::pair();

    let handshake = async {
        server.recv_json().await;
        server
            .send_json(json!({
                "type": "connection_error",
                "payload": {"errors": [{"errorType": "UnauthorizedException", "message": "bad signature"}]}
            }))
            .await;
    };

    let (built, ()) = tokio::join!(builder().build(connection, credentials(), request()), handshake);

    assert_matches!(built, Err(Error::Protocol(message)) if message.contains("bad signature"));
}

#[tokio::test]
async fn unexpected_frames_during_the_handshake_are_fatal() {
    let (connection, server) = mock_connection::pair();

    let handshake = async {
        server.recv_json().await;
        server
            .send_json(json!({"type": "data", "id": "x", "payload": {}}))
            .await;
        server.recv().await
    };

    let (built, close) = tokio::join!(builder().build(connection, credentials(), request()), handshake);

    assert_matches!(built, Err(Error::Protocol(_)));
    assert_matches!(close, Some(Message::Close { code: Some(4950), .. }));
}

#[tokio::test]
async fn handshake_times_out() {
    let (connection, server) = mock_connection::pair();

    let built = builder()
        .handshake_timeout(Duration::from_millis(50))
        .build(connection, credentials(), request())
        .await;

    assert_matches!(built, Err(Error::Connection(_)));
    assert_eq!(server.recv_json().await, json!({"type": "connection_init"}));
}

#[tokio::test]
async fn expired_credentials_are_rejected_up_front() {
    let (connection, server) = mock_connection::pair();
    let expired = credentials().with_expiration(Utc::now() - chrono::Duration::minutes(1));

    let built = builder().build(connection, expired, request()).await;

    assert_matches!(built, Err(Error::Authentication(_)));
    assert_eq!(server.recv().await, None);
}

#[tokio::test]
async fn unsubscribe_works_while_the_subscriber_is_behind() {
    let (subscription, server, start) =
        start_with(builder().subscription_buffer_size(1), ack(10_000)).await;
    let id = start["id"].clone();
    let handle = subscription.handle();

    for x in 1..=3 {
        server
            .send_json(json!({"type": "data", "id": id, "payload": {"x": x}}))
            .await;
    }
    // Let the session fill the buffer and block on the next event
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.unsubscribe();

    assert_eq!(handle.closed().await, Ok(()));
    assert_eq!(server.recv_json().await, json!({"type": "stop", "id": id}));
    expect_close(&server, 1000).await;
    assert_eq!(server.recv().await, None);
}

#[tokio::test]
async fn keepalive_expires_while_the_subscriber_is_behind() {
    let (subscription, server, start) =
        start_with(builder().subscription_buffer_size(1), ack(100)).await;
    let id = start["id"].clone();
    let handle = subscription.handle();

    for x in 1..=3 {
        server
            .send_json(json!({"type": "data", "id": id, "payload": {"x": x}}))
            .await;
    }

    assert_eq!(
        handle.closed().await,
        Err(Error::KeepaliveTimeout(Duration::from_millis(100)))
    );
    expect_close(&server, 1000).await;
    assert_eq!(server.recv().await, None);
}

#[tokio::test]
async fn unsubscribing_as_the_keepalive_expires_closes_once() {
    let (subscription, server, _) = start(30).await;
    let handle = subscription.handle();

    tokio::time::sleep(Duration::from_millis(30)).await;
    handle.unsubscribe();

    assert_matches!(
        handle.closed().await,
        Ok(()) | Err(Error::KeepaliveTimeout(_))
    );
    assert_eq!(handle.state(), SessionState::Closed);
    handle.unsubscribe();

    let mut frames = Vec::new();
    while let Some(frame) = server.recv().await {
        frames.push(frame);
    }

    let closes = frames
        .iter()
        .filter(|frame| matches!(frame, Message::Close { .. }))
        .count();
    assert_eq!(closes, 1, "frames: {frames:?}");
    assert_matches!(frames.last(), Some(Message::Close { code: Some(1000), .. }));
}
