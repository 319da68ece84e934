#![allow(dead_code)]

//! An in-memory connection, with the other end driven by the test.

use std::time::Duration;

use appsync_realtime_client::{Connection, Error, Message};
use serde_json::Value;

pub struct MockConnection {
    incoming: async_channel::Receiver<Message>,
    outgoing: async_channel::Sender<Message>,
}

pub struct MockServer {
    to_client: async_channel::Sender<Message>,
    from_client: async_channel::Receiver<Message>,
}

pub fn pair() -> (MockConnection, MockServer) {
    let (to_client, incoming) = async_channel::unbounded();
    let (outgoing, from_client) = async_channel::unbounded();

    (
        MockConnection { incoming, outgoing },
        MockServer {
            to_client,
            from_client,
        },
    )
}

impl Connection for MockConnection {
    async fn receive(&mut self) -> Option<Message> {
        self.incoming.recv().await.ok()
    }

    async fn send(&mut self, message: Message) -> Result<(), Error> {
        self.outgoing
            .send(message)
            .await
            .map_err(|error| Error::Send(error.to_string()))
    }
}

impl MockServer {
    pub async fn send(&self, message: Message) {
        self.to_client.send(message).await.unwrap();
    }

    pub async fn send_json(&self, frame: Value) {
        self.send(Message::Text(frame.to_string())).await;
    }

    /// The next frame the client sent, or `None` if it has hung up.
    pub async fn recv(&self) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting on the client")
            .ok()
    }

    pub async fn recv_json(&self) -> Value {
        match self.recv().await {
            Some(Message::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    /// Asserts the client hasn't sent anything else for a little while
    pub async fn assert_silent(&self) {
        let next = tokio::time::timeout(Duration::from_millis(50), self.from_client.recv()).await;
        assert!(next.is_err(), "unexpected frame {next:?}");
    }

    /// Hangs up, as if the socket dropped
    pub fn disconnect(self) {}
}
