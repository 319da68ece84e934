use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::Error;

/// The lifecycle of a subscription session.
///
/// Sessions only ever move forward through these states, and `Closed` is
/// terminal: there is no automatic reconnection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// The websocket is being opened
    #[default]
    Connecting,
    /// `connection_init` has been sent, waiting on `connection_ack`
    AwaitingAck,
    /// The `start` frame has been sent, waiting on the server to accept it
    Registering,
    /// Data is flowing
    Streaming,
    /// The session is being torn down
    Closing,
    /// The session is over
    Closed,
}

/// State the session actor shares with subscription handles.
///
/// The actor is the only writer.
#[derive(Clone, Debug, Default)]
pub(super) struct SessionStatus(Arc<Mutex<StatusInner>>);

#[derive(Debug, Default)]
struct StatusInner {
    state: SessionState,
    keep_alive: Option<Duration>,
    error: Option<Error>,
}

impl SessionStatus {
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn set_state(&self, state: SessionState) {
        self.lock().state = state;
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        self.lock().keep_alive
    }

    pub fn set_keep_alive(&self, interval: Duration) {
        self.lock().keep_alive = Some(interval);
    }

    pub fn error(&self) -> Option<Error> {
        self.lock().error.clone()
    }

    pub fn fail(&self, error: Error) {
        self.lock().error.get_or_insert(error);
    }

    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
