use std::{future::pending, time::Duration};

use futures_timer::Delay;

/// A resettable countdown driven by the server's `ka` frames.
///
/// The server tells us how long it's willing to go between keepalives in
/// its `connection_ack`.  If that long passes without one the connection is
/// considered dead.
pub(super) struct KeepAlive {
    interval: Duration,
    deadline: Option<Delay>,
}

impl KeepAlive {
    /// Creates a KeepAlive with the countdown already running
    pub fn armed(interval: Duration) -> Self {
        KeepAlive {
            interval,
            deadline: Some(Delay::new(interval)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Restarts the countdown from the full interval.
    pub fn rearm(&mut self) {
        match &mut self.deadline {
            Some(deadline) => deadline.reset(self.interval),
            None => self.deadline = Some(Delay::new(self.interval)),
        }
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Resolves when the countdown runs out.  Never resolves if disarmed.
    ///
    /// Safe to drop & call again, the deadline is unaffected.
    pub async fn expired(&mut self) {
        match &mut self.deadline {
            Some(deadline) => deadline.await,
            None => pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use futures_lite::future;

    use super::*;

    #[tokio::test]
    async fn expires_after_the_interval() {
        let started = Instant::now();
        let mut keep_alive = KeepAlive::armed(Duration::from_millis(30));

        keep_alive.expired().await;

        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn rearming_pushes_the_deadline_back() {
        let mut keep_alive = KeepAlive::armed(Duration::from_millis(60));

        for _ in 0..3 {
            Delay::new(Duration::from_millis(30)).await;
            assert!(future::poll_once(keep_alive.expired()).await.is_none());
            keep_alive.rearm();
        }

        let started = Instant::now();
        keep_alive.expired().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn disarmed_never_expires() {
        let mut keep_alive = KeepAlive::armed(Duration::from_millis(10));
        keep_alive.disarm();

        let expired = future::or(
            async {
                keep_alive.expired().await;
                true
            },
            async {
                Delay::new(Duration::from_millis(50)).await;
                false
            },
        )
        .await;

        assert!(!expired);
    }
}
