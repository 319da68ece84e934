use std::{
    future::{poll_fn, Future},
    pin::{pin, Pin},
    task::Poll,
};

/// Runs `future` to completion while also driving `producer`.
///
/// Returns the output of `future` along with the still running producer, or
/// `None` if the producer finished first.  The producer is something like a
/// connection actor that has to be polled for `future` to make progress.
pub(super) async fn read_from_producer<F, P>(future: F, producer: P) -> Option<(F::Output, P)>
where
    F: Future,
    P: Future<Output = ()> + Unpin,
{
    let mut future = pin!(future);
    let mut producer = Some(producer);

    poll_fn(move |cx| {
        if let Poll::Ready(output) = future.as_mut().poll(cx) {
            return Poll::Ready(producer.take().map(|producer| (output, producer)));
        }

        let Some(running) = producer.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(running).poll(cx) {
            Poll::Ready(()) => {
                producer = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_lite::future;
    use futures_timer::Delay;

    use super::*;

    #[tokio::test]
    async fn returns_the_producer_if_the_future_wins() {
        let producer: future::Boxed<()> = Box::pin(future::pending());

        let result = read_from_producer(async { 1 }, producer).await;

        assert_eq!(result.map(|(output, _)| output), Some(1));
    }

    #[tokio::test]
    async fn returns_none_if_the_producer_finishes_first() {
        let producer: future::Boxed<()> = Box::pin(async {});

        let result = read_from_producer(
            async {
                Delay::new(Duration::from_secs(5)).await;
                1
            },
            producer,
        )
        .await;

        assert!(result.is_none());
    }
}
