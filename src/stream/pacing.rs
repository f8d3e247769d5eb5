//! Latest-wins pacing for render pulls

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait to pace any stream to a minimum emission interval.
pub trait PaceExt: Stream {
    /// Emit at most once per `period`.
    ///
    /// Items arriving between emissions overwrite each other; only the newest
    /// is emitted. A pending item is still flushed after the inner stream ends.
    fn pace(self, period: Duration) -> Pace<Self>
    where
        Self: Sized,
    {
        Pace::new(self, period)
    }
}

impl<T: Stream> PaceExt for T {}

pin_project! {
    /// Stream combinator returned by [`PaceExt::pace`].
    pub struct Pace<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        pending: Option<S::Item>,
        done: bool,
    }
}

impl<S: Stream> Pace<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        let mut interval = interval(period);
        // Late emissions push the schedule back instead of bursting.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { stream, interval, pending: None, done: false }
    }
}

impl<S: Stream> Stream for Pace<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => break,
            }
        }

        if this.pending.is_none() {
            return if *this.done { Poll::Ready(None) } else { Poll::Pending };
        }

        ready!(this.interval.poll_tick(cx));
        Poll::Ready(this.pending.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::watch;
    use tokio_stream::wrappers::WatchStream;

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_latest() {
        let (tx, rx) = watch::channel(0u32);
        let mut paced = Box::pin(WatchStream::new(rx).pace(Duration::from_millis(100)));

        // First tick is immediate.
        assert_eq!(paced.next().await, Some(0));

        for value in 1..=5 {
            tx.send_replace(value);
        }
        assert_eq!(paced.next().await, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn emissions_are_spaced() {
        let (tx, rx) = watch::channel(0u32);
        let mut paced = Box::pin(WatchStream::new(rx).pace(Duration::from_millis(100)));

        let start = tokio::time::Instant::now();
        paced.next().await;
        tx.send_replace(1);
        paced.next().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_pending_item_after_end() {
        let items = futures::stream::iter([1, 2, 3]);
        let collected: Vec<_> = items.pace(Duration::from_millis(10)).collect().await;
        assert_eq!(collected, vec![3]);
    }
}
