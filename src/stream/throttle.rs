//! Latest-wins stream sampling

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait to add sampling to any Stream
pub trait SampleExt: Stream {
    /// Emit at most once per `period`.
    ///
    /// Items that arrive between ticks replace each other; only the latest is
    /// emitted. When the inner stream ends, the held item is flushed before the
    /// sampled stream ends.
    fn sample_latest(self, period: Duration) -> SampleLatest<Self>
    where
        Self: Sized,
    {
        SampleLatest::new(self, period)
    }
}

impl<T: Stream> SampleExt for T {}

pin_project! {
    /// Stream returned by [`SampleExt::sample_latest`]
    pub struct SampleLatest<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        latest: Option<S::Item>,
        exhausted: bool,
    }
}

impl<S: Stream> SampleLatest<S> {
    /// Must be called inside a tokio runtime.
    pub fn new(stream: S, period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { stream, interval, latest: None, exhausted: false }
    }
}

impl<S: Stream> Stream for SampleLatest<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.exhausted {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.latest = Some(item),
                Poll::Ready(None) => *this.exhausted = true,
                Poll::Pending => break,
            }
        }

        if *this.exhausted {
            return Poll::Ready(this.latest.take());
        }
        if this.latest.is_none() {
            return Poll::Pending;
        }

        ready!(this.interval.poll_tick(cx));
        Poll::Ready(this.latest.take())
    }
}
