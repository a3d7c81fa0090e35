//! Display-rate pacing for frame streams

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, interval};

/// Extension trait to pace any Stream for display.
pub trait PaceExt: Stream {
    /// Emit at most one item per interval.
    ///
    /// Latest-wins: when several frames arrive inside one interval only the
    /// most recent is emitted, so a paced subscriber always shows the
    /// freshest image rather than a backlog.
    fn paced(self, period: Duration) -> Paced<Self>
    where
        Self: Sized,
    {
        Paced::new(self, period)
    }
}

impl<T: Stream> PaceExt for T {}

pin_project! {
    /// Stream combinator bounding emission rate with latest-wins semantics.
    pub struct Paced<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        pending: Option<S::Item>,
    }
}

impl<S: Stream> Paced<S> {
    /// Create a paced stream.
    pub fn new(stream: S, period: Duration) -> Self {
        let mut interval = interval(period);
        // Delay missed ticks instead of bursting to catch up
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        Self { stream, interval, pending: None }
    }
}

impl<S: Stream> Stream for Paced<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        ready!(this.interval.poll_tick(cx));

        // Drain whatever is available, keeping only the freshest item
        loop {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    *this.pending = Some(item);
                }
                Poll::Ready(None) => {
                    return Poll::Ready(this.pending.take());
                }
                Poll::Pending => {
                    return Poll::Ready(this.pending.take());
                }
            }
        }
    }
}
