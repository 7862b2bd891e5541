//! Push-based subscription handle.
//!
//! Every subscription pairs with exactly one release of the collaborator-side listener.
//! The release runs when the handle is dropped, so early returns and aborted tasks
//! unsubscribe as reliably as an explicit [`Subscription::unsubscribe`].

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;

type Release = Box<dyn FnOnce() + Send>;

pub struct Subscription<T> {
    stream: BoxStream<'static, T>,
    release: Option<Release>,
}

impl<T: Send + 'static> Subscription<T> {
    pub fn new(
        stream: impl Stream<Item = T> + Send + 'static,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            stream: stream.boxed(),
            release: Some(Box::new(release)),
        }
    }

    /// Wraps a channel fed by the collaborator.
    pub fn from_receiver(
        mut rx: mpsc::UnboundedReceiver<T>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self::new(stream::poll_fn(move |cx| rx.poll_recv(cx)), release)
    }

    /// A subscription that yields the given items and nothing else.
    pub fn fixed(items: Vec<T>) -> Self {
        Self::new(stream::iter(items), || {})
    }

    pub async fn next(&mut self) -> Option<T> {
        self.stream.next().await
    }

    /// Transforms pushed items without re-subscribing; the release guard moves along.
    pub fn map<U, F>(mut self, f: F) -> Subscription<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        let inner = std::mem::replace(&mut self.stream, stream::empty().boxed());
        Subscription {
            stream: inner.map(f).boxed(),
            release: self.release.take(),
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.stream.as_mut().poll_next(cx)
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish()
    }
}
