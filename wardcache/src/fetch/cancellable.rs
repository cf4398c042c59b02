use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Future that races `future` against a [`CancellationToken`].
///
/// Resolves to `None` as soon as the token is cancelled, dropping the inner
/// future on the next poll. Cancellation wins when both are ready.
#[pin_project]
pub struct Cancellable<F> {
    #[pin]
    future: F,
    #[pin]
    cancelled: WaitForCancellationFutureOwned,
}

impl<F> Cancellable<F> {
    /// Wraps `future` so it stops when `token` is cancelled.
    pub fn new(future: F, token: CancellationToken) -> Self {
        Self {
            future,
            cancelled: token.cancelled_owned(),
        }
    }
}

impl<F: Future> Future for Cancellable<F> {
    type Output = Option<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if this.cancelled.poll(cx).is_ready() {
            return Poll::Ready(None);
        }
        this.future.poll(cx).map(Some)
    }
}

/// Extension trait adding [`with_cancellation`](CancellableExt::with_cancellation)
/// to every future.
pub trait CancellableExt: Future + Sized {
    /// Races `self` against `token`.
    fn with_cancellation(self, token: CancellationToken) -> Cancellable<Self> {
        Cancellable::new(self, token)
    }
}

impl<F: Future> CancellableExt for F {}
