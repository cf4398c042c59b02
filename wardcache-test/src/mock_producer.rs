use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use wardcache_core::{BoxError, CancellationToken, Producer};

/// Producer that answers with a fixed result after an optional delay.
#[derive(Clone, Debug)]
pub struct MockProducer<T> {
    result: Result<T, String>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl<T: Clone + Send + Sync + 'static> MockProducer<T> {
    pub fn ok(value: T) -> Self {
        Self {
            result: Ok(value),
            delay: Duration::ZERO,
            calls: Arc::default(),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
            delay: Duration::ZERO,
            calls: Arc::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `produce` calls across all clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T: Clone + Send + Sync + 'static> Producer<T> for MockProducer<T> {
    fn produce(&self, _token: CancellationToken) -> BoxFuture<'static, Result<T, BoxError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.result.clone();
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result.map_err(BoxError::from)
        })
    }
}

/// Producer whose single answer is released by the test through a [`Gate`].
#[derive(Debug)]
pub struct GatedProducer<T> {
    receiver: Mutex<Option<oneshot::Receiver<T>>>,
    calls: Arc<AtomicUsize>,
}

/// Releases the answer of a [`GatedProducer`].
#[derive(Debug)]
pub struct Gate<T> {
    sender: oneshot::Sender<T>,
    calls: Arc<AtomicUsize>,
}

impl<T> GatedProducer<T> {
    pub fn new() -> (Self, Gate<T>) {
        let (sender, receiver) = oneshot::channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let producer = Self {
            receiver: Mutex::new(Some(receiver)),
            calls: Arc::clone(&calls),
        };
        (producer, Gate { sender, calls })
    }
}

impl<T> Gate<T> {
    /// Number of times the producer was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `true` once the pending fetch was dropped without being released.
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }

    /// Lets the pending fetch complete with `value`. Returns `false` when
    /// nobody was waiting any more.
    pub fn release(self, value: T) -> bool {
        self.sender.send(value).is_ok()
    }
}

impl<T: Send + 'static> Producer<T> for GatedProducer<T> {
    fn produce(&self, _token: CancellationToken) -> BoxFuture<'static, Result<T, BoxError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let receiver = self.receiver.lock().unwrap().take();
        Box::pin(async move {
            match receiver {
                Some(receiver) => receiver.await.map_err(BoxError::from),
                None => Err("gated producer called twice".into()),
            }
        })
    }
}
