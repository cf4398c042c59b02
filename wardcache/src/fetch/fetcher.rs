use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wardcache_core::{BoxError, CacheKey, Producer};

use super::cancellable::CancellableExt;
use super::session::{FetchSession, SessionStatus};
use crate::error::LoadError;

/// Result of running a producer inside a session.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// The producer finished (successfully or not) before cancellation.
    Completed(Result<T, LoadError>),
    /// The session was cancelled while the producer was running.
    Cancelled,
}

#[derive(Debug, Default)]
struct SessionSlot {
    current: Option<FetchSession>,
    next_id: u64,
}

/// Owns the single active [`FetchSession`] of one consumer.
///
/// Starting a session cancels the previous one. Results are committed via
/// [`settle`](CancellableFetcher::settle), which runs the commit under the
/// same lock [`cancel_with`](CancellableFetcher::cancel_with) takes: once a
/// cancel returns, the cancelled session can no longer commit anything.
#[derive(Debug, Default)]
pub struct CancellableFetcher {
    timeout: Option<Duration>,
    slot: Mutex<SessionSlot>,
}

impl CancellableFetcher {
    /// Creates a fetcher without a producer timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher that fails producers running longer than `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            slot: Mutex::default(),
        }
    }

    /// Producer timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Cancels the current session and starts a new `Loading` one for `key`.
    ///
    /// `on_start` runs under the session lock before the new session becomes
    /// current.
    pub fn start(&self, key: CacheKey, on_start: impl FnOnce(&FetchSession)) -> FetchSession {
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.current.as_mut()
            && previous.cancel()
        {
            debug!(session = previous.id(), key = %previous.key(), "Superseded in-flight session");
        }
        let id = slot.next_id;
        slot.next_id += 1;

        let mut session = FetchSession::new(id, key);
        session.set_status(SessionStatus::Loading);
        on_start(&session);
        debug!(session = id, key = %session.key(), "Started fetch session");
        slot.current = Some(session.clone());
        session
    }

    /// Runs `producer` for `session`.
    ///
    /// The producer future is raced against the session token and dropped as
    /// soon as the session is cancelled. A timeout is reported as
    /// [`LoadError::Timeout`].
    pub async fn run<T>(&self, session: &FetchSession, producer: &dyn Producer<T>) -> FetchOutcome<T> {
        self.run_with(session, |token| producer.produce(token)).await
    }

    /// Like [`run`](Self::run) for a fetch that is not packaged as a
    /// [`Producer`]. `start` receives the session token.
    pub async fn run_with<T, F>(&self, session: &FetchSession, start: F) -> FetchOutcome<T>
    where
        F: FnOnce(CancellationToken) -> BoxFuture<'static, Result<T, BoxError>>,
    {
        let token = session.token().clone();
        let fetch = start(token.clone());
        let timeout = self.timeout;
        let attempt = async move {
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, fetch).await {
                    Ok(result) => result,
                    Err(_) => return Err(LoadError::Timeout(limit)),
                },
                None => fetch.await,
            };
            result.map_err(LoadError::from_boxed)
        };

        match attempt.with_cancellation(token).await {
            Some(result) => FetchOutcome::Completed(result),
            None => FetchOutcome::Cancelled,
        }
    }

    /// Marks `session` as settled with `status` and runs `commit`.
    ///
    /// Returns `None` without running `commit` when the session was
    /// cancelled, superseded or already settled.
    pub fn settle<R>(
        &self,
        session: &FetchSession,
        status: SessionStatus,
        commit: impl FnOnce() -> R,
    ) -> Option<R> {
        let mut slot = self.slot.lock();
        let current = slot.current.as_mut().filter(|current| {
            current.id() == session.id()
                && !current.is_cancelled()
                && current.status() == SessionStatus::Loading
        });
        match current {
            Some(current) => {
                current.set_status(status);
                Some(commit())
            }
            None => {
                debug!(session = session.id(), key = %session.key(), "Suppressed stale response");
                None
            }
        }
    }

    /// Cancels the current session if it is still loading and runs
    /// `on_cancel` under the session lock.
    pub fn cancel_with<R>(&self, on_cancel: impl FnOnce(&FetchSession) -> R) -> Option<R> {
        let mut slot = self.slot.lock();
        let session = slot.current.as_mut()?;
        if !session.cancel() {
            return None;
        }
        debug!(session = session.id(), key = %session.key(), "Cancelled fetch session");
        Some(on_cancel(session))
    }

    /// Cancels `session` if it is still the current, loading session and
    /// runs `on_cancel` under the session lock. A superseded session is left
    /// alone; its successor owns the slot.
    pub fn abandon<R>(
        &self,
        session: &FetchSession,
        on_cancel: impl FnOnce(&FetchSession) -> R,
    ) -> Option<R> {
        let mut slot = self.slot.lock();
        let current = slot
            .current
            .as_mut()
            .filter(|current| current.id() == session.id())?;
        if !current.cancel() {
            return None;
        }
        debug!(session = current.id(), key = %current.key(), "Abandoned fetch session");
        Some(on_cancel(current))
    }

    /// Cancels the current session. Returns `true` if it was still loading.
    pub fn cancel(&self) -> bool {
        self.cancel_with(|_| ()).is_some()
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Option<FetchSession> {
        self.slot.lock().current.clone()
    }
}

impl Drop for CancellableFetcher {
    fn drop(&mut self) {
        if let Some(session) = self.slot.get_mut().current.as_mut() {
            session.cancel();
        }
    }
}
