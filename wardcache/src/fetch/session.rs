use tokio_util::sync::CancellationToken;
use wardcache_core::CacheKey;

/// Lifecycle of a fetch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created but not yet fetching.
    Idle,
    /// The producer is running.
    Loading,
    /// The producer succeeded and the result was committed.
    Success,
    /// The producer failed or timed out.
    Error,
    /// The session was cancelled or superseded before it settled.
    Cancelled,
}

impl SessionStatus {
    /// Returns `true` once the session can no longer change.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            SessionStatus::Success | SessionStatus::Error | SessionStatus::Cancelled
        )
    }
}

/// One "this consumer wants data for key K" relationship.
///
/// Values handed out by [`CancellableFetcher`](super::CancellableFetcher)
/// are snapshots; the token is shared with the live session.
#[derive(Debug, Clone)]
pub struct FetchSession {
    id: u64,
    key: CacheKey,
    token: CancellationToken,
    status: SessionStatus,
}

impl FetchSession {
    pub(crate) fn new(id: u64, key: CacheKey) -> Self {
        Self {
            id,
            key,
            token: CancellationToken::new(),
            status: SessionStatus::Idle,
        }
    }

    /// Monotonic id, unique per fetcher.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Key this session fetches.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Token cancelled when the session is cancelled or replaced.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Status at the time this snapshot was taken.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns `true` if the session's token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    /// Cancels the token. A session that had not settled becomes
    /// `Cancelled`; returns `true` in that case.
    pub(crate) fn cancel(&mut self) -> bool {
        self.token.cancel();
        if self.status.is_settled() {
            return false;
        }
        self.status = SessionStatus::Cancelled;
        true
    }
}
