use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Run-wide deadline shared by the coordinator and every worker.
///
/// Cancellation is cooperative: workers look at the token before starting a
/// step but a step already executing is never interrupted.
#[derive(Debug, Clone)]
pub struct Deadline {
    budget: Duration,
    expires_at: Instant,
    token: CancellationToken,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            budget,
            // A budget too large to represent never expires in practice
            expires_at: now.checked_add(budget).unwrap_or_else(|| now + FAR_FUTURE),
            token: CancellationToken::new(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// True once the budget has elapsed or the token was cancelled
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.expires_at
    }

    /// Resolves when the deadline fires. Cancels the token on the way out so
    /// that `is_expired` agrees from then on.
    pub async fn expired(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.expires_at) => self.token.cancel(),
        }
    }

    /// Fire the deadline early
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token cancelled together with this deadline, but which can also be
    /// cancelled on its own (e.g. to stop the progress monitor)
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// Bounded concurrency gate; a permit must be held to execute a step.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held by a worker
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot. Returns `None` once the pool has been closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().acquire_owned().await.ok()
    }

    /// Refuse all further acquisitions; held permits stay valid
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
