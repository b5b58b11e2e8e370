use std::collections::{HashMap, HashSet};
use std::thread::sleep;
use std::time::Duration;

use core_types::{DocId, DocumentRecord};
use tracing::warn;

use crate::{DocumentStore, StoreError};

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 50;

/// Retries transient (`Unavailable`) failures of the wrapped store with
/// exponential backoff. Other errors are returned immediately.
#[derive(Debug, Clone)]
pub struct RetryingStore<S> {
    inner: S,
    attempts: u32,
    backoff: Duration,
}

impl<S: DocumentStore> RetryingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            attempts: DEFAULT_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }

    /// Total attempts including the first; zero is treated as one.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

impl<S: DocumentStore> DocumentStore for RetryingStore<S> {
    fn batch_get(&self, ids: &HashSet<DocId>) -> Result<HashMap<DocId, DocumentRecord>, StoreError> {
        let mut attempt = 1;
        loop {
            match self.inner.batch_get(ids) {
                Ok(found) => return Ok(found),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    let delay = self.delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "document store lookup failed; retrying"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
