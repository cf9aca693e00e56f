//! Cancellation and deadlines for build jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::VectorError;

/// Shared flag that asks a build to stop.
///
/// Clones share the same flag. Cancellation is cooperative: long-running
/// build steps call [`BuildContext::checkpoint`] between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Cancellation token plus deadline handed to every build step.
#[derive(Debug, Clone)]
pub struct BuildContext {
    token: CancellationToken,
    started: Instant,
    timeout: Duration,
}

impl BuildContext {
    /// Create a context that expires `timeout` from now.
    #[must_use]
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self::since(token, Instant::now(), timeout)
    }

    /// Create a context whose deadline is `timeout` after `started`, which
    /// may lie in the past (a job's submission time, for instance).
    #[must_use]
    pub const fn since(token: CancellationToken, started: Instant, timeout: Duration) -> Self {
        Self { token, started, timeout }
    }

    /// A context that never expires and cannot be cancelled from outside.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(CancellationToken::new(), Duration::MAX)
    }

    /// The token observed by this context.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Stop the build if it was cancelled or ran past its deadline.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::BuildCancelled`] or [`VectorError::BuildTimeout`].
    #[inline]
    pub fn checkpoint(&self) -> Result<(), VectorError> {
        if self.token.is_cancelled() {
            return Err(VectorError::BuildCancelled);
        }
        if self.started.elapsed() > self.timeout {
            return Err(VectorError::BuildTimeout(self.timeout));
        }
        Ok(())
    }
}
