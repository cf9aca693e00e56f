//! Completion handles for submitted builds.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use kestreldb_core::{CollectionName, FieldName, IndexName};

use super::CancellationToken;
use crate::error::VectorError;
use crate::index::IndexType;

/// Summary of a completed build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Collection the index belongs to.
    pub collection: CollectionName,
    /// Indexed field.
    pub field: FieldName,
    /// Index name.
    pub index_name: IndexName,
    /// Index algorithm.
    pub index_type: IndexType,
    /// Segments that received an artifact.
    pub segments_built: usize,
    /// Whether the registry accepted the result.
    pub committed: bool,
    /// Wall time from submission to completion.
    pub elapsed: Duration,
}

/// Result delivered to waiters and callbacks.
pub type BuildResult = Result<BuildOutcome, VectorError>;

/// Invoked once on a worker thread after the build resolves.
pub type BuildCallback = Box<dyn FnOnce(&BuildResult) + Send + 'static>;

#[derive(Debug, Default)]
struct HandleState {
    result: Mutex<Option<BuildResult>>,
    done: Condvar,
}

/// Handle to a build running on the worker pool.
///
/// Clones observe the same build. Dropping a handle does not cancel the build.
#[derive(Debug, Clone)]
pub struct BuildHandle {
    state: Arc<HandleState>,
    token: CancellationToken,
}

impl BuildHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { state: Arc::new(HandleState::default()), token }
    }

    /// Store the result and wake every waiter. Only the first call has effect.
    pub(crate) fn resolve(&self, result: BuildResult) {
        if let Ok(mut slot) = self.state.result.lock() {
            if slot.is_none() {
                *slot = Some(result);
            }
        }
        self.state.done.notify_all();
    }

    /// Block until the build resolves.
    ///
    /// # Errors
    ///
    /// Returns the build's error.
    pub fn wait(&self) -> BuildResult {
        let mut slot = self.state.result.lock().map_err(|_| VectorError::LockPoisoned)?;
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self.state.done.wait(slot).map_err(|_| VectorError::LockPoisoned)?;
        }
    }

    /// Block until the build resolves or `timeout` elapses. On timeout the
    /// build is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::BuildTimeout`] on timeout, or the build's error.
    pub fn wait_timeout(&self, timeout: Duration) -> BuildResult {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.state.result.lock().map_err(|_| VectorError::LockPoisoned)?;
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            let Some(deadline) = deadline else {
                slot = self.state.done.wait(slot).map_err(|_| VectorError::LockPoisoned)?;
                continue;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.token.cancel();
                return Err(VectorError::BuildTimeout(timeout));
            }
            slot = self
                .state
                .done
                .wait_timeout(slot, remaining)
                .map_err(|_| VectorError::LockPoisoned)?
                .0;
        }
    }

    /// The result, if the build has resolved.
    #[must_use]
    pub fn try_result(&self) -> Option<BuildResult> {
        self.state.result.lock().ok().and_then(|slot| slot.clone())
    }

    /// Whether the build has resolved.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.result.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Request cancellation. The handle resolves with
    /// [`VectorError::BuildCancelled`] unless the build already finished.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn outcome() -> BuildOutcome {
        BuildOutcome {
            collection: CollectionName::new("c").unwrap(),
            field: FieldName::new("v").unwrap(),
            index_name: IndexName::new("FLAT").unwrap(),
            index_type: IndexType::Flat,
            segments_built: 1,
            committed: true,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_wait_sees_result_from_other_thread() {
        let handle = BuildHandle::new(CancellationToken::new());
        let remote = handle.clone();
        let worker = thread::spawn(move || remote.resolve(Ok(outcome())));
        assert_eq!(handle.wait().unwrap().segments_built, 1);
        worker.join().unwrap();
        assert!(handle.is_finished());
    }

    #[test]
    fn test_first_resolve_wins() {
        let handle = BuildHandle::new(CancellationToken::new());
        handle.resolve(Err(VectorError::BuildCancelled));
        handle.resolve(Ok(outcome()));
        assert!(matches!(handle.try_result(), Some(Err(VectorError::BuildCancelled))));
    }

    #[test]
    fn test_wait_timeout_cancels() {
        let token = CancellationToken::new();
        let handle = BuildHandle::new(token.clone());
        assert!(handle.try_result().is_none());
        let result = handle.wait_timeout(Duration::from_millis(10));
        assert!(matches!(result, Err(VectorError::BuildTimeout(_))));
        assert!(token.is_cancelled());
    }
}
