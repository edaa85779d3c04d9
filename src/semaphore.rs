//! FIFO counting semaphore.
//!
//! The token manager holds one of these with a single permit so that reading,
//! refreshing and storing the credential happen in one critical section at a time.
//! Permits are RAII guards: the only way to give capacity back is to drop (or
//! `release`) a permit obtained from `acquire`, so a release can never outnumber
//! the grants.

use core::fmt;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use crate::error::TadoClientError;

/// Returned by `acquire` when the waiter was rejected by `purge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireError;

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "semaphore waiter purged")
    }
}

impl std::error::Error for AcquireError {}

impl From<AcquireError> for TadoClientError {
    fn from(_: AcquireError) -> Self {
        TadoClientError::LockPurged
    }
}

#[derive(Debug)]
struct State {
    available: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Debug)]
pub struct Semaphore {
    max: usize,
    state: Mutex<State>,
}

impl Semaphore {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Semaphore {
            max,
            state: Mutex::new(State {
                available: max,
                waiters: VecDeque::new(),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // State is a counter and a queue, both valid after any panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a permit. Grants immediately when capacity is free and nobody is queued.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        let rx = {
            let mut state = self.lock_state();
            if state.waiters.is_empty() && state.available > 0 {
                state.available -= 1;
                return Ok(SemaphorePermit { sem: self });
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        let mut pending = PendingGrant {
            sem: self,
            rx,
            granted: false,
        };
        match (&mut pending.rx).await {
            Ok(()) => {
                pending.granted = true;
                Ok(SemaphorePermit { sem: self })
            }
            Err(_) => Err(AcquireError),
        }
    }

    /// Reject every queued waiter. Returns how many were rejected.
    ///
    /// Permits already handed out stay valid and return their capacity when dropped.
    pub fn purge(&self) -> usize {
        let mut state = self.lock_state();
        let purged = state.waiters.drain(..).filter(|w| !w.is_closed()).count();
        if purged > 0 {
            log::debug!("Purged {} semaphore waiter(s)", purged);
        }
        purged
    }

    pub fn available_permits(&self) -> usize {
        self.lock_state().available
    }

    /// Number of live waiters currently queued.
    pub fn waiting(&self) -> usize {
        self.lock_state().waiters.iter().filter(|w| !w.is_closed()).count()
    }

    fn release_one(&self) {
        let mut state = self.lock_state();
        // Hand the permit straight to the oldest waiter still listening.
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
        }
        debug_assert!(state.available < self.max, "release without matching acquire");
        state.available += 1;
    }
}

/// A granted permit. Capacity is returned when this is dropped.
#[must_use = "the permit is released as soon as it is dropped"]
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    sem: &'a Semaphore,
}

impl SemaphorePermit<'_> {
    /// Release explicitly. Equivalent to dropping the permit.
    pub fn release(self) {}
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.sem.release_one();
    }
}

/// Queued waiter. If the acquiring future is dropped after the grant was sent
/// but before it was observed, the permit is handed back here.
struct PendingGrant<'a> {
    sem: &'a Semaphore,
    rx: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for PendingGrant<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.sem.release_one();
        }
    }
}
