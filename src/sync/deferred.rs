//! Single-assignment exit with many waiters.
//!
//! A [`Deferred`] is completed at most once, by whichever producer gets
//! there first. Every waiter, whether it started waiting before or after the
//! completion, observes the same exit.
//!
//! # Cancel Safety
//!
//! Dropping a [`Wait`] future only discards that waiter, unregistering its
//! waker. It never affects the producer or other waiters.

use crate::types::Exit;
use core::fmt;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

struct DeferredState<A, E> {
    exit: Option<Exit<A, E>>,
    next_waiter: u64,
    waiters: Vec<(u64, Waker)>,
}

/// A shared, single-assignment exit.
///
/// Cloning produces another handle to the same slot.
pub struct Deferred<A, E> {
    inner: Arc<Mutex<DeferredState<A, E>>>,
}

impl<A, E> Deferred<A, E> {
    /// Creates an empty deferred.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DeferredState {
                exit: None,
                next_waiter: 0,
                waiters: Vec::new(),
            })),
        }
    }

    /// Completes with a value. Returns `false` if already completed.
    pub fn succeed(&self, value: A) -> bool {
        self.complete(Ok(value))
    }

    /// Completes with a failure. Returns `false` if already completed.
    pub fn fail(&self, cause: crate::Cause<E>) -> bool {
        self.complete(Err(cause))
    }

    /// Completes with `exit` if nothing has completed it yet.
    ///
    /// Returns `true` if this call won, waking every pending waiter.
    pub fn complete(&self, exit: Exit<A, E>) -> bool {
        let wakers = {
            let mut state = self.inner.lock();
            if state.exit.is_some() {
                return false;
            }
            state.exit = Some(exit);
            std::mem::take(&mut state.waiters)
        };
        for (_, waker) in wakers {
            waker.wake();
        }
        true
    }

    /// Returns true once a value or failure has been published.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.lock().exit.is_some()
    }

    /// Returns a copy of the published exit, if any.
    #[must_use]
    pub fn poll_value(&self) -> Option<Exit<A, E>>
    where
        A: Clone,
        E: Clone,
    {
        self.inner.lock().exit.clone()
    }

    /// Waits for the exit to be published.
    #[must_use]
    pub fn wait(&self) -> Wait<A, E> {
        Wait {
            inner: Arc::clone(&self.inner),
            slot: None,
        }
    }
}

impl<A, E> Clone for Deferred<A, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, E> Default for Deferred<A, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, E> fmt::Debug for Deferred<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Future returned by [`Deferred::wait`].
#[must_use = "futures do nothing unless polled"]
pub struct Wait<A, E> {
    inner: Arc<Mutex<DeferredState<A, E>>>,
    slot: Option<u64>,
}

impl<A: Clone, E: Clone> Future for Wait<A, E> {
    type Output = Exit<A, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.inner.lock();
        if let Some(exit) = &state.exit {
            this.slot = None;
            return Poll::Ready(exit.clone());
        }
        let registered = this
            .slot
            .and_then(|slot| state.waiters.iter_mut().find(|(id, _)| *id == slot));
        match registered {
            Some((_, waker)) => {
                if !waker.will_wake(cx.waker()) {
                    waker.clone_from(cx.waker());
                }
            }
            None => {
                let slot = state.next_waiter;
                state.next_waiter += 1;
                state.waiters.push((slot, cx.waker().clone()));
                this.slot = Some(slot);
            }
        }
        Poll::Pending
    }
}

impl<A, E> Drop for Wait<A, E> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.inner.lock().waiters.retain(|(id, _)| *id != slot);
        }
    }
}
