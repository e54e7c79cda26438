//! Atomic state cell.

use core::fmt;
use parking_lot::Mutex;

/// A mutable cell whose every update is one critical section.
///
/// All reads and writes go through synchronous closures, so the lock is
/// never held while a future is suspended. Compound read-decide-write
/// transitions belong in a single [`Ref::modify`] call.
pub struct Ref<S> {
    state: Mutex<S>,
}

impl<S> Ref<S> {
    /// Creates a cell holding `initial`.
    #[must_use]
    pub fn new(initial: S) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn get(&self) -> S
    where
        S: Clone,
    {
        self.state.lock().clone()
    }

    /// Replaces the state, returning the previous one.
    pub fn set(&self, value: S) -> S {
        core::mem::replace(&mut *self.state.lock(), value)
    }

    /// Applies `f` to the state.
    pub fn update(&self, f: impl FnOnce(&mut S)) {
        f(&mut self.state.lock());
    }

    /// Applies `f` to the state and returns its result.
    pub fn modify<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.state.lock())
    }
}

impl<S: Default> Default for Ref<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: fmt::Debug> fmt::Debug for Ref<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_lock() {
            Some(state) => f.debug_tuple("Ref").field(&*state).finish(),
            None => f.write_str("Ref(<locked>)"),
        }
    }
}
