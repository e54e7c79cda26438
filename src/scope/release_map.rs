//! Ordered, at-most-once finalizer registry.
//!
//! A [`ReleaseMap`] is either `Running`, holding finalizers keyed by strictly
//! increasing integers, or `Exited`, holding the exit it was closed with.
//! The `Running -> Exited` transition happens exactly once.
//!
//! Every operation is one critical section on the state cell followed, at
//! most, by running finalizers after the lock is released. Keys handed out
//! inside the critical section totally order racing registrations; a
//! sequential release runs finalizers in exactly the reverse of that order.

use super::finalizer::Finalizer;
use crate::cause::Cause;
use crate::combinator::join_all;
use crate::cx::Cx;
use crate::sync::Ref;
use crate::tracing_compat::{debug, trace};
use crate::types::exit::collect_all_par_unit;
use crate::types::{ExecutionStrategy, Exit, ReleaseKey};
use core::fmt;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

enum State<E> {
    Running {
        next_key: u64,
        finalizers: BTreeMap<u64, Finalizer<E>>,
    },
    Exited {
        next_key: u64,
        exit: Exit<(), E>,
    },
}

/// Outcome of a registration attempt, computed inside the critical section.
enum Registration<E> {
    Stored(ReleaseKey),
    RunNow(Finalizer<E>, Exit<(), E>),
}

/// A registry of finalizers released together when a scope closes.
///
/// Cloning produces another handle to the same registry.
pub struct ReleaseMap<E> {
    state: Arc<Ref<State<E>>>,
}

impl<E> Clone for ReleaseMap<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E: Clone + Send + 'static> ReleaseMap<E> {
    /// Creates an empty, running registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Ref::new(State::Running {
                next_key: 0,
                finalizers: BTreeMap::new(),
            })),
        }
    }

    fn register(&self, finalizer: Finalizer<E>) -> Registration<E> {
        self.state.modify(move |state| match state {
            State::Running {
                next_key,
                finalizers,
            } => {
                let key = *next_key;
                *next_key += 1;
                finalizers.insert(key, finalizer);
                Registration::Stored(ReleaseKey::new(key))
            }
            State::Exited { next_key, exit } => {
                *next_key += 1;
                Registration::RunNow(finalizer, exit.clone())
            }
        })
    }

    /// Registers `finalizer`, returning a handle that releases it.
    ///
    /// Invoking the returned handle removes and runs this finalizer through
    /// [`ReleaseMap::release`], so it runs at most once however often the
    /// handle is called. If the registry has already exited, `finalizer`
    /// runs immediately against the stored exit and a no-op handle is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the cause of the immediate run if it failed.
    pub async fn add(&self, finalizer: Finalizer<E>) -> Exit<Finalizer<E>, E> {
        match self.add_if_open(finalizer).await? {
            Some(key) => Ok(self.releaser(key)),
            None => Ok(Finalizer::noop()),
        }
    }

    /// Registers `finalizer`, returning its key.
    ///
    /// Returns `Ok(None)` if the registry had already exited, after running
    /// `finalizer` against the stored exit.
    ///
    /// # Errors
    ///
    /// Returns the cause of the immediate run if it failed.
    pub async fn add_if_open(&self, finalizer: Finalizer<E>) -> Exit<Option<ReleaseKey>, E> {
        match self.register(finalizer) {
            Registration::Stored(key) => {
                trace!(key = key.as_u64(), "finalizer registered");
                Ok(Some(key))
            }
            Registration::RunNow(finalizer, exit) => {
                trace!("registry exited, running finalizer immediately");
                finalizer.run(exit).await?;
                Ok(None)
            }
        }
    }

    /// Registers `finalizer` without running anything.
    ///
    /// Returns `None`, dropping `finalizer` unrun, if the registry has
    /// exited. Usable from synchronous contexts such as `Drop`.
    pub fn try_add(&self, finalizer: Finalizer<E>) -> Option<ReleaseKey> {
        self.state.modify(move |state| match state {
            State::Running {
                next_key,
                finalizers,
            } => {
                let key = *next_key;
                *next_key += 1;
                finalizers.insert(key, finalizer);
                Some(ReleaseKey::new(key))
            }
            State::Exited { .. } => None,
        })
    }

    fn releaser(&self, key: ReleaseKey) -> Finalizer<E> {
        let map = self.clone();
        Finalizer::new(move |exit| {
            let map = map.clone();
            async move { map.release(key, exit).await }
        })
    }

    /// A finalizer that unregisters `key` from this registry without running
    /// it. Holds the registry weakly.
    pub(crate) fn remover(&self, key: ReleaseKey) -> Finalizer<E> {
        let state = Arc::downgrade(&self.state);
        Finalizer::from_fn(move |_exit| {
            if let Some(state) = state.upgrade() {
                Self { state }.remove(key);
            }
            Ok(())
        })
    }

    /// Removes and runs the finalizer registered under `key`.
    ///
    /// A no-op if the key is absent or the registry has exited.
    ///
    /// # Errors
    ///
    /// Returns the finalizer's failure.
    pub async fn release(&self, key: ReleaseKey, exit: Exit<(), E>) -> Exit<(), E> {
        let finalizer = self.state.modify(|state| match state {
            State::Running { finalizers, .. } => finalizers.remove(&key.as_u64()),
            State::Exited { .. } => None,
        });
        match finalizer {
            Some(finalizer) => {
                trace!(key = key.as_u64(), "releasing finalizer");
                finalizer.run(exit).await
            }
            None => Ok(()),
        }
    }

    /// Closes the registry with `exit` and runs every remaining finalizer.
    ///
    /// Finalizers run in reverse registration order, at most as many at a
    /// time as `strategy` allows. Every finalizer is attempted; all failures
    /// are combined with [`Cause::parallel`](crate::Cause::parallel). A
    /// second call finds the registry exited and returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the combined cause of every failed finalizer.
    pub async fn release_all(&self, exit: Exit<(), E>, strategy: ExecutionStrategy) -> Exit<(), E> {
        let stored_exit = exit.clone();
        let finalizers = self.state.modify(move |state| {
            let State::Running {
                next_key,
                finalizers,
            } = state
            else {
                return None;
            };
            let next_key = *next_key;
            let finalizers = std::mem::take(finalizers);
            *state = State::Exited {
                next_key,
                exit: stored_exit,
            };
            Some(finalizers)
        });
        let Some(finalizers) = finalizers else {
            trace!("release_all on exited registry");
            return Ok(());
        };

        debug!(
            count = finalizers.len(),
            strategy = %strategy,
            "releasing all finalizers"
        );
        let runs = finalizers
            .into_values()
            .rev()
            .map(|finalizer| finalizer.run(exit.clone()));
        let exits = join_all(runs, strategy.concurrency_limit()).await;
        let result = collect_all_par_unit(exits);
        if result.is_err() {
            debug!(
                failures = result.as_ref().map_or_else(Cause::size, |_| 0),
                "finalizers failed during release_all"
            );
        }
        result
    }

    /// Swaps the finalizer registered under `key`, returning the previous one.
    ///
    /// If the registry has exited, `finalizer` runs immediately against the
    /// stored exit and `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// Returns the cause of the immediate run if it failed.
    pub async fn replace(
        &self,
        key: ReleaseKey,
        finalizer: Finalizer<E>,
    ) -> Exit<Option<Finalizer<E>>, E> {
        let outcome = self.state.modify(move |state| match state {
            State::Running { finalizers, .. } => {
                Ok(finalizers.insert(key.as_u64(), finalizer))
            }
            State::Exited { exit, .. } => Err((finalizer, exit.clone())),
        });
        match outcome {
            Ok(previous) => Ok(previous),
            Err((finalizer, exit)) => {
                finalizer.run(exit).await?;
                Ok(None)
            }
        }
    }

    /// Removes the finalizer registered under `key` without running it.
    pub fn remove(&self, key: ReleaseKey) -> Option<Finalizer<E>> {
        self.state.modify(|state| match state {
            State::Running { finalizers, .. } => finalizers.remove(&key.as_u64()),
            State::Exited { .. } => None,
        })
    }

    /// The finalizer registered under `key`, if any.
    #[must_use]
    pub fn get(&self, key: ReleaseKey) -> Option<Finalizer<E>> {
        self.state.modify(|state| match state {
            State::Running { finalizers, .. } => finalizers.get(&key.as_u64()).cloned(),
            State::Exited { .. } => None,
        })
    }

    /// Number of finalizers still registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.modify(|state| match state {
            State::Running { finalizers, .. } => finalizers.len(),
            State::Exited { .. } => 0,
        })
    }

    /// Returns true if no finalizer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once [`ReleaseMap::release_all`] has run.
    #[must_use]
    pub fn is_exited(&self) -> bool {
        self.state
            .modify(|state| matches!(state, State::Exited { .. }))
    }

    /// The exit the registry was closed with, if it has exited.
    #[must_use]
    pub fn exit_value(&self) -> Option<Exit<(), E>> {
        self.state.modify(|state| match state {
            State::Running { .. } => None,
            State::Exited { exit, .. } => Some(exit.clone()),
        })
    }

    /// Acquires a resource uninterruptibly and registers its release.
    ///
    /// `acquire` runs with a masked context, so an interrupt cannot land
    /// between acquisition and registration. `release` receives a clone of
    /// the acquired value and the exit of the registry.
    ///
    /// # Errors
    ///
    /// Returns the acquisition failure, or the failure of an immediate
    /// release if the registry had already exited.
    pub async fn acquire_release<A, Acq, AcqFut, Rel, RelFut>(
        &self,
        cx: &Cx,
        acquire: Acq,
        release: Rel,
    ) -> Exit<A, E>
    where
        A: Clone + Send + Sync + 'static,
        Acq: FnOnce(Cx) -> AcqFut,
        AcqFut: Future<Output = Exit<A, E>>,
        Rel: Fn(A, Exit<(), E>) -> RelFut + Send + Sync + 'static,
        RelFut: Future<Output = Exit<(), E>> + Send + 'static,
    {
        cx.uninterruptible(|masked| async move {
            let value = acquire(masked).await?;
            let held = value.clone();
            let finalizer = Finalizer::new(move |exit| release(held.clone(), exit));
            self.add(finalizer).await?;
            Ok::<A, Cause<E>>(value)
        })
        .await
    }
}

impl<E: Clone + Send + 'static> Default for ReleaseMap<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for ReleaseMap<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.modify(|state| match state {
            State::Running {
                next_key,
                finalizers,
            } => f
                .debug_struct("ReleaseMap::Running")
                .field("next_key", next_key)
                .field("finalizers", &finalizers.len())
                .finish(),
            State::Exited { next_key, exit } => f
                .debug_struct("ReleaseMap::Exited")
                .field("next_key", next_key)
                .field("failed", &exit.is_err())
                .finish(),
        })
    }
}
