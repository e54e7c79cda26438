//! Memoized construction of layer graphs.
//!
//! A [`MemoMap`] caches, per [`LayerId`], the shared outcome of building
//! that layer together with a forwarding finalizer. Requesters race through
//! a single critical section on the map: exactly one becomes the builder,
//! everyone else waits on the same [`Deferred`] and observes the same exit.
//!
//! # Teardown
//!
//! Every successful request, builder or not, counts as one observer and
//! registers the node's forwarding finalizer in its own outer release map.
//! Invoking the forwarding finalizer decrements the observer count; only the
//! invocation that takes it from one to zero releases the node's inner
//! release map and evicts the node, so a later request builds it anew.
//! Later invocations do nothing.
//!
//! Joining an existing node and the final decrement both happen under the
//! cache lock: a torn-down node is never observed again.
//!
//! # Abandoned builds
//!
//! If the future driving a build is dropped before it finishes, the node's
//! waiters are failed with an interruption and the node's inner release map
//! is handed to the outer one, so partial acquisitions are still released
//! when the outer scope closes.

use super::Layer;
use super::context::LayerContext;
use crate::cause::Cause;
use crate::config::ScopeConfig;
use crate::cx::{Cx, Restore};
use crate::error::Error;
use crate::scope::{Finalizer, ReleaseMap};
use crate::sync::{Deferred, Ref};
use crate::tracing_compat::{debug, trace, warn};
use crate::types::exit::and_then_cause;
use crate::types::{Defect, ExecutionStrategy, Exit, FiberId, LayerId};
use core::fmt;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};

type Erased = Arc<dyn Any + Send + Sync>;
type Entries<E> = Ref<HashMap<LayerId, MemoEntry<E>>>;

struct MemoEntry<E> {
    deferred: Deferred<Erased, E>,
    observers: Arc<AtomicUsize>,
    forwarding: Finalizer<E>,
}

impl<E> MemoEntry<E> {
    fn counts_with(&self, observers: &Arc<AtomicUsize>) -> bool {
        Arc::ptr_eq(&self.observers, observers)
    }
}

impl<E> Clone for MemoEntry<E> {
    fn clone(&self) -> Self {
        Self {
            deferred: self.deferred.clone(),
            observers: Arc::clone(&self.observers),
            forwarding: self.forwarding.clone(),
        }
    }
}

/// A node this requester must build, plus the cell its teardown goes into.
struct Pending<E> {
    entry: MemoEntry<E>,
    teardown: Arc<Ref<Finalizer<E>>>,
}

enum Lookup<E> {
    Hit(MemoEntry<E>),
    Miss(Pending<E>),
}

/// Per-graph cache guaranteeing single construction and counted teardown.
///
/// Create one per top-level build; [`Layer::build`] does this for you.
/// Cloning produces another handle to the same cache.
pub struct MemoMap<E> {
    entries: Arc<Entries<E>>,
    strategy: ExecutionStrategy,
}

impl<E> Clone for MemoMap<E> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            strategy: self.strategy,
        }
    }
}

impl<E> fmt::Debug for MemoMap<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.entries.modify(|entries| entries.len());
        f.debug_struct("MemoMap")
            .field("cached", &cached)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl<E> MemoMap<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache that releases nodes sequentially.
    #[must_use]
    pub fn new() -> Self {
        Self::with_strategy(ExecutionStrategy::Sequential)
    }

    /// Creates an empty cache releasing each node's resources with
    /// `strategy`.
    #[must_use]
    pub fn with_strategy(strategy: ExecutionStrategy) -> Self {
        Self {
            entries: Arc::new(Ref::new(HashMap::new())),
            strategy,
        }
    }

    /// Creates an empty cache using the configured layer release strategy.
    #[must_use]
    pub fn from_config(config: &ScopeConfig) -> Self {
        Self::with_strategy(config.layer_release_strategy)
    }

    /// The strategy used when a node's inner release map is released.
    #[must_use]
    pub const fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// Number of cached nodes, including failed ones. Torn-down nodes are
    /// evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.modify(|entries| entries.len())
    }

    /// Returns true if nothing has been requested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `id` has an entry.
    #[must_use]
    pub fn contains(&self, id: LayerId) -> bool {
        self.entries.modify(|entries| entries.contains_key(&id))
    }

    /// Current observer count of the node cached under `id`.
    #[must_use]
    pub fn observers(&self, id: LayerId) -> Option<usize> {
        self.entries.modify(|entries| {
            entries
                .get(&id)
                .map(|entry| entry.observers.load(Ordering::Acquire))
        })
    }

    /// Returns the value of `layer`, building it at most once.
    ///
    /// On success the node's forwarding finalizer is registered in `outer`;
    /// the node's own resources are released once every requester's outer
    /// map has released it. Layers marked [`Layer::fresh`] are built anew
    /// and never cached.
    ///
    /// # Errors
    ///
    /// Returns the build failure, shared by every concurrent requester. The
    /// builder's copy has any failure of the partial cleanup appended with
    /// [`Cause::sequential`].
    pub async fn get_or_else_memoize<A>(
        &self,
        layer: &Layer<A, E>,
        outer: &ReleaseMap<E>,
        cx: &Cx,
    ) -> Exit<A, E>
    where
        A: Clone + Send + Sync + 'static,
    {
        let id = layer.id();
        if layer.is_fresh() {
            trace!(layer = %id, name = layer.label(), "building fresh layer");
            return self.build(layer, outer, cx, Self::pending()).await;
        }

        loop {
            let lookup = self.entries.modify(|entries| {
                if let Some(entry) = entries.get(&id) {
                    return Lookup::Hit(entry.clone());
                }
                let pending = Self::pending();
                entries.insert(id, pending.entry.clone());
                Lookup::Miss(pending)
            });

            match lookup {
                Lookup::Hit(entry) => {
                    debug!(layer = %id, name = layer.label(), "memo hit");
                    if let Some(exit) = self.observe(id, &entry, outer).await {
                        return exit;
                    }
                    debug!(layer = %id, name = layer.label(), "memo node torn down, rebuilding");
                }
                Lookup::Miss(pending) => {
                    debug!(layer = %id, name = layer.label(), "memo miss, building");
                    return self.build(layer, outer, cx, pending).await;
                }
            }
        }
    }

    fn pending() -> Pending<E> {
        let teardown = Arc::new(Ref::new(Finalizer::noop()));
        let current = Arc::clone(&teardown);
        let forwarding = Finalizer::new(move |exit| current.get().run(exit));
        Pending {
            entry: MemoEntry {
                deferred: Deferred::new(),
                observers: Arc::new(AtomicUsize::new(0)),
                forwarding,
            },
            teardown,
        }
    }

    /// Joins a cached node as one more observer.
    ///
    /// Returns `None` if the node was torn down, and evicted, before it
    /// could be joined.
    async fn observe<A>(
        &self,
        id: LayerId,
        entry: &MemoEntry<E>,
        outer: &ReleaseMap<E>,
    ) -> Option<Exit<A, E>>
    where
        A: Clone + Send + Sync + 'static,
    {
        let erased = match entry.deferred.wait().await {
            Ok(erased) => erased,
            Err(cause) => return Some(Err(cause)),
        };
        let value = match downcast::<A, E>(id, &erased) {
            Ok(value) => value,
            Err(cause) => return Some(Err(cause)),
        };
        let joined = self.entries.modify(|entries| match entries.get(&id) {
            Some(current) if current.counts_with(&entry.observers) => {
                entry.observers.fetch_add(1, Ordering::AcqRel);
                true
            }
            _ => false,
        });
        if !joined {
            return None;
        }
        Some(
            outer
                .add(entry.forwarding.clone())
                .await
                .map(|_| value),
        )
    }

    async fn build<A>(
        &self,
        layer: &Layer<A, E>,
        outer: &ReleaseMap<E>,
        cx: &Cx,
        pending: Pending<E>,
    ) -> Exit<A, E>
    where
        A: Clone + Send + Sync + 'static,
    {
        let id = layer.id();
        let Pending { entry, teardown } = pending;
        let inner = ReleaseMap::new();
        let strategy = self.strategy;
        let mut guard = AbandonGuard {
            id: layer.id(),
            fiber: cx.fiber_id(),
            deferred: entry.deferred.clone(),
            inner: inner.clone(),
            outer: outer.clone(),
            strategy,
            armed: true,
        };

        let exit = cx
            .uninterruptible_mask(|restore: Restore| async move {
                let ctx = LayerContext::new(self.clone(), inner.clone(), restore.cx());
                let built = match restore.cx().checkpoint::<E>() {
                    Ok(()) => layer.run(ctx).await,
                    Err(cause) => Err(cause),
                };

                match built {
                    Err(cause) => {
                        entry.deferred.fail(cause.clone());
                        debug!(layer = %layer.id(), failures = cause.size(), "layer build failed");
                        let cleanup = inner.release_all(Err(cause.clone()), strategy).await;
                        and_then_cause(Err(cause), cleanup)
                    }
                    Ok(value) => {
                        teardown.set(release_on_last_observer(
                            Arc::downgrade(&self.entries),
                            id,
                            Arc::clone(&entry.observers),
                            inner.clone(),
                            strategy,
                        ));
                        entry.observers.fetch_add(1, Ordering::AcqRel);
                        if let Err(cause) = outer.add(entry.forwarding.clone()).await {
                            entry.deferred.fail(cause.clone());
                            return Err(cause);
                        }
                        let erased: Erased = Arc::new(value.clone());
                        entry.deferred.succeed(erased);
                        trace!(layer = %layer.id(), "layer built");
                        Ok(value)
                    }
                }
            })
            .await;

        guard.armed = false;
        exit
    }
}

impl<E> Default for MemoMap<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Teardown that releases `inner` only when the last observer goes away.
///
/// The final decrement evicts the node counted by `observers` from the
/// cache in the same critical section that [`MemoMap::observe`] joins it in.
fn release_on_last_observer<E>(
    entries: Weak<Entries<E>>,
    id: LayerId,
    observers: Arc<AtomicUsize>,
    inner: ReleaseMap<E>,
    strategy: ExecutionStrategy,
) -> Finalizer<E>
where
    E: Clone + Send + Sync + 'static,
{
    Finalizer::new(move |exit| {
        let observers = Arc::clone(&observers);
        let entries = entries.clone();
        let inner = inner.clone();
        async move {
            let decrement = || {
                observers.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            };
            let previous = match entries.upgrade() {
                Some(entries) => entries.modify(|entries| {
                    let previous = decrement();
                    if previous == Ok(1)
                        && entries.get(&id).is_some_and(|current| current.counts_with(&observers))
                    {
                        entries.remove(&id);
                    }
                    previous
                }),
                None => decrement(),
            };
            if previous == Ok(1) {
                trace!(layer = %id, "last observer gone, releasing node");
                inner.release_all(exit, strategy).await
            } else {
                Ok(())
            }
        }
    })
}

fn downcast<A, E>(id: LayerId, erased: &Erased) -> Exit<A, E>
where
    A: Clone + Send + Sync + 'static,
{
    erased
        .downcast_ref::<A>()
        .cloned()
        .ok_or_else(|| Cause::die(Defect::from(Error::LayerTypeMismatch { layer: id })))
}

/// Fails waiters and hands off partial resources if a build is dropped.
struct AbandonGuard<E: Clone + Send + 'static> {
    #[cfg_attr(not(feature = "tracing-integration"), allow(dead_code))]
    id: LayerId,
    fiber: FiberId,
    deferred: Deferred<Erased, E>,
    inner: ReleaseMap<E>,
    outer: ReleaseMap<E>,
    strategy: ExecutionStrategy,
    armed: bool,
}

impl<E: Clone + Send + 'static> Drop for AbandonGuard<E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(layer = %self.id, "layer build abandoned before completion");
        self.deferred.fail(Cause::interrupt(self.fiber));
        let inner = self.inner.clone();
        let strategy = self.strategy;
        let handoff = Finalizer::new(move |exit| {
            let inner = inner.clone();
            async move { inner.release_all(exit, strategy).await }
        });
        if self.outer.try_add(handoff).is_none() {
            warn!(
                layer = %self.id,
                "outer scope already closed, abandoned build resources not released"
            );
        }
    }
}
