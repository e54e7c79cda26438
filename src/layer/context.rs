//! The context handed to a layer's build function.

use super::Layer;
use super::memo_map::MemoMap;
use crate::cx::Cx;
use crate::scope::ReleaseMap;
use crate::types::Exit;
use std::future::Future;

/// What a layer sees while it is being built.
///
/// Dependencies resolved through [`LayerContext::get`] go through the same
/// [`MemoMap`] and register their teardown in this node's own release map,
/// so a node is always torn down before the nodes it depends on.
pub struct LayerContext<E> {
    memo_map: MemoMap<E>,
    scope: ReleaseMap<E>,
    cx: Cx,
}

impl<E> Clone for LayerContext<E> {
    fn clone(&self) -> Self {
        Self {
            memo_map: self.memo_map.clone(),
            scope: self.scope.clone(),
            cx: self.cx.clone(),
        }
    }
}

impl<E> std::fmt::Debug for LayerContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerContext")
            .field("cx", &self.cx)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl<E> LayerContext<E>
where
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(memo_map: MemoMap<E>, scope: ReleaseMap<E>, cx: Cx) -> Self {
        Self {
            memo_map,
            scope,
            cx,
        }
    }

    /// The same context running on another fiber context.
    pub(crate) fn with_cx(&self, cx: Cx) -> Self {
        Self {
            memo_map: self.memo_map.clone(),
            scope: self.scope.clone(),
            cx,
        }
    }

    /// Resolves a dependency, building it if no other node has.
    ///
    /// # Errors
    ///
    /// Returns the dependency's build failure.
    pub async fn get<A>(&self, layer: &Layer<A, E>) -> Exit<A, E>
    where
        A: Clone + Send + Sync + 'static,
    {
        self.memo_map
            .get_or_else_memoize(layer, &self.scope, &self.cx)
            .await
    }

    /// The release map owned by the node being built.
    #[must_use]
    pub fn scope(&self) -> &ReleaseMap<E> {
        &self.scope
    }

    /// The fiber context of the build.
    #[must_use]
    pub fn cx(&self) -> &Cx {
        &self.cx
    }

    /// The memo map the graph is being built with.
    #[must_use]
    pub fn memo_map(&self) -> &MemoMap<E> {
        &self.memo_map
    }

    /// Acquires a resource owned by the node being built.
    ///
    /// # Errors
    ///
    /// Returns the acquisition failure.
    pub async fn acquire_release<A, Acq, AcqFut, Rel, RelFut>(
        &self,
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
        self.scope.acquire_release(&self.cx, acquire, release).await
    }
}
