//! Layers: nodes of a memoized resource-building graph.
//!
//! A [`Layer`] describes how to build a value, possibly acquiring resources
//! and depending on other layers. Building a graph goes through a
//! [`MemoMap`], which constructs each distinct layer at most once and tears
//! it down only after its last observer is released.
//!
//! ```ignore
//! let pool = Layer::scoped(open_pool, close_pool);
//! let users = pool.map(UserRepo::new);
//! let orders = pool.map(OrderRepo::new);
//!
//! // `pool` is opened once and closed once, after both repos.
//! let (users, orders) = users.zip_par(&orders).build(&scope, &cx).await?;
//! ```
//!
//! Identity is the layer handle: clones share a [`LayerId`] and are built
//! once, while every combinator returns a new node. [`Layer::fresh`] opts a
//! node out of memoization.

mod context;
mod memo_map;

pub use context::LayerContext;
pub use memo_map::MemoMap;

use crate::cause::Cause;
use crate::combinator::join_all;
use crate::config::ScopeConfig;
use crate::cx::Cx;
use crate::scope::Scope;
use crate::types::exit::collect_all_par;
use crate::types::{Defect, Exit, LayerId};
use core::fmt;
use futures_lite::FutureExt;
use futures_lite::future::{self, Boxed};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

type BuildFn<A, E> = dyn Fn(LayerContext<E>) -> Boxed<Exit<A, E>> + Send + Sync;

struct LayerNode<A, E> {
    id: LayerId,
    name: Option<Arc<str>>,
    fresh: bool,
    build: Arc<BuildFn<A, E>>,
}

/// A node of a resource-building graph producing an `A` or failing with `E`.
///
/// Cloning is cheap and preserves identity.
pub struct Layer<A, E> {
    node: Arc<LayerNode<A, E>>,
}

impl<A, E> Clone for Layer<A, E> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<A, E> fmt::Debug for Layer<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.node.id)
            .field("name", &self.node.name)
            .field("fresh", &self.node.fresh)
            .finish_non_exhaustive()
    }
}

impl<A, E> Layer<A, E> {
    /// The identity this layer is memoized under.
    #[must_use]
    pub fn id(&self) -> LayerId {
        self.node.id
    }

    /// The label given with [`Layer::named`], if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.node.name.as_deref()
    }

    /// Returns true if this layer bypasses memoization.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.node.fresh
    }

    #[cfg_attr(not(feature = "tracing-integration"), allow(dead_code))]
    pub(crate) fn label(&self) -> &str {
        self.name().unwrap_or("<anonymous>")
    }
}

impl<A, E> Layer<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a layer from an async build function.
    ///
    /// The function receives a [`LayerContext`] through which it resolves
    /// dependencies and registers resources.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(LayerContext<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exit<A, E>> + Send + 'static,
    {
        let build = move |ctx: LayerContext<E>| -> Boxed<Exit<A, E>> { Box::pin(f(ctx)) };
        Self {
            node: Arc::new(LayerNode {
                id: LayerId::next(),
                name: None,
                fresh: false,
                build: Arc::new(build),
            }),
        }
    }

    /// A layer that always produces `value`.
    pub fn succeed(value: A) -> Self {
        Self::from_fn(move |_| future::ready(Ok(value.clone())))
    }

    /// A layer that always fails with `error`.
    pub fn fail(error: E) -> Self {
        Self::fail_cause(Cause::fail(error))
    }

    /// A layer that always fails with `cause`.
    pub fn fail_cause(cause: Cause<E>) -> Self {
        Self::from_fn(move |_| future::ready(Err(cause.clone())))
    }

    /// A layer owning a resource: `acquire` runs uninterruptibly and
    /// `release` runs when the layer is torn down.
    pub fn scoped<Acq, AcqFut, Rel, RelFut>(acquire: Acq, release: Rel) -> Self
    where
        Acq: Fn(Cx) -> AcqFut + Send + Sync + 'static,
        AcqFut: Future<Output = Exit<A, E>> + Send + 'static,
        Rel: Fn(A, Exit<(), E>) -> RelFut + Send + Sync + 'static,
        RelFut: Future<Output = Exit<(), E>> + Send + 'static,
    {
        let acquire = Arc::new(acquire);
        let release = Arc::new(release);
        Self::from_fn(move |ctx: LayerContext<E>| {
            let acquire = Arc::clone(&acquire);
            let release = Arc::clone(&release);
            async move {
                ctx.acquire_release(
                    move |cx| acquire(cx),
                    move |value, exit| release(value, exit),
                )
                .await
            }
        })
    }

    /// Labels the layer for logs and reports. Identity is unchanged.
    #[must_use]
    pub fn named(self, name: impl Into<Arc<str>>) -> Self {
        Self {
            node: Arc::new(LayerNode {
                id: self.node.id,
                name: Some(name.into()),
                fresh: self.node.fresh,
                build: Arc::clone(&self.node.build),
            }),
        }
    }

    /// A copy of this layer that is built anew on every request.
    #[must_use]
    pub fn fresh(&self) -> Self {
        Self {
            node: Arc::new(LayerNode {
                id: LayerId::next(),
                name: self.node.name.clone(),
                fresh: true,
                build: Arc::clone(&self.node.build),
            }),
        }
    }

    /// Transforms the output.
    pub fn map<B, F>(&self, f: F) -> Layer<B, E>
    where
        B: Clone + Send + Sync + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Layer::from_fn(move |ctx: LayerContext<E>| {
            let source = source.clone();
            let f = Arc::clone(&f);
            async move { ctx.get(&source).await.map(&*f) }
        })
    }

    /// Builds the layer chosen from this layer's output.
    pub fn flat_map<B, F>(&self, f: F) -> Layer<B, E>
    where
        B: Clone + Send + Sync + 'static,
        F: Fn(A) -> Layer<B, E> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Layer::from_fn(move |ctx: LayerContext<E>| {
            let source = source.clone();
            let f = Arc::clone(&f);
            async move {
                let value = ctx.get(&source).await?;
                ctx.get(&f(value)).await
            }
        })
    }

    /// Continues with the layer chosen from this layer's outcome.
    pub fn fold<B, OnFailure, OnSuccess>(
        &self,
        on_failure: OnFailure,
        on_success: OnSuccess,
    ) -> Layer<B, E>
    where
        B: Clone + Send + Sync + 'static,
        OnFailure: Fn(Cause<E>) -> Layer<B, E> + Send + Sync + 'static,
        OnSuccess: Fn(A) -> Layer<B, E> + Send + Sync + 'static,
    {
        let source = self.clone();
        let on_failure = Arc::new(on_failure);
        let on_success = Arc::new(on_success);
        Layer::from_fn(move |ctx: LayerContext<E>| {
            let source = source.clone();
            let on_failure = Arc::clone(&on_failure);
            let on_success = Arc::clone(&on_success);
            async move {
                let next = match ctx.get(&source).await {
                    Ok(value) => on_success(value),
                    Err(cause) => on_failure(cause),
                };
                ctx.get(&next).await
            }
        })
    }

    /// Falls back to `that` when this layer fails with a typed failure.
    ///
    /// Defects and interruptions are not recovered.
    #[must_use]
    pub fn or_else(&self, that: &Self) -> Self {
        let source = self.clone();
        let fallback = that.clone();
        Self::from_fn(move |ctx: LayerContext<E>| {
            let source = source.clone();
            let fallback = fallback.clone();
            async move {
                match ctx.get(&source).await {
                    Ok(value) => Ok(value),
                    Err(cause) if cause.is_failure() => ctx.get(&fallback).await,
                    Err(cause) => Err(cause),
                }
            }
        })
    }

    /// Builds this layer, then `that`.
    pub fn zip<B>(&self, that: &Layer<B, E>) -> Layer<(A, B), E>
    where
        B: Clone + Send + Sync + 'static,
    {
        let left = self.clone();
        let right = that.clone();
        Layer::from_fn(move |ctx: LayerContext<E>| {
            let left = left.clone();
            let right = right.clone();
            async move {
                let a = ctx.get(&left).await?;
                let b = ctx.get(&right).await?;
                Ok::<_, Cause<E>>((a, b))
            }
        })
    }

    /// Builds this layer and `that` concurrently.
    ///
    /// Each side runs on a forked context. When one side fails the other
    /// side's context is interrupted; if both fail the causes are combined
    /// with [`Cause::parallel`].
    pub fn zip_par<B>(&self, that: &Layer<B, E>) -> Layer<(A, B), E>
    where
        B: Clone + Send + Sync + 'static,
    {
        let left = self.clone();
        let right = that.clone();
        Layer::from_fn(move |ctx: LayerContext<E>| {
            let left = left.clone();
            let right = right.clone();
            async move {
                let left_cx = ctx.cx().fork();
                let right_cx = ctx.cx().fork();
                let left_ctx = ctx.with_cx(left_cx.clone());
                let right_ctx = ctx.with_cx(right_cx.clone());
                let left_run = async {
                    let exit = left_ctx.get(&left).await;
                    if exit.is_err() {
                        right_cx.interrupt_by(left_cx.fiber_id());
                    }
                    exit
                };
                let right_run = async {
                    let exit = right_ctx.get(&right).await;
                    if exit.is_err() {
                        left_cx.interrupt_by(right_cx.fiber_id());
                    }
                    exit
                };
                match future::zip(left_run, right_run).await {
                    (Ok(a), Ok(b)) => Ok((a, b)),
                    (Err(cause), Ok(_)) | (Ok(_), Err(cause)) => Err(cause),
                    (Err(l), Err(r)) => Err(Cause::parallel(l, r)),
                }
            }
        })
    }

    /// Builds every layer in order, stopping at the first failure.
    pub fn all(layers: impl IntoIterator<Item = Self>) -> Layer<Vec<A>, E> {
        let layers: Arc<[Self]> = layers.into_iter().collect();
        Layer::from_fn(move |ctx: LayerContext<E>| {
            let layers = Arc::clone(&layers);
            async move {
                let mut values = Vec::with_capacity(layers.len());
                for layer in layers.iter() {
                    values.push(ctx.get(layer).await?);
                }
                Ok::<_, Cause<E>>(values)
            }
        })
    }

    /// Builds every layer concurrently, keeping every failure.
    ///
    /// Values are returned in input order. A failing layer interrupts the
    /// contexts of all the others.
    pub fn all_par(layers: impl IntoIterator<Item = Self>) -> Layer<Vec<A>, E> {
        let layers: Arc<[Self]> = layers.into_iter().collect();
        Layer::from_fn(move |ctx: LayerContext<E>| {
            let layers = Arc::clone(&layers);
            async move {
                let forks: Vec<Cx> = layers.iter().map(|_| ctx.cx().fork()).collect();
                let forks = &forks;
                let runs = layers.iter().enumerate().map(|(index, layer)| {
                    let branch = ctx.with_cx(forks[index].clone());
                    Box::pin(async move {
                        let exit = branch.get(layer).await;
                        if exit.is_err() {
                            let by = forks[index].fiber_id();
                            forks
                                .iter()
                                .enumerate()
                                .filter(|(other, _)| *other != index)
                                .for_each(|(_, sibling)| sibling.interrupt_by(by));
                        }
                        exit
                    })
                });
                collect_all_par(join_all(runs, None).await)
            }
        })
    }

    /// Builds this layer with a fresh [`MemoMap`], registering its teardown
    /// in `scope`.
    ///
    /// # Errors
    ///
    /// Returns the cause of the first failing node, with any cleanup
    /// failures appended.
    pub async fn build(&self, scope: &Scope<E>, cx: &Cx) -> Exit<A, E> {
        self.build_with_config(scope, cx, &ScopeConfig::default())
            .await
    }

    /// Like [`Layer::build`], releasing each node's resources with
    /// `config.layer_release_strategy`.
    ///
    /// # Errors
    ///
    /// Returns the cause of the first failing node.
    pub async fn build_with_config(
        &self,
        scope: &Scope<E>,
        cx: &Cx,
        config: &ScopeConfig,
    ) -> Exit<A, E> {
        let memo_map = MemoMap::from_config(config);
        memo_map
            .get_or_else_memoize(self, scope.release_map(), cx)
            .await
    }

    /// Runs the build function once, turning panics into `Die`.
    pub(crate) fn run(&self, ctx: LayerContext<E>) -> Boxed<Exit<A, E>> {
        let build = Arc::clone(&self.node.build);
        Box::pin(async move {
            let fut = match catch_unwind(AssertUnwindSafe(move || (*build)(ctx))) {
                Ok(fut) => fut,
                Err(payload) => return Err(Cause::die(Defect::from_panic(payload))),
            };
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(exit) => exit,
                Err(payload) => Err(Cause::die(Defect::from_panic(payload))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{event_log, run_test};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>, value: u32) -> Layer<u32, &'static str> {
        let counter = Arc::clone(counter);
        Layer::from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            future::ready(Ok(value))
        })
    }

    #[test]
    fn clones_share_identity_combinators_do_not() {
        let layer: Layer<u32, ()> = Layer::succeed(1);
        assert_eq!(layer.id(), layer.clone().id());
        assert_ne!(layer.id(), layer.map(|n| n + 1).id());
        assert_ne!(layer.id(), layer.fresh().id());
        assert!(layer.fresh().is_fresh());
    }

    #[test]
    fn named_keeps_identity() {
        let layer: Layer<u32, ()> = Layer::succeed(1);
        let id = layer.id();
        let named = layer.named("config");
        assert_eq!(named.id(), id);
        assert_eq!(named.name(), Some("config"));
        assert_eq!(named.label(), "config");
    }

    #[test]
    fn map_and_flat_map() {
        let scope: Scope<&str> = Scope::new();
        let cx = Cx::new();
        let base: Layer<u32, &str> = Layer::succeed(20);
        let doubled = base.map(|n| n * 2);
        let chained = doubled.flat_map(|n| Layer::succeed(n + 2));
        assert_eq!(run_test(|| chained.build(&scope, &cx)), Ok(42));
    }

    #[test]
    fn zip_shares_a_common_dependency() {
        let counter = Arc::new(AtomicUsize::new(0));
        let shared = counting(&counter, 5);
        let left = shared.map(|n| n + 1);
        let right = shared.map(|n| n + 2);
        let scope = Scope::new();
        let cx = Cx::new();
        let graph = left.zip(&right);
        let exit = run_test(|| graph.build(&scope, &cx));
        assert_eq!(exit, Ok((6, 7)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fresh_layer_builds_per_request() {
        let counter = Arc::new(AtomicUsize::new(0));
        let fresh = counting(&counter, 1).fresh();
        let scope = Scope::new();
        let cx = Cx::new();
        let graph = fresh.zip(&fresh);
        let exit = run_test(|| graph.build(&scope, &cx));
        assert_eq!(exit, Ok((1, 1)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn or_else_recovers_typed_failures_only() {
        let scope: Scope<&str> = Scope::new();
        let cx = Cx::new();
        let recovered = Layer::fail("down").or_else(&Layer::succeed(7_u32));
        assert_eq!(run_test(|| recovered.build(&scope, &cx)), Ok(7));

        let defect: Layer<u32, &str> = Layer::fail_cause(Cause::die_message("bug"));
        let not_recovered = defect.or_else(&Layer::succeed(7));
        let exit = run_test(|| not_recovered.build(&scope, &cx));
        assert!(exit.expect_err("defect propagates").is_die());
    }

    #[test]
    fn fold_routes_on_outcome() {
        let scope: Scope<&str> = Scope::new();
        let cx = Cx::new();
        let failing: Layer<u32, &str> = Layer::fail("missing");
        let folded = failing.fold(
            |cause| Layer::succeed(format!("failed: {}", cause.failures().len())),
            |n| Layer::succeed(format!("ok: {n}")),
        );
        assert_eq!(
            run_test(|| folded.build(&scope, &cx)),
            Ok("failed: 1".to_string())
        );
    }

    #[test]
    fn all_keeps_order_and_all_par_interrupts_siblings() {
        let scope: Scope<&str> = Scope::new();
        let cx = Cx::new();
        let ordered = Layer::all([Layer::succeed(1_u8), Layer::succeed(2), Layer::succeed(3)]);
        assert_eq!(run_test(|| ordered.build(&scope, &cx)), Ok(vec![1, 2, 3]));

        let failing = Layer::all_par([
            Layer::fail("a"),
            Layer::succeed(2_u8),
            Layer::fail("c"),
        ]);
        let cause = run_test(|| failing.build(&scope, &cx)).expect_err("first fails");
        assert_eq!(cause.failures(), vec![&"a"]);
        assert!(cause.is_interrupted());
        assert_eq!(cause.size(), 3);
    }

    #[test]
    fn panicking_build_becomes_die() {
        let scope: Scope<()> = Scope::new();
        let cx = Cx::new();
        let exploding: Layer<u8, ()> = Layer::from_fn(|_| async {
            let explode = true;
            if explode {
                panic!("build exploded");
            }
            Ok::<u8, Cause<()>>(0)
        });
        let cause = run_test(|| exploding.build(&scope, &cx)).expect_err("panic");
        assert_eq!(
            cause.first_defect().map(Defect::message_str),
            Some("panic: build exploded")
        );
    }

    #[test]
    fn scoped_layer_releases_with_scope() {
        let log = event_log();
        let acquire_log = Arc::clone(&log);
        let release_log = Arc::clone(&log);
        let resource: Layer<&'static str, ()> = Layer::scoped(
            move |_cx| {
                acquire_log.lock().push("acquire".to_string());
                future::ready(Ok("conn"))
            },
            move |value, _exit| {
                release_log.lock().push(format!("release {value}"));
                future::ready(Ok(()))
            },
        );
        let scope = Scope::new();
        let cx = Cx::new();
        run_test(|| async {
            assert_eq!(resource.build(&scope, &cx).await, Ok("conn"));
            assert_eq!(*log.lock(), vec!["acquire"]);
            scope.close(Ok(())).await.expect("close");
        });
        assert_eq!(*log.lock(), vec!["acquire", "release conn"]);
    }
}
