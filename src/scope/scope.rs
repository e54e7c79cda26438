//! Scope: a finalizer registry that knows how it will be closed.

use super::finalizer::Finalizer;
use super::release_map::ReleaseMap;
use crate::config::ScopeConfig;
use crate::cx::Cx;
use crate::tracing_compat::debug;
use crate::types::{ExecutionStrategy, Exit};
use std::future::Future;

/// An owning handle to a [`ReleaseMap`] plus the strategy used to close it.
///
/// Resources acquired in a scope are released together by
/// [`Scope::close`], in reverse acquisition order under the default
/// sequential strategy.
#[derive(Debug)]
pub struct Scope<E> {
    release_map: ReleaseMap<E>,
    strategy: ExecutionStrategy,
}

impl<E> Clone for Scope<E> {
    fn clone(&self) -> Self {
        Self {
            release_map: self.release_map.clone(),
            strategy: self.strategy,
        }
    }
}

impl<E: Clone + Send + 'static> Scope<E> {
    /// Creates an open scope that closes sequentially.
    #[must_use]
    pub fn new() -> Self {
        Self::with_strategy(ExecutionStrategy::Sequential)
    }

    /// Creates an open scope that closes with `strategy`.
    #[must_use]
    pub fn with_strategy(strategy: ExecutionStrategy) -> Self {
        Self {
            release_map: ReleaseMap::new(),
            strategy,
        }
    }

    /// Creates an open scope using the configured release strategy.
    #[must_use]
    pub fn from_config(config: &ScopeConfig) -> Self {
        Self::with_strategy(config.release_strategy)
    }

    /// The strategy used by [`Scope::close`].
    #[must_use]
    pub const fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// The underlying registry.
    #[must_use]
    pub const fn release_map(&self) -> &ReleaseMap<E> {
        &self.release_map
    }

    /// Registers a finalizer, returning a handle that releases it early.
    ///
    /// # Errors
    ///
    /// If the scope is already closed the finalizer runs immediately and its
    /// failure is returned.
    pub async fn add_finalizer(&self, finalizer: Finalizer<E>) -> Exit<Finalizer<E>, E> {
        self.release_map.add(finalizer).await
    }

    /// Acquires a resource and registers its release in this scope.
    ///
    /// See [`ReleaseMap::acquire_release`].
    ///
    /// # Errors
    ///
    /// Returns the acquisition failure.
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
        self.release_map.acquire_release(cx, acquire, release).await
    }

    /// Creates a child scope whose closing is registered in this one.
    ///
    /// The child may be closed on its own, which also unregisters it from
    /// this scope; otherwise it closes, with this scope's exit, when this
    /// scope does. Forking a closed scope yields a closed child.
    ///
    /// # Errors
    ///
    /// Returns the failure of closing the child immediately when this scope
    /// was already closed.
    pub async fn fork(&self) -> Exit<Self, E> {
        let child = Self::with_strategy(self.strategy);
        let child_map = child.release_map.clone();
        let strategy = self.strategy;
        let key = self
            .release_map
            .add_if_open(Finalizer::new(move |exit| {
                let child_map = child_map.clone();
                async move { child_map.release_all(exit, strategy).await }
            }))
            .await?;
        if let Some(key) = key {
            child.release_map.try_add(self.release_map.remover(key));
        }
        Ok(child)
    }

    /// Closes the scope, releasing every registered resource.
    ///
    /// # Errors
    ///
    /// Returns every finalizer failure, combined in parallel.
    pub async fn close(&self, exit: Exit<(), E>) -> Exit<(), E> {
        debug!(strategy = %self.strategy, "closing scope");
        self.release_map.release_all(exit, self.strategy).await
    }

    /// Returns true once the scope has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.release_map.is_exited()
    }
}

impl<E: Clone + Send + 'static> Default for Scope<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cause::Cause;
    use crate::test_utils::{event_log, init_test_logging, recording_finalizer, run_test};
    use std::sync::Arc;

    #[test]
    fn acquire_release_registers_release() {
        init_test_logging();
        crate::test_phase!("acquire_release_registers_release");
        let log = event_log();
        let scope: Scope<()> = Scope::new();
        let cx = Cx::new();
        let release_log = Arc::clone(&log);
        let value = run_test(|| async {
            let value = scope
                .acquire_release(
                    &cx,
                    |masked| async move {
                        assert!(!masked.is_interruptible());
                        Ok::<_, Cause<()>>(42_u32)
                    },
                    move |n, _exit| {
                        let log = Arc::clone(&release_log);
                        async move {
                            log.lock().push(format!("release {n}"));
                            Ok(())
                        }
                    },
                )
                .await
                .expect("acquire");
            scope.close(Ok(())).await.expect("close");
            value
        });
        assert_eq!(value, 42);
        assert_eq!(*log.lock(), vec!["release 42"]);
        assert!(scope.is_closed());
        crate::test_complete!("acquire_release_registers_release");
    }

    #[test]
    fn failed_acquire_registers_nothing() {
        let scope: Scope<&str> = Scope::new();
        let cx = Cx::new();
        let exit = run_test(|| {
            scope.acquire_release(
                &cx,
                |_| async { Err::<u8, _>(Cause::fail("refused")) },
                |_, _| async { Ok(()) },
            )
        });
        assert_eq!(exit, Err(Cause::fail("refused")));
        assert!(scope.release_map().is_empty());
    }

    #[test]
    fn interrupt_during_acquire_is_deferred() {
        let scope: Scope<()> = Scope::new();
        let cx = Cx::new();
        let exit = run_test(|| {
            scope.acquire_release(
                &cx,
                |masked| async move {
                    masked.interrupt();
                    masked.checkpoint::<()>()?;
                    Ok::<_, Cause<()>>("acquired")
                },
                |_, _| async { Ok(()) },
            )
        });
        assert_eq!(exit, Ok("acquired"));
        assert_eq!(scope.release_map().len(), 1);
        assert!(cx.checkpoint::<()>().is_err());
    }

    #[test]
    fn child_scope_closes_with_parent() {
        let log = event_log();
        let parent: Scope<()> = Scope::new();
        run_test(|| async {
            parent
                .add_finalizer(recording_finalizer(&log, "parent"))
                .await
                .expect("add");
            let child = parent.fork().await.expect("fork");
            child
                .add_finalizer(recording_finalizer(&log, "child"))
                .await
                .expect("add");
            parent.close(Ok(())).await.expect("close");
            assert!(child.is_closed());
        });
        assert_eq!(*log.lock(), vec!["child", "parent"]);
    }

    #[test]
    fn closed_children_unregister_from_parent() {
        let log = event_log();
        let parent: Scope<()> = Scope::new();
        run_test(|| async {
            for _ in 0..1000 {
                let child = parent.fork().await.expect("fork");
                child.close(Ok(())).await.expect("close child");
            }
            assert_eq!(parent.release_map().len(), 0);

            let open = parent.fork().await.expect("fork");
            open.add_finalizer(recording_finalizer(&log, "open child"))
                .await
                .expect("add");
            assert_eq!(parent.release_map().len(), 1);
            parent.close(Ok(())).await.expect("close parent");
            assert!(open.is_closed());
        });
        assert_eq!(*log.lock(), vec!["open child"]);
    }

    #[test]
    fn fork_of_closed_scope_is_closed() {
        let parent: Scope<()> = Scope::new();
        run_test(|| async {
            parent.close(Ok(())).await.expect("close");
            let child = parent.fork().await.expect("fork");
            assert!(child.is_closed());
        });
    }

    #[test]
    fn from_config_uses_release_strategy() {
        let config = ScopeConfig {
            release_strategy: ExecutionStrategy::Parallel,
            ..ScopeConfig::default()
        };
        let scope: Scope<()> = Scope::from_config(&config);
        assert_eq!(scope.strategy(), ExecutionStrategy::Parallel);
    }
}
