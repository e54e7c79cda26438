//! Finalizers: shared cleanup actions that receive the scope's exit.

use crate::cause::Cause;
use crate::types::{Defect, Exit};
use core::fmt;
use futures_lite::FutureExt;
use futures_lite::future::Boxed;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

type FinalizerFn<E> = dyn Fn(Exit<(), E>) -> Boxed<Exit<(), E>> + Send + Sync;

/// A cleanup action run when a resource is released.
///
/// The finalizer receives the exit of the scope it was registered in, so it
/// can behave differently on success, failure, or interruption. Cloning
/// shares the same action.
///
/// A finalizer that panics, either while being called or while its future
/// is polled, completes with a `Die` cause carrying the panic message.
pub struct Finalizer<E> {
    run: Arc<FinalizerFn<E>>,
}

impl<E: Send + 'static> Finalizer<E> {
    /// Creates a finalizer from an async function of the exit.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Exit<(), E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exit<(), E>> + Send + 'static,
    {
        Self {
            run: Arc::new(move |exit: Exit<(), E>| -> Boxed<Exit<(), E>> { Box::pin(f(exit)) }),
        }
    }

    /// Creates a finalizer from a synchronous function of the exit.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Exit<(), E>) -> Exit<(), E> + Send + Sync + 'static,
    {
        Self::new(move |exit| std::future::ready(f(exit)))
    }

    /// A finalizer that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::from_fn(|_| Ok(()))
    }

    /// Runs the finalizer against `exit`.
    ///
    /// The returned future owns everything it needs, so it can be collected
    /// and driven after the registry lock is released.
    #[must_use]
    pub fn run(&self, exit: Exit<(), E>) -> Boxed<Exit<(), E>> {
        let run = Arc::clone(&self.run);
        Box::pin(async move {
            let fut = match catch_unwind(AssertUnwindSafe(move || (*run)(exit))) {
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

impl<E> Finalizer<E> {
    /// Returns true if both handles share the same action.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.run, &other.run)
    }
}

impl<E> Clone for Finalizer<E> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
        }
    }
}

impl<E> fmt::Debug for Finalizer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finalizer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn receives_exit() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let fin: Finalizer<&str> = Finalizer::from_fn(move |exit| {
            if exit.is_err() {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });
        assert_eq!(block_on(fin.run(Ok(()))), Ok(()));
        assert_eq!(block_on(fin.run(Err(Cause::fail("e")))), Ok(()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn async_finalizer_failure_propagates() {
        let fin: Finalizer<&str> = Finalizer::new(|_| async { Err(Cause::fail("close failed")) });
        assert_eq!(block_on(fin.run(Ok(()))), Err(Cause::fail("close failed")));
    }

    #[test]
    fn panic_while_calling_becomes_die() {
        let fin: Finalizer<()> = Finalizer::from_fn(|_| panic!("finalizer exploded"));
        let exit = block_on(fin.run(Ok(())));
        let cause = exit.expect_err("panic should fail");
        assert!(cause.is_die());
        assert_eq!(
            cause.first_defect().map(Defect::message_str),
            Some("panic: finalizer exploded")
        );
    }

    #[test]
    fn panic_while_polling_becomes_die() {
        let fin: Finalizer<()> = Finalizer::new(|_| async {
            futures_lite::future::yield_now().await;
            let explode = true;
            if explode {
                panic!("late panic");
            }
            Ok(())
        });
        let cause = block_on(fin.run(Ok(()))).expect_err("panic should fail");
        assert!(cause.is_die());
    }

    #[test]
    fn noop_succeeds_and_clones_share() {
        let fin: Finalizer<()> = Finalizer::noop();
        assert_eq!(block_on(fin.run(Err(Cause::die_message("x")))), Ok(()));
        assert!(fin.ptr_eq(&fin.clone()));
        assert!(!fin.ptr_eq(&Finalizer::noop()));
    }
}
