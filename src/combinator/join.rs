//! Join combinator: drive many futures to completion within one task.
//!
//! [`join_all`] polls every future from the task that awaits it, so no
//! executor or spawning is needed. All futures always run to completion;
//! results come back in input order regardless of completion order.
//!
//! # Bounded concurrency
//!
//! With a limit of `n`, at most `n` futures are in flight at any time. The
//! next queued future starts as soon as a slot frees up, in input order.
//! A limit of one degenerates to sequential execution.

use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future for the [`join_all`] combinator.
#[must_use = "futures do nothing unless polled"]
pub struct JoinAll<F: Future> {
    queued: VecDeque<(usize, F)>,
    in_flight: Vec<(usize, F)>,
    results: Vec<Option<F::Output>>,
    limit: Option<NonZeroUsize>,
}

/// Runs every future concurrently with at most `limit` in flight.
///
/// `None` means unbounded.
pub fn join_all<I>(futures: I, limit: Option<NonZeroUsize>) -> JoinAll<I::Item>
where
    I: IntoIterator,
    I::Item: Future + Unpin,
{
    let queued: VecDeque<(usize, I::Item)> = futures.into_iter().enumerate().collect();
    let mut results = Vec::with_capacity(queued.len());
    results.resize_with(queued.len(), || None);
    JoinAll {
        queued,
        in_flight: Vec::new(),
        results,
        limit,
    }
}

// Futures are only polled through `Pin::new`, never pinned structurally.
impl<F: Future> Unpin for JoinAll<F> {}

impl<F: Future> JoinAll<F> {
    fn fill_slots(&mut self) -> bool {
        let capacity = self.limit.map_or(usize::MAX, NonZeroUsize::get);
        let mut started = false;
        while self.in_flight.len() < capacity {
            let Some(next) = self.queued.pop_front() else {
                break;
            };
            self.in_flight.push(next);
            started = true;
        }
        started
    }
}

impl<F: Future + Unpin> Future for JoinAll<F> {
    type Output = Vec<F::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        this.fill_slots();
        loop {
            let mut i = 0;
            while i < this.in_flight.len() {
                let (index, fut) = &mut this.in_flight[i];
                if let Poll::Ready(output) = Pin::new(fut).poll(cx) {
                    this.results[*index] = Some(output);
                    this.in_flight.swap_remove(i);
                } else {
                    i += 1;
                }
            }
            // Newly started futures must be polled once to register wakers.
            if !this.fill_slots() {
                break;
            }
        }

        if this.in_flight.is_empty() && this.queued.is_empty() {
            let results = std::mem::take(&mut this.results);
            Poll::Ready(results.into_iter().flatten().collect())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::{self, block_on};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn results_in_input_order() {
        let futs: Vec<future::Boxed<usize>> = (0..5)
            .map(|i: usize| {
                Box::pin(async move {
                    for _ in 0..(5 - i) {
                        future::yield_now().await;
                    }
                    i
                }) as future::Boxed<usize>
            })
            .collect();
        assert_eq!(block_on(join_all(futs, None)), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn respects_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let futs: Vec<future::Boxed<()>> = (0..6)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                Box::pin(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    future::yield_now().await;
                    future::yield_now().await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }) as future::Boxed<()>
            })
            .collect();
        block_on(join_all(futs, NonZeroUsize::new(2)));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_input_completes() {
        let futs: Vec<future::Boxed<u8>> = Vec::new();
        assert!(block_on(join_all(futs, None)).is_empty());
    }
}
