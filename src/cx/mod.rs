//! Fiber context: identity, interruption, and uninterruptible sections.
//!
//! A [`Cx`] is threaded through every scope and layer operation. It names
//! the fiber doing the work, carries the shared interrupt flag, and tracks
//! whether the current section may observe interruption.
//!
//! # Interruption is cooperative
//!
//! [`Cx::interrupt`] only raises a flag. Work observes it at
//! [`Cx::checkpoint`], which fails with `Cause::Interrupt(by)` when an
//! interrupt has been requested and the context is not masked. Forked
//! contexts see interrupts raised on any ancestor.
//!
//! # Masking
//!
//! [`Cx::uninterruptible`] and [`Cx::uninterruptible_mask`] run a section
//! with the mask depth raised, so checkpoints inside it pass even when an
//! interrupt is pending. The request is not lost: it is observed at the
//! first checkpoint after the section ends.
//!
//! ```ignore
//! cx.uninterruptible_mask(|restore| async move {
//!     let key = registry.try_add(fin);          // never torn mid-way
//!     let value = build(restore.cx()).await;    // may observe interrupt
//!     publish(key, value)
//! })
//! .await
//! ```

use crate::cause::Cause;
use crate::tracing_compat::trace;
use crate::types::{Exit, FiberId};
use core::fmt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

/// Interrupt flag shared by a fiber and every context derived from it.
struct InterruptSignal {
    requested_by: Mutex<Option<FiberId>>,
    parent: Option<Arc<InterruptSignal>>,
}

impl InterruptSignal {
    fn root() -> Arc<Self> {
        Arc::new(Self {
            requested_by: Mutex::new(None),
            parent: None,
        })
    }

    fn child(parent: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            requested_by: Mutex::new(None),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// The first recorded interruptor, searching this signal then ancestors.
    fn requested_by(&self) -> Option<FiberId> {
        let mut current = Some(self);
        while let Some(signal) = current {
            if let Some(by) = *signal.requested_by.lock() {
                return Some(by);
            }
            current = signal.parent.as_deref();
        }
        None
    }

    fn request(&self, by: FiberId) -> bool {
        let mut slot = self.requested_by.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(by);
        true
    }
}

/// The context of one fiber of work.
///
/// Cloning is cheap; clones share the fiber identity, the interrupt flag,
/// and the mask depth at the time of cloning.
#[derive(Clone)]
pub struct Cx {
    fiber_id: FiberId,
    signal: Arc<InterruptSignal>,
    mask_depth: u32,
}

impl Cx {
    /// Creates a root context for a freshly allocated fiber.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fiber_id(FiberId::next())
    }

    /// Creates a root context for the given fiber.
    #[must_use]
    pub fn with_fiber_id(fiber_id: FiberId) -> Self {
        Self {
            fiber_id,
            signal: InterruptSignal::root(),
            mask_depth: 0,
        }
    }

    /// Creates a context for a child fiber.
    ///
    /// The child gets a fresh identity and its own interrupt flag; an
    /// interrupt on this context (or any ancestor) is also visible to the
    /// child. The child inherits the current mask depth.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            fiber_id: FiberId::next(),
            signal: InterruptSignal::child(&self.signal),
            mask_depth: self.mask_depth,
        }
    }

    /// The fiber this context belongs to.
    #[must_use]
    pub const fn fiber_id(&self) -> FiberId {
        self.fiber_id
    }

    /// Requests interruption of this fiber, attributed to itself.
    pub fn interrupt(&self) {
        self.interrupt_by(self.fiber_id);
    }

    /// Requests interruption of this fiber, attributed to `by`.
    ///
    /// Only the first request is recorded.
    pub fn interrupt_by(&self, by: FiberId) {
        if self.signal.request(by) {
            trace!(fiber = %self.fiber_id, by = %by, "interrupt requested");
        }
    }

    /// Returns true if this fiber or an ancestor has been interrupted.
    #[must_use]
    pub fn is_interrupt_requested(&self) -> bool {
        self.signal.requested_by().is_some()
    }

    /// The fiber that requested interruption, if any.
    #[must_use]
    pub fn interrupted_by(&self) -> Option<FiberId> {
        self.signal.requested_by()
    }

    /// Returns true if checkpoints in this context can observe interruption.
    #[must_use]
    pub const fn is_interruptible(&self) -> bool {
        self.mask_depth == 0
    }

    /// Observes a pending interrupt.
    ///
    /// Returns `Err(Cause::Interrupt(by))` if interruption was requested and
    /// the context is not masked, `Ok(())` otherwise.
    pub fn checkpoint<E>(&self) -> Exit<(), E> {
        if !self.is_interruptible() {
            return Ok(());
        }
        match self.signal.requested_by() {
            Some(by) => {
                trace!(fiber = %self.fiber_id, by = %by, "interrupt observed at checkpoint");
                Err(Cause::interrupt(by))
            }
            None => Ok(()),
        }
    }

    /// Current nesting depth of uninterruptible sections.
    #[must_use]
    pub const fn mask_depth(&self) -> u32 {
        self.mask_depth
    }

    fn masked(&self) -> Self {
        Self {
            fiber_id: self.fiber_id,
            signal: Arc::clone(&self.signal),
            mask_depth: self.mask_depth.saturating_add(1),
        }
    }

    /// Runs a section that cannot observe interruption.
    pub async fn uninterruptible<F, Fut>(&self, f: F) -> Fut::Output
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future,
    {
        f(self.masked()).await
    }

    /// Runs an uninterruptible section that can selectively re-enable
    /// interruption for parts of its work through [`Restore::cx`].
    pub async fn uninterruptible_mask<F, Fut>(&self, f: F) -> Fut::Output
    where
        F: FnOnce(Restore) -> Fut,
        Fut: Future,
    {
        let restore = Restore {
            outer: self.clone(),
            masked: self.masked(),
        };
        f(restore).await
    }
}

impl Default for Cx {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("fiber_id", &self.fiber_id)
            .field("mask_depth", &self.mask_depth)
            .field("interrupted_by", &self.interrupted_by())
            .finish()
    }
}

/// Handle given to the body of [`Cx::uninterruptible_mask`].
#[derive(Clone, Debug)]
pub struct Restore {
    outer: Cx,
    masked: Cx,
}

impl Restore {
    /// A context with the interruptibility from before the section.
    ///
    /// Work run with it observes interrupts exactly as it would have outside
    /// the section.
    #[must_use]
    pub fn cx(&self) -> Cx {
        self.outer.clone()
    }

    /// The masked context of the section itself.
    #[must_use]
    pub fn masked(&self) -> Cx {
        self.masked.clone()
    }

    /// Runs `f` with the interruptibility from before the section.
    pub async fn restore<F, Fut>(&self, f: F) -> Fut::Output
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future,
    {
        f(self.cx()).await
    }
}
