//! Identifier types for runtime entities.
//!
//! These types provide type-safe identifiers for the entities the scope
//! machinery talks about: fibers (logical units of concurrent work), layers
//! (builder-graph nodes), and finalizer registrations.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static FIBER_COUNTER: AtomicU64 = AtomicU64::new(1);
static LAYER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a logical unit of concurrent work.
///
/// Interruptions are attributed to the fiber that requested them, so every
/// [`Cause::Interrupt`](crate::Cause::Interrupt) node carries one of these.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FiberId(u64);

impl FiberId {
    /// The reserved "unknown fiber" identity.
    pub const NONE: Self = Self(0);

    /// Allocates a fresh, process-unique fiber identity.
    #[must_use]
    pub fn next() -> Self {
        Self(FIBER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a fiber ID with a fixed value for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true if this is [`FiberId::NONE`].
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FiberId({})", self.0)
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "F<none>")
        } else {
            write!(f, "F{}", self.0)
        }
    }
}

/// Identity of a builder-graph node.
///
/// Every call to a [`Layer`](crate::Layer) constructor or combinator
/// allocates a new identity; clones of a layer share it. The memo map caches
/// by this identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    /// Allocates a fresh layer identity.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(LAYER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({})", self.0)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Key of a finalizer registered in a [`ReleaseMap`](crate::ReleaseMap).
///
/// Keys are strictly increasing within one map and define release order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseKey(u64);

impl ReleaseKey {
    #[inline]
    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ReleaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReleaseKey({})", self.0)
    }
}
