//! Untyped defect payloads.
//!
//! A defect is a failure nobody planned for: an invariant violation, a panic
//! inside a finalizer, a type confusion in a cache. Defects carry an opaque
//! payload that can be downcast by code that knows what to look for, plus a
//! rendered message for everyone else.

use core::fmt;
use std::any::Any;
use std::sync::Arc;

/// An unanticipated, untyped failure payload.
///
/// Cloning a defect is cheap and preserves identity: two defects compare
/// equal only when they share the same allocation.
#[derive(Clone)]
pub struct Defect {
    payload: Arc<dyn Any + Send + Sync>,
    message: Arc<str>,
}

impl Defect {
    /// Wraps an arbitrary displayable payload.
    #[must_use]
    pub fn new<T>(payload: T) -> Self
    where
        T: Any + Send + Sync + fmt::Display,
    {
        let message: Arc<str> = Arc::from(payload.to_string());
        Self {
            payload: Arc::new(payload),
            message,
        }
    }

    /// Creates a defect that only carries a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            message: Arc::from(message.as_str()),
            payload: Arc::new(message),
        }
    }

    /// Converts a caught panic payload into a defect.
    ///
    /// Panic payloads are not `Sync`, so only the message survives; it is
    /// stored as a `String` payload.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::message(format!("panic: {message}"))
    }

    /// Returns the rendered message.
    #[must_use]
    pub fn message_str(&self) -> &str {
        &self.message
    }

    /// Attempts to view the payload as a concrete type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Returns true if the payload is of type `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Returns true if both defects share the same payload allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl PartialEq for Defect {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Defect {}

impl fmt::Debug for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Defect").field(&&*self.message).finish()
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<crate::error::Error> for Defect {
    fn from(error: crate::error::Error) -> Self {
        Self::new(error)
    }
}
