//! Shared-state primitives used by the scope and layer machinery.
//!
//! - [`Ref`]: Atomic cell updated by synchronous closures
//! - [`Deferred`]: Single-assignment exit that many tasks can await
//!
//! # Lock discipline
//!
//! Neither primitive holds a lock across a suspension point. `Ref::modify`
//! takes a synchronous closure; `Deferred` only locks to publish a value or
//! register a waker.

mod cell;
mod deferred;

pub use cell::Ref;
pub use deferred::{Deferred, Wait};
