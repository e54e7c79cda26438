//! Finalizer registries and scopes.
//!
//! - [`ReleaseMap`]: Ordered registry of finalizers, released at most once
//! - [`Scope`]: A release map plus the strategy used to close it
//! - [`Finalizer`]: A shared cleanup action receiving the scope's exit
//!
//! # Lifecycle
//!
//! ```text
//! Running { next_key, finalizers } ──release_all(exit)──▶ Exited { exit }
//! ```
//!
//! Registration after the transition never stores anything: the finalizer
//! runs immediately against the stored exit.

mod finalizer;
mod release_map;
#[allow(clippy::module_inception)]
mod scope;

pub use finalizer::Finalizer;
pub use release_map::ReleaseMap;
pub use scope::Scope;
