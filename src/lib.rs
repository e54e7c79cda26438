//! Layerscope: lossless failure causes, ordered finalizer registries, and
//! memoized resource graphs.
//!
//! # Overview
//!
//! Layerscope is the resource-safety core of a structured-concurrency
//! runtime. It answers three questions: what exactly went wrong, what must
//! be cleaned up and in which order, and how to build a graph of shared
//! resources so that each is acquired once and released once.
//!
//! # Core Guarantees
//!
//! - **No lost failures**: a [`Cause`] records every failure, defect, and
//!   interruption, composed sequentially or in parallel, without collapsing
//! - **At-most-once release**: every finalizer in a [`ReleaseMap`] runs at
//!   most once, in reverse registration order under sequential release
//! - **Nothing registered after close**: registering into a closed map runs
//!   the finalizer immediately instead of storing it
//! - **Single construction**: a [`MemoMap`] builds each layer at most once
//!   per graph; concurrent requesters all observe the same exit
//! - **Counted teardown**: a shared layer is released only after its last
//!   observer is
//!
//! # Module Structure
//!
//! - [`cause`]: The failure algebra, its folds, rendering, and reports
//! - [`scope`]: Finalizers, release maps, and scopes
//! - [`layer`]: Layers, their combinators, and the memo map
//! - [`cx`]: Fiber context with cooperative interruption and masking
//! - [`sync`]: The atomic cell and single-assignment primitives
//! - [`combinator`]: Bounded `join_all` used for parallel release
//! - [`types`]: Identifiers, defects, exits, and execution strategies
//! - [`config`]: Release strategy configuration from code, env, or TOML
//! - [`error`](mod@error): Errors synthesized by the crate itself
//! - [`tracing_compat`]: Optional tracing integration (requires
//!   `tracing-integration` feature)
//!
//! # Example
//!
//! ```
//! use layerscope::{Cause, Cx, Layer, Scope};
//! use futures_lite::future::block_on;
//!
//! let config: Layer<&str, String> = Layer::succeed("postgres://localhost");
//! let pool = config.map(|url| format!("pool({url})"));
//!
//! let scope = Scope::new();
//! let cx = Cx::new();
//! let built = block_on(pool.build(&scope, &cx));
//! assert_eq!(built, Ok("pool(postgres://localhost)".to_string()));
//! assert_eq!(block_on(scope.close(Ok(()))), Ok(()));
//!
//! let both = Cause::fail("a").both(Cause::fail("b"));
//! assert_eq!(both.failures(), vec![&"a", &"b"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::future_not_send)]

pub mod cause;
pub mod combinator;
pub mod config;
pub mod cx;
pub mod error;
pub mod layer;
pub mod scope;
pub mod sync;
pub mod tracing_compat;
pub mod types;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use cause::{Cause, CauseReducer, CauseReport};
pub use config::ScopeConfig;
pub use cx::{Cx, Restore};
pub use error::{Error, Result};
pub use layer::{Layer, LayerContext, MemoMap};
pub use scope::{Finalizer, ReleaseMap, Scope};
pub use sync::{Deferred, Ref};
pub use types::{Defect, ExecutionStrategy, Exit, FiberId, LayerId, ReleaseKey};
