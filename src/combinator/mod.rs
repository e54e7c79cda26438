//! Combinators for driving groups of futures.
//!
//! - [`join`]: Run many futures concurrently, waiting for all, with an
//!   optional concurrency limit

pub mod join;

pub use join::{JoinAll, join_all};
