//! Core types shared by the cause, scope, and layer subsystems.
//!
//! - [`id`]: Identifier types (`FiberId`, `LayerId`, `ReleaseKey`)
//! - [`defect`]: Untyped defect payloads
//! - [`exit`]: `Exit<A, E>` and helpers for combining exits
//! - [`strategy`]: Finalizer execution strategy

pub mod defect;
pub mod exit;
pub mod id;
pub mod strategy;

pub use defect::Defect;
pub use exit::Exit;
pub use id::{FiberId, LayerId, ReleaseKey};
pub use strategy::ExecutionStrategy;
