//! Error types for layerscope.
//!
//! Runtime failures of user computations travel as [`Cause`](crate::Cause)
//! values; the [`Error`] enum here covers the failures the crate itself
//! synthesizes:
//!
//! - **Interruption**: `Cause::squash` on an interrupt-only cause
//! - **Unknown**: `Cause::squash` on a cause with nothing in it
//! - **Layers**: a memoized value whose type does not match its layer
//! - **Configuration**: unparseable configuration values

use crate::types::{FiberId, LayerId};
use thiserror::Error;

/// Errors synthesized by the crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The computation was interrupted by the listed fibers.
    #[error("interrupted by fibers {}", render_fibers(.fibers))]
    Interrupted {
        /// Fibers that requested the interruption, in encounter order.
        fibers: Vec<FiberId>,
    },

    /// A failure with no recorded reason.
    #[error("unknown error: cause contained no failure, defect, or interruption")]
    Unknown,

    /// A memoized layer value could not be viewed as the layer's output type.
    #[error("memoized value for layer {layer} has an unexpected type")]
    LayerTypeMismatch {
        /// The layer whose cached value was inconsistent.
        layer: LayerId,
    },

    /// An invalid configuration value.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the problem.
        message: String,
    },
}

impl Error {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is an interruption.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

fn render_fibers(fibers: &[FiberId]) -> String {
    if fibers.is_empty() {
        return "<none>".to_string();
    }
    fibers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A specialized `Result` type for layerscope operations.
pub type Result<T> = core::result::Result<T, Error>;
