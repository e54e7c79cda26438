//! Execution strategy for running a batch of finalizers.

use crate::error::Error;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::str::FromStr;

/// How [`ReleaseMap::release_all`](crate::ReleaseMap::release_all) runs the
/// finalizers it collected.
///
/// Whatever the strategy, every finalizer is attempted and every failure is
/// kept in the combined cause.
///
/// Serialized as its display string (`"sequential"`, `"parallel"`,
/// `"parallel:N"`), the same form accepted from env and TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExecutionStrategy {
    /// One at a time, in reverse registration order.
    #[default]
    Sequential,
    /// All at once, in no particular order.
    Parallel,
    /// Concurrently, with at most `n` finalizers in flight.
    ParallelN(NonZeroUsize),
}

impl ExecutionStrategy {
    /// Returns the concurrency bound, `None` meaning unbounded.
    ///
    /// `Sequential` is a bound of one.
    #[must_use]
    pub const fn concurrency_limit(self) -> Option<NonZeroUsize> {
        match self {
            Self::Sequential => Some(NonZeroUsize::MIN),
            Self::Parallel => None,
            Self::ParallelN(n) => Some(n),
        }
    }

    /// Returns true for [`ExecutionStrategy::Sequential`].
    #[must_use]
    pub const fn is_sequential(self) -> bool {
        matches!(self, Self::Sequential)
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::ParallelN(n) => write!(f, "parallel:{n}"),
        }
    }
}

impl FromStr for ExecutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "sequential" | "seq" => return Ok(Self::Sequential),
            "parallel" | "par" => return Ok(Self::Parallel),
            _ => {}
        }
        let Some((head, bound)) = trimmed.split_once(':') else {
            return Err(Error::config(format!(
                "unknown execution strategy {trimmed:?}; expected sequential, parallel, or parallel:N"
            )));
        };
        if !head.trim().eq_ignore_ascii_case("parallel") {
            return Err(Error::config(format!(
                "unknown execution strategy {trimmed:?}; expected sequential, parallel, or parallel:N"
            )));
        }
        let n = bound.trim().parse::<NonZeroUsize>().map_err(|e| {
            Error::config(format!(
                "invalid parallelism bound in {trimmed:?}: expected positive integer ({e})"
            ))
        })?;
        Ok(Self::ParallelN(n))
    }
}

impl TryFrom<String> for ExecutionStrategy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExecutionStrategy> for String {
    fn from(strategy: ExecutionStrategy) -> Self {
        strategy.to_string()
    }
}
