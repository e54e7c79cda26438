//! Human- and machine-readable renderings of a cause.

use super::{Cause, CauseReducer};
use crate::types::{Defect, FiberId};
use core::fmt;
use serde::Serialize;

/// Renders the tree on one line.
struct InlineRenderer;

impl<E: fmt::Display> CauseReducer<(), E, String> for InlineRenderer {
    fn empty_case(&mut self, _: &()) -> String {
        "Empty".to_string()
    }

    fn fail_case(&mut self, _: &(), error: &E) -> String {
        format!("Fail({error})")
    }

    fn die_case(&mut self, _: &(), defect: &Defect) -> String {
        format!("Die({defect})")
    }

    fn interrupt_case(&mut self, _: &(), fiber_id: FiberId) -> String {
        format!("Interrupt({fiber_id})")
    }

    fn sequential_case(&mut self, _: &(), left: String, right: String) -> String {
        format!("({left} ; {right})")
    }

    fn parallel_case(&mut self, _: &(), left: String, right: String) -> String {
        format!("({left} | {right})")
    }
}

impl<E: fmt::Display> fmt::Display for Cause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reduce_with_context(&(), &mut InlineRenderer))
    }
}

impl<E: fmt::Display> Cause<E> {
    /// Renders the cause as an indented tree, one node per line.
    ///
    /// ```text
    /// Sequential
    /// ├─ Fail(timeout)
    /// └─ Parallel
    ///    ├─ Die(panic: lost connection)
    ///    └─ Interrupt(F4)
    /// ```
    #[must_use]
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.pretty_into(&mut out, "", "");
        out
    }

    fn pretty_into(&self, out: &mut String, lead: &str, indent: &str) {
        out.push_str(lead);
        match self {
            Self::Empty => out.push_str("Empty\n"),
            Self::Fail(e) => {
                out.push_str(&format!("Fail({e})\n"));
            }
            Self::Die(d) => {
                out.push_str(&format!("Die({d})\n"));
            }
            Self::Interrupt(id) => {
                out.push_str(&format!("Interrupt({id})\n"));
            }
            Self::Sequential(l, r) | Self::Parallel(l, r) => {
                let label = if matches!(self, Self::Sequential(_, _)) {
                    "Sequential\n"
                } else {
                    "Parallel\n"
                };
                out.push_str(label);
                l.pretty_into(out, &format!("{indent}├─ "), &format!("{indent}│  "));
                r.pretty_into(out, &format!("{indent}└─ "), &format!("{indent}   "));
            }
        }
    }
}

/// A serializable summary of a cause, for logs and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CauseReport {
    /// Rendered typed failures, in encounter order.
    pub failures: Vec<String>,
    /// Rendered defect messages, in encounter order.
    pub defects: Vec<String>,
    /// Interrupting fibers, without duplicates.
    pub interruptors: Vec<FiberId>,
    /// Whether the cause holds only interruptions.
    pub interrupted_only: bool,
    /// One-line rendering of the whole tree.
    pub rendered: String,
}

impl CauseReport {
    /// Builds a report from a cause.
    #[must_use]
    pub fn from_cause<E: fmt::Display>(cause: &Cause<E>) -> Self {
        Self {
            failures: cause.failures().iter().map(ToString::to_string).collect(),
            defects: cause
                .defects()
                .iter()
                .map(|d| d.message_str().to_string())
                .collect(),
            interruptors: cause.interruptors(),
            interrupted_only: cause.is_interrupted_only(),
            rendered: cause.to_string(),
        }
    }

    /// Serializes the report as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<E: fmt::Display> From<&Cause<E>> for CauseReport {
    fn from(cause: &Cause<E>) -> Self {
        Self::from_cause(cause)
    }
}
