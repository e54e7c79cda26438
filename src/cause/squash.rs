//! Reducing a cause to its single most important failure.

use super::Cause;
use crate::error::Error;
use crate::types::Defect;
use core::fmt;

impl<E> Cause<E> {
    /// Squashes the cause into one defect, converting typed failures with `f`.
    ///
    /// Priority: the first typed failure, else the first defect, else an
    /// [`Error::Interrupted`] naming every interruptor, else
    /// [`Error::Unknown`].
    pub fn squash_with(&self, f: impl FnOnce(&E) -> Defect) -> Defect {
        if let Some(error) = self.first_failure() {
            return f(error);
        }
        if let Some(defect) = self.first_defect() {
            return defect.clone();
        }
        let fibers = self.interruptors();
        if !fibers.is_empty() {
            return Defect::from(Error::Interrupted { fibers });
        }
        Defect::from(Error::Unknown)
    }

    /// Squashes the cause into one defect, wrapping typed failures as-is.
    #[must_use]
    pub fn squash(&self) -> Defect
    where
        E: Clone + fmt::Display + Send + Sync + 'static,
    {
        self.squash_with(|error| Defect::new(error.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FiberId;

    #[test]
    fn failure_wins_over_defect() {
        let cause: Cause<String> = Cause::parallel(
            Cause::die_message("defect"),
            Cause::fail("typed".to_string()),
        );
        let squashed = cause.squash();
        assert_eq!(
            squashed.downcast_ref::<String>().map(String::as_str),
            Some("typed")
        );
    }

    #[test]
    fn squash_with_transforms_failure() {
        let cause: Cause<i32> = Cause::fail(404);
        let squashed = cause.squash_with(|code| Defect::message(format!("http {code}")));
        assert_eq!(squashed.message_str(), "http 404");
    }

    #[test]
    fn defect_wins_over_interrupt() {
        let defect = Defect::new("boom");
        let cause: Cause<String> = Cause::sequential(
            Cause::interrupt(FiberId::new_for_test(1)),
            Cause::die(defect.clone()),
        );
        assert_eq!(cause.squash(), defect);
    }

    #[test]
    fn interrupt_only_synthesizes_error() {
        let cause: Cause<String> = Cause::parallel(
            Cause::interrupt(FiberId::new_for_test(1)),
            Cause::interrupt(FiberId::new_for_test(2)),
        );
        let squashed = cause.squash();
        let err = squashed.downcast_ref::<Error>().expect("error payload");
        assert_eq!(
            err,
            &Error::Interrupted {
                fibers: vec![FiberId::new_for_test(1), FiberId::new_for_test(2)]
            }
        );
    }

    #[test]
    fn empty_falls_back_to_unknown() {
        let squashed = Cause::<String>::empty().squash();
        assert_eq!(squashed.downcast_ref::<Error>(), Some(&Error::Unknown));
    }
}
