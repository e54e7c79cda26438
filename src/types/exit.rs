//! Exit values: the outcome of a computation that may fail with a [`Cause`].
//!
//! `Exit<A, E>` is a plain `Result` so that `?` works everywhere; the helpers
//! here cover the combinations the scope machinery needs.

use crate::cause::Cause;

/// The outcome of a computation: a value, or the full cause of its failure.
pub type Exit<A, E> = Result<A, Cause<E>>;

/// Collects many exits into one, keeping every failure.
///
/// Successful values are returned in input order. If any exit failed, the
/// failures are combined left to right with [`Cause::parallel`], so no
/// failure is dropped even when several occurred.
pub fn collect_all_par<A, E, I>(exits: I) -> Exit<Vec<A>, E>
where
    I: IntoIterator<Item = Exit<A, E>>,
{
    let mut values = Vec::new();
    let mut failure: Option<Cause<E>> = None;
    for exit in exits {
        match exit {
            Ok(value) => values.push(value),
            Err(cause) => {
                failure = Some(match failure {
                    None => cause,
                    Some(acc) => Cause::parallel(acc, cause),
                });
            }
        }
    }
    failure.map_or(Ok(values), Err)
}

/// Collects unit exits, discarding the values.
pub fn collect_all_par_unit<E, I>(exits: I) -> Exit<(), E>
where
    I: IntoIterator<Item = Exit<(), E>>,
{
    collect_all_par(exits).map(|_| ())
}

/// Appends `then` to a failed exit as a sequential follow-up failure.
///
/// Used when cleanup fails after a primary failure: the primary cause stays
/// first and the cleanup cause is recorded after it.
pub fn and_then_cause<A, E>(exit: Exit<A, E>, then: Exit<(), E>) -> Exit<A, E> {
    match (exit, then) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(later)) => Err(later),
        (Err(first), Ok(())) => Err(first),
        (Err(first), Err(later)) => Err(Cause::sequential(first, later)),
    }
}
