//! Lossless algebraic record of why a computation did not produce a value.
//!
//! A [`Cause`] is an immutable binary tree with three kinds of leaves and two
//! kinds of composition:
//!
//! - `Fail(E)`: an expected, typed failure
//! - `Die(Defect)`: an unexpected, untyped defect
//! - `Interrupt(FiberId)`: cooperative cancellation attributed to a fiber
//! - `Sequential(a, b)`: `a` happened, then `b` happened
//! - `Parallel(a, b)`: `a` and `b` happened concurrently
//!
//! `Empty` is the identity of both compositions. Composition never loses
//! information: a failure during cleanup of another failure is recorded
//! after it, and concurrent failures are recorded side by side.
//!
//! # Equality
//!
//! Causes compare by meaning, not by shape. Both compositions are
//! associative, `Parallel` is commutative and idempotent, and `Sequential`
//! distributes over a `Parallel` on its left. See [`Cause::flatten_steps`]
//! for the canonical form used by `==`.
//!
//! # Reductions
//!
//! Every derived operation (rendering, classification, squashing) is a
//! reduction; [`Cause::reduce_with_context`] is the general extension point.

mod fold;
mod linearize;
mod render;
mod squash;

pub use fold::CauseReducer;
pub use render::CauseReport;

use crate::types::{Defect, FiberId};
use smallvec::SmallVec;

/// Why a computation did not produce a value.
#[derive(Debug, Clone, Default)]
pub enum Cause<E> {
    /// No failure occurred.
    #[default]
    Empty,
    /// An expected, typed failure.
    Fail(E),
    /// An unexpected, untyped defect.
    Die(Defect),
    /// Cancellation requested by the given fiber.
    Interrupt(FiberId),
    /// The left cause happened, then the right cause happened.
    Sequential(Box<Cause<E>>, Box<Cause<E>>),
    /// The two causes happened concurrently and independently.
    Parallel(Box<Cause<E>>, Box<Cause<E>>),
}

impl<E> Cause<E> {
    /// The empty cause.
    #[must_use]
    pub const fn empty() -> Self {
        Self::Empty
    }

    /// An expected failure.
    #[must_use]
    pub const fn fail(error: E) -> Self {
        Self::Fail(error)
    }

    /// An unexpected defect.
    #[must_use]
    pub const fn die(defect: Defect) -> Self {
        Self::Die(defect)
    }

    /// A defect carrying only a message.
    #[must_use]
    pub fn die_message(message: impl Into<String>) -> Self {
        Self::Die(Defect::message(message))
    }

    /// An interruption requested by `fiber_id`.
    #[must_use]
    pub const fn interrupt(fiber_id: FiberId) -> Self {
        Self::Interrupt(fiber_id)
    }

    /// `left` happened, then `right` happened.
    ///
    /// Returns the other operand when either side is empty.
    #[must_use]
    pub fn sequential(left: Self, right: Self) -> Self {
        if left.is_empty_node() {
            right
        } else if right.is_empty_node() {
            left
        } else {
            Self::Sequential(Box::new(left), Box::new(right))
        }
    }

    /// `left` and `right` happened concurrently.
    ///
    /// Returns the other operand when either side is empty.
    #[must_use]
    pub fn parallel(left: Self, right: Self) -> Self {
        if left.is_empty_node() {
            right
        } else if right.is_empty_node() {
            left
        } else {
            Self::Parallel(Box::new(left), Box::new(right))
        }
    }

    /// Appends `that` as a later failure. Method form of [`Cause::sequential`].
    #[must_use]
    pub fn then(self, that: Self) -> Self {
        Self::sequential(self, that)
    }

    /// Adds `that` as a concurrent failure. Method form of [`Cause::parallel`].
    #[must_use]
    pub fn both(self, that: Self) -> Self {
        Self::parallel(self, that)
    }

    const fn is_empty_node(&self) -> bool {
        matches!(self, Self::Empty)
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    /// Returns true if the cause contains no failure, defect, or interruption.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Fail(_) | Self::Die(_) | Self::Interrupt(_) => false,
            Self::Sequential(l, r) | Self::Parallel(l, r) => l.is_empty() && r.is_empty(),
        }
    }

    /// Returns true if the cause contains a typed failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.any_leaf(|leaf| matches!(leaf, Self::Fail(_)))
    }

    /// Returns true if the cause contains a defect.
    #[must_use]
    pub fn is_die(&self) -> bool {
        self.any_leaf(|leaf| matches!(leaf, Self::Die(_)))
    }

    /// Returns true if the cause contains an interruption.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.any_leaf(|leaf| matches!(leaf, Self::Interrupt(_)))
    }

    /// Returns true if the cause contains nothing but interruptions.
    ///
    /// An empty cause is trivially interrupted-only.
    #[must_use]
    pub fn is_interrupted_only(&self) -> bool {
        !self.any_leaf(|leaf| matches!(leaf, Self::Fail(_) | Self::Die(_)))
    }

    fn any_leaf(&self, mut pred: impl FnMut(&Self) -> bool) -> bool {
        let mut found = false;
        self.for_each_leaf(&mut |leaf| {
            if !found && pred(leaf) {
                found = true;
            }
        });
        found
    }

    /// Visits every leaf top-down, left to right.
    fn for_each_leaf<'a>(&'a self, f: &mut impl FnMut(&'a Self)) {
        match self {
            Self::Empty => {}
            Self::Fail(_) | Self::Die(_) | Self::Interrupt(_) => f(self),
            Self::Sequential(l, r) | Self::Parallel(l, r) => {
                l.for_each_leaf(f);
                r.for_each_leaf(f);
            }
        }
    }

    // ------------------------------------------------------------------
    // Collectors
    // ------------------------------------------------------------------

    /// Every typed failure, in encounter order.
    #[must_use]
    pub fn failures(&self) -> Vec<&E> {
        let mut out = Vec::new();
        self.for_each_leaf(&mut |leaf| {
            if let Self::Fail(e) = leaf {
                out.push(e);
            }
        });
        out
    }

    /// Every defect, in encounter order.
    #[must_use]
    pub fn defects(&self) -> Vec<&Defect> {
        let mut out = Vec::new();
        self.for_each_leaf(&mut |leaf| {
            if let Self::Die(d) = leaf {
                out.push(d);
            }
        });
        out
    }

    /// Every interrupting fiber, in encounter order, without duplicates.
    #[must_use]
    pub fn interruptors(&self) -> Vec<FiberId> {
        let mut out: Vec<FiberId> = Vec::new();
        self.for_each_leaf(&mut |leaf| {
            if let Self::Interrupt(id) = leaf {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        });
        out
    }

    /// The first typed failure, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&E> {
        self.find_map(|c| match c {
            Self::Fail(e) => Some(e),
            _ => None,
        })
    }

    /// The first defect, if any.
    #[must_use]
    pub fn first_defect(&self) -> Option<&Defect> {
        self.find_map(|c| match c {
            Self::Die(d) => Some(d),
            _ => None,
        })
    }

    /// The first interrupting fiber, if any.
    #[must_use]
    pub fn first_interruptor(&self) -> Option<FiberId> {
        self.find_map(|c| match c {
            Self::Interrupt(id) => Some(*id),
            _ => None,
        })
    }

    /// Number of leaves (failures, defects, and interruptions).
    #[must_use]
    pub fn size(&self) -> usize {
        let mut n = 0;
        self.for_each_leaf(&mut |_| n += 1);
        n
    }

    // ------------------------------------------------------------------
    // Transformations
    // ------------------------------------------------------------------

    /// Substitutes each typed failure payload, keeping the shape.
    pub fn map<E2>(self, mut f: impl FnMut(E) -> E2) -> Cause<E2> {
        self.map_inner(&mut f)
    }

    fn map_inner<E2>(self, f: &mut impl FnMut(E) -> E2) -> Cause<E2> {
        match self {
            Self::Empty => Cause::Empty,
            Self::Fail(e) => Cause::Fail(f(e)),
            Self::Die(d) => Cause::Die(d),
            Self::Interrupt(id) => Cause::Interrupt(id),
            Self::Sequential(l, r) => {
                let l = l.map_inner(f);
                let r = r.map_inner(f);
                Cause::Sequential(Box::new(l), Box::new(r))
            }
            Self::Parallel(l, r) => {
                let l = l.map_inner(f);
                let r = r.map_inner(f);
                Cause::Parallel(Box::new(l), Box::new(r))
            }
        }
    }

    /// Substitutes each typed failure with a whole sub-cause.
    pub fn flat_map<E2>(self, mut f: impl FnMut(E) -> Cause<E2>) -> Cause<E2> {
        self.flat_map_inner(&mut f)
    }

    fn flat_map_inner<E2>(self, f: &mut impl FnMut(E) -> Cause<E2>) -> Cause<E2> {
        match self {
            Self::Empty => Cause::Empty,
            Self::Fail(e) => f(e),
            Self::Die(d) => Cause::Die(d),
            Self::Interrupt(id) => Cause::Interrupt(id),
            Self::Sequential(l, r) => {
                let l = l.flat_map_inner(f);
                Cause::sequential(l, r.flat_map_inner(f))
            }
            Self::Parallel(l, r) => {
                let l = l.flat_map_inner(f);
                Cause::parallel(l, r.flat_map_inner(f))
            }
        }
    }

    /// Removes typed failures, keeping defects and interruptions.
    ///
    /// The result has no `Fail` nodes, so it can be viewed at any error type.
    #[must_use]
    pub fn strip_failures<E2>(&self) -> Cause<E2> {
        match self {
            Self::Empty | Self::Fail(_) => Cause::Empty,
            Self::Die(d) => Cause::Die(d.clone()),
            Self::Interrupt(id) => Cause::Interrupt(*id),
            Self::Sequential(l, r) => Cause::sequential(l.strip_failures(), r.strip_failures()),
            Self::Parallel(l, r) => Cause::parallel(l.strip_failures(), r.strip_failures()),
        }
    }

    /// Keeps only defects, or `None` if the cause has none.
    #[must_use]
    pub fn keep_defects<E2>(&self) -> Option<Cause<E2>> {
        let kept = self.keep_defects_inner();
        if kept.is_empty() { None } else { Some(kept) }
    }

    fn keep_defects_inner<E2>(&self) -> Cause<E2> {
        match self {
            Self::Empty | Self::Fail(_) | Self::Interrupt(_) => Cause::Empty,
            Self::Die(d) => Cause::Die(d.clone()),
            Self::Sequential(l, r) => {
                Cause::sequential(l.keep_defects_inner(), r.keep_defects_inner())
            }
            Self::Parallel(l, r) => Cause::parallel(l.keep_defects_inner(), r.keep_defects_inner()),
        }
    }

    /// Searches the tree top-down, left to right, returning the first hit.
    ///
    /// Composite nodes are offered to `f` before their children.
    pub fn find_map<'a, Z>(&'a self, mut f: impl FnMut(&'a Self) -> Option<Z>) -> Option<Z> {
        self.find_map_inner(&mut f)
    }

    fn find_map_inner<'a, Z>(&'a self, f: &mut impl FnMut(&'a Self) -> Option<Z>) -> Option<Z> {
        if let Some(z) = f(self) {
            return Some(z);
        }
        match self {
            Self::Sequential(l, r) | Self::Parallel(l, r) => {
                l.find_map_inner(f).or_else(|| r.find_map_inner(f))
            }
            _ => None,
        }
    }

    /// Rebuilds the tree keeping only the leaves matching `pred`.
    ///
    /// Branches left with nothing collapse to `Empty`.
    #[must_use]
    pub fn filter(&self, mut pred: impl FnMut(&Self) -> bool) -> Self
    where
        E: Clone,
    {
        self.filter_inner(&mut pred)
    }

    fn filter_inner(&self, pred: &mut impl FnMut(&Self) -> bool) -> Self
    where
        E: Clone,
    {
        match self {
            Self::Empty => Self::Empty,
            Self::Fail(_) | Self::Die(_) | Self::Interrupt(_) => {
                if pred(self) {
                    self.clone()
                } else {
                    Self::Empty
                }
            }
            Self::Sequential(l, r) => {
                let l = l.filter_inner(pred);
                Self::sequential(l, r.filter_inner(pred))
            }
            Self::Parallel(l, r) => {
                let l = l.filter_inner(pred);
                Self::parallel(l, r.filter_inner(pred))
            }
        }
    }

    /// Returns true if `that` occurs somewhere in this cause.
    #[must_use]
    pub fn contains(&self, that: &Self) -> bool
    where
        E: PartialEq,
    {
        if that.is_empty() {
            return true;
        }
        self.find_map(|c| (c == that).then_some(())).is_some()
    }

    // ------------------------------------------------------------------
    // Canonical form
    // ------------------------------------------------------------------

    /// Flattens the cause into its canonical sequence of parallel steps.
    ///
    /// Each step is the set of leaves that happened concurrently; steps are
    /// ordered by time. Duplicate leaves within a step are merged, which is
    /// what makes `Parallel` idempotent under `==`.
    #[must_use]
    pub fn flatten_steps(&self) -> Vec<SmallVec<[&Self; 4]>>
    where
        E: PartialEq,
    {
        let mut steps: Vec<SmallVec<[&Self; 4]>> = Vec::new();
        // Each pending chain `c1 ; c2 ; ...` is stored as a stack, head last.
        let mut pending: Vec<Vec<&Self>> = vec![vec![self]];
        while !pending.is_empty() {
            let mut step: SmallVec<[&Self; 4]> = SmallVec::new();
            let mut next: Vec<Vec<&Self>> = Vec::new();
            for chain in pending {
                Self::step_chain(chain, &mut step, &mut next);
            }
            if !step.is_empty() {
                steps.push(step);
            }
            pending = next;
        }
        steps
    }

    fn step_chain<'a>(
        mut chain: Vec<&'a Self>,
        step: &mut SmallVec<[&'a Self; 4]>,
        next: &mut Vec<Vec<&'a Self>>,
    ) where
        E: PartialEq,
    {
        while let Some(head) = chain.pop() {
            match head {
                Self::Empty => {}
                Self::Sequential(l, r) => {
                    chain.push(r.as_ref());
                    chain.push(l.as_ref());
                }
                Self::Parallel(l, r) => {
                    let mut right_chain = chain.clone();
                    right_chain.push(r.as_ref());
                    Self::step_chain(right_chain, step, next);
                    chain.push(l.as_ref());
                }
                leaf => {
                    if !step.iter().any(|seen| leaf_eq(seen, leaf)) {
                        step.push(leaf);
                    }
                    if !chain.is_empty() {
                        next.push(chain);
                    }
                    return;
                }
            }
        }
    }
}

impl<E> Cause<Cause<E>> {
    /// Collapses a cause of causes into a single cause.
    #[must_use]
    pub fn flatten(self) -> Cause<E> {
        self.flat_map(|inner| inner)
    }
}

impl<E> From<Defect> for Cause<E> {
    fn from(defect: Defect) -> Self {
        Self::Die(defect)
    }
}

fn leaf_eq<E: PartialEq>(a: &Cause<E>, b: &Cause<E>) -> bool {
    match (a, b) {
        (Cause::Fail(x), Cause::Fail(y)) => x == y,
        (Cause::Die(x), Cause::Die(y)) => x == y,
        (Cause::Interrupt(x), Cause::Interrupt(y)) => x == y,
        _ => false,
    }
}

fn step_eq<E: PartialEq>(a: &[&Cause<E>], b: &[&Cause<E>]) -> bool {
    a.len() == b.len()
        && a.iter().all(|x| b.iter().any(|y| leaf_eq(x, y)))
        && b.iter().all(|y| a.iter().any(|x| leaf_eq(x, y)))
}

impl<E: PartialEq> PartialEq for Cause<E> {
    fn eq(&self, other: &Self) -> bool {
        let left = self.flatten_steps();
        let right = other.flatten_steps();
        left.len() == right.len() && left.iter().zip(right.iter()).all(|(a, b)| step_eq(a, b))
    }
}

impl<E: Eq> Eq for Cause<E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn init_test(test_name: &str) {
        init_test_logging();
        crate::test_phase!(test_name);
    }

    fn fid(n: u64) -> FiberId {
        FiberId::new_for_test(n)
    }

    #[test]
    fn empty_is_identity() {
        init_test("empty_is_identity");
        let a: Cause<&str> = Cause::fail("a");
        crate::assert_with_log!(
            Cause::sequential(Cause::empty(), a.clone()) == a,
            "empty ; a == a",
            &a,
            Cause::sequential(Cause::empty(), a.clone())
        );
        assert_eq!(Cause::sequential(a.clone(), Cause::empty()), a);
        assert_eq!(Cause::parallel(Cause::empty(), a.clone()), a);
        assert_eq!(Cause::parallel(a.clone(), Cause::empty()), a);
        crate::test_complete!("empty_is_identity");
    }

    #[test]
    fn sequential_is_associative() {
        init_test("sequential_is_associative");
        let (a, b, c) = (Cause::fail(1), Cause::fail(2), Cause::interrupt(fid(3)));
        let left = Cause::sequential(Cause::sequential(a.clone(), b.clone()), c.clone());
        let right = Cause::sequential(a, Cause::sequential(b, c));
        crate::assert_with_log!(left == right, "associativity", &left, &right);
        crate::test_complete!("sequential_is_associative");
    }

    #[test]
    fn parallel_is_commutative_and_idempotent() {
        let a: Cause<i32> = Cause::fail(1);
        let b: Cause<i32> = Cause::fail(2);
        assert_eq!(
            Cause::parallel(a.clone(), b.clone()),
            Cause::parallel(b.clone(), a.clone())
        );
        assert_eq!(Cause::parallel(a.clone(), a.clone()), a);
    }

    #[test]
    fn sequential_is_not_commutative() {
        let a: Cause<i32> = Cause::fail(1);
        let b: Cause<i32> = Cause::fail(2);
        assert_ne!(
            Cause::sequential(a.clone(), b.clone()),
            Cause::sequential(b, a)
        );
    }

    #[test]
    fn sequential_distributes_over_parallel() {
        let (a, b, c): (Cause<i32>, Cause<i32>, Cause<i32>) =
            (Cause::fail(1), Cause::fail(2), Cause::fail(3));
        let left = Cause::sequential(Cause::parallel(a.clone(), b.clone()), c.clone());
        let right = Cause::parallel(
            Cause::sequential(a, c.clone()),
            Cause::sequential(b, c),
        );
        assert_eq!(left, right);
    }

    #[test]
    fn failures_preserve_order() {
        init_test("failures_preserve_order");
        let cause = Cause::sequential(Cause::fail("x"), Cause::fail("y"));
        let failures = cause.failures();
        crate::assert_with_log!(
            failures == vec![&"x", &"y"],
            "failures in encounter order",
            vec!["x", "y"],
            failures
        );
        crate::test_complete!("failures_preserve_order");
    }

    #[test]
    fn defects_are_all_collected() {
        let cause: Cause<()> = Cause::parallel(
            Cause::die(Defect::new(1_i32)),
            Cause::die(Defect::new(2_i32)),
        );
        let payloads: Vec<i32> = cause
            .defects()
            .iter()
            .filter_map(|d| d.downcast_ref::<i32>().copied())
            .collect();
        assert!(payloads.contains(&1));
        assert!(payloads.contains(&2));
        assert_eq!(payloads.len(), 2);
    }

    #[test]
    fn interruptors_are_deduplicated() {
        let cause: Cause<()> = Cause::parallel(
            Cause::interrupt(fid(4)),
            Cause::sequential(Cause::interrupt(fid(5)), Cause::interrupt(fid(4))),
        );
        assert_eq!(cause.interruptors(), vec![fid(4), fid(5)]);
        assert_eq!(cause.first_interruptor(), Some(fid(4)));
    }

    #[test]
    fn predicates() {
        let fail: Cause<&str> = Cause::fail("e");
        let die: Cause<&str> = Cause::die_message("boom");
        let int: Cause<&str> = Cause::interrupt(fid(1));

        assert!(Cause::<&str>::empty().is_empty());
        assert!(!fail.is_empty());
        assert!(fail.is_failure() && !fail.is_die() && !fail.is_interrupted());
        assert!(die.is_die() && !die.is_failure());
        assert!(int.is_interrupted() && int.is_interrupted_only());

        let mixed = Cause::parallel(int.clone(), fail.clone());
        assert!(mixed.is_interrupted());
        assert!(!mixed.is_interrupted_only());
        assert!(Cause::sequential(int.clone(), int).is_interrupted_only());

        let hollow: Cause<&str> =
            Cause::Sequential(Box::new(Cause::Empty), Box::new(Cause::Empty));
        assert!(hollow.is_empty());
    }

    #[test]
    fn map_and_flat_map() {
        let cause = Cause::sequential(Cause::fail(2), Cause::die_message("d"));
        let mapped = cause.clone().map(|n| n * 10);
        assert_eq!(mapped.failures(), vec![&20]);
        assert!(mapped.is_die());

        let exploded = cause.flat_map(|n| Cause::parallel(Cause::fail(n), Cause::fail(n + 1)));
        assert_eq!(exploded.failures(), vec![&2, &3]);

        let erased: Cause<i32> = Cause::sequential(Cause::fail(1), Cause::fail(2))
            .flat_map(|_| Cause::empty());
        assert!(erased.is_empty());
    }

    #[test]
    fn flatten_collapses_nested() {
        let nested: Cause<Cause<&str>> = Cause::parallel(
            Cause::fail(Cause::sequential(Cause::fail("a"), Cause::fail("b"))),
            Cause::interrupt(fid(2)),
        );
        let flat = nested.flatten();
        assert_eq!(flat.failures(), vec![&"a", &"b"]);
        assert_eq!(flat.interruptors(), vec![fid(2)]);
    }

    #[test]
    fn strip_failures_and_keep_defects() {
        let d = Defect::new("boom");
        let cause: Cause<&str> = Cause::sequential(
            Cause::fail("e"),
            Cause::parallel(Cause::die(d.clone()), Cause::interrupt(fid(8))),
        );
        let stripped: Cause<()> = cause.strip_failures();
        assert!(!stripped.is_failure());
        assert!(stripped.is_die());
        assert!(stripped.is_interrupted());

        let defects: Option<Cause<()>> = cause.keep_defects();
        assert_eq!(defects, Some(Cause::die(d)));

        let only_failures: Cause<&str> = Cause::fail("only");
        assert!(only_failures.keep_defects::<()>().is_none());
    }

    #[test]
    fn find_map_is_top_down() {
        let cause: Cause<i32> = Cause::sequential(Cause::fail(1), Cause::fail(2));
        let first_seq = cause.find_map(|c| match c {
            Cause::Sequential(_, _) => Some("seq"),
            _ => None,
        });
        assert_eq!(first_seq, Some("seq"));
        assert_eq!(cause.first_failure(), Some(&1));
    }

    #[test]
    fn filter_prunes_leaves() {
        let cause: Cause<i32> = Cause::sequential(
            Cause::parallel(Cause::fail(1), Cause::die_message("x")),
            Cause::fail(2),
        );
        let only_fails = cause.filter(|c| matches!(c, Cause::Fail(_)));
        assert_eq!(
            only_fails,
            Cause::sequential(Cause::fail(1), Cause::fail(2))
        );
        let nothing = cause.filter(|_| false);
        assert!(matches!(nothing, Cause::Empty));
    }

    #[test]
    fn contains_finds_subtrees() {
        let inner: Cause<i32> = Cause::parallel(Cause::fail(1), Cause::fail(2));
        let outer = Cause::sequential(Cause::fail(0), inner.clone());
        assert!(outer.contains(&inner));
        assert!(outer.contains(&Cause::fail(2)));
        assert!(outer.contains(&Cause::empty()));
        assert!(!outer.contains(&Cause::fail(9)));
    }

    #[test]
    fn size_counts_leaves() {
        let cause: Cause<i32> = Cause::sequential(
            Cause::parallel(Cause::fail(1), Cause::fail(2)),
            Cause::interrupt(fid(1)),
        );
        assert_eq!(cause.size(), 3);
        assert_eq!(Cause::<i32>::empty().size(), 0);
    }

    #[test]
    fn flatten_steps_shape() {
        let cause: Cause<i32> = Cause::sequential(
            Cause::parallel(Cause::fail(1), Cause::fail(2)),
            Cause::fail(3),
        );
        let steps = cause.flatten_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].len(), 2);
        assert_eq!(steps[1].len(), 1);
    }
}
