//! Folding a cause into a summary value.

use super::Cause;
use crate::types::{Defect, FiberId};

/// A bottom-up reduction of a [`Cause`] into a value of type `Z`.
///
/// Implementations receive a shared context value at every node, which lets
/// one reducer be reused with different settings (a rendering depth, a
/// filter, a target type). Leaves are reduced first; composite nodes combine
/// the already-reduced results of their children.
pub trait CauseReducer<C, E, Z> {
    /// Reduces an empty node.
    fn empty_case(&mut self, context: &C) -> Z;
    /// Reduces a typed failure.
    fn fail_case(&mut self, context: &C, error: &E) -> Z;
    /// Reduces a defect.
    fn die_case(&mut self, context: &C, defect: &Defect) -> Z;
    /// Reduces an interruption.
    fn interrupt_case(&mut self, context: &C, fiber_id: FiberId) -> Z;
    /// Combines the results of a sequential node.
    fn sequential_case(&mut self, context: &C, left: Z, right: Z) -> Z;
    /// Combines the results of a parallel node.
    fn parallel_case(&mut self, context: &C, left: Z, right: Z) -> Z;
}

/// Adapter turning six closures into a [`CauseReducer`].
struct FnReducer<Em, Fa, Di, In, Sq, Pa> {
    empty: Em,
    fail: Fa,
    die: Di,
    interrupt: In,
    sequential: Sq,
    parallel: Pa,
}

impl<E, Z, Em, Fa, Di, In, Sq, Pa> CauseReducer<(), E, Z> for FnReducer<Em, Fa, Di, In, Sq, Pa>
where
    Em: FnMut() -> Z,
    Fa: FnMut(&E) -> Z,
    Di: FnMut(&Defect) -> Z,
    In: FnMut(FiberId) -> Z,
    Sq: FnMut(Z, Z) -> Z,
    Pa: FnMut(Z, Z) -> Z,
{
    fn empty_case(&mut self, _: &()) -> Z {
        (self.empty)()
    }

    fn fail_case(&mut self, _: &(), error: &E) -> Z {
        (self.fail)(error)
    }

    fn die_case(&mut self, _: &(), defect: &Defect) -> Z {
        (self.die)(defect)
    }

    fn interrupt_case(&mut self, _: &(), fiber_id: FiberId) -> Z {
        (self.interrupt)(fiber_id)
    }

    fn sequential_case(&mut self, _: &(), left: Z, right: Z) -> Z {
        (self.sequential)(left, right)
    }

    fn parallel_case(&mut self, _: &(), left: Z, right: Z) -> Z {
        (self.parallel)(left, right)
    }
}

impl<E> Cause<E> {
    /// Reduces the tree bottom-up with a context-aware reducer.
    pub fn reduce_with_context<C, Z>(
        &self,
        context: &C,
        reducer: &mut impl CauseReducer<C, E, Z>,
    ) -> Z {
        match self {
            Self::Empty => reducer.empty_case(context),
            Self::Fail(e) => reducer.fail_case(context, e),
            Self::Die(d) => reducer.die_case(context, d),
            Self::Interrupt(id) => reducer.interrupt_case(context, *id),
            Self::Sequential(l, r) => {
                let left = l.reduce_with_context(context, reducer);
                let right = r.reduce_with_context(context, reducer);
                reducer.sequential_case(context, left, right)
            }
            Self::Parallel(l, r) => {
                let left = l.reduce_with_context(context, reducer);
                let right = r.reduce_with_context(context, reducer);
                reducer.parallel_case(context, left, right)
            }
        }
    }

    /// Pattern-matches every node, folding the tree bottom-up.
    pub fn fold<Z>(
        &self,
        empty: impl FnMut() -> Z,
        fail: impl FnMut(&E) -> Z,
        die: impl FnMut(&Defect) -> Z,
        interrupt: impl FnMut(FiberId) -> Z,
        sequential: impl FnMut(Z, Z) -> Z,
        parallel: impl FnMut(Z, Z) -> Z,
    ) -> Z {
        let mut reducer = FnReducer {
            empty,
            fail,
            die,
            interrupt,
            sequential,
            parallel,
        };
        self.reduce_with_context(&(), &mut reducer)
    }

    /// Accumulates over every node top-down, left to right.
    ///
    /// `f` is offered every node (composites before their children); when it
    /// returns `Some`, that value replaces the accumulator. Nodes for which it
    /// returns `None` leave the accumulator unchanged.
    pub fn fold_left<Z>(&self, zero: Z, mut f: impl FnMut(&Z, &Self) -> Option<Z>) -> Z {
        self.fold_left_inner(zero, &mut f)
    }

    fn fold_left_inner<Z>(&self, acc: Z, f: &mut impl FnMut(&Z, &Self) -> Option<Z>) -> Z {
        let acc = f(&acc, self).unwrap_or(acc);
        match self {
            Self::Sequential(l, r) | Self::Parallel(l, r) => {
                let acc = l.fold_left_inner(acc, f);
                r.fold_left_inner(acc, f)
            }
            _ => acc,
        }
    }
}
