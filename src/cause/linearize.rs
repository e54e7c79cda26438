//! Expanding parallel failure histories into linear ones.

use super::Cause;

impl<E: Clone + PartialEq> Cause<E> {
    /// Every purely sequential history contained in this cause.
    ///
    /// Each `Parallel` node contributes the histories of either side; each
    /// `Sequential` node contributes every pairing of a left history with a
    /// right history. Duplicate histories are merged. An empty cause has no
    /// histories.
    #[must_use]
    pub fn linearize(&self) -> Vec<Self> {
        match self {
            Self::Empty => Vec::new(),
            Self::Fail(_) | Self::Die(_) | Self::Interrupt(_) => vec![self.clone()],
            Self::Sequential(l, r) => {
                let lefts = l.linearize();
                let rights = r.linearize();
                if lefts.is_empty() {
                    return rights;
                }
                if rights.is_empty() {
                    return lefts;
                }
                let mut out = Vec::with_capacity(lefts.len() * rights.len());
                for left in &lefts {
                    for right in &rights {
                        push_unique(&mut out, Self::sequential(left.clone(), right.clone()));
                    }
                }
                out
            }
            Self::Parallel(l, r) => {
                let mut out = l.linearize();
                for history in r.linearize() {
                    push_unique(&mut out, history);
                }
                out
            }
        }
    }
}

fn push_unique<E: PartialEq>(out: &mut Vec<Cause<E>>, cause: Cause<E>) {
    if !out.contains(&cause) {
        out.push(cause);
    }
}
