#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

pub use layerscope::test_utils::{
    EventLog, event_log, failing_finalizer, init_test_logging, recording_finalizer, run_test,
};
pub use layerscope::{assert_with_log, test_complete, test_phase, test_section};

use layerscope::{Cause, Defect, FiberId};
use proptest::prelude::*;
use proptest::test_runner::RngSeed;

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "LAYERSCOPE_PROPTEST_SEED";

/// Build a ProptestConfig with `cases` cases and a deterministic seed.
///
/// The seed comes from `LAYERSCOPE_PROPTEST_SEED` when set, otherwise from
/// [`DEFAULT_PROPTEST_SEED`] when running under CI. An explicit
/// `PROPTEST_RNG_SEED` always wins.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    std::env::var(PROPTEST_SEED_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .or_else(|| std::env::var("CI").ok().map(|_| DEFAULT_PROPTEST_SEED))
}

/// Strategy for leaf causes over small integer failures.
///
/// Defects are drawn from a fixed pool so that equal defects share an
/// allocation and compare equal.
pub fn arb_leaf(defects: &'static [Defect]) -> impl Strategy<Value = Cause<u8>> {
    prop_oneof![
        Just(Cause::empty()),
        (0_u8..6).prop_map(Cause::fail),
        (0..defects.len()).prop_map(move |i| Cause::die(defects[i].clone())),
        (1_u64..4).prop_map(|n| Cause::interrupt(FiberId::new_for_test(n))),
    ]
}

/// Strategy for leaf causes that hold a failure, defect, or interruption.
pub fn arb_nonempty_leaf(defects: &'static [Defect]) -> impl Strategy<Value = Cause<u8>> {
    arb_leaf(defects).prop_filter("leaf must not be empty", |cause| !cause.is_empty())
}

/// Strategy for arbitrary cause trees of bounded depth.
pub fn arb_cause(defects: &'static [Defect]) -> impl Strategy<Value = Cause<u8>> {
    arb_leaf(defects).prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Cause::sequential(l, r)),
            (inner.clone(), inner).prop_map(|(l, r)| Cause::parallel(l, r)),
        ]
    })
}

/// A fixed pool of defects shared by every generated cause.
pub fn defect_pool() -> &'static [Defect] {
    static POOL: std::sync::OnceLock<Vec<Defect>> = std::sync::OnceLock::new();
    POOL.get_or_init(|| {
        vec![
            Defect::message("disk on fire"),
            Defect::message("invariant broken"),
        ]
    })
}
