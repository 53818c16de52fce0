//! Fee estimator lifecycle tests: many rounds of observation and mining
//! checked through save/restore byte identity and reorg rollback
//! equivalence.

use rand::Rng;

use lode_mempool::{FeeEstimator, FeeEstimatorConfig, ESTIMATE_FEE_DEPTH};
use lode_tests::helpers::FeeTester;

fn tester(bin_size: i32, max_replacements: i32, max_rollback: u32) -> FeeTester {
    FeeTester::new(FeeEstimator::new(FeeEstimatorConfig {
        max_rollback,
        bin_size,
        max_replacements,
        min_registered_blocks: 0,
        start_height: 0,
    }))
}

/// One round: seven observations, then a block of up to five of the
/// outstanding transactions.
fn round(tester: &mut FeeTester, rng: &mut impl Rng) {
    for _ in 0..7 {
        tester.observe(rng.gen_range(1_000..1_000_000));
    }
    tester.next_block(5);
}

/// Save, restore, re-save: the two blobs must be byte-identical and the
/// restored estimator must answer every depth the same way.
fn check_save_restore(tester: &mut FeeTester, expected: &[f64; ESTIMATE_FEE_DEPTH]) {
    let saved = tester.ef.save();
    let restored = FeeEstimator::restore(&saved).unwrap();
    assert_eq!(restored.save(), saved, "restored state must re-save identically");
    tester.ef = restored;
    let estimates = tester.estimates();
    assert_eq!(&estimates, expected, "estimates must survive restore");
}

#[test]
fn save_restore_roundtrip_over_many_rounds() {
    let mut rng = rand::thread_rng();
    let rounds = 8;
    let mut tester = tester(6, 4, rounds + 1);

    let mut estimate_history = vec![tester.estimates()];
    for _ in 0..rounds {
        let last = *estimate_history.last().unwrap();
        check_save_restore(&mut tester, &last);
        round(&mut tester, &mut rng);
        estimate_history.push(tester.estimates());
    }

    // Reverse the whole run, re-checking the persisted form each step.
    for step in 1..=rounds as usize {
        tester.rollback();
        let expected = estimate_history[estimate_history.len() - step - 1];
        check_save_restore(&mut tester, &expected);
    }
}

#[test]
fn rollback_restores_earlier_estimates_exactly() {
    let mut rng = rand::thread_rng();
    let steps_back = 2;
    let rounds = 30;
    let mut tester = tester(6, 4, steps_back as u32);

    let mut estimate_history = vec![tester.estimates()];
    for _ in 0..rounds {
        // Advance a few blocks.
        for _ in 0..=steps_back {
            round(&mut tester, &mut rng);
            estimate_history.push(tester.estimates());
        }
        // Roll them back; each step must land exactly on the snapshot taken
        // at that height.
        for step in 0..steps_back {
            tester.rollback();
            let expected = estimate_history[estimate_history.len() - step - 2];
            let estimates = tester.estimates();
            assert_eq!(
                estimates, expected,
                "rollback must reproduce the earlier estimates"
            );
        }
        estimate_history.truncate(estimate_history.len() - steps_back);
    }
}

#[test]
fn registered_blocks_advance_height_and_count_by_one() {
    let mut rng = rand::thread_rng();
    let mut tester = tester(10, 4, 2);
    for expected_height in 1..=20 {
        round(&mut tester, &mut rng);
        assert_eq!(tester.ef.last_known_height(), expected_height);
    }
}
