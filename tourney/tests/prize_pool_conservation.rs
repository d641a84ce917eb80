//! Prize pool conservation tests.
//!
//! The standard split must hand out every credit collected in entry fees:
//! rounding remainders go to first place, never to nobody.

use proptest::prelude::*;
use tourney::tournament::PrizeStructure;

fn assert_conserved(entries: usize, fee: i64) -> PrizeStructure {
    let structure = PrizeStructure::standard(entries, fee);
    let pool = entries as i64 * fee;
    let sum: i64 = structure.payouts.iter().sum();

    assert_eq!(
        structure.total_pool, pool,
        "{} entries x {} fee should give a {} pool",
        entries, fee, pool
    );
    assert_eq!(
        sum, pool,
        "{} entries x {} fee: payouts {:?} sum to {}, pool is {}",
        entries, fee, structure.payouts, sum, pool
    );
    structure
}

#[test]
fn test_winner_takes_all_up_to_five_entries() {
    for (entries, fee) in [(0, 100), (1, 10), (2, 100), (3, 50), (5, 1000), (5, 1)] {
        let structure = assert_conserved(entries, fee);
        assert_eq!(structure.payouts.len(), 1, "{entries} entries pay one rank");
    }
}

#[test]
fn test_two_ranks_for_six_to_nine_entries() {
    for (entries, fee) in [(6, 100), (7, 50), (8, 1000), (9, 25), (6, 1), (9, 999)] {
        let structure = assert_conserved(entries, fee);
        assert_eq!(structure.payouts.len(), 2);
        assert!(
            structure.payouts[0] >= structure.payouts[1],
            "first place never earns less than second: {:?}",
            structure.payouts
        );
    }
}

#[test]
fn test_three_ranks_from_ten_entries() {
    for (entries, fee) in [(10, 100), (11, 7), (13, 1), (64, 333), (1000, 3)] {
        let structure = assert_conserved(entries, fee);
        assert_eq!(structure.payouts.len(), 3);
        assert!(structure.payouts.windows(2).all(|w| w[0] >= w[1]));
    }
}

#[test]
fn test_remainder_goes_to_first_place() {
    // 7 x 33 = 231; 60% = 138.6, 40% = 92.4
    let structure = assert_conserved(7, 33);
    assert_eq!(structure.payouts, vec![139, 92]);
}

proptest! {
    #[test]
    fn test_standard_split_conserves_any_pool(entries in 0usize..500, fee in 1i64..100_000) {
        let structure = PrizeStructure::standard(entries, fee);
        prop_assert_eq!(structure.payouts.iter().sum::<i64>(), structure.total_pool);
        prop_assert!(structure.payouts.iter().all(|p| *p >= 0));
    }
}
