//! Pot construction and distribution.
//!
//! Commitment totals split into a main pot plus side pots by distinct
//! commitment levels among live players; folded players' chips stay in
//! the tiers they reach (dead money). Distribution integer-divides each
//! pot among its best hands and hands out odd chips one at a time in
//! clockwise order starting from the dealer's left.

use super::{
    entities::Chips,
    evaluator::HandValue,
};
use std::collections::HashMap;

/// What a seat put into the hand, and whether it still contests the pot.
#[derive(Clone, Copy, Debug)]
pub struct Contribution {
    pub seat: usize,
    pub committed: Chips,
    pub folded: bool,
}

/// One pot tier. `eligible` lists the live seats whose commitment reached
/// this tier's level.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pot {
    pub amount: Chips,
    pub eligible: Vec<usize>,
}

/// Build the main pot and side pots from hand commitments.
///
/// Levels are the distinct commitment totals of not-folded players,
/// ascending; the lowest tier is the main pot. Each tier collects
/// `min(commit, level) - min(commit, prev)` from every contributor,
/// folded or not. Zero tiers are dropped.
pub fn build_pots(contributions: &[Contribution]) -> Vec<Pot> {
    let mut levels: Vec<Chips> = contributions
        .iter()
        .filter(|c| !c.folded && c.committed > 0)
        .map(|c| c.committed)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    let mut pots = Vec::with_capacity(levels.len());
    let mut prev: Chips = 0;
    for &level in &levels {
        let mut amount: Chips = 0;
        for c in contributions {
            amount += c.committed.min(level) - c.committed.min(prev);
        }
        let eligible: Vec<usize> = contributions
            .iter()
            .filter(|c| !c.folded && c.committed >= level)
            .map(|c| c.seat)
            .collect();
        if amount > 0 {
            pots.push(Pot { amount, eligible });
        }
        prev = level;
    }
    pots
}

/// Award every pot, returning total winnings per seat.
///
/// `hands` maps live seats to their evaluated hands. `payout_order` is
/// every seat index in clockwise order starting from the dealer's left;
/// it fixes both which winner receives the first odd chip and the order
/// of the rest.
pub fn distribute(
    pots: &[Pot],
    hands: &HashMap<usize, HandValue>,
    payout_order: &[usize],
) -> HashMap<usize, Chips> {
    let mut winnings: HashMap<usize, Chips> = HashMap::new();
    for pot in pots {
        let best = pot
            .eligible
            .iter()
            .filter_map(|seat| hands.get(seat))
            .max()
            .cloned();
        let Some(best) = best else { continue };

        let mut winners: Vec<usize> = payout_order
            .iter()
            .copied()
            .filter(|seat| pot.eligible.contains(seat) && hands.get(seat) == Some(&best))
            .collect();
        if winners.is_empty() {
            // Eligibility without an evaluated hand cannot happen in a
            // well-formed showdown; skip rather than lose chips silently.
            winners = pot.eligible.clone();
        }

        let share = pot.amount / winners.len() as Chips;
        let mut remainder = pot.amount % winners.len() as Chips;
        for &seat in &winners {
            let mut amount = share;
            if remainder > 0 {
                amount += 1;
                remainder -= 1;
            }
            *winnings.entry(seat).or_default() += amount;
        }
    }
    winnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::evaluator::{HandCategory, HandValue};

    fn contrib(seat: usize, committed: Chips, folded: bool) -> Contribution {
        Contribution {
            seat,
            committed,
            folded,
        }
    }

    fn hand(category: HandCategory, tb: &[u8]) -> HandValue {
        HandValue {
            category,
            tiebreakers: tb.to_vec(),
        }
    }

    #[test]
    fn test_single_level_single_pot() {
        let pots = build_pots(&[contrib(0, 100, false), contrib(1, 100, false)]);
        assert_eq!(
            pots,
            vec![Pot {
                amount: 200,
                eligible: vec![0, 1]
            }]
        );
    }

    #[test]
    fn test_three_way_all_in_side_pot() {
        // A=1000 all-in, B and C at 3000: main 3000 {A,B,C}, side 4000 {B,C}.
        let pots = build_pots(&[
            contrib(0, 1000, false),
            contrib(1, 3000, false),
            contrib(2, 3000, false),
        ]);
        assert_eq!(pots.len(), 2);
        assert_eq!(pots[0].amount, 3000);
        assert_eq!(pots[0].eligible, vec![0, 1, 2]);
        assert_eq!(pots[1].amount, 4000);
        assert_eq!(pots[1].eligible, vec![1, 2]);
    }

    #[test]
    fn test_folded_chips_are_dead_money_in_reached_tiers() {
        // Folder put in 150; live levels are 100 and 300.
        let pots = build_pots(&[
            contrib(0, 100, false),
            contrib(1, 300, false),
            contrib(2, 150, true),
        ]);
        assert_eq!(pots.len(), 2);
        // Tier 100 collects 100+100+100.
        assert_eq!(pots[0].amount, 300);
        assert_eq!(pots[0].eligible, vec![0, 1]);
        // Tier 300 collects 200 from B and the folder's remaining 50.
        assert_eq!(pots[1].amount, 250);
        assert_eq!(pots[1].eligible, vec![1]);
    }

    #[test]
    fn test_equal_commitments_produce_no_side_pot() {
        let pots = build_pots(&[
            contrib(0, 500, false),
            contrib(1, 500, false),
            contrib(2, 500, false),
        ]);
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 1500);
    }

    #[test]
    fn test_zero_commitments_ignored() {
        let pots = build_pots(&[contrib(0, 0, false), contrib(1, 100, false)]);
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 100);
        assert_eq!(pots[0].eligible, vec![1]);
    }

    #[test]
    fn test_distribute_single_winner() {
        let pots = vec![Pot {
            amount: 4000,
            eligible: vec![0, 1],
        }];
        let mut hands = HashMap::new();
        hands.insert(0, hand(HandCategory::Flush, &[14, 12, 9, 7, 5]));
        hands.insert(1, hand(HandCategory::OnePair, &[13, 14, 12, 11]));
        let winnings = distribute(&pots, &hands, &[1, 0]);
        assert_eq!(winnings.get(&0), Some(&4000));
        assert_eq!(winnings.get(&1), None);
    }

    #[test]
    fn test_distribute_odd_chip_goes_clockwise_from_dealers_left() {
        let pots = vec![Pot {
            amount: 101,
            eligible: vec![0, 1],
        }];
        let mut hands = HashMap::new();
        let tie = hand(HandCategory::Straight, &[10]);
        hands.insert(0, tie.clone());
        hands.insert(1, tie);
        // Seat 1 is first clockwise from the dealer's left.
        let winnings = distribute(&pots, &hands, &[1, 0]);
        assert_eq!(winnings.get(&1), Some(&51));
        assert_eq!(winnings.get(&0), Some(&50));
    }

    #[test]
    fn test_distribute_split_among_three() {
        let pots = vec![Pot {
            amount: 100,
            eligible: vec![0, 1, 2],
        }];
        let tie = hand(HandCategory::TwoPair, &[14, 13, 12]);
        let hands: HashMap<_, _> = (0..3).map(|s| (s, tie.clone())).collect();
        let winnings = distribute(&pots, &hands, &[2, 0, 1]);
        // 100 / 3 = 33 r1; first in payout order gets the extra chip.
        assert_eq!(winnings.get(&2), Some(&34));
        assert_eq!(winnings.get(&0), Some(&33));
        assert_eq!(winnings.get(&1), Some(&33));
        assert_eq!(winnings.values().sum::<Chips>(), 100);
    }

    #[test]
    fn test_distribute_layered_pots_different_winners() {
        // Main pot to A (best hand overall not eligible for side).
        let pots = vec![
            Pot {
                amount: 3000,
                eligible: vec![0, 1, 2],
            },
            Pot {
                amount: 4000,
                eligible: vec![1, 2],
            },
        ];
        let mut hands = HashMap::new();
        hands.insert(0, hand(HandCategory::FullHouse, &[10, 5]));
        hands.insert(1, hand(HandCategory::OnePair, &[9, 14, 12, 7]));
        hands.insert(2, hand(HandCategory::Flush, &[13, 11, 9, 6, 3]));
        let winnings = distribute(&pots, &hands, &[1, 2, 0]);
        assert_eq!(winnings.get(&0), Some(&3000));
        assert_eq!(winnings.get(&2), Some(&4000));
        assert_eq!(winnings.get(&1), None);
    }

    #[test]
    fn test_distribution_conserves_chips() {
        let contributions = [
            contrib(0, 720, false),
            contrib(1, 1500, false),
            contrib(2, 1500, false),
            contrib(3, 333, true),
        ];
        let pots = build_pots(&contributions);
        let total_in: Chips = contributions.iter().map(|c| c.committed).sum();
        assert_eq!(pots.iter().map(|p| p.amount).sum::<Chips>(), total_in);

        let mut hands = HashMap::new();
        hands.insert(0, hand(HandCategory::TwoPair, &[8, 3, 14]));
        hands.insert(1, hand(HandCategory::TwoPair, &[8, 3, 14]));
        hands.insert(2, hand(HandCategory::HighCard, &[14, 11, 9, 5, 2]));
        let winnings = distribute(&pots, &hands, &[1, 2, 3, 0]);
        assert_eq!(winnings.values().sum::<Chips>(), total_in);
    }
}
