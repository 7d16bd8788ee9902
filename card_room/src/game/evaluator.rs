//! Best-five hand evaluation over 5 to 7 cards.
//!
//! The output is a `(category, tiebreakers)` pair with a derived total
//! order; that order is the single source of truth for every winner
//! decision in the engine.

use super::entities::Card;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hand categories in ascending strength.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HandCategory {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl HandCategory {
    pub fn name(self) -> &'static str {
        match self {
            Self::HighCard => "high card",
            Self::OnePair => "a pair",
            Self::TwoPair => "two pair",
            Self::ThreeOfAKind => "three of a kind",
            Self::Straight => "a straight",
            Self::Flush => "a flush",
            Self::FullHouse => "a full house",
            Self::FourOfAKind => "four of a kind",
            Self::StraightFlush => "a straight flush",
            Self::RoyalFlush => "a royal flush",
        }
    }
}

impl fmt::Display for HandCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An evaluated hand. Ordering is lexicographic over
/// `(category, tiebreakers)`, which the derive provides field-by-field.
#[derive(Clone, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct HandValue {
    pub category: HandCategory,
    /// Rank indices in descending importance: the deciding ranks first,
    /// then kickers high to low.
    pub tiebreakers: Vec<u8>,
}

impl HandValue {
    pub fn name(&self) -> &'static str {
        self.category.name()
    }
}

impl fmt::Display for HandValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.category)
    }
}

/// Evaluate the best five-card hand makeable from `cards` (5 to 7 of
/// them). For more than five cards every five-card combination is
/// scored and the maximum kept.
pub fn evaluate(cards: &[Card]) -> HandValue {
    assert!(
        (5..=7).contains(&cards.len()),
        "evaluator takes 5-7 cards, got {}",
        cards.len()
    );
    let n = cards.len();
    if n == 5 {
        return evaluate_five([cards[0], cards[1], cards[2], cards[3], cards[4]]);
    }

    // Scan every 5-subset (21 of them for 7 cards) and keep the max.
    let mut best: Option<HandValue> = None;
    for a in 0..n - 4 {
        for b in a + 1..n - 3 {
            for c in b + 1..n - 2 {
                for d in c + 1..n - 1 {
                    for e in d + 1..n {
                        let five = [cards[a], cards[b], cards[c], cards[d], cards[e]];
                        let value = evaluate_five(five);
                        if best.as_ref().map_or(true, |b| value > *b) {
                            best = Some(value);
                        }
                    }
                }
            }
        }
    }
    best.expect("at least one 5-card combination")
}

fn evaluate_five(cards: [Card; 5]) -> HandValue {
    let mut ranks: [u8; 5] = cards.map(|c| c.rank);
    ranks.sort_unstable_by(|a, b| b.cmp(a));

    let is_flush = cards.iter().all(|c| c.suit == cards[0].suit);
    // Wheel: A-5-4-3-2 plays as a five-high straight.
    let is_wheel = ranks == [14, 5, 4, 3, 2];
    let is_straight = is_wheel || ranks.windows(2).all(|w| w[0] == w[1] + 1);
    let straight_high = if is_wheel { 5 } else { ranks[0] };

    if is_flush && is_straight {
        if straight_high == 14 {
            return HandValue {
                category: HandCategory::RoyalFlush,
                tiebreakers: vec![14],
            };
        }
        return HandValue {
            category: HandCategory::StraightFlush,
            tiebreakers: vec![straight_high],
        };
    }

    // Count multiples from ace down so ties break naturally.
    let mut quads = None;
    let mut trips = None;
    let mut pairs: Vec<u8> = Vec::new();
    let mut singles: Vec<u8> = Vec::new();
    let mut rank = 14u8;
    while rank >= 2 {
        match ranks.iter().filter(|&&r| r == rank).count() {
            4 => quads = Some(rank),
            3 => trips = Some(rank),
            2 => pairs.push(rank),
            1 => singles.push(rank),
            _ => {}
        }
        rank -= 1;
    }

    if let Some(q) = quads {
        let mut tb = vec![q];
        tb.extend(&singles);
        return HandValue {
            category: HandCategory::FourOfAKind,
            tiebreakers: tb,
        };
    }
    if let (Some(t), true) = (trips, !pairs.is_empty()) {
        return HandValue {
            category: HandCategory::FullHouse,
            tiebreakers: vec![t, pairs[0]],
        };
    }
    if is_flush {
        return HandValue {
            category: HandCategory::Flush,
            tiebreakers: ranks.to_vec(),
        };
    }
    if is_straight {
        return HandValue {
            category: HandCategory::Straight,
            tiebreakers: vec![straight_high],
        };
    }
    if let Some(t) = trips {
        let mut tb = vec![t];
        tb.extend(&singles);
        return HandValue {
            category: HandCategory::ThreeOfAKind,
            tiebreakers: tb,
        };
    }
    if pairs.len() >= 2 {
        let mut tb = vec![pairs[0], pairs[1]];
        tb.extend(&singles);
        return HandValue {
            category: HandCategory::TwoPair,
            tiebreakers: tb,
        };
    }
    if pairs.len() == 1 {
        let mut tb = vec![pairs[0]];
        tb.extend(&singles);
        return HandValue {
            category: HandCategory::OnePair,
            tiebreakers: tb,
        };
    }
    HandValue {
        category: HandCategory::HighCard,
        tiebreakers: ranks.to_vec(),
    }
}
