use rand::{Rng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Type alias for whole chips. All bets and stacks are integral chips;
/// fractional chips do not exist anywhere in the engine.
pub type Chips = u32;

/// Milliseconds, used for every timer-facing quantity.
pub type Millis = u64;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    fn letter(self) -> char {
        match self {
            Self::Hearts => 'h',
            Self::Diamonds => 'd',
            Self::Clubs => 'c',
            Self::Spades => 's',
        }
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A card is a rank (2..=14, ace high) plus a suit. Rendered and
/// serialized in the compact `"Ah"` form the clients and the hand
/// archive both use.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Card {
    pub rank: u8,
    pub suit: Suit,
}

impl Card {
    pub const fn new(rank: u8, suit: Suit) -> Self {
        Self { rank, suit }
    }

    fn rank_char(self) -> char {
        match self.rank {
            10 => 'T',
            11 => 'J',
            12 => 'Q',
            13 => 'K',
            14 => 'A',
            r => (b'0' + r) as char,
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank_char(), self.suit)
    }
}

impl FromStr for Card {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (r, su) = match (chars.next(), chars.next(), chars.next()) {
            (Some(r), Some(su), None) => (r, su),
            _ => return Err(format!("bad card: {s:?}")),
        };
        let rank = match r {
            '2'..='9' => r as u8 - b'0',
            'T' => 10,
            'J' => 11,
            'Q' => 12,
            'K' => 13,
            'A' => 14,
            _ => return Err(format!("bad rank: {r:?}")),
        };
        let suit = match su {
            'h' => Suit::Hearts,
            'd' => Suit::Diamonds,
            'c' => Suit::Clubs,
            's' => Suit::Spades,
            _ => return Err(format!("bad suit: {su:?}")),
        };
        Ok(Card::new(rank, suit))
    }
}

impl Serialize for Card {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Card {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An ordered 52-card deck. Shuffling is a Fisher–Yates pass driven by a
/// caller-supplied RNG; the table injects a cryptographically secure one
/// and tests inject a seeded one. `rand`'s range sampling rejects rather
/// than taking a biased modulo.
#[derive(Clone, Debug)]
pub struct Deck {
    cards: Vec<Card>,
    next: usize,
}

impl Deck {
    pub fn shuffled<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut cards = Vec::with_capacity(52);
        for suit in Suit::ALL {
            for rank in 2..=14 {
                cards.push(Card::new(rank, suit));
            }
        }
        for i in (1..cards.len()).rev() {
            let j = rng.gen_range(0..=i);
            cards.swap(i, j);
        }
        Self { cards, next: 0 }
    }

    /// Deal the top card. A 6-seat hand consumes at most 20 of 52 cards,
    /// so the deck cannot run dry mid-hand.
    pub fn draw(&mut self) -> Card {
        let card = self.cards[self.next];
        self.next += 1;
        card
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.next
    }
}

/// Opaque persistent identity: hex-encoded public key bytes from the
/// auth provider. The engine never interprets the contents.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A player's betting action for the current turn. Raise totals are the
/// target street commitment, not the increment.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Fold,
    Check,
    Call,
    Raise { total: Chips },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Fold => write!(f, "folds"),
            Self::Check => write!(f, "checks"),
            Self::Call => write!(f, "calls"),
            Self::Raise { total } => write!(f, "raises to {total}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
}

impl Phase {
    pub fn in_hand(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Which time-bank pool the current phase burns.
    pub fn is_preflop_pool(self) -> bool {
        matches!(self, Self::Idle | Self::Preflop)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Idle => "idle",
            Self::Preflop => "preflop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Showdown => "showdown",
        };
        write!(f, "{repr}")
    }
}

/// Per-player extra-time pools, one per timing regime. Both pools grow
/// by a fixed step every N hands dealt, clamped to a cap.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TimeBank {
    pub preflop_ms: Millis,
    pub postflop_ms: Millis,
}

impl TimeBank {
    pub fn new(initial_ms: Millis) -> Self {
        Self {
            preflop_ms: initial_ms,
            postflop_ms: initial_ms,
        }
    }

    pub fn pool_for(&self, phase: Phase) -> Millis {
        if phase.is_preflop_pool() {
            self.preflop_ms
        } else {
            self.postflop_ms
        }
    }

    /// Burn up to `elapsed_ms` from the pool for `phase`, returning the
    /// amount actually deducted.
    pub fn burn(&mut self, phase: Phase, elapsed_ms: Millis) -> Millis {
        let pool = if phase.is_preflop_pool() {
            &mut self.preflop_ms
        } else {
            &mut self.postflop_ms
        };
        let burned = elapsed_ms.min(*pool);
        *pool -= burned;
        burned
    }

    pub fn grow(&mut self, step_ms: Millis, cap_ms: Millis) {
        self.preflop_ms = (self.preflop_ms + step_ms).min(cap_ms);
        self.postflop_ms = (self.postflop_ms + step_ms).min(cap_ms);
    }
}

/// One occupied seat. Created on join, destroyed on leave or kick;
/// destruction mid-hand is deferred via `pending_removal`.
#[derive(Clone, Debug)]
pub struct SeatedPlayer {
    pub id: PlayerId,
    pub handle: String,
    pub stack: Chips,
    /// Hole cards; empty outside a hand.
    pub hole_cards: Vec<Card>,
    /// Chips committed on the current street, not yet swept into the pot.
    pub street_bet: Chips,
    /// Chips committed across the whole hand, blinds included.
    pub committed: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub sitting_out: bool,
    pub sit_out_next_hand: bool,
    pub disconnected: bool,
    pub pending_removal: bool,
    pub busted: bool,
    /// Was dealt into the current hand.
    pub in_hand: bool,
    pub time_bank: TimeBank,
    pub hands_dealt: u32,
    /// Stack at the moment cards were dealt, for settlement rows.
    pub hand_start_stack: Chips,
}

impl SeatedPlayer {
    pub fn new(id: PlayerId, handle: impl Into<String>, stack: Chips, time_bank_ms: Millis) -> Self {
        Self {
            id,
            handle: handle.into(),
            stack,
            hole_cards: Vec::with_capacity(2),
            street_bet: 0,
            committed: 0,
            folded: false,
            all_in: false,
            sitting_out: false,
            sit_out_next_hand: false,
            disconnected: false,
            pending_removal: false,
            busted: false,
            in_hand: false,
            time_bank: TimeBank::new(time_bank_ms),
            hands_dealt: 0,
            hand_start_stack: stack,
        }
    }

    /// Eligible to be dealt the next hand.
    pub fn can_be_dealt(&self) -> bool {
        !self.sitting_out && !self.pending_removal && self.stack > 0
    }

    /// Still has decisions to make on the current street.
    pub fn can_act(&self) -> bool {
        self.in_hand && !self.folded && !self.all_in && !self.sitting_out
    }

    /// Live in the hand (contesting the pot), whether or not able to act.
    pub fn contesting(&self) -> bool {
        self.in_hand && !self.folded
    }

    /// Move chips from stack to the current street. Clamps to the stack
    /// and flips `all_in` when the stack empties. Returns the amount moved.
    pub fn commit(&mut self, amount: Chips) -> Chips {
        let moved = amount.min(self.stack);
        self.stack -= moved;
        self.street_bet += moved;
        self.committed += moved;
        if self.stack == 0 {
            self.all_in = true;
        }
        moved
    }

    pub fn reset_for_hand(&mut self) {
        self.hole_cards.clear();
        self.street_bet = 0;
        self.committed = 0;
        self.folded = false;
        self.all_in = false;
        self.in_hand = false;
        self.hand_start_stack = self.stack;
    }
}

/// The denominations the display layer can animate.
pub const CHIP_DENOMS: [Chips; 6] = [1000, 500, 100, 25, 5, 1];

/// Ordered multiset of chip denominations mirroring the pot for display.
/// The invariant `sum == pot scalar` holds after every mutation.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChipPile(Vec<Chips>);

impl ChipPile {
    /// Break `amount` into denominations greedily, highest first, and
    /// append them to the pile.
    pub fn add(&mut self, mut amount: Chips) {
        for denom in CHIP_DENOMS {
            while amount >= denom {
                self.0.push(denom);
                amount -= denom;
            }
        }
    }

    pub fn total(&self) -> Chips {
        self.0.iter().sum()
    }

    pub fn take_all(&mut self) -> Vec<Chips> {
        std::mem::take(&mut self.0)
    }

    pub fn denominations(&self) -> &[Chips] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn test_card_display_round_trip() {
        for repr in ["Ah", "Td", "2c", "Ks", "9h"] {
            let card: Card = repr.parse().unwrap();
            assert_eq!(card.to_string(), repr);
        }
    }

    #[test]
    fn test_card_parse_rejects_garbage() {
        assert!("".parse::<Card>().is_err());
        assert!("A".parse::<Card>().is_err());
        assert!("1h".parse::<Card>().is_err());
        assert!("Ax".parse::<Card>().is_err());
        assert!("Ahh".parse::<Card>().is_err());
    }

    #[test]
    fn test_card_serde_uses_string_form() {
        let card = Card::new(14, Suit::Spades);
        let json = serde_json::to_string(&card).unwrap();
        assert_eq!(json, "\"As\"");
        let back: Card = serde_json::from_str(&json).unwrap();
        assert_eq!(back, card);
    }

    #[test]
    fn test_deck_has_52_distinct_cards() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut deck = Deck::shuffled(&mut rng);
        let mut seen = HashSet::new();
        for _ in 0..52 {
            assert!(seen.insert(deck.draw()));
        }
        assert_eq!(seen.len(), 52);
        assert_eq!(deck.remaining(), 0);
    }

    #[test]
    fn test_deck_shuffle_is_seed_deterministic() {
        let mut a = Deck::shuffled(&mut StdRng::seed_from_u64(42));
        let mut b = Deck::shuffled(&mut StdRng::seed_from_u64(42));
        for _ in 0..52 {
            assert_eq!(a.draw(), b.draw());
        }
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Fold.to_string(), "folds");
        assert_eq!(Action::Check.to_string(), "checks");
        assert_eq!(Action::Call.to_string(), "calls");
        assert_eq!(Action::Raise { total: 300 }.to_string(), "raises to 300");
    }

    #[test]
    fn test_action_serde_tagging() {
        let json = serde_json::to_string(&Action::Raise { total: 250 }).unwrap();
        assert_eq!(json, r#"{"type":"raise","total":250}"#);
        let back: Action = serde_json::from_str(r#"{"type":"fold"}"#).unwrap();
        assert_eq!(back, Action::Fold);
    }

    #[test]
    fn test_time_bank_burn_clamps_to_pool() {
        let mut bank = TimeBank::new(15_000);
        assert_eq!(bank.burn(Phase::Preflop, 20_000), 15_000);
        assert_eq!(bank.preflop_ms, 0);
        assert_eq!(bank.postflop_ms, 15_000);
    }

    #[test]
    fn test_time_bank_pool_selection() {
        let mut bank = TimeBank::new(10_000);
        bank.burn(Phase::Flop, 4_000);
        assert_eq!(bank.pool_for(Phase::Preflop), 10_000);
        assert_eq!(bank.pool_for(Phase::River), 6_000);
    }

    #[test]
    fn test_time_bank_growth_clamps_to_cap() {
        let mut bank = TimeBank::new(58_000);
        bank.grow(5_000, 60_000);
        assert_eq!(bank.preflop_ms, 60_000);
        assert_eq!(bank.postflop_ms, 60_000);
    }

    #[test]
    fn test_commit_clamps_and_flags_all_in() {
        let mut p = SeatedPlayer::new(PlayerId::new("a"), "alice", 100, 15_000);
        assert_eq!(p.commit(250), 100);
        assert_eq!(p.stack, 0);
        assert!(p.all_in);
        assert_eq!(p.committed, 100);
        assert_eq!(p.street_bet, 100);
    }

    #[test]
    fn test_commit_partial_leaves_stack() {
        let mut p = SeatedPlayer::new(PlayerId::new("a"), "alice", 1000, 15_000);
        assert_eq!(p.commit(300), 300);
        assert_eq!(p.stack, 700);
        assert!(!p.all_in);
    }

    #[test]
    fn test_reset_for_hand_clears_hand_state() {
        let mut p = SeatedPlayer::new(PlayerId::new("a"), "alice", 1000, 15_000);
        p.commit(200);
        p.hole_cards.push(Card::new(14, Suit::Hearts));
        p.folded = true;
        p.in_hand = true;
        p.reset_for_hand();
        assert!(p.hole_cards.is_empty());
        assert_eq!(p.street_bet, 0);
        assert_eq!(p.committed, 0);
        assert!(!p.folded && !p.all_in && !p.in_hand);
        assert_eq!(p.hand_start_stack, 800);
    }

    #[test]
    fn test_chip_pile_sums_to_added_amount() {
        let mut pile = ChipPile::default();
        pile.add(151);
        pile.add(4_237);
        assert_eq!(pile.total(), 4_388);
    }

    #[test]
    fn test_chip_pile_greedy_breakdown() {
        let mut pile = ChipPile::default();
        pile.add(631);
        assert_eq!(pile.denominations(), &[500, 100, 25, 5, 1]);
    }

    #[test]
    fn test_chip_pile_take_all_empties() {
        let mut pile = ChipPile::default();
        pile.add(100);
        let taken = pile.take_all();
        assert_eq!(taken.iter().sum::<Chips>(), 100);
        assert_eq!(pile.total(), 0);
    }

    #[test]
    fn test_player_id_short() {
        let id = PlayerId::new("deadbeefcafebabe");
        assert_eq!(id.short(), "deadbeef");
        assert_eq!(PlayerId::new("ab").short(), "ab");
    }
}
