//! Personalised state views.
//!
//! The table snapshot carries every hole card; redaction to what a
//! given viewer may see happens here and only here. A seat's cards are
//! visible to their owner always, and to everyone once the hand reaches
//! showdown with the seat still live. Hidden cards become face-down
//! placeholders so clients can still render card backs.

use crate::game::{
    entities::{Card, Chips, Millis},
    table::TableSnapshot,
    Phase, PlayerId,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TableView {
    pub phase: Phase,
    pub hand_no: u64,
    pub board: Vec<Card>,
    pub pot: Chips,
    pub chip_pile: Vec<Chips>,
    pub dealer_seat: usize,
    pub current_actor: Option<usize>,
    pub max_bet: Chips,
    pub min_raise_total: Chips,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub seats: Vec<Option<SeatView>>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SeatView {
    pub handle: String,
    pub stack: Chips,
    pub street_bet: Chips,
    pub committed: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub sitting_out: bool,
    pub disconnected: bool,
    pub busted: bool,
    pub in_hand: bool,
    /// `Some(card)` face-up, `None` a face-down placeholder.
    pub hole_cards: Vec<Option<Card>>,
    pub is_you: bool,
    /// Time-bank pools, present only on the viewer's own seat.
    pub time_bank_ms: Option<(Millis, Millis)>,
}

/// Build the view of `snapshot` as seen by `viewer` (`None` for an
/// observer, who gets the showdown-only visibility).
pub fn personalise(snapshot: &TableSnapshot, viewer: Option<&PlayerId>) -> TableView {
    let showdown = snapshot.phase == Phase::Showdown;
    TableView {
        phase: snapshot.phase,
        hand_no: snapshot.hand_no,
        board: snapshot.board.clone(),
        pot: snapshot.pot,
        chip_pile: snapshot.chip_pile.clone(),
        dealer_seat: snapshot.dealer_seat,
        current_actor: snapshot.current_actor,
        max_bet: snapshot.max_bet,
        min_raise_total: snapshot.min_raise_total,
        small_blind: snapshot.small_blind,
        big_blind: snapshot.big_blind,
        seats: snapshot
            .seats
            .iter()
            .map(|seat| {
                seat.as_ref().map(|s| {
                    let is_you = viewer.is_some_and(|v| v.as_str() == s.id.as_str());
                    let face_up = is_you || (showdown && s.in_hand && !s.folded);
                    SeatView {
                        handle: s.handle.clone(),
                        stack: s.stack,
                        street_bet: s.street_bet,
                        committed: s.committed,
                        folded: s.folded,
                        all_in: s.all_in,
                        sitting_out: s.sitting_out,
                        disconnected: s.disconnected,
                        busted: s.busted,
                        in_hand: s.in_hand,
                        hole_cards: s
                            .hole_cards
                            .iter()
                            .map(|c| if face_up { Some(*c) } else { None })
                            .collect(),
                        is_you,
                        time_bank_ms: is_you
                            .then_some((s.time_bank_preflop_ms, s.time_bank_postflop_ms)),
                    }
                })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{
        entities::Suit,
        table::{SeatSnapshot, TableSnapshot},
    };

    fn snapshot(phase: Phase) -> TableSnapshot {
        let seat = |id: &str, folded: bool| {
            Some(SeatSnapshot {
                id: PlayerId::new(id),
                handle: id.to_string(),
                stack: 1_000,
                street_bet: 0,
                committed: 100,
                folded,
                all_in: false,
                sitting_out: false,
                disconnected: false,
                busted: false,
                in_hand: true,
                hole_cards: vec![Card::new(14, Suit::Hearts), Card::new(13, Suit::Spades)],
                time_bank_preflop_ms: 15_000,
                time_bank_postflop_ms: 15_000,
            })
        };
        TableSnapshot {
            phase,
            hand_no: 3,
            board: vec![],
            pot: 200,
            chip_pile: vec![100, 100],
            dealer_seat: 0,
            current_actor: Some(0),
            max_bet: 0,
            min_raise_total: 100,
            small_blind: 50,
            big_blind: 100,
            seats: vec![seat("a", false), seat("b", false), seat("c", true), None],
        }
    }

    fn cards_of(view: &TableView, seat: usize) -> &[Option<Card>] {
        &view.seats[seat].as_ref().unwrap().hole_cards
    }

    #[test]
    fn test_viewer_sees_only_own_cards_preflop() {
        let view = personalise(&snapshot(Phase::Preflop), Some(&PlayerId::new("a")));
        assert!(cards_of(&view, 0).iter().all(|c| c.is_some()));
        assert!(cards_of(&view, 1).iter().all(|c| c.is_none()));
        assert!(cards_of(&view, 2).iter().all(|c| c.is_none()));
        assert!(view.seats[0].as_ref().unwrap().is_you);
        assert!(!view.seats[1].as_ref().unwrap().is_you);
    }

    #[test]
    fn test_showdown_reveals_live_seats_to_everyone() {
        let view = personalise(&snapshot(Phase::Showdown), Some(&PlayerId::new("a")));
        assert!(cards_of(&view, 1).iter().all(|c| c.is_some()));
        // Folded seats stay hidden even at showdown.
        assert!(cards_of(&view, 2).iter().all(|c| c.is_none()));
    }

    #[test]
    fn test_observer_gets_showdown_only_view() {
        let hidden = personalise(&snapshot(Phase::River), None);
        assert!(cards_of(&hidden, 0).iter().all(|c| c.is_none()));
        assert!(cards_of(&hidden, 1).iter().all(|c| c.is_none()));
        let shown = personalise(&snapshot(Phase::Showdown), None);
        assert!(cards_of(&shown, 0).iter().all(|c| c.is_some()));
    }

    #[test]
    fn test_time_bank_only_on_own_seat() {
        let view = personalise(&snapshot(Phase::Preflop), Some(&PlayerId::new("b")));
        assert!(view.seats[1].as_ref().unwrap().time_bank_ms.is_some());
        assert!(view.seats[0].as_ref().unwrap().time_bank_ms.is_none());
    }

    #[test]
    fn test_placeholders_preserve_card_count() {
        let view = personalise(&snapshot(Phase::Flop), Some(&PlayerId::new("a")));
        assert_eq!(cards_of(&view, 1).len(), 2);
    }
}
