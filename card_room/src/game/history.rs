//! Per-hand history log.
//!
//! Every significant event appends one text line. Lines are public
//! except the per-player "dealt to" lines, which carry an owner; the
//! personalised copy handed to a participant at hand end contains every
//! public line plus only that player's private line.

use super::entities::{Card, Chips, PlayerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who may see a log line.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private { owner: PlayerId },
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LogLine {
    pub text: String,
    pub visibility: Visibility,
}

impl LogLine {
    pub fn public(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visibility: Visibility::Public,
        }
    }

    pub fn private(owner: PlayerId, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visibility: Visibility::Private { owner },
        }
    }

    pub fn visible_to(&self, id: &PlayerId) -> bool {
        match &self.visibility {
            Visibility::Public => true,
            Visibility::Private { owner } => owner == id,
        }
    }
}

/// Ordered log for one hand.
#[derive(Clone, Debug, Default)]
pub struct HandLog {
    lines: Vec<LogLine>,
}

fn join_cards(cards: &[Card]) -> String {
    cards
        .iter()
        .map(Card::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

impl HandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: LogLine) {
        self.lines.push(line);
    }

    pub fn header(&mut self, hand_no: u64, started_at: DateTime<Utc>, sb: Chips, bb: Chips) {
        self.push(LogLine::public(format!(
            "*** HAND #{hand_no} *** {} blinds {sb}/{bb}",
            started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )));
    }

    pub fn seat_summary(&mut self, seat: usize, handle: &str, stack: Chips, is_button: bool) {
        let button = if is_button { " [button]" } else { "" };
        self.push(LogLine::public(format!(
            "Seat {seat}: {handle} ({stack} chips){button}"
        )));
    }

    pub fn blind_post(&mut self, handle: &str, kind: &str, amount: Chips) {
        self.push(LogLine::public(format!(
            "{handle} posts {kind} blind {amount}"
        )));
    }

    pub fn dealt_to(&mut self, id: PlayerId, handle: &str, hole: &[Card]) {
        self.push(LogLine::private(
            id,
            format!("Dealt to {handle} [{}]", join_cards(hole)),
        ));
    }

    pub fn street(&mut self, name: &str, board: &[Card]) {
        self.push(LogLine::public(format!(
            "*** {name} *** [{}]",
            join_cards(board)
        )));
    }

    pub fn action(&mut self, handle: &str, description: &str) {
        self.push(LogLine::public(format!("{handle} {description}")));
    }

    pub fn shows(&mut self, handle: &str, hole: &[Card], hand_name: &str) {
        self.push(LogLine::public(format!(
            "{handle} shows [{}] ({hand_name})",
            join_cards(hole)
        )));
    }

    pub fn collects(&mut self, handle: &str, amount: Chips, pot_name: &str) {
        self.push(LogLine::public(format!(
            "{handle} collects {amount} from the {pot_name}"
        )));
    }

    pub fn summary(&mut self, pot_total: Chips, board: &[Card]) {
        if board.is_empty() {
            self.push(LogLine::public(format!("*** SUMMARY *** pot {pot_total}")));
        } else {
            self.push(LogLine::public(format!(
                "*** SUMMARY *** pot {pot_total} board [{}]",
                join_cards(board)
            )));
        }
    }

    pub fn folded_note(&mut self, handle: &str, phase: &str) {
        self.push(LogLine::public(format!("{handle} folded on the {phase}")));
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    /// Lines appended since index `from`; the actor uses this to stream
    /// increments without re-sending the whole log.
    pub fn lines_since(&self, from: usize) -> &[LogLine] {
        &self.lines[from.min(self.lines.len())..]
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The personalised transcript for one participant: all public lines
    /// plus their own private lines, in original order.
    pub fn personalised(&self, id: &PlayerId) -> String {
        self.lines
            .iter()
            .filter(|l| l.visible_to(id))
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The public transcript, private lines elided; this is what the
    /// archive stores.
    pub fn public_text(&self) -> String {
        self.lines
            .iter()
            .filter(|l| l.visibility == Visibility::Public)
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Suit;

    fn pid(s: &str) -> PlayerId {
        PlayerId::new(s)
    }

    #[test]
    fn test_private_line_visible_only_to_owner() {
        let line = LogLine::private(pid("a"), "Dealt to alice [Ah Kd]");
        assert!(line.visible_to(&pid("a")));
        assert!(!line.visible_to(&pid("b")));
    }

    #[test]
    fn test_personalised_includes_own_private_line_only() {
        let mut log = HandLog::new();
        log.push(LogLine::public("*** HAND #1 ***"));
        log.dealt_to(pid("a"), "alice", &[Card::new(14, Suit::Hearts), Card::new(13, Suit::Diamonds)]);
        log.dealt_to(pid("b"), "bob", &[Card::new(2, Suit::Clubs), Card::new(7, Suit::Spades)]);
        log.action("alice", "folds");

        let for_a = log.personalised(&pid("a"));
        assert!(for_a.contains("Dealt to alice [Ah Kd]"));
        assert!(!for_a.contains("Dealt to bob"));
        assert!(for_a.contains("alice folds"));

        let for_b = log.personalised(&pid("b"));
        assert!(for_b.contains("Dealt to bob [2c 7s]"));
        assert!(!for_b.contains("Dealt to alice"));
    }

    #[test]
    fn test_public_text_elides_private_lines() {
        let mut log = HandLog::new();
        log.push(LogLine::public("header"));
        log.dealt_to(pid("a"), "alice", &[Card::new(14, Suit::Hearts)]);
        let text = log.public_text();
        assert_eq!(text, "header");
    }

    #[test]
    fn test_lines_since_returns_increment() {
        let mut log = HandLog::new();
        log.push(LogLine::public("one"));
        let mark = log.len();
        log.push(LogLine::public("two"));
        log.push(LogLine::public("three"));
        let inc: Vec<_> = log.lines_since(mark).iter().map(|l| l.text.clone()).collect();
        assert_eq!(inc, vec!["two", "three"]);
        assert!(log.lines_since(99).is_empty());
    }

    #[test]
    fn test_street_header_formats_board() {
        let mut log = HandLog::new();
        log.street(
            "FLOP",
            &[
                Card::new(14, Suit::Hearts),
                Card::new(10, Suit::Diamonds),
                Card::new(3, Suit::Clubs),
            ],
        );
        assert_eq!(log.lines()[0].text, "*** FLOP *** [Ah Td 3c]");
    }
}
