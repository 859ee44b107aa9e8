use keyvana_domain_score::{DueNote, Hand, Position};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HandMode {
    Left,
    Right,
    #[default]
    Both,
}

/// Why a position is skipped without waiting for input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipTrigger {
    /// No notes at all: bar line, repeat sign, rest-only slice.
    Structural,
    /// Notes exist, but none for the hand being practiced.
    OtherHand(Hand),
}

impl HandMode {
    pub fn hand(self) -> Option<Hand> {
        match self {
            HandMode::Left => Some(Hand::Left),
            HandMode::Right => Some(Hand::Right),
            HandMode::Both => None,
        }
    }

    pub fn includes(self, hand: Hand) -> bool {
        match self.hand() {
            Some(selected) => selected == hand,
            None => true,
        }
    }

    pub fn filter(self, notes: &[DueNote]) -> Vec<DueNote> {
        notes
            .iter()
            .filter(|note| self.includes(note.hand))
            .copied()
            .collect()
    }

    pub fn skip_trigger(self, position: &Position) -> Option<SkipTrigger> {
        if position.is_structural() {
            return Some(SkipTrigger::Structural);
        }
        match self.hand() {
            Some(hand) if !position.has_notes_for(hand) => Some(SkipTrigger::OtherHand(hand)),
            _ => None,
        }
    }

    /// Whether the cursor may come to rest on `position` in this mode.
    pub fn is_playable(self, position: &Position) -> bool {
        self.skip_trigger(position).is_none()
    }
}
