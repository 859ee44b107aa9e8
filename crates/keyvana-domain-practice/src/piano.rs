use crate::input::HeldNotes;
use keyvana_domain_score::{DueNote, Hand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const FIRST_KEY: u8 = 21; // A0
pub const LAST_KEY: u8 = 108; // C8

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// `60` -> `"C4"`.
pub fn note_name(pitch: u8) -> String {
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

pub fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyState {
    Idle,
    Due(Hand),
    Pressed,
    Correct(Hand),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PianoKey {
    pub pitch: u8,
    pub name: String,
    pub is_black: bool,
    pub state: KeyState,
}

/// State of all 88 keys for the current due notes and held pitches.
pub fn piano_keys(due: &[DueNote], held: &HeldNotes) -> Vec<PianoKey> {
    let mut hands: HashMap<u8, Hand> = HashMap::new();
    for note in due {
        hands.insert(note.pitch, note.hand);
    }

    (FIRST_KEY..=LAST_KEY)
        .map(|pitch| {
            let pressed = held.contains(pitch);
            let state = match (hands.get(&pitch), pressed) {
                (Some(hand), true) => KeyState::Correct(*hand),
                (Some(hand), false) => KeyState::Due(*hand),
                (None, true) => KeyState::Pressed,
                (None, false) => KeyState::Idle,
            };
            PianoKey {
                pitch,
                name: note_name(pitch),
                is_black: is_black_key(pitch),
                state,
            }
        })
        .collect()
}
