use keyvana_ports::types::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputSource {
    Midi(DeviceId),
    Keyboard,
}

/// The pitches currently held down, from every input source at once.
///
/// A pitch stays held while at least one source holds it, so a key held on
/// the MIDI keyboard is not dropped when the same pitch is released on the
/// computer keyboard.
#[derive(Clone, Debug, Default)]
pub struct HeldNotes {
    pitches: BTreeMap<u8, HashSet<InputSource>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressOutcome {
    /// The pitch was not held by anyone before.
    NewlyHeld,
    /// Another source already held it; this source now holds it too.
    AlsoHeld,
    /// This source already held the pitch (e.g. a note-on without note-off).
    Repeated,
}

impl HeldNotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, pitch: u8, source: InputSource) -> PressOutcome {
        let holders = self.pitches.entry(pitch).or_default();
        let was_empty = holders.is_empty();
        if !holders.insert(source) {
            return PressOutcome::Repeated;
        }
        if was_empty {
            PressOutcome::NewlyHeld
        } else {
            PressOutcome::AlsoHeld
        }
    }

    /// Returns true when no source holds the pitch anymore.
    pub fn release(&mut self, pitch: u8, source: &InputSource) -> bool {
        let Some(holders) = self.pitches.get_mut(&pitch) else {
            return false;
        };
        if !holders.remove(source) {
            return false;
        }
        if holders.is_empty() {
            self.pitches.remove(&pitch);
            return true;
        }
        false
    }

    /// Drop everything `source` holds; returns the pitches that are now free.
    pub fn release_source(&mut self, source: &InputSource) -> Vec<u8> {
        let mut freed = Vec::new();
        self.pitches.retain(|pitch, holders| {
            if holders.remove(source) && holders.is_empty() {
                freed.push(*pitch);
                return false;
            }
            !holders.is_empty()
        });
        freed
    }

    pub fn release_all(&mut self) -> Vec<u8> {
        let freed = self.pitches();
        self.pitches.clear();
        freed
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.pitches.contains_key(&pitch)
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    /// Held pitches in ascending order.
    pub fn pitches(&self) -> Vec<u8> {
        self.pitches.keys().copied().collect()
    }
}
