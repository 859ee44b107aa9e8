use std::collections::HashMap;

pub const MIN_OCTAVE: i8 = -1;
pub const MAX_OCTAVE: i8 = 8;

/// Computer-keyboard piano: home row for white keys, the row above for black
/// keys, starting at C of the current octave.
#[derive(Clone, Debug)]
pub struct KeyboardMap {
    octave: i8,
}

impl KeyboardMap {
    pub fn new(octave: i8) -> Self {
        Self {
            octave: octave.clamp(MIN_OCTAVE, MAX_OCTAVE),
        }
    }

    pub fn octave(&self) -> i8 {
        self.octave
    }

    pub fn set_octave(&mut self, octave: i8) {
        self.octave = octave.clamp(MIN_OCTAVE, MAX_OCTAVE);
    }

    /// Returns true if changed.
    pub fn octave_up(&mut self) -> bool {
        if self.octave < MAX_OCTAVE {
            self.octave += 1;
            true
        } else {
            false
        }
    }

    /// Returns true if changed.
    pub fn octave_down(&mut self) -> bool {
        if self.octave > MIN_OCTAVE {
            self.octave -= 1;
            true
        } else {
            false
        }
    }

    pub fn key_to_pitch(&self, key: char) -> Option<u8> {
        let offset = key_to_offset(key.to_ascii_lowercase())?;
        let base = (self.octave as i16 + 1) * 12;
        let pitch = base + offset as i16;
        if (0..=127).contains(&pitch) {
            Some(pitch as u8)
        } else {
            None
        }
    }
}

impl Default for KeyboardMap {
    fn default() -> Self {
        Self::new(4)
    }
}

fn key_to_offset(key: char) -> Option<u8> {
    match key {
        'a' => Some(0),  // C
        'w' => Some(1),  // C#
        's' => Some(2),  // D
        'e' => Some(3),  // D#
        'd' => Some(4),  // E
        'f' => Some(5),  // F
        't' => Some(6),  // F#
        'g' => Some(7),  // G
        'y' => Some(8),  // G#
        'h' => Some(9),  // A
        'u' => Some(10), // A#
        'j' => Some(11), // B
        'k' => Some(12), // C (octave up)
        'o' => Some(13), // C#
        'l' => Some(14), // D
        'p' => Some(15), // D#
        ';' => Some(16), // E
        _ => None,
    }
}

/// Tracks which keys are down so OS key-repeat never re-presses a pitch and a
/// key-up always releases the pitch that key-down produced, even if the
/// octave changed in between.
#[derive(Clone, Debug, Default)]
pub struct KeyboardInput {
    map: KeyboardMap,
    down: HashMap<char, u8>,
}

impl KeyboardInput {
    pub fn new(map: KeyboardMap) -> Self {
        Self {
            map,
            down: HashMap::new(),
        }
    }

    pub fn map(&self) -> &KeyboardMap {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut KeyboardMap {
        &mut self.map
    }

    /// Returns the pitch for a fresh press; `None` for repeats and unmapped keys.
    pub fn key_down(&mut self, key: char, repeat: bool) -> Option<u8> {
        let key = key.to_ascii_lowercase();
        if repeat || self.down.contains_key(&key) {
            return None;
        }
        let pitch = self.map.key_to_pitch(key)?;
        self.down.insert(key, pitch);
        Some(pitch)
    }

    /// Returns the pitch to release, or `None` while another key still
    /// sounds the same pitch.
    pub fn key_up(&mut self, key: char) -> Option<u8> {
        let pitch = self.down.remove(&key.to_ascii_lowercase())?;
        if self.down.values().any(|&other| other == pitch) {
            return None;
        }
        Some(pitch)
    }

    pub fn release_all(&mut self) -> Vec<u8> {
        let mut pitches: Vec<u8> = self.down.drain().map(|(_, pitch)| pitch).collect();
        pitches.sort_unstable();
        pitches.dedup();
        pitches
    }

    pub fn has_active_keys(&self) -> bool {
        !self.down.is_empty()
    }
}
