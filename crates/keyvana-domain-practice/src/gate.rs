use crate::input::HeldNotes;
use keyvana_domain_score::DueNote;

/// Superset test: every due pitch is held. Extra held pitches are fine.
/// Nothing due means nothing can be satisfied.
pub fn all_satisfied(due: &[DueNote], held: &HeldNotes) -> bool {
    !due.is_empty() && due.iter().all(|note| held.contains(note.pitch))
}

/// How long to hold off an advance: the shortest due note at `bpm`.
pub fn advance_wait_ms(due: &[DueNote], bpm: Option<u32>) -> u32 {
    let Some(bpm) = bpm.filter(|bpm| *bpm > 0) else {
        return 0;
    };
    let beats = due
        .iter()
        .map(|note| note.duration_beats)
        .fold(f32::INFINITY, f32::min);
    if !beats.is_finite() {
        return 0;
    }
    (beats as f64 * 60_000.0 / bpm as f64).round() as u32
}

/// One-shot per position: fires at most once until `reset`.
#[derive(Clone, Debug, Default)]
pub struct AdvanceGate {
    fired: bool,
}

impl AdvanceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.fired = false;
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Returns the wait before advancing the first time the due notes are
    /// satisfied; `None` otherwise.
    pub fn evaluate(&mut self, due: &[DueNote], held: &HeldNotes, bpm: Option<u32>) -> Option<u32> {
        if self.fired || !all_satisfied(due, held) {
            return None;
        }
        self.fired = true;
        Some(advance_wait_ms(due, bpm))
    }
}
