use crate::cursor::{Cursor, CursorState, MeasureProgress, Step};
use crate::gate::AdvanceGate;
use crate::hand::{HandMode, SkipTrigger};
use crate::input::HeldNotes;
use crate::loop_range::{LoopSelection, LoopTransition};
use keyvana_domain_score::{DueNote, Measure, PositionIndex, ScorePositions};

#[derive(Clone, Debug, PartialEq)]
pub enum PracticeEvent {
    /// The cursor settled on a position. Sent once per settled move.
    DueNotesChanged {
        position: PositionIndex,
        due: Vec<DueNote>,
        progress: MeasureProgress,
        end_reached: bool,
    },
    AutoSkipped {
        from: PositionIndex,
        to: PositionIndex,
        trigger: SkipTrigger,
    },
    /// Due notes are satisfied; advance from `position` after `wait_ms`.
    AdvanceRequested {
        position: PositionIndex,
        wait_ms: u32,
    },
    LoopSelectionChanged {
        selection: LoopSelection,
    },
    HandModeChanged {
        mode: HandMode,
    },
    PieceCompleted,
}

/// Navigation and matching state for one loaded score.
///
/// Every move goes through a single settle step: skip what cannot be played in
/// the current hand mode, then publish the due notes once and re-arm the gate.
/// Held notes are owned by the caller and passed in, since input exists
/// whether or not a score is loaded.
#[derive(Clone, Debug)]
pub struct PracticeSession {
    cursor: Cursor,
    selection: LoopSelection,
    hand_mode: HandMode,
    gate: AdvanceGate,
    filtered_due: Vec<DueNote>,
    advance_bpm: Option<u32>,
    completed: bool,
}

impl PracticeSession {
    pub fn new(score: ScorePositions, hand_mode: HandMode) -> Self {
        Self {
            cursor: Cursor::new(score),
            selection: LoopSelection::Idle,
            hand_mode,
            gate: AdvanceGate::new(),
            filtered_due: Vec::new(),
            advance_bpm: None,
            completed: false,
        }
    }

    /// Settle on the first position. Call once after construction.
    pub fn start(&mut self, held: &HeldNotes) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        self.cursor.reset();
        self.settle(held, &mut events);
        events
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn cursor_state(&self) -> CursorState {
        self.cursor.state()
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor.is_at_end()
    }

    pub fn filtered_due(&self) -> &[DueNote] {
        &self.filtered_due
    }

    pub fn hand_mode(&self) -> HandMode {
        self.hand_mode
    }

    pub fn loop_selection(&self) -> LoopSelection {
        self.selection
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Tempo used to derive the advance delay; `None` advances immediately.
    pub fn set_advance_bpm(&mut self, bpm: Option<u32>) {
        self.advance_bpm = bpm;
    }

    pub fn next(&mut self, held: &HeldNotes) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        if self.cursor.next().moved() {
            self.completed = false;
            self.settle(held, &mut events);
        }
        events
    }

    pub fn previous(&mut self, held: &HeldNotes) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        if !self.cursor.previous() {
            return events;
        }
        // step back over positions the settle step would skip forward again
        while !self.hand_mode.is_playable(self.cursor.position()) {
            if !self.cursor.previous() {
                break;
            }
        }
        self.completed = false;
        self.settle(held, &mut events);
        events
    }

    pub fn reset(&mut self, held: &HeldNotes) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        match self.selection.active_range() {
            Some(range) => self.cursor.jump_to_measure(range.start),
            None => self.cursor.reset(),
        }
        self.completed = false;
        self.settle(held, &mut events);
        events
    }

    pub fn jump_to_measure(&mut self, measure: Measure, held: &HeldNotes) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        self.cursor.jump_to_measure(measure);
        self.completed = false;
        self.settle(held, &mut events);
        events
    }

    /// A measure was clicked: drive the loop selection state machine.
    pub fn select_measure(&mut self, measure: Measure, held: &HeldNotes) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        let measure = self.cursor.score().clamp_measure(measure);
        let transition = self.selection.select(measure);
        self.cursor.set_loop(self.selection.active_range());

        match transition {
            LoopTransition::Activated(selected) => {
                // store the snapped range the cursor actually uses
                let range = self.cursor.loop_range().unwrap_or(selected);
                self.selection = LoopSelection::Active(range);
                log::info!("loop activated: measures {}-{}", range.start, range.end);
                events.push(PracticeEvent::LoopSelectionChanged {
                    selection: self.selection,
                });
                self.cursor.jump_to_measure(range.start);
                self.completed = false;
                self.settle(held, &mut events);
            }
            LoopTransition::Deactivated(range) => {
                log::info!("loop cleared: measures {}-{}", range.start, range.end);
                events.push(PracticeEvent::LoopSelectionChanged {
                    selection: self.selection,
                });
            }
            LoopTransition::Pending { start, replaced } => {
                if let Some(range) = replaced {
                    log::info!("loop {}-{} replaced by new selection", range.start, range.end);
                }
                log::debug!("loop start pending at measure {start}");
                events.push(PracticeEvent::LoopSelectionChanged {
                    selection: self.selection,
                });
            }
        }
        events
    }

    pub fn clear_loop(&mut self) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        if self.selection.clear() {
            self.cursor.set_loop(None);
            events.push(PracticeEvent::LoopSelectionChanged {
                selection: self.selection,
            });
        }
        events
    }

    pub fn set_hand_mode(&mut self, mode: HandMode, held: &HeldNotes) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        if mode == self.hand_mode {
            return events;
        }
        self.hand_mode = mode;
        events.push(PracticeEvent::HandModeChanged { mode });
        self.settle(held, &mut events);
        events
    }

    /// Held notes changed: re-check the gate.
    pub fn on_input(&mut self, held: &HeldNotes) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        self.evaluate_gate(held, &mut events);
        events
    }

    /// Carry out an advance requested earlier for `position`. Stale requests
    /// (the cursor moved away meanwhile) are dropped without a trace.
    pub fn complete_advance(&mut self, position: PositionIndex, held: &HeldNotes) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        if self.cursor.index() != position || !self.gate.has_fired() {
            return events;
        }
        match self.cursor.next() {
            Step::AtEnd => self.finish(&mut events),
            Step::Moved | Step::Wrapped => self.settle(held, &mut events),
        }
        events
    }

    /// Swap in a re-derived score, keeping the loop selection valid for it.
    pub fn replace_score(&mut self, score: ScorePositions, held: &HeldNotes) -> Vec<PracticeEvent> {
        let mut events = Vec::new();
        let before = self.selection;
        self.selection.clamp_to(score.first_measure(), score.total_measures());
        self.cursor = Cursor::new(score);
        self.cursor.set_loop(self.selection.active_range());
        if let Some(range) = self.cursor.loop_range() {
            self.selection = LoopSelection::Active(range);
        }
        if self.selection != before {
            log::warn!("loop selection clamped to the new score: {:?}", self.selection);
            events.push(PracticeEvent::LoopSelectionChanged {
                selection: self.selection,
            });
        }
        match self.selection.active_range() {
            Some(range) => self.cursor.jump_to_measure(range.start),
            None => self.cursor.reset(),
        }
        self.completed = false;
        self.settle(held, &mut events);
        events
    }

    fn settle(&mut self, held: &HeldNotes, events: &mut Vec<PracticeEvent>) {
        while let Some(trigger) = self.hand_mode.skip_trigger(self.cursor.position()) {
            let from = self.cursor.index();
            let mode = self.hand_mode;
            let walk = self.cursor.next_matching(|p| mode.is_playable(p));
            if walk.moved && self.cursor.index() != from {
                events.push(PracticeEvent::AutoSkipped {
                    from,
                    to: self.cursor.index(),
                    trigger,
                });
            }
            if !walk.found {
                if self.cursor.loop_range().is_some() {
                    log::warn!("no playable position for {:?} inside the loop", mode);
                }
                break;
            }
        }

        self.filtered_due = self.hand_mode.filter(&self.cursor.position().notes);
        self.gate.reset();
        events.push(PracticeEvent::DueNotesChanged {
            position: self.cursor.index(),
            due: self.filtered_due.clone(),
            progress: self.cursor.progress(),
            end_reached: self.cursor.is_at_end(),
        });

        if self.filtered_due.is_empty() && self.cursor.is_at_end() {
            self.finish(events);
            return;
        }
        self.evaluate_gate(held, events);
    }

    fn evaluate_gate(&mut self, held: &HeldNotes, events: &mut Vec<PracticeEvent>) {
        if let Some(wait_ms) = self.gate.evaluate(&self.filtered_due, held, self.advance_bpm) {
            events.push(PracticeEvent::AdvanceRequested {
                position: self.cursor.index(),
                wait_ms,
            });
        }
    }

    fn finish(&mut self, events: &mut Vec<PracticeEvent>) {
        if !self.completed {
            self.completed = true;
            log::info!("piece completed");
            events.push(PracticeEvent::PieceCompleted);
        }
    }
}
