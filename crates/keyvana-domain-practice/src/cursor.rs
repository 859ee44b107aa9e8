use crate::loop_range::LoopRange;
use keyvana_domain_score::{Measure, Position, PositionIndex, ScorePositions};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    pub index: PositionIndex,
    pub end_reached: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureProgress {
    pub current: Measure,
    pub total: Measure,
}

/// Outcome of a single `next`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Moved,
    /// Went back to the loop start. The index may be unchanged when the
    /// loop holds a single position.
    Wrapped,
    AtEnd,
}

impl Step {
    pub fn moved(self) -> bool {
        self != Step::AtEnd
    }
}

/// Result of walking forward until a position matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Walk {
    pub moved: bool,
    pub found: bool,
}

/// Cursor over the positions of one score.
///
/// All operations are total: out-of-range requests clamp, and moves that are
/// impossible report `false` instead of failing. With a loop range set, the
/// cursor never leaves `[start, end]`.
#[derive(Clone, Debug)]
pub struct Cursor {
    score: ScorePositions,
    index: PositionIndex,
    loop_range: Option<LoopRange>,
}

impl Cursor {
    pub fn new(score: ScorePositions) -> Self {
        Self {
            score,
            index: 0,
            loop_range: None,
        }
    }

    pub fn score(&self) -> &ScorePositions {
        &self.score
    }

    pub fn index(&self) -> PositionIndex {
        self.index
    }

    pub fn position(&self) -> &Position {
        // index is kept in 0..len and scores are never empty
        &self.score.positions()[self.index]
    }

    pub fn measure(&self) -> Measure {
        self.score.measure_at(self.index)
    }

    pub fn progress(&self) -> MeasureProgress {
        MeasureProgress {
            current: self.measure(),
            total: self.score.total_measures(),
        }
    }

    pub fn state(&self) -> CursorState {
        CursorState {
            index: self.index,
            end_reached: self.is_at_end(),
        }
    }

    pub fn loop_range(&self) -> Option<LoopRange> {
        self.loop_range
    }

    /// Set or clear the loop bound. The range is clamped to the score and
    /// snapped onto measures that have positions; the cursor is not moved.
    pub fn set_loop(&mut self, range: Option<LoopRange>) {
        let first = self.score.first_measure();
        let last = self.score.total_measures();
        self.loop_range = range.map(|r| self.snap(r.clamp_to(first, last)));
    }

    /// Shrink `range` to the measures inside it that hold positions. A range
    /// with none at all grows to the nearest populated measures around it.
    fn snap(&self, range: LoopRange) -> LoopRange {
        let measures = self.score.positions().iter().map(|p| p.measure);
        let inside: Vec<Measure> = measures.clone().filter(|m| range.contains(*m)).collect();
        if let (Some(start), Some(end)) = (inside.first(), inside.last()) {
            return LoopRange::new(*start, *end);
        }
        let before = measures.clone().filter(|m| *m < range.start).last();
        let after = measures.clone().find(|m| *m > range.end);
        match (before, after) {
            (Some(start), Some(end)) => LoopRange::new(start, end),
            (Some(m), None) | (None, Some(m)) => LoopRange::new(m, m),
            (None, None) => range,
        }
    }

    /// True once the cursor stands on the final position and no loop can
    /// carry it further; `next` is a no-op from here.
    ///
    /// This turns true on arrival, while the last notes are still due. The
    /// piece is finished only when `PracticeEvent::PieceCompleted` is sent.
    pub fn is_at_end(&self) -> bool {
        self.loop_range.is_none() && self.index >= self.score.last_index()
    }

    pub fn next(&mut self) -> Step {
        if self.is_at_end() {
            return Step::AtEnd;
        }

        if let Some(range) = self.loop_range {
            let wraps = self.index >= self.score.last_index()
                || self.score.measure_at(self.index + 1) > range.end;
            if wraps {
                self.index = self.score.first_index_of_measure(range.start);
                return Step::Wrapped;
            }
        }

        self.index += 1;
        Step::Moved
    }

    pub fn previous(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        if let Some(range) = self.loop_range {
            if self.score.measure_at(self.index - 1) < range.start {
                return false;
            }
        }
        self.index -= 1;
        true
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Move to the first position of `measure`, clamped to the score and, when
    /// looping, to the loop range.
    pub fn jump_to_measure(&mut self, measure: Measure) {
        let measure = match self.loop_range {
            Some(range) => measure.clamp(range.start, range.end),
            None => measure,
        };
        self.index = self.score.first_index_of_measure(measure);
    }

    /// Step forward with `next` until a position satisfies `matches`.
    ///
    /// Stops at the end of the score, or after one full lap of the loop range
    /// without a match.
    pub fn next_matching(&mut self, matches: impl Fn(&Position) -> bool) -> Walk {
        let mut moved = false;
        for _ in 0..self.score.len() {
            if !self.next().moved() {
                return Walk {
                    moved,
                    found: false,
                };
            }
            moved = true;
            if matches(self.position()) {
                return Walk { moved, found: true };
            }
        }
        Walk {
            moved,
            found: false,
        }
    }
}
