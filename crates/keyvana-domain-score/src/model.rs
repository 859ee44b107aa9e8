use serde::{Deserialize, Serialize};

pub type Measure = u32; // 1-based
pub type PositionIndex = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DueNote {
    pub pitch: u8,
    pub hand: Hand,
    pub duration_beats: f32,
}

impl DueNote {
    pub fn new(pitch: u8, hand: Hand, duration_beats: f32) -> Self {
        Self {
            pitch,
            hand,
            duration_beats,
        }
    }
}

/// One cursor stop. An empty `notes` list is a bar line, rest-only slice or
/// other structural marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub measure: Measure,
    #[serde(default)]
    pub notes: Vec<DueNote>,
}

impl Position {
    pub fn new(measure: Measure, notes: Vec<DueNote>) -> Self {
        Self { measure, notes }
    }

    pub fn is_structural(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn has_notes_for(&self, hand: Hand) -> bool {
        self.notes.iter().any(|note| note.hand == hand)
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ScoreError {
    #[error("score has no positions")]
    Empty,
    #[error("position {index}: measure numbers start at 1")]
    MeasureZero { index: PositionIndex },
    #[error("position {index}: measure {measure} comes after measure {previous}")]
    OutOfOrder {
        index: PositionIndex,
        measure: Measure,
        previous: Measure,
    },
    #[error("position {index}: pitch {pitch} is outside 0..=127")]
    PitchOutOfRange { index: PositionIndex, pitch: u8 },
    #[error("position {index}: invalid duration {duration}")]
    InvalidDuration { index: PositionIndex, duration: f32 },
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// The navigable positions of a loaded piece, validated once on construction.
#[derive(Clone, Debug, PartialEq)]
pub struct ScorePositions {
    positions: Vec<Position>,
    total_measures: Measure,
}

impl ScorePositions {
    pub fn new(positions: Vec<Position>) -> Result<Self, ScoreError> {
        if positions.is_empty() {
            return Err(ScoreError::Empty);
        }

        let mut previous = 1;
        for (index, position) in positions.iter().enumerate() {
            if position.measure == 0 {
                return Err(ScoreError::MeasureZero { index });
            }
            if position.measure < previous {
                return Err(ScoreError::OutOfOrder {
                    index,
                    measure: position.measure,
                    previous,
                });
            }
            previous = position.measure;

            for note in &position.notes {
                if note.pitch > 127 {
                    return Err(ScoreError::PitchOutOfRange {
                        index,
                        pitch: note.pitch,
                    });
                }
                if !note.duration_beats.is_finite() || note.duration_beats < 0.0 {
                    return Err(ScoreError::InvalidDuration {
                        index,
                        duration: note.duration_beats,
                    });
                }
            }
        }

        Ok(Self {
            total_measures: previous,
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn last_index(&self) -> PositionIndex {
        self.positions.len() - 1
    }

    pub fn get(&self, index: PositionIndex) -> Option<&Position> {
        self.positions.get(index)
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn first_measure(&self) -> Measure {
        self.positions[0].measure
    }

    pub fn total_measures(&self) -> Measure {
        self.total_measures
    }

    pub fn measure_at(&self, index: PositionIndex) -> Measure {
        self.positions
            .get(index.min(self.last_index()))
            .map(|p| p.measure)
            .unwrap_or(1)
    }

    pub fn clamp_measure(&self, measure: Measure) -> Measure {
        measure.clamp(self.first_measure(), self.total_measures)
    }

    /// First position whose measure is `measure` or, when that measure has no
    /// position of its own, the first one after it.
    pub fn first_index_of_measure(&self, measure: Measure) -> PositionIndex {
        let measure = self.clamp_measure(measure);
        self.positions
            .iter()
            .position(|p| p.measure >= measure)
            .unwrap_or(self.last_index())
    }
}

/// Something that can (re)derive the positions of the current score, such as
/// the notation renderer after a reload.
pub trait PositionSource {
    fn derive_positions(&self) -> Result<Vec<Position>, ScoreError>;

    fn load(&self) -> Result<ScorePositions, ScoreError> {
        ScorePositions::new(self.derive_positions()?)
    }
}

impl PositionSource for Vec<Position> {
    fn derive_positions(&self) -> Result<Vec<Position>, ScoreError> {
        Ok(self.clone())
    }
}
