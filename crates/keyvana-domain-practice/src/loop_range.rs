use keyvana_domain_score::Measure;
use serde::{Deserialize, Serialize};

/// Inclusive measure interval, always `1 <= start <= end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRange {
    pub start: Measure,
    pub end: Measure,
}

impl LoopRange {
    pub fn new(a: Measure, b: Measure) -> Self {
        let a = a.max(1);
        let b = b.max(1);
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn contains(&self, measure: Measure) -> bool {
        measure >= self.start && measure <= self.end
    }

    pub fn clamp_to(self, first: Measure, last: Measure) -> Self {
        Self::new(self.start.clamp(first, last), self.end.clamp(first, last))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value")]
pub enum LoopSelection {
    Idle,
    PendingStart(Measure),
    Active(LoopRange),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopTransition {
    /// First boundary chosen. `replaced` is set when an active range was
    /// dropped to make room for the new selection.
    Pending {
        start: Measure,
        replaced: Option<LoopRange>,
    },
    Activated(LoopRange),
    Deactivated(LoopRange),
}

impl Default for LoopSelection {
    fn default() -> Self {
        Self::Idle
    }
}

impl LoopSelection {
    pub fn active_range(&self) -> Option<LoopRange> {
        match self {
            LoopSelection::Active(range) => Some(*range),
            _ => None,
        }
    }

    pub fn pending_start(&self) -> Option<Measure> {
        match self {
            LoopSelection::PendingStart(start) => Some(*start),
            _ => None,
        }
    }

    /// Apply a click on `measure`.
    pub fn select(&mut self, measure: Measure) -> LoopTransition {
        let measure = measure.max(1);
        let (next, transition) = match *self {
            LoopSelection::Active(range) if range.contains(measure) => {
                (LoopSelection::Idle, LoopTransition::Deactivated(range))
            }
            LoopSelection::Active(range) => (
                LoopSelection::PendingStart(measure),
                LoopTransition::Pending {
                    start: measure,
                    replaced: Some(range),
                },
            ),
            LoopSelection::Idle => (
                LoopSelection::PendingStart(measure),
                LoopTransition::Pending {
                    start: measure,
                    replaced: None,
                },
            ),
            LoopSelection::PendingStart(start) => {
                let range = LoopRange::new(start, measure);
                (LoopSelection::Active(range), LoopTransition::Activated(range))
            }
        };
        *self = next;
        transition
    }

    pub fn clear(&mut self) -> bool {
        let changed = *self != LoopSelection::Idle;
        *self = LoopSelection::Idle;
        changed
    }

    /// Keep the selection valid for a score with measures `first..=last`.
    pub fn clamp_to(&mut self, first: Measure, last: Measure) {
        *self = match *self {
            LoopSelection::Idle => LoopSelection::Idle,
            LoopSelection::PendingStart(start) => {
                LoopSelection::PendingStart(start.clamp(first, last))
            }
            LoopSelection::Active(range) => LoopSelection::Active(range.clamp_to(first, last)),
        };
    }
}
