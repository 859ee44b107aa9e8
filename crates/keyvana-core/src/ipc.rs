use crate::metronome::Click;
use keyvana_domain_practice::{CursorState, HandMode, LoopSelection, MeasureProgress, SkipTrigger};
use keyvana_domain_score::{DueNote, Measure, Position, PositionIndex};
use keyvana_ports::storage::SettingsDto;
use keyvana_ports::types::{Bus, DeviceId, MidiInputDevice, SampleTime, Volume01};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ScoreSource {
    /// Positions handed over directly by the notation renderer.
    Positions(Vec<Position>),
    JsonFile(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    LoadScore { source: ScoreSource },
    Next,
    Previous,
    Reset,
    JumpToMeasure { measure: Measure },
    SelectMeasure { measure: Measure },
    ClearLoop,
    SetHandMode { mode: HandMode },
    KeyDown { key: char, repeat: bool },
    KeyUp { key: char },
    FocusLost,
    OctaveUp,
    OctaveDown,
    ListMidiInputs,
    SelectMidiInput { device_id: DeviceId },
    DisconnectMidiInput,
    StartMetronome { bpm: Option<u32> },
    StopMetronome,
    SetMetronomeBpm { bpm: u32 },
    NudgeMetronomeBpm { delta: i32 },
    SetMuted { muted: bool },
    SetDelayedAdvance { enabled: bool },
    SetMasterVolume { volume: Volume01 },
    SetBusVolume { bus: Bus, volume: Volume01 },
    LoadSoundFont { path: String },
    RequestSnapshot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    Requested,
    DeviceLost,
    Shutdown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    ScoreLoaded {
        positions: usize,
        total_measures: Measure,
    },
    ScoreLoadFailed {
        message: String,
    },
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
    PieceCompleted,
    LoopSelectionChanged {
        selection: LoopSelection,
    },
    HandModeChanged {
        mode: HandMode,
    },
    HeldNotesChanged {
        pitches: Vec<u8>,
    },
    KeyboardOctaveChanged {
        octave: i8,
    },
    MidiInputsUpdated {
        devices: Vec<MidiInputDevice>,
    },
    MidiInputConnected {
        device_id: DeviceId,
    },
    MidiInputDisconnected {
        device_id: DeviceId,
        reason: DisconnectReason,
    },
    MidiInputError {
        message: String,
    },
    MetronomeStateChanged {
        running: bool,
        bpm: u32,
    },
    MetronomePulse {
        beat: u64,
        accent: bool,
        sample_time: SampleTime,
    },
    MutedChanged {
        muted: bool,
    },
    SettingsUpdated {
        settings: SettingsDto,
    },
    Snapshot {
        cursor: Option<CursorState>,
        due: Vec<DueNote>,
        hand_mode: HandMode,
        loop_selection: LoopSelection,
        held: Vec<u8>,
        metronome_running: bool,
        settings: SettingsDto,
    },
}

impl From<Click> for Event {
    fn from(click: Click) -> Self {
        Event::MetronomePulse {
            beat: click.beat,
            accent: click.accent,
            sample_time: click.sample_time,
        }
    }
}
