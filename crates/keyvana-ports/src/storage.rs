use crate::types::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_METRONOME_BPM: u32 = 80;
pub const DEFAULT_KEYBOARD_OCTAVE: i8 = 4;

fn default_master_volume() -> Volume01 {
    Volume01::new(0.8)
}

fn default_bus_user_volume() -> Volume01 {
    Volume01::new(0.8)
}

fn default_bus_metronome_volume() -> Volume01 {
    Volume01::new(0.6)
}

fn default_metronome_bpm() -> u32 {
    DEFAULT_METRONOME_BPM
}

fn default_keyboard_octave() -> i8 {
    DEFAULT_KEYBOARD_OCTAVE
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDto {
    pub selected_midi_in: Option<DeviceId>,
    pub selected_audio_out: Option<DeviceId>,
    pub audio_buffer_size_frames: Option<u32>,
    #[serde(default = "default_master_volume")]
    pub master_volume: Volume01,
    #[serde(default = "default_bus_user_volume")]
    pub bus_user_volume: Volume01,
    #[serde(default = "default_bus_metronome_volume")]
    pub bus_metronome_volume: Volume01,
    #[serde(default = "default_metronome_bpm")]
    pub metronome_bpm: u32,
    pub muted: bool,
    #[serde(default = "default_keyboard_octave")]
    pub keyboard_octave: i8,
    /// Wait `duration × 60000 / bpm` ms before advancing a satisfied position.
    pub delayed_advance: bool,
    pub default_sf2_path: Option<String>,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self {
            selected_midi_in: None,
            selected_audio_out: None,
            audio_buffer_size_frames: None,
            master_volume: default_master_volume(),
            bus_user_volume: default_bus_user_volume(),
            bus_metronome_volume: default_bus_metronome_volume(),
            metronome_bpm: DEFAULT_METRONOME_BPM,
            muted: false,
            keyboard_octave: DEFAULT_KEYBOARD_OCTAVE,
            delayed_advance: false,
            default_sf2_path: None,
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SettingsDto, StorageError>;
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError>;
}
