use crate::audio::AudioError;
use crate::synth::{SoundFontInfo, SynthError};
use crate::types::*;

/// The sound side of the practice engine.
///
/// Notes played by the user and metronome clicks both go through this
/// interface. Implementations are called from the engine thread only; anything
/// that reaches the audio thread must be handed over without blocking.
pub trait AudioTrigger: Send {
    /// Make sure the audio clock is running, starting the output if needed.
    fn ensure_started(&mut self) -> Result<(), AudioError>;

    /// Current audio clock, or `None` while no output is running.
    fn clock(&self) -> Option<ClockTime>;

    fn play_note(&mut self, note: u8, velocity: u8);
    fn stop_note(&mut self, note: u8);
    fn stop_all(&mut self);

    /// Muting silences everything currently sounding and drops new note-ons.
    fn set_muted(&mut self, muted: bool);
    fn is_muted(&self) -> bool;

    /// Queue a short percussive click that starts exactly at `at`.
    fn schedule_click(&mut self, at: SampleTime, accent: bool);

    /// Drop every queued click that has not sounded yet.
    fn cancel_clicks(&mut self);

    fn set_master_volume(&mut self, _volume: Volume01) {}

    fn set_bus_volume(&mut self, _bus: Bus, _volume: Volume01) {}

    fn load_soundfont(&mut self, _path: &str) -> Result<SoundFontInfo, SynthError> {
        Err(SynthError::UnsupportedFormat)
    }
}
